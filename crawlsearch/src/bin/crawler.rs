// Copyright 2024 Felix Engl
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The crawler worker (§4.4): pops URLs, fetches them, archives the body,
//! and hands the document off to the indexer.

use crawlsearch::archive::ArchiveWriter;
use crawlsearch::config::Configs;
use crawlsearch::logging::configure_logging;
use crawlsearch::metadata::{ArchiveLocation, MetadataStore, ReserveOutcome};
use crawlsearch::queue::{JobQueue, Queue};
use data_encoding::BASE32;
use std::time::Duration;
use twox_hash::xxh3;

fn is_valid_url(url: &str) -> bool {
    url.len() >= 10 && (url.starts_with("http://") || url.starts_with("https://"))
}

/// A Base32-encoded xxh3/128 digest of the raw response body (§4.4.1).
fn content_hash(body: &[u8]) -> String {
    BASE32.encode(&xxh3::hash128(body).to_be_bytes())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let configs = Configs::load()?;
    configure_logging("crawler", &configs);

    let metadata = MetadataStore::connect(
        &configs.db_connection_string(),
        configs.db_pool_size,
        configs.store_connect_max_retries,
        Duration::from_secs(configs.store_connect_backoff_secs),
    )
    .await?;

    let queue = JobQueue::connect(
        &configs.redis_url(),
        configs.store_connect_max_retries,
        Duration::from_secs(configs.store_connect_backoff_secs),
    )
    .await?;

    if let Some(seed_url) = &configs.seed_url {
        queue.seed_crawl_queue_if_empty(seed_url).await?;
    }

    let archive = ArchiveWriter::open(
        configs.warc_base_path.clone(),
        "crawl",
        configs.warc_max_file_size_bytes,
    )?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(configs.http_fetch_timeout_secs))
        .user_agent(configs.http_user_agent.clone())
        .build()?;

    log::info!("crawler worker starting");

    let mut shutdown = Box::pin(tokio::signal::ctrl_c());
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("crawler worker shutting down");
                break;
            }
            url = queue.pop_crawl_url() => {
                match url {
                    Ok(Some(url)) => {
                        if let Err(err) = crawl_one(&url, &metadata, &queue, &archive, &http, &configs).await {
                            log::error!("crawl failed for {url}: {err}");
                        }
                        tokio::time::sleep(Duration::from_secs(configs.crawl_delay_secs)).await;
                    }
                    Ok(None) => {
                        tokio::time::sleep(Duration::from_secs(configs.queue_poll_interval_secs)).await;
                    }
                    Err(err) => {
                        log::error!("queue pop failed: {err}");
                        tokio::time::sleep(Duration::from_secs(configs.queue_poll_interval_secs)).await;
                    }
                }
            }
        }
    }

    Ok(())
}

async fn crawl_one(
    url: &str,
    metadata: &MetadataStore,
    queue: &JobQueue,
    archive: &ArchiveWriter,
    http: &reqwest::Client,
    configs: &Configs,
) -> anyhow::Result<()> {
    if !is_valid_url(url) {
        log::warn!("discarding invalid url: {url}");
        return Ok(());
    }

    let doc_id = match metadata.reserve(url).await? {
        ReserveOutcome::Duplicate => {
            log::info!("duplicate url, skipping: {url}");
            return Ok(());
        }
        ReserveOutcome::Created(doc_id) => doc_id,
    };

    let response = match http.get(url).send().await {
        Ok(response) => response,
        Err(err) => {
            log::warn!("fetch failed for {url}: {err}");
            return Ok(());
        }
    };

    let body = match response.bytes().await {
        Ok(body) if !body.is_empty() => body,
        Ok(_) => {
            log::warn!("empty body for {url}");
            return Ok(());
        }
        Err(err) => {
            log::warn!("failed to read body for {url}: {err}");
            return Ok(());
        }
    };

    // Distinct from a fetch failure (left `processing`, §9/§10): the URL was
    // fetched but the archive write itself failed, which is unrecoverable
    // for this doc_id, so it is marked `error` rather than left stuck in
    // `processing` indistinguishable from a future retry candidate.
    let locator = match archive.write_record(url, &body).await {
        Ok(locator) => locator,
        Err(err) => {
            log::error!("archive write failed for {url}: {err}");
            if let Err(mark_err) = metadata.mark_failed(doc_id).await {
                log::error!("failed to mark doc {doc_id} as error: {mark_err}");
            }
            return Ok(());
        }
    };
    let hash = content_hash(&body);

    metadata
        .mark_crawled(
            doc_id,
            ArchiveLocation {
                file_path: locator.file_name,
                offset: locator.offset as i64,
                length: locator.length as i32,
                content_hash: Some(hash),
            },
        )
        .await?;

    let enqueued = queue
        .push_indexing_job(doc_id, configs.index_enqueue_max_retries)
        .await?;
    if !enqueued {
        metadata.mark_not_queued(doc_id).await?;
    }

    log::info!("crawled {url} as doc {doc_id}");
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accepts_http_and_https_urls_of_sufficient_length() {
        assert!(is_valid_url("http://example.test"));
        assert!(is_valid_url("https://example.test/page"));
    }

    #[test]
    fn rejects_urls_below_the_minimum_length() {
        assert!(!is_valid_url("http://a"));
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(!is_valid_url("ftp://example.test/file"));
        assert!(!is_valid_url("javascript:alert(1)"));
    }

    #[test]
    fn content_hash_is_stable_for_the_same_body() {
        let body = b"hello world";
        assert_eq!(content_hash(body), content_hash(body));
        assert_ne!(content_hash(body), content_hash(b"different"));
    }
}
