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

//! The indexer worker (§4.5): consumes crawled documents, extracts text,
//! tokenizes it, and folds the result into the inverted index.

use crawlsearch::archive::read_record;
use crawlsearch::config::Configs;
use crawlsearch::html;
use crawlsearch::index::{Index, InvertedIndex};
use crawlsearch::logging::configure_logging;
use crawlsearch::metadata::MetadataStore;
use crawlsearch::queue::{JobQueue, Queue};
use crawlsearch::tokenize::{tokenize, INDEXER_MIN_TOKEN_LEN};
use std::collections::HashSet;
use std::io::Read;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let configs = Configs::load()?;
    configure_logging("indexer", &configs);

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

    let index = InvertedIndex::open(&configs.rocksdb_path)?;

    log::info!("indexer worker starting");

    let mut shutdown = Box::pin(tokio::signal::ctrl_c());
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                log::info!("indexer worker shutting down");
                break;
            }
            doc_id = queue.pop_indexing_job() => {
                match doc_id {
                    Ok(doc_id) => {
                        if let Err(err) = index_one(doc_id, &metadata, &index, &configs).await {
                            log::error!("indexing doc {doc_id} failed: {err}");
                        }
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

async fn index_one(
    doc_id: i64,
    metadata: &MetadataStore,
    index: &InvertedIndex,
    configs: &Configs,
) -> anyhow::Result<()> {
    let Some((file_path, offset, length)) = metadata.fetch_locator(doc_id).await? else {
        log::warn!("no archive locator for doc {doc_id}, skipping");
        return Ok(());
    };

    let compressed = match read_record(&configs.warc_base_path, &file_path, offset as u64, length as u64) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!("short/corrupt archive read for doc {doc_id}: {err}");
            return Ok(());
        }
    };

    let mut decoder = flate2::read::GzDecoder::new(compressed.as_slice());
    let mut raw = Vec::new();
    let max_bytes = configs.indexer_max_decompressed_bytes as usize;
    let mut limited = decoder.by_ref().take(max_bytes as u64 + 1);
    if let Err(err) = limited.read_to_end(&mut raw) {
        log::warn!("decompression error for doc {doc_id}: {err}");
        return Ok(());
    }
    if raw.len() > max_bytes {
        log::warn!("doc {doc_id} exceeds max decompressed size, skipping");
        return Ok(());
    }

    let parsed = match warc::parse_record(&raw) {
        Ok(parsed) => parsed,
        Err(err) => {
            log::warn!("missing header delimiter for doc {doc_id}: {err}");
            return Ok(());
        }
    };

    let html_text = String::from_utf8_lossy(parsed.payload);
    let extracted = html::extract(&html_text);
    let tokens = tokenize(&extracted.text, INDEXER_MIN_TOKEN_LEN);
    let token_count = tokens.len();

    let unique_tokens: HashSet<String> = tokens.into_iter().collect();
    for token in &unique_tokens {
        if let Err(err) = index.add_doc_to_postings(token, doc_id as u64) {
            log::warn!("posting update failed for doc {doc_id}, term {token}: {err}");
        }
    }

    metadata.set_doc_length(doc_id, token_count as i32).await?;
    if let Some(title) = extracted.title {
        metadata.set_title_if_absent(doc_id, &title).await?;
    }

    log::info!("indexed doc {doc_id} ({token_count} tokens, {} unique terms)", unique_tokens.len());
    Ok(())
}
