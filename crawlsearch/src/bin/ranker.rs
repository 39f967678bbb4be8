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

//! The ranking service (§4.6): an HTTP endpoint that scores the corpus
//! against a query and returns ranked, snippeted results.

use actix_web::{web, App, HttpResponse, HttpServer};
use crawlsearch::archive::read_record;
use crawlsearch::config::Configs;
use crawlsearch::html;
use crawlsearch::index::{Index, InvertedIndex};
use crawlsearch::logging::configure_logging;
use crawlsearch::metadata::{CorpusStats, MetadataStore};
use crawlsearch::queue::{JobQueue, Queue};
use crawlsearch::ranking::{generate_snippet, score_documents};
use crawlsearch::tokenize::normalize_query;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

struct CorpusStatsCache {
    stats: RwLock<(CorpusStats, Instant)>,
    refresh_interval: Duration,
}

impl CorpusStatsCache {
    fn new(initial: CorpusStats, refresh_interval: Duration) -> Self {
        Self {
            stats: RwLock::new((initial, Instant::now())),
            refresh_interval,
        }
    }

    async fn get(&self, metadata: &MetadataStore) -> CorpusStats {
        {
            let guard = self.stats.read().await;
            if guard.1.elapsed() < self.refresh_interval {
                return guard.0;
            }
        }
        match metadata.corpus_stats().await {
            Ok(fresh) => {
                let mut guard = self.stats.write().await;
                *guard = (fresh, Instant::now());
                fresh
            }
            Err(err) => {
                log::warn!("failed to refresh corpus stats: {err}");
                self.stats.read().await.0
            }
        }
    }
}

/// The store handles, present only if their respective connection attempt
/// succeeded at startup. Held separately from `AppState` so `/health` can
/// check liveness with a cheap `is_some()` each, without touching any of
/// them (§4.6.1).
struct Stores {
    metadata: Option<MetadataStore>,
    queue: Option<JobQueue>,
    index: Option<InvertedIndex>,
}

struct AppState {
    stores: Stores,
    corpus_stats: CorpusStatsCache,
    configs: Configs,
}

#[derive(Debug, Serialize)]
struct SearchResult {
    id: i64,
    url: String,
    title: Option<String>,
    snippet: String,
    score: f64,
}

#[derive(Debug, Serialize)]
struct SearchMeta {
    count: usize,
    latency_ms: u128,
}

#[derive(Debug, Serialize)]
struct SearchResponse {
    query: String,
    results: Vec<SearchResult>,
    meta: SearchMeta,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: String,
}

async fn health(state: web::Data<Arc<AppState>>) -> HttpResponse {
    let stores = &state.stores;
    if stores.metadata.is_some() && stores.queue.is_some() && stores.index.is_some() {
        HttpResponse::Ok().json(serde_json::json!({"status": "healthy", "service": "ranker"}))
    } else {
        HttpResponse::ServiceUnavailable()
            .json(serde_json::json!({"status": "unhealthy", "service": "ranker"}))
    }
}

async fn search(
    state: web::Data<Arc<AppState>>,
    query: web::Query<SearchQuery>,
) -> HttpResponse {
    let (Some(metadata), Some(queue), Some(index)) =
        (&state.stores.metadata, &state.stores.queue, &state.stores.index)
    else {
        return HttpResponse::ServiceUnavailable()
            .json(serde_json::json!({"error": "a backing store is unavailable"}));
    };

    let started = Instant::now();
    let normalized_terms = normalize_query(&query.q, state.configs.ranker_min_token_len);
    let cache_key = normalized_terms.join(" ");

    if let Ok(Some(cached)) = queue.cache_get(&cache_key).await {
        if let Ok(response) = serde_json::from_str::<SearchResponse>(&cached) {
            let mut response = response;
            response.meta.latency_ms = started.elapsed().as_millis();
            return HttpResponse::Ok().json(response);
        }
    }

    let mut postings = HashMap::new();
    for term in &normalized_terms {
        let ids: Vec<i64> = index
            .get_postings(term)
            .unwrap_or_default()
            .into_iter()
            .map(|id| id as i64)
            .collect();
        postings.insert(term.clone(), ids);
    }

    let stats = state.corpus_stats.get(metadata).await;

    let candidate_ids: Vec<i64> = postings
        .values()
        .flat_map(|ids| ids.iter().copied())
        .collect::<std::collections::HashSet<_>>()
        .into_iter()
        .collect();
    let summaries = metadata.fetch_many(&candidate_ids).await.unwrap_or_default();
    let doc_lengths: HashMap<i64, i64> = summaries
        .iter()
        .map(|summary| (summary.id, summary.doc_length.unwrap_or(0) as i64))
        .collect();

    let scored = score_documents(
        &postings,
        stats.document_count,
        stats.average_doc_length(),
        &doc_lengths,
    );

    let top: Vec<_> = scored
        .into_iter()
        .take(state.configs.ranker_results_per_page)
        .collect();

    let summary_by_id: HashMap<i64, _> = summaries.into_iter().map(|s| (s.id, s)).collect();

    let mut results = Vec::with_capacity(top.len());
    for scored_doc in &top {
        let Some(summary) = summary_by_id.get(&scored_doc.doc_id) else {
            continue;
        };
        let snippet = fetch_snippet(metadata, &state.configs, scored_doc.doc_id, &normalized_terms)
            .await
            .unwrap_or_default();
        results.push(SearchResult {
            id: summary.id,
            url: summary.url.clone(),
            title: summary.title.clone(),
            snippet,
            score: scored_doc.score,
        });
    }

    let response = SearchResponse {
        query: query.q.clone(),
        meta: SearchMeta {
            count: results.len(),
            latency_ms: started.elapsed().as_millis(),
        },
        results,
    };

    if let Ok(payload) = serde_json::to_string(&response) {
        let _ = queue
            .cache_set(&cache_key, &payload, state.configs.ranker_cache_ttl_secs)
            .await;
    }

    HttpResponse::Ok().json(response)
}

async fn fetch_snippet(
    metadata: &MetadataStore,
    configs: &Configs,
    doc_id: i64,
    terms: &[String],
) -> Option<String> {
    let (file_path, offset, length) = metadata.fetch_locator(doc_id).await.ok()??;
    let compressed = read_record(&configs.warc_base_path, &file_path, offset as u64, length as u64).ok()?;
    let mut decompressed = Vec::new();
    {
        use std::io::Read;
        flate2::read::GzDecoder::new(compressed.as_slice())
            .read_to_end(&mut decompressed)
            .ok()?;
    }
    let parsed = warc::parse_record(&decompressed).ok()?;
    let html_text = String::from_utf8_lossy(parsed.payload);
    let extracted = html::extract(&html_text);
    Some(generate_snippet(
        &extracted.text,
        terms,
        configs.ranker_snippet_max_chars,
    ))
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let configs = Configs::load()?;
    configure_logging("ranker", &configs);

    // Unlike the crawler and indexer, the ranker never aborts on a failed
    // store connection: it is request-scoped and cannot simply exit, so a
    // store that is down at startup is recorded as absent rather than
    // propagated via `?`, and `/health` reports 503 until an operator
    // restarts it with the store reachable (§4.6.1).
    let metadata = match MetadataStore::connect(
        &configs.db_connection_string(),
        configs.db_pool_size,
        configs.store_connect_max_retries,
        Duration::from_secs(configs.store_connect_backoff_secs),
    )
    .await
    {
        Ok(store) => Some(store),
        Err(err) => {
            log::error!("metadata store unreachable at startup: {err}");
            None
        }
    };

    let queue = match JobQueue::connect(
        &configs.redis_url(),
        configs.store_connect_max_retries,
        Duration::from_secs(configs.store_connect_backoff_secs),
    )
    .await
    {
        Ok(queue) => Some(queue),
        Err(err) => {
            log::error!("job queue unreachable at startup: {err}");
            None
        }
    };

    let index = match InvertedIndex::open(&configs.rocksdb_path) {
        Ok(index) => Some(index),
        Err(err) => {
            log::error!("inverted index unreachable at startup: {err}");
            None
        }
    };

    let initial_stats = match &metadata {
        Some(store) => store.corpus_stats().await.unwrap_or_default(),
        None => CorpusStats::default(),
    };
    let refresh_interval = Duration::from_secs(configs.ranker_corpus_stats_refresh_secs);

    let bind_addr = configs.ranker_bind_addr.clone();
    let state = Arc::new(AppState {
        stores: Stores { metadata, queue, index },
        corpus_stats: CorpusStatsCache::new(initial_stats, refresh_interval),
        configs,
    });

    log::info!("ranking service listening on {bind_addr}");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .route("/health", web::get().to(health))
            .route("/search", web::get().to(search))
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
