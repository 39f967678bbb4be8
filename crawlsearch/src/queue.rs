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

//! The Redis-backed job queue: `crawl_queue`, `indexing_queue`, and the
//! query-result cache (§3, §4.3).

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use thiserror::Error;

const CRAWL_QUEUE_KEY: &str = "crawl_queue";
const INDEXING_QUEUE_KEY: &str = "indexing_queue";
const CACHE_PREFIX: &str = "query_cache:";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error(transparent)]
    Redis(#[from] redis::RedisError),
    #[error("fake queue failure injected for test {0}")]
    Fake(&'static str),
}

/// The queue/cache surface the crawler, indexer, and ranker depend on.
/// `JobQueue` implements this against Redis; `fakes::FakeQueue` implements
/// it in memory so callers can be tested without a live Redis.
#[async_trait::async_trait]
pub trait Queue: Send + Sync {
    /// Seeds `crawl_queue` with `url` if it is currently empty (§4.3).
    async fn seed_crawl_queue_if_empty(&self, url: &str) -> Result<(), QueueError>;

    async fn push_crawl_url(&self, url: &str) -> Result<(), QueueError>;

    /// Non-blocking pop; `None` on an empty queue (§4.3, §4.4 step 1 — the
    /// caller sleeps `QUEUE_POLL_INTERVAL` and retries).
    async fn pop_crawl_url(&self) -> Result<Option<String>, QueueError>;

    /// A single, unretried attempt to push `doc_id` onto `indexing_queue`.
    async fn push_indexing_job_once(&self, doc_id: i64) -> Result<(), QueueError>;

    /// Indefinite blocking pop (§4.3, §4.5 step 1).
    async fn pop_indexing_job(&self) -> Result<i64, QueueError>;

    async fn cache_get(&self, query: &str) -> Result<Option<String>, QueueError>;

    async fn cache_set(&self, query: &str, payload: &str, ttl_secs: u64) -> Result<(), QueueError>;

    /// Bounded-retry push used by the crawler to hand a document off to the
    /// indexer (§4.4 step 7). Returns `Ok(false)` once all attempts are
    /// exhausted so the caller can fall back to `mark_not_queued`. Defined
    /// once here, over `push_indexing_job_once`, so both the real store and
    /// any fake get the same retry semantics for free.
    async fn push_indexing_job(&self, doc_id: i64, max_retries: u32) -> Result<bool, QueueError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.push_indexing_job_once(doc_id).await {
                Ok(()) => return Ok(true),
                Err(err) if attempt < max_retries => {
                    log::warn!("indexing enqueue attempt {attempt}/{max_retries} failed: {err}");
                }
                Err(err) => {
                    log::error!("indexing enqueue exhausted {max_retries} attempts: {err}");
                    return Ok(false);
                }
            }
        }
    }
}

/// A pooled, cloneable handle onto the queues and cache. `ConnectionManager`
/// reconnects transparently, matching the crawler lineage's preference for
/// long-lived handles over per-call connections.
#[derive(Clone)]
pub struct JobQueue {
    conn: ConnectionManager,
}

impl JobQueue {
    /// Connects with bounded retry (§4.4, §7), identical policy to the
    /// metadata store's startup contract: `max_retries` attempts with
    /// `backoff` between each, fatal on exhaustion.
    pub async fn connect(
        redis_url: &str,
        max_retries: u32,
        backoff: std::time::Duration,
    ) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url)?;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match client.get_connection_manager().await {
                Ok(conn) => return Ok(Self { conn }),
                Err(err) if attempt < max_retries => {
                    log::warn!("redis connect attempt {attempt}/{max_retries} failed: {err}");
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

}

#[async_trait::async_trait]
impl Queue for JobQueue {
    async fn seed_crawl_queue_if_empty(&self, url: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        let len: i64 = conn.llen(CRAWL_QUEUE_KEY).await?;
        if len == 0 {
            conn.rpush::<_, _, ()>(CRAWL_QUEUE_KEY, url).await?;
        }
        Ok(())
    }

    async fn push_crawl_url(&self, url: &str) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.rpush(CRAWL_QUEUE_KEY, url).await?;
        Ok(())
    }

    async fn pop_crawl_url(&self) -> Result<Option<String>, QueueError> {
        let mut conn = self.conn.clone();
        Ok(conn.lpop(CRAWL_QUEUE_KEY, None).await?)
    }

    async fn push_indexing_job_once(&self, doc_id: i64) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.rpush(INDEXING_QUEUE_KEY, doc_id).await?;
        Ok(())
    }

    async fn pop_indexing_job(&self) -> Result<i64, QueueError> {
        let mut conn = self.conn.clone();
        let (_, doc_id): (String, i64) = conn.blpop(INDEXING_QUEUE_KEY, 0.0).await?;
        Ok(doc_id)
    }

    async fn cache_get(&self, query: &str) -> Result<Option<String>, QueueError> {
        let mut conn = self.conn.clone();
        Ok(conn.get(format!("{CACHE_PREFIX}{query}")).await?)
    }

    async fn cache_set(&self, query: &str, payload: &str, ttl_secs: u64) -> Result<(), QueueError> {
        let mut conn = self.conn.clone();
        conn.set_ex(format!("{CACHE_PREFIX}{query}"), payload, ttl_secs)
            .await?;
        Ok(())
    }
}

/// A small in-memory stand-in for [`JobQueue`], used by tests that need
/// queue/cache behavior without a live Redis (ambient test-tooling
/// requirement of §1.1).
#[cfg(test)]
pub mod fakes {
    use super::{Queue, QueueError};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeQueue {
        crawl: Mutex<VecDeque<String>>,
        indexing: Mutex<VecDeque<i64>>,
        cache: Mutex<HashMap<String, String>>,
        /// Number of remaining `push_indexing_job_once` calls that should
        /// fail before succeeding, for exercising the bounded-retry path.
        fail_pushes: Mutex<u32>,
    }

    impl FakeQueue {
        pub fn new() -> Self {
            Self::default()
        }

        /// The next `count` calls to `push_indexing_job_once` return an
        /// error instead of enqueuing.
        pub fn fail_next_pushes(&self, count: u32) {
            *self.fail_pushes.lock().unwrap() = count;
        }

        pub fn indexing_queue_len(&self) -> usize {
            self.indexing.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl Queue for FakeQueue {
        async fn seed_crawl_queue_if_empty(&self, url: &str) -> Result<(), QueueError> {
            let mut crawl = self.crawl.lock().unwrap();
            if crawl.is_empty() {
                crawl.push_back(url.to_string());
            }
            Ok(())
        }

        async fn push_crawl_url(&self, url: &str) -> Result<(), QueueError> {
            self.crawl.lock().unwrap().push_back(url.to_string());
            Ok(())
        }

        async fn pop_crawl_url(&self) -> Result<Option<String>, QueueError> {
            Ok(self.crawl.lock().unwrap().pop_front())
        }

        async fn push_indexing_job_once(&self, doc_id: i64) -> Result<(), QueueError> {
            let mut remaining = self.fail_pushes.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(QueueError::Fake("push_indexing_job_once"));
            }
            self.indexing.lock().unwrap().push_back(doc_id);
            Ok(())
        }

        async fn pop_indexing_job(&self) -> Result<i64, QueueError> {
            self.indexing
                .lock()
                .unwrap()
                .pop_front()
                .ok_or(QueueError::Fake("pop_indexing_job on empty queue"))
        }

        async fn cache_get(&self, query: &str) -> Result<Option<String>, QueueError> {
            Ok(self.cache.lock().unwrap().get(query).cloned())
        }

        async fn cache_set(
            &self,
            query: &str,
            payload: &str,
            _ttl_secs: u64,
        ) -> Result<(), QueueError> {
            self.cache
                .lock()
                .unwrap()
                .insert(query.to_string(), payload.to_string());
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::fakes::FakeQueue;
    use super::*;

    #[test]
    fn queue_keys_are_namespaced_distinctly() {
        assert_ne!(CRAWL_QUEUE_KEY, INDEXING_QUEUE_KEY);
    }

    #[test]
    fn cache_prefix_disambiguates_from_queue_keys() {
        assert!(!CRAWL_QUEUE_KEY.starts_with(CACHE_PREFIX));
        assert!(!INDEXING_QUEUE_KEY.starts_with(CACHE_PREFIX));
    }

    #[tokio::test]
    async fn seed_only_fills_an_empty_crawl_queue() {
        let queue = FakeQueue::new();
        queue.seed_crawl_queue_if_empty("https://a.example").await.unwrap();
        queue.seed_crawl_queue_if_empty("https://b.example").await.unwrap();
        assert_eq!(queue.pop_crawl_url().await.unwrap().as_deref(), Some("https://a.example"));
        assert_eq!(queue.pop_crawl_url().await.unwrap(), None);
    }

    #[tokio::test]
    async fn push_indexing_job_retries_then_succeeds() {
        let queue = FakeQueue::new();
        queue.fail_next_pushes(2);
        let enqueued = queue.push_indexing_job(42, 5).await.unwrap();
        assert!(enqueued);
        assert_eq!(queue.indexing_queue_len(), 1);
    }

    #[tokio::test]
    async fn push_indexing_job_gives_up_after_max_retries() {
        let queue = FakeQueue::new();
        queue.fail_next_pushes(10);
        let enqueued = queue.push_indexing_job(42, 3).await.unwrap();
        assert!(!enqueued);
        assert_eq!(queue.indexing_queue_len(), 0);
    }

    #[tokio::test]
    async fn cache_round_trips_through_the_trait() {
        let queue = FakeQueue::new();
        assert_eq!(queue.cache_get("q").await.unwrap(), None);
        queue.cache_set("q", "payload", 60).await.unwrap();
        assert_eq!(queue.cache_get("q").await.unwrap().as_deref(), Some("payload"));
    }
}
