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

//! The relational document record store (§3, §3.1, §4.2).

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Mirrors the `status` column (§3.1). Stored as `VARCHAR(20)`, not a
/// Postgres `ENUM`, so a new status is a one-line application change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentStatus {
    Pending,
    Processing,
    Crawled,
    CrawledNotQueued,
    Error,
}

impl DocumentStatus {
    fn as_str(self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Crawled => "crawled",
            DocumentStatus::CrawledNotQueued => "crawled_not_queued",
            DocumentStatus::Error => "error",
        }
    }

    fn from_str(value: &str) -> Option<Self> {
        Some(match value {
            "pending" => DocumentStatus::Pending,
            "processing" => DocumentStatus::Processing,
            "crawled" => DocumentStatus::Crawled,
            "crawled_not_queued" => DocumentStatus::CrawledNotQueued,
            "error" => DocumentStatus::Error,
            _ => return None,
        })
    }
}

/// Outcome of [`MetadataStore::reserve`]: either this call created the row
/// (and owns the fresh `doc_id`), or some other caller already had (§8
/// invariant 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReserveOutcome {
    Created(i64),
    Duplicate,
}

/// The archive locator plus content hash recorded at crawl time (§4.2,
/// §4.4.1).
#[derive(Debug, Clone)]
pub struct ArchiveLocation {
    pub file_path: String,
    pub offset: i64,
    pub length: i32,
    pub content_hash: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: i64,
    pub url: String,
    pub title: Option<String>,
    pub doc_length: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CorpusStats {
    pub document_count: i64,
    pub total_doc_length: i64,
}

impl CorpusStats {
    pub fn average_doc_length(&self) -> f64 {
        if self.document_count == 0 {
            0.0
        } else {
            self.total_doc_length as f64 / self.document_count as f64
        }
    }
}

/// The Postgres-backed document record store of §3/§4.2.
#[derive(Clone)]
pub struct MetadataStore {
    pool: PgPool,
}

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    id SERIAL PRIMARY KEY,
    url TEXT UNIQUE NOT NULL,
    status VARCHAR(20) NOT NULL DEFAULT 'pending',
    crawled_at TIMESTAMP NOT NULL DEFAULT now(),
    file_path TEXT,
    "offset" BIGINT,
    length INT,
    content_hash VARCHAR(64),
    title TEXT,
    doc_length INT
);
CREATE INDEX IF NOT EXISTS documents_url_idx ON documents (url);
CREATE INDEX IF NOT EXISTS documents_status_idx ON documents (status);
"#;

impl MetadataStore {
    /// Connects with bounded retry (§4.4, §7): `max_retries` attempts,
    /// `backoff` between each, then propagates the final error.
    pub async fn connect(
        connection_string: &str,
        pool_size: u32,
        max_retries: u32,
        backoff: std::time::Duration,
    ) -> Result<Self, MetadataError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match PgPoolOptions::new()
                .max_connections(pool_size)
                .connect(connection_string)
                .await
            {
                Ok(pool) => {
                    sqlx::query(DDL).execute(&pool).await?;
                    return Ok(Self { pool });
                }
                Err(err) if attempt < max_retries => {
                    log::warn!(
                        "metadata store connect attempt {attempt}/{max_retries} failed: {err}"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Inserts `(url, status='processing')`, returning the fresh id, or
    /// `Duplicate` if a row for `url` already exists (§4.2, §8 invariant 3).
    pub async fn reserve(&self, url: &str) -> Result<ReserveOutcome, MetadataError> {
        let row = sqlx::query(
            r#"
            INSERT INTO documents (url, status)
            VALUES ($1, $2)
            ON CONFLICT (url) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(url)
        .bind(DocumentStatus::Processing.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => ReserveOutcome::Created(row.get::<i32, _>("id") as i64),
            None => ReserveOutcome::Duplicate,
        })
    }

    /// Transitions `processing → crawled`, recording the archive locator and
    /// content hash in one statement (§4.2, §4.4.1).
    pub async fn mark_crawled(
        &self,
        doc_id: i64,
        location: ArchiveLocation,
    ) -> Result<(), MetadataError> {
        sqlx::query(
            r#"
            UPDATE documents
            SET status = $2, file_path = $3, "offset" = $4, length = $5, content_hash = $6
            WHERE id = $1
            "#,
        )
        .bind(doc_id as i32)
        .bind(DocumentStatus::Crawled.as_str())
        .bind(location.file_path)
        .bind(location.offset)
        .bind(location.length)
        .bind(location.content_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, doc_id: i64) -> Result<(), MetadataError> {
        self.set_status(doc_id, DocumentStatus::Error).await
    }

    pub async fn mark_not_queued(&self, doc_id: i64) -> Result<(), MetadataError> {
        self.set_status(doc_id, DocumentStatus::CrawledNotQueued)
            .await
    }

    async fn set_status(&self, doc_id: i64, status: DocumentStatus) -> Result<(), MetadataError> {
        sqlx::query("UPDATE documents SET status = $2 WHERE id = $1")
            .bind(doc_id as i32)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn fetch_locator(
        &self,
        doc_id: i64,
    ) -> Result<Option<(String, i64, i32)>, MetadataError> {
        let row = sqlx::query(
            r#"SELECT file_path, "offset", length FROM documents WHERE id = $1"#,
        )
        .bind(doc_id as i32)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.and_then(|row| {
            let file_path: Option<String> = row.get("file_path");
            let offset: Option<i64> = row.get("offset");
            let length: Option<i32> = row.get("length");
            match (file_path, offset, length) {
                (Some(file_path), Some(offset), Some(length)) => {
                    Some((file_path, offset, length))
                }
                _ => None,
            }
        }))
    }

    pub async fn set_doc_length(&self, doc_id: i64, length: i32) -> Result<(), MetadataError> {
        sqlx::query("UPDATE documents SET doc_length = $2 WHERE id = $1")
            .bind(doc_id as i32)
            .bind(length)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Sets `title` only if it is still unset (§4.5.1): the indexer that
    /// first sees a document wins, later passes are a no-op.
    pub async fn set_title_if_absent(
        &self,
        doc_id: i64,
        title: &str,
    ) -> Result<(), MetadataError> {
        sqlx::query("UPDATE documents SET title = $2 WHERE id = $1 AND title IS NULL")
            .bind(doc_id as i32)
            .bind(title)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// One batched `WHERE id = ANY($1)` lookup for the ranker's result join
    /// (§4.2.1). Ids with no matching row are simply absent.
    pub async fn fetch_many(
        &self,
        doc_ids: &[i64],
    ) -> Result<Vec<DocumentSummary>, MetadataError> {
        if doc_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<i32> = doc_ids.iter().map(|id| *id as i32).collect();
        let rows = sqlx::query(
            "SELECT id, url, title, doc_length FROM documents WHERE id = ANY($1)",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| DocumentSummary {
                id: row.get::<i32, _>("id") as i64,
                url: row.get("url"),
                title: row.get("title"),
                doc_length: row.get("doc_length"),
            })
            .collect())
    }

    /// One aggregate query feeding BM25's `N` and `avgdl` (§4.2.1, §4.6).
    pub async fn corpus_stats(&self) -> Result<CorpusStats, MetadataError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS document_count, COALESCE(SUM(doc_length), 0) AS total_doc_length \
             FROM documents WHERE doc_length IS NOT NULL",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(CorpusStats {
            document_count: row.get("document_count"),
            total_doc_length: row.get("total_doc_length"),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn status_round_trips_through_its_string_form() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Processing,
            DocumentStatus::Crawled,
            DocumentStatus::CrawledNotQueued,
            DocumentStatus::Error,
        ] {
            assert_eq!(DocumentStatus::from_str(status.as_str()), Some(status));
        }
    }

    #[test]
    fn unknown_status_string_is_rejected() {
        assert_eq!(DocumentStatus::from_str("bogus"), None);
    }

    #[test]
    fn average_doc_length_of_empty_corpus_is_zero() {
        let stats = CorpusStats::default();
        assert_eq!(stats.average_doc_length(), 0.0);
    }

    #[test]
    fn average_doc_length_divides_total_by_count() {
        let stats = CorpusStats {
            document_count: 4,
            total_doc_length: 40,
        };
        assert_eq!(stats.average_doc_length(), 10.0);
    }
}
