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

//! The RocksDB-backed inverted index (§3, §6): one column family mapping
//! lowercased terms to comma-separated decimal doc-id lists.

use camino::Utf8Path;
use itertools::Itertools;
use rocksdb::{BlockBasedOptions, Options, SliceTransform, DB};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

pub const POSTINGS_CF: &str = "postings";

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    RocksDb(#[from] rocksdb::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("posting list for a term contained a non-numeric doc id")]
    CorruptPostingList,
}

fn postings_cf_options() -> Options {
    let mut options = Options::default();
    options.create_if_missing(true);
    options.create_missing_column_families(true);

    let mut block_options = BlockBasedOptions::default();
    block_options.set_bloom_filter(10.0, true);
    block_options.set_whole_key_filtering(true);
    options.set_block_based_table_factory(&block_options);
    options.set_prefix_extractor(SliceTransform::create_fixed_prefix(4));

    options
}

fn db_options() -> Options {
    let mut options = Options::default();
    options.create_if_missing(true);
    options.create_missing_column_families(true);
    options
}

/// Opens (creating if absent) the inverted-index database rooted at `path`,
/// verifying the `postings` column family exists, the way the crawler
/// lineage's `open_db` validates its own handles at startup.
pub fn open_db(path: impl AsRef<Path>) -> Result<DB, IndexError> {
    let path = path.as_ref();
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    let db = DB::open_cf_with_opts(&db_options(), path, [(POSTINGS_CF, postings_cf_options())])?;
    Ok(db)
}

/// The inverted-index surface the indexer and ranker depend on.
/// `InvertedIndex` implements this against RocksDB; `fakes::FakeIndex`
/// implements it in memory so callers can be tested without a real on-disk
/// database (§1.1).
pub trait Index: Send + Sync {
    fn get_postings(&self, term: &str) -> Result<Vec<u64>, IndexError>;
    fn add_doc_to_postings(&self, term: &str, doc_id: u64) -> Result<(), IndexError>;
}

/// A handle onto the inverted index. Cheap to clone: `DB` is internally
/// reference-counted and thread-safe for concurrent reads; writers are
/// serialized per-key by the caller (§5 shared-resource policy).
#[derive(Clone)]
pub struct InvertedIndex {
    db: Arc<DB>,
}

impl InvertedIndex {
    pub fn open(path: impl AsRef<Utf8Path>) -> Result<Self, IndexError> {
        Ok(Self {
            db: Arc::new(open_db(path.as_ref().as_std_path())?),
        })
    }

    fn cf(&self) -> Arc<rocksdb::BoundColumnFamily> {
        self.db
            .cf_handle(POSTINGS_CF)
            .expect("postings column family is created at open time")
    }
}

impl Index for InvertedIndex {
    /// Returns the doc ids currently posted for `term`, empty if the term
    /// has never been seen (§4.6 step 3 treats a miss as an empty list).
    fn get_postings(&self, term: &str) -> Result<Vec<u64>, IndexError> {
        match self.db.get_cf(&self.cf(), term.as_bytes())? {
            None => Ok(Vec::new()),
            Some(bytes) => parse_postings(&bytes),
        }
    }

    /// Idempotent read-modify-write: adds `doc_id` to `term`'s posting list
    /// if absent, writing back only when the list actually changed (§3,
    /// §4.5 step 8).
    fn add_doc_to_postings(&self, term: &str, doc_id: u64) -> Result<(), IndexError> {
        let cf = self.cf();
        let mut postings = match self.db.get_cf(&cf, term.as_bytes())? {
            None => {
                self.db.put_cf(&cf, term.as_bytes(), doc_id.to_string())?;
                return Ok(());
            }
            Some(bytes) => parse_postings(&bytes)?,
        };

        if postings.contains(&doc_id) {
            return Ok(());
        }
        postings.push(doc_id);
        self.db.put_cf(&cf, term.as_bytes(), encode_postings(&postings))?;
        Ok(())
    }
}

fn parse_postings(bytes: &[u8]) -> Result<Vec<u64>, IndexError> {
    let text = std::str::from_utf8(bytes).map_err(|_| IndexError::CorruptPostingList)?;
    text.split(',')
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<u64>().map_err(|_| IndexError::CorruptPostingList))
        .collect()
}

fn encode_postings(postings: &[u64]) -> String {
    postings.iter().join(",")
}

/// A small in-memory stand-in for [`InvertedIndex`], used by tests that need
/// posting-list behavior without a real RocksDB directory (§1.1).
#[cfg(test)]
pub mod fakes {
    use super::{Index, IndexError};
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct FakeIndex {
        postings: Mutex<HashMap<String, Vec<u64>>>,
    }

    impl FakeIndex {
        pub fn new() -> Self {
            Self::default()
        }
    }

    impl Index for FakeIndex {
        fn get_postings(&self, term: &str) -> Result<Vec<u64>, IndexError> {
            Ok(self.postings.lock().unwrap().get(term).cloned().unwrap_or_default())
        }

        fn add_doc_to_postings(&self, term: &str, doc_id: u64) -> Result<(), IndexError> {
            let mut postings = self.postings.lock().unwrap();
            let list = postings.entry(term.to_string()).or_default();
            if !list.contains(&doc_id) {
                list.push(doc_id);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod test {
    use super::fakes::FakeIndex;
    use super::*;

    #[test]
    fn parses_comma_separated_decimal_ids() {
        assert_eq!(parse_postings(b"1,2,3").unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn rejects_non_numeric_postings() {
        assert!(parse_postings(b"1,x,3").is_err());
    }

    #[test]
    fn encode_then_parse_round_trips() {
        let ids = vec![7, 42, 1000];
        let encoded = encode_postings(&ids);
        assert_eq!(parse_postings(encoded.as_bytes()).unwrap(), ids);
    }

    #[test]
    fn add_and_get_postings_on_a_fresh_db() {
        let dir = unique_dir();
        let index = InvertedIndex::open(&dir).unwrap();
        index.add_doc_to_postings("hello", 1).unwrap();
        index.add_doc_to_postings("hello", 2).unwrap();
        index.add_doc_to_postings("hello", 1).unwrap();
        assert_eq!(index.get_postings("hello").unwrap(), vec![1, 2]);
        assert_eq!(index.get_postings("nope").unwrap(), Vec::<u64>::new());
        drop(index);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn fake_index_honors_the_same_idempotence_contract() {
        let index = FakeIndex::new();
        index.add_doc_to_postings("hello", 1).unwrap();
        index.add_doc_to_postings("hello", 1).unwrap();
        index.add_doc_to_postings("hello", 2).unwrap();
        assert_eq!(index.get_postings("hello").unwrap(), vec![1, 2]);
    }

    fn unique_dir() -> camino::Utf8PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!("index-test-{}-{n}", std::process::id()));
        camino::Utf8PathBuf::from_path_buf(dir).unwrap()
    }
}
