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

use crate::archive::ArchiveError;
use camino::{Utf8Path, Utf8PathBuf};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use warc::{WarcHeader, WarcWriter};

/// Where one archived record landed: the archive file's basename (never the
/// full path — the full path is reconstructed at read time, §3) plus the
/// byte offset and length of its gzip member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLocator {
    pub file_name: String,
    pub offset: u64,
    pub length: u64,
}

struct OpenFile {
    path: Utf8PathBuf,
    file: File,
    size: u64,
    sequence: u64,
}

/// A thread-safe, single-active-file WARC archive writer. Concurrent calls
/// to [`write_record`](ArchiveWriter::write_record) are serialized by the
/// internal lock, mirroring the crawler lineage's
/// `ThreadsafeMultiFileWarcWriter`, generalized here to gzip each record
/// individually instead of leaving the whole file uncompressed.
#[derive(Clone)]
pub struct ArchiveWriter {
    root: Utf8PathBuf,
    prefix: String,
    max_file_size: u64,
    state: Arc<Mutex<OpenFile>>,
}

impl ArchiveWriter {
    pub fn open(
        root: impl AsRef<Utf8Path>,
        prefix: impl Into<String>,
        max_file_size: u64,
    ) -> Result<Self, ArchiveError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        let prefix = prefix.into();
        let open_file = Self::open_or_create_current(&root, &prefix)?;
        Ok(Self {
            root,
            prefix,
            max_file_size,
            state: Arc::new(Mutex::new(open_file)),
        })
    }

    fn open_or_create_current(root: &Utf8Path, prefix: &str) -> Result<OpenFile, ArchiveError> {
        let sequence = 0u64;
        let path = root.join(format!("{prefix}-{sequence:06}.warc.gz"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)?;
        let size = file.metadata()?.len();
        Ok(OpenFile {
            path,
            file,
            size,
            sequence,
        })
    }

    /// Appends one gzip-compressed WARC `response` record for `url` carrying
    /// `payload`, returning where it landed. Rotates to a fresh file first
    /// if the current one would exceed `max_file_size` (§4.1.2); a record is
    /// never split across files.
    pub async fn write_record(
        &self,
        url: &str,
        payload: &[u8],
    ) -> Result<ArchiveLocator, ArchiveError> {
        let header = WarcHeader::response(url, payload.len(), OffsetDateTime::now_utc());
        let mut raw = WarcWriter::new(Vec::new());
        raw.write_header(&header)?;
        raw.write_body(payload)?;
        let raw = raw.into_inner();

        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw)?;
        let compressed = encoder.finish()?;

        let mut state = self.state.lock().await;
        if state.size > 0 && state.size + compressed.len() as u64 > self.max_file_size {
            let sequence = state.sequence + 1;
            let next_path = self.root.join(format!("{}-{sequence:06}.warc.gz", self.prefix));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .read(true)
                .open(&next_path)?;
            *state = OpenFile {
                path: next_path,
                file,
                size: 0,
                sequence,
            };
        }

        let offset = state.size;
        state.file.write_all(&compressed)?;
        state.file.flush()?;
        state.size += compressed.len() as u64;

        let file_name = state
            .path
            .file_name()
            .expect("archive path always has a file name")
            .to_string();

        Ok(ArchiveLocator {
            file_name,
            offset,
            length: compressed.len() as u64,
        })
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::archive::read_record;

    #[tokio::test]
    async fn round_trips_a_record() {
        let dir = camino_tempfile();
        let writer = ArchiveWriter::open(&dir, "crawl", 1024 * 1024).unwrap();
        let locator = writer
            .write_record("https://example.test/a", b"hello world")
            .await
            .unwrap();
        let raw = read_record(&dir, &locator.file_name, locator.offset, locator.length).unwrap();
        let decompressed = {
            use std::io::Read;
            let mut out = Vec::new();
            flate2::read::GzDecoder::new(raw.as_slice())
                .read_to_end(&mut out)
                .unwrap();
            out
        };
        let parsed = warc::parse_record(&decompressed).unwrap();
        assert_eq!(parsed.target_uri, "https://example.test/a");
        assert_eq!(parsed.payload, b"hello world");
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn random_access_is_independent_of_neighbors() {
        let dir = camino_tempfile();
        let writer = ArchiveWriter::open(&dir, "crawl", 1024 * 1024).unwrap();
        writer.write_record("https://example.test/1", b"one").await.unwrap();
        let second = writer
            .write_record("https://example.test/2", b"two")
            .await
            .unwrap();
        writer.write_record("https://example.test/3", b"three").await.unwrap();

        let raw = read_record(&dir, &second.file_name, second.offset, second.length).unwrap();
        use std::io::Read;
        let mut decompressed = Vec::new();
        flate2::read::GzDecoder::new(raw.as_slice())
            .read_to_end(&mut decompressed)
            .unwrap();
        let parsed = warc::parse_record(&decompressed).unwrap();
        assert_eq!(parsed.target_uri, "https://example.test/2");
        assert_eq!(parsed.payload, b"two");
        std::fs::remove_dir_all(&dir).ok();
    }

    fn camino_tempfile() -> Utf8PathBuf {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        let dir = std::env::temp_dir().join(format!(
            "archive-writer-test-{}-{n}",
            std::process::id()
        ));
        Utf8PathBuf::from_path_buf(dir).unwrap()
    }
}
