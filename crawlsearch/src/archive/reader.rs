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

use camino::Utf8Path;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveReadError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("expected {expected} bytes at offset {offset} in {file_name}, got {got}")]
    ShortRead {
        file_name: String,
        offset: u64,
        expected: u64,
        got: u64,
    },
}

/// Reads the gzip member located at `(file_name, offset, length)` back out of
/// the archive rooted at `root`, per the random-access contract of §3/§4.1.1.
/// The caller is responsible for decompressing and parsing the result.
pub fn read_record(
    root: impl AsRef<Utf8Path>,
    file_name: &str,
    offset: u64,
    length: u64,
) -> Result<Vec<u8>, ArchiveReadError> {
    let path = root.as_ref().join(file_name);
    let mut file = File::open(&path)?;
    file.seek(SeekFrom::Start(offset))?;

    let mut buf = vec![0u8; length as usize];
    let mut read_so_far = 0usize;
    while read_so_far < buf.len() {
        let n = file.read(&mut buf[read_so_far..])?;
        if n == 0 {
            return Err(ArchiveReadError::ShortRead {
                file_name: file_name.to_string(),
                offset,
                expected: length,
                got: read_so_far as u64,
            });
        }
        read_so_far += n;
    }
    Ok(buf)
}
