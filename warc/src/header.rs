//Copyright 2024 Felix Engl
//
//Licensed under the Apache License, Version 2.0 (the "License");
//you may not use this file except in compliance with the License.
//You may obtain a copy of the License at
//
//    http://www.apache.org/licenses/LICENSE-2.0
//
//Unless required by applicable law or agreed to in writing, software
//distributed under the License is distributed on an "AS IS" BASIS,
//WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//See the License for the specific language governing permissions and
//limitations under the License.

// https://iipc.github.io/warc-specifications/specifications/warc-format/warc-1.0/

use std::io;
use std::io::Write;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

pub const WARC_VERSION_LINE: &str = "WARC/1.0";
pub const CONTENT_TYPE: &str = "application/http; msgtype=response";

/// The header of a single `response` WARC record, restricted to the fields
/// a crawl archive actually needs (§3 of the archive format).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarcHeader {
    record_id: Uuid,
    target_uri: String,
    date: OffsetDateTime,
    content_length: usize,
}

#[derive(Debug, Error)]
pub enum WarcHeaderWriteError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    DateFormat(#[from] time::error::Format),
}

impl WarcHeader {
    /// Builds the header for a `response` record with a freshly minted
    /// `WARC-Record-ID` and the given capture time.
    pub fn response(target_uri: impl Into<String>, content_length: usize, date: OffsetDateTime) -> Self {
        Self {
            record_id: Uuid::new_v4(),
            target_uri: target_uri.into(),
            date,
            content_length,
        }
    }

    pub fn record_id(&self) -> Uuid {
        self.record_id
    }

    pub fn target_uri(&self) -> &str {
        &self.target_uri
    }

    pub fn date(&self) -> OffsetDateTime {
        self.date
    }

    pub fn content_length(&self) -> usize {
        self.content_length
    }

    /// Writes the header block (including the trailing blank line) to `w`.
    /// Returns the number of bytes written.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<usize, WarcHeaderWriteError> {
        let mut written = 0;
        macro_rules! line {
            ($($arg:tt)*) => {{
                let s = format!($($arg)*);
                w.write_all(s.as_bytes())?;
                w.write_all(b"\r\n")?;
                written += s.len() + 2;
            }};
        }
        line!("{WARC_VERSION_LINE}");
        line!("WARC-Type: response");
        line!("WARC-Record-ID: <urn:uuid:{}>", self.record_id);
        line!("WARC-Date: {}", self.date.format(&Rfc3339)?);
        line!("WARC-Target-URI: {}", self.target_uri);
        line!("Content-Type: {CONTENT_TYPE}");
        line!("Content-Length: {}", self.content_length);
        w.write_all(b"\r\n")?;
        written += 2;
        Ok(written)
    }
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    pub fn create_test_header(url: &str, len: usize) -> WarcHeader {
        WarcHeader::response(
            format!("https://example.test/{url}"),
            len,
            OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        )
    }

    #[test]
    fn writes_required_fields() {
        let header = create_test_header("a", 11);
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.starts_with("WARC/1.0\r\n"));
        assert!(text.contains("WARC-Type: response\r\n"));
        assert!(text.contains("WARC-Target-URI: https://example.test/a\r\n"));
        assert!(text.contains("Content-Length: 11\r\n"));
        assert!(text.contains(&format!("WARC-Record-ID: <urn:uuid:{}>", header.record_id())));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
