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

use std::str::Utf8Error;
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use uuid::Uuid;

/// A WARC record split into its header fields and raw payload bytes.
/// Borrows from the buffer it was parsed out of.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRecord<'a> {
    pub record_id: Option<Uuid>,
    pub target_uri: String,
    pub date: Option<OffsetDateTime>,
    pub content_length: Option<usize>,
    pub payload: &'a [u8],
}

#[derive(Debug, Error)]
pub enum WarcParseError {
    #[error("missing CRLFCRLF header/body delimiter")]
    MissingHeaderDelimiter,
    #[error("header block is not valid UTF-8")]
    InvalidUtf8(#[from] Utf8Error),
    #[error("missing mandatory WARC-Target-URI header")]
    MissingTargetUri,
}

/// Locates the header/body boundary (the first `CRLFCRLF`) and parses the
/// header lines before it. Everything after the boundary is the payload,
/// returned as a borrow so the caller avoids a copy of a possibly large body.
pub fn parse_record(bytes: &[u8]) -> Result<ParsedRecord<'_>, WarcParseError> {
    let boundary = memchr::memmem::find(bytes, b"\r\n\r\n")
        .ok_or(WarcParseError::MissingHeaderDelimiter)?;
    let header_text = std::str::from_utf8(&bytes[..boundary])?;
    let payload = &bytes[boundary + 4..];

    let mut record_id = None;
    let mut target_uri = None;
    let mut date = None;
    let mut content_length = None;

    for line in header_text.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim() {
            "WARC-Record-ID" => {
                let trimmed = value.trim_start_matches("<urn:uuid:").trim_end_matches('>');
                record_id = Uuid::parse_str(trimmed).ok();
            }
            "WARC-Target-URI" => target_uri = Some(value.to_string()),
            "WARC-Date" => date = OffsetDateTime::parse(value, &Rfc3339).ok(),
            "Content-Length" => content_length = value.parse().ok(),
            _ => {}
        }
    }

    Ok(ParsedRecord {
        record_id,
        target_uri: target_uri.ok_or(WarcParseError::MissingTargetUri)?,
        date,
        content_length,
        payload,
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::header::test::create_test_header;
    use crate::writer::WarcWriter;

    #[test]
    fn round_trips_a_record() {
        const BODY: &[u8] = b"HTTP/1.1 200 OK\r\n\r\n<html>hi</html>";
        let header = create_test_header("a", BODY.len());
        let mut writer = WarcWriter::new(Vec::new());
        writer.write_header(&header).unwrap();
        writer.write_body(BODY).unwrap();
        let raw = writer.into_inner();

        let parsed = parse_record(&raw).unwrap();
        assert_eq!(parsed.target_uri, "https://example.test/a");
        assert_eq!(parsed.record_id, Some(header.record_id()));
        assert_eq!(parsed.content_length, Some(BODY.len()));
        assert_eq!(parsed.payload, BODY);
    }

    #[test]
    fn errors_without_delimiter() {
        let err = parse_record(b"WARC/1.0\r\nWARC-Type: response").unwrap_err();
        assert!(matches!(err, WarcParseError::MissingHeaderDelimiter));
    }
}
