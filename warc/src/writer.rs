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

use crate::header::{WarcHeader, WarcHeaderWriteError};
use crate::state::State;
use std::fmt::{Debug, Formatter};
use std::io;
use std::io::Write;
use thiserror::Error;

/// A writer for a sequence of WARC records.
/// warc-record  = header CRLF block CRLF CRLF
pub struct WarcWriter<W: Write> {
    inner: W,
    bytes_written: usize,
    state: State,
    corrupt: bool,
}

const BODY_TAIL: &[u8; 4] = b"\r\n\r\n";

impl<W: Write + Debug> Debug for WarcWriter<W> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarcWriter")
            .field("inner", &self.inner)
            .field("bytes_written", &self.bytes_written)
            .field("state", &self.state)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum WarcWriterError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("current state is {current} but expected {expected}")]
    WrongState { current: State, expected: State },
    #[error("the writer is corrupted")]
    Corrupt,
    #[error(transparent)]
    Header(#[from] WarcHeaderWriteError),
}

impl<W: Write> WarcWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            bytes_written: 0,
            state: State::ExpectHeader,
            corrupt: false,
        }
    }

    pub fn bytes_written(&self) -> usize {
        self.bytes_written
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn corrupted(&self) -> bool {
        self.corrupt
    }

    fn check_state(&self, expected: State) -> Result<(), WarcWriterError> {
        if self.corrupt {
            return Err(WarcWriterError::Corrupt);
        }
        if self.state != expected {
            Err(WarcWriterError::WrongState {
                current: self.state,
                expected,
            })
        } else {
            Ok(())
        }
    }

    pub fn write_header(&mut self, header: &WarcHeader) -> Result<usize, WarcWriterError> {
        self.check_state(State::ExpectHeader)?;
        let written = match header.write_to(&mut self.inner) {
            Ok(value) => value,
            Err(err) => {
                self.corrupt = true;
                return Err(err.into());
            }
        };
        self.bytes_written += written;
        self.state = State::ExpectBody;
        Ok(written)
    }

    /// Writes the payload and the trailing `CRLFCRLF` that terminates the record.
    pub fn write_body(&mut self, body: &[u8]) -> Result<usize, WarcWriterError> {
        self.check_state(State::ExpectBody)?;
        if !body.is_empty() {
            if let Err(err) = self.inner.write_all(body) {
                self.corrupt = true;
                return Err(err.into());
            }
            self.bytes_written += body.len();
        }
        if let Err(err) = self.inner.write_all(BODY_TAIL) {
            self.corrupt = true;
            return Err(err.into());
        }
        self.bytes_written += BODY_TAIL.len();
        self.state = State::ExpectHeader;
        Ok(body.len() + BODY_TAIL.len())
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod test {
    use crate::header::test::create_test_header;
    use crate::writer::WarcWriter;

    #[test]
    fn can_write_one_record() {
        const BODY: &[u8] = b"HTTP/1.1 200 OK\r\n\r\n<html>hello</html>";
        let header = create_test_header("a", BODY.len());
        let mut writer = WarcWriter::new(Vec::new());
        writer.write_header(&header).unwrap();
        writer.write_body(BODY).unwrap();
        let data = writer.into_inner();
        assert_eq!(data.len(), data.len());
        assert!(data.ends_with(b"\r\n\r\n"));
    }

    #[test]
    fn rejects_body_before_header() {
        let mut writer = WarcWriter::new(Vec::new());
        let err = writer.write_body(b"oops").unwrap_err();
        assert!(matches!(err, super::WarcWriterError::WrongState { .. }));
    }
}
