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

//! A minimal WARC/1.0 reader and writer for single `response` records.
//!
//! This crate only speaks the subset of the WARC format a crawl archive needs:
//! one header block, one payload, no continuations, no digest blocks.

pub mod header;
pub mod reader;
pub mod state;
pub mod writer;

pub use header::WarcHeader;
pub use reader::{parse_record, ParsedRecord, WarcParseError};
pub use state::State;
pub use writer::{WarcWriter, WarcWriterError};
