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

//! A small-scale, Google-inspired search engine: crawler, WARC archive,
//! indexer, and ranking service sharing one library crate.

pub mod archive;
pub mod config;
pub mod html;
pub mod index;
pub mod logging;
pub mod metadata;
pub mod queue;
pub mod ranking;
pub mod tokenize;
