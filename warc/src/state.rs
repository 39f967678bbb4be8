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

use std::fmt::{Display, Formatter};

/// The state of a [crate::writer::WarcWriter]. A writer always alternates
/// between expecting a header and expecting a body.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum State {
    ExpectHeader,
    ExpectBody,
}

impl Display for State {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            State::ExpectHeader => write!(f, "ExpectHeader"),
            State::ExpectBody => write!(f, "ExpectBody"),
        }
    }
}
