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

//! The canonical tokenizer (§4.5 step 7) and query-side stopword filtering
//! (§4.6 steps 1-2). Both the indexer and the ranker go through this module
//! so the same text always yields the same terms.

/// The indexer's minimum token length is fixed, not configurable (§4.5 step
/// 7): the inverted index's contents must not depend on the ranker's
/// `RANKER_MIN_TOKEN_LEN` knob, or re-indexing after tuning that knob would
/// silently change posting-list contents (§8 invariants 2 and 4).
pub const INDEXER_MIN_TOKEN_LEN: usize = 3;

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "with", "this", "that",
    "from", "have", "has", "was", "were", "will", "would", "can", "could",
    "about", "into", "than", "then", "them", "their", "there", "what",
];

/// Splits `text` into maximal alphanumeric runs, lowercased, discarding
/// anything shorter than `min_len` characters.
pub fn tokenize(text: &str, min_len: usize) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    let mut flush = |current: &mut String, tokens: &mut Vec<String>| {
        if current.len() >= min_len {
            tokens.push(std::mem::take(current));
        } else {
            current.clear();
        }
    };

    for ch in text.chars() {
        if ch.is_alphanumeric() {
            current.extend(ch.to_lowercase());
        } else {
            flush(&mut current, &mut tokens);
        }
    }
    flush(&mut current, &mut tokens);

    tokens
}

/// Normalizes a query the same way the indexer tokenizes a document, then
/// drops stop words so common terms don't dominate posting-list fan-out
/// (§4.6 steps 1-2).
pub fn normalize_query(query: &str, min_len: usize) -> Vec<String> {
    tokenize(query, min_len)
        .into_iter()
        .filter(|token| !STOPWORDS.contains(&token.as_str()))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn splits_on_non_alphanumeric_and_lowercases() {
        assert_eq!(
            tokenize("Hello, World! hello", 3),
            vec!["hello", "world", "hello"]
        );
    }

    #[test]
    fn discards_short_tokens() {
        assert_eq!(tokenize("a an the fox", 3), vec!["the", "fox"]);
    }

    #[test]
    fn handles_trailing_run_without_separator() {
        assert_eq!(tokenize("foobar", 3), vec!["foobar"]);
    }

    #[test]
    fn normalize_query_drops_stopwords() {
        assert_eq!(normalize_query("what is the quick fox", 3), vec!["quick", "fox"]);
    }

    #[test]
    fn empty_text_yields_no_tokens() {
        assert!(tokenize("", 3).is_empty());
    }
}
