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

//! Scoring and snippet generation for the ranking service (§4.6 steps 4-7).

use std::collections::{HashMap, HashSet};

const BM25_K1: f64 = 1.2;
const BM25_B: f64 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDocument {
    pub doc_id: i64,
    pub score: f64,
}

/// `IDF(t) = log((N - n_t + 0.5) / (n_t + 0.5) + 1)` (§4.6 step 4).
pub fn idf(total_documents: i64, matching_documents: usize) -> f64 {
    let n = total_documents as f64;
    let n_t = matching_documents as f64;
    ((n - n_t + 0.5) / (n_t + 0.5) + 1.0).ln()
}

/// Scores every document that matched at least one query term against the
/// reduced BM25 variant of §4.6 step 4 / §10: `f(t,D)` is approximated as 1
/// per occurrence since the posting encoding only records membership, not
/// term frequency. Results are sorted by descending score, ties broken by
/// ascending `doc_id` for determinism (§4.6 step 5).
pub fn score_documents(
    postings: &HashMap<String, Vec<i64>>,
    total_documents: i64,
    average_doc_length: f64,
    doc_lengths: &HashMap<i64, i64>,
) -> Vec<ScoredDocument> {
    let mut candidate_ids: HashSet<i64> = HashSet::new();
    for ids in postings.values() {
        candidate_ids.extend(ids.iter().copied());
    }

    let mut scored: Vec<ScoredDocument> = candidate_ids
        .into_iter()
        .map(|doc_id| {
            let doc_length = *doc_lengths.get(&doc_id).unwrap_or(&0) as f64;
            let norm = if average_doc_length > 0.0 {
                1.0 - BM25_B + BM25_B * doc_length / average_doc_length
            } else {
                1.0
            };

            let score: f64 = postings
                .values()
                .filter(|ids| ids.contains(&doc_id))
                .map(|ids| {
                    let term_idf = idf(total_documents, ids.len());
                    let f = 1.0;
                    term_idf * (f * (BM25_K1 + 1.0)) / (f + BM25_K1 * norm)
                })
                .sum();

            ScoredDocument { doc_id, score }
        })
        .collect();

    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.doc_id.cmp(&b.doc_id))
    });
    scored
}

/// Builds a snippet of at most `max_chars` centered on the densest cluster
/// of query term occurrences in `text`, wrapping matches in `**bold**`
/// markers (§4.6 step 7). Falls back to the leading `max_chars` of `text`
/// when no term occurs.
pub fn generate_snippet(text: &str, terms: &[String], max_chars: usize) -> String {
    let words: Vec<&str> = text.split_whitespace().collect();
    if words.is_empty() {
        return String::new();
    }

    let lowered_terms: HashSet<String> = terms.iter().map(|t| t.to_lowercase()).collect();
    let matches: Vec<bool> = words
        .iter()
        .map(|word| {
            let cleaned: String = word
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect::<String>()
                .to_lowercase();
            lowered_terms.contains(&cleaned)
        })
        .collect();

    let window = 12usize.min(words.len());
    let mut best_start = 0;
    let mut best_count = 0;
    for start in 0..=words.len().saturating_sub(window) {
        let count = matches[start..start + window].iter().filter(|m| **m).count();
        if count > best_count {
            best_count = count;
            best_start = start;
        }
    }
    let end = (best_start + window).min(words.len());

    let mut snippet = String::new();
    for (word, is_match) in words[best_start..end].iter().zip(&matches[best_start..end]) {
        if !snippet.is_empty() {
            snippet.push(' ');
        }
        if *is_match {
            snippet.push_str("**");
            snippet.push_str(word);
            snippet.push_str("**");
        } else {
            snippet.push_str(word);
        }
    }

    if snippet.chars().count() > max_chars {
        snippet = snippet.chars().take(max_chars).collect();
    }
    snippet
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn idf_is_higher_for_rarer_terms() {
        let rare = idf(100, 1);
        let common = idf(100, 50);
        assert!(rare > common);
    }

    #[test]
    fn scores_sort_descending_with_doc_id_tiebreak() {
        let mut postings = HashMap::new();
        postings.insert("fox".to_string(), vec![1, 2]);
        let mut doc_lengths = HashMap::new();
        doc_lengths.insert(1, 3);
        doc_lengths.insert(2, 3);

        let scored = score_documents(&postings, 2, 3.0, &doc_lengths);
        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0].score, scored[1].score);
        assert!(scored[0].doc_id < scored[1].doc_id);
    }

    #[test]
    fn document_matching_more_terms_scores_higher() {
        let mut postings = HashMap::new();
        postings.insert("quick".to_string(), vec![1, 2]);
        postings.insert("brown".to_string(), vec![1]);
        let mut doc_lengths = HashMap::new();
        doc_lengths.insert(1, 3);
        doc_lengths.insert(2, 3);

        let scored = score_documents(&postings, 2, 3.0, &doc_lengths);
        let doc1 = scored.iter().find(|s| s.doc_id == 1).unwrap();
        let doc2 = scored.iter().find(|s| s.doc_id == 2).unwrap();
        assert!(doc1.score > doc2.score);
    }

    #[test]
    fn snippet_bolds_matching_terms() {
        let snippet = generate_snippet(
            "the quick brown fox jumps over the lazy dog",
            &["fox".to_string()],
            160,
        );
        assert!(snippet.contains("**fox**"));
    }

    #[test]
    fn snippet_respects_max_length() {
        let long_text = "word ".repeat(100);
        let snippet = generate_snippet(&long_text, &["word".to_string()], 20);
        assert!(snippet.chars().count() <= 20);
    }

    #[test]
    fn empty_text_yields_empty_snippet() {
        assert_eq!(generate_snippet("", &["fox".to_string()], 160), "");
    }
}
