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

//! HTML parsing for the indexer (§4.5 steps 5-6, §4.5.1): visible-text
//! extraction and title extraction over the same parsed DOM.

use ego_tree::NodeRef;
use scraper::{Html, Node};

const SKIPPED_TAGS: &[&str] = &["script", "style"];

/// Parsed HTML ready for tokenization and title lookup.
pub struct ExtractedPage {
    pub text: String,
    pub title: Option<String>,
}

/// Walks the DOM by depth-first search, joining visible text with single
/// spaces and skipping `<script>`/`<style>` subtrees entirely, and records
/// the first `<title>` element's text if present (§4.5 step 6, §4.5.1).
pub fn extract(html: &str) -> ExtractedPage {
    let document = Html::parse_document(html);
    let mut text_parts = Vec::new();
    let mut title = None;
    walk(document.tree.root(), &mut text_parts, &mut title);

    ExtractedPage {
        text: text_parts.join(" "),
        title,
    }
}

fn walk<'a>(node: NodeRef<'a, Node>, text_parts: &mut Vec<String>, title: &mut Option<String>) {
    match node.value() {
        Node::Element(element) => {
            let tag = element.name();
            if SKIPPED_TAGS.contains(&tag) {
                return;
            }
            if tag == "title" && title.is_none() {
                let collected = collect_text(node);
                if !collected.trim().is_empty() {
                    *title = Some(collected.trim().to_string());
                }
            }
            for child in node.children() {
                walk(child, text_parts, title);
            }
        }
        Node::Text(text) => {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                text_parts.push(trimmed.to_string());
            }
        }
        _ => {
            for child in node.children() {
                walk(child, text_parts, title);
            }
        }
    }
}

fn collect_text(node: NodeRef<'_, Node>) -> String {
    let mut parts = Vec::new();
    for descendant in node.descendants() {
        if let Node::Text(text) = descendant.value() {
            parts.push(&**text);
        }
    }
    parts.join(" ")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn extracts_title_and_body_text() {
        let page = extract("<html><title>T</title><body>hello world hello</body></html>");
        assert_eq!(page.title.as_deref(), Some("T"));
        assert!(page.text.contains("hello world hello"));
    }

    #[test]
    fn skips_script_and_style_subtrees() {
        let page = extract(
            "<html><body><script>var x = 1;</script><style>.a{}</style><p>visible</p></body></html>",
        );
        assert_eq!(page.text.trim(), "visible");
    }

    #[test]
    fn missing_title_yields_none() {
        let page = extract("<html><body>no title here</body></html>");
        assert!(page.title.is_none());
    }

    #[test]
    fn joins_sibling_text_nodes_with_single_spaces() {
        let page = extract("<p>one</p><p>two</p>");
        assert_eq!(page.text, "one two");
    }
}
