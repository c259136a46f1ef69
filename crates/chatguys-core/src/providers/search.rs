//! Search-augmented replies: OpenAI wire format plus source metadata
//!
//! Perplexity-style servers answer with the usual `choices` and add a
//! top-level `citations` list of URLs and/or a `search_results` list of
//! `{title, url}` objects. The reply text refers to them as `[1]`, `[2]`, ...

use serde::Deserialize;
use serde_json::Value;

use crate::error::DispatchError;
use crate::types::Citation;

use super::openai;
use super::types::{ChatRequest, NormalizedReply};

pub fn request_body(request: &ChatRequest) -> Value {
    openai::request_body(request)
}

/// Reply text plus an itemized citation list, numbered from 1
pub fn parse_reply(raw: &Value) -> Result<NormalizedReply, DispatchError> {
    let text = openai::first_choice_text(raw)?;
    let meta = SearchMetadata::deserialize(raw)?;
    Ok(NormalizedReply {
        text,
        citations: meta.into_citations(),
    })
}

/// Either list may be absent or `null`
#[derive(Debug, Default, Deserialize)]
struct SearchMetadata {
    #[serde(default)]
    citations: Option<Vec<String>>,
    #[serde(default)]
    search_results: Option<Vec<SearchResult>>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    url: String,
    #[serde(default)]
    title: Option<String>,
}

impl SearchMetadata {
    /// `citations` keeps its order (it matches the inline numbering);
    /// `search_results` contributes titles and any URLs not already listed.
    fn into_citations(self) -> Vec<Citation> {
        let results = self.search_results.unwrap_or_default();
        let mut sources: Vec<String> = Vec::new();
        for url in self
            .citations
            .unwrap_or_default()
            .into_iter()
            .chain(results.iter().map(|r| r.url.clone()))
        {
            let url = url.trim().to_string();
            if !url.is_empty() && !sources.contains(&url) {
                sources.push(url);
            }
        }

        sources
            .into_iter()
            .enumerate()
            .map(|(i, url)| {
                let title = results
                    .iter()
                    .find(|r| r.url.trim() == url)
                    .and_then(|r| r.title.clone())
                    .filter(|t| !t.trim().is_empty());
                let citation = Citation::new((i + 1).to_string(), url);
                match title {
                    Some(t) => citation.with_title(t),
                    None => citation,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_citations_only() {
        let raw = json!({
            "choices": [{"message": {"content": "Rust 1.80 shipped LazyLock [1][2]."}}],
            "citations": ["https://blog.rust-lang.org/a", "https://doc.rust-lang.org/b"]
        });
        let reply = parse_reply(&raw).unwrap();
        assert_eq!(reply.text, "Rust 1.80 shipped LazyLock [1][2].");
        assert_eq!(reply.citations.len(), 2);
        assert_eq!(reply.citations[0].label, "1");
        assert_eq!(reply.citations[1].source, "https://doc.rust-lang.org/b");
        assert!(reply.citations[0].title.is_none());
    }

    #[test]
    fn test_search_results_add_titles_and_extra_sources() {
        let raw = json!({
            "choices": [{"message": {"content": "See sources."}}],
            "citations": ["https://a.example"],
            "search_results": [
                {"title": "Page B", "url": "https://b.example"},
                {"title": "Page A", "url": "https://a.example"}
            ]
        });
        let reply = parse_reply(&raw).unwrap();
        assert_eq!(reply.citations.len(), 2);
        assert_eq!(reply.citations[0].source, "https://a.example");
        assert_eq!(reply.citations[0].title.as_deref(), Some("Page A"));
        assert_eq!(reply.citations[1].label, "2");
        assert_eq!(reply.citations[1].title.as_deref(), Some("Page B"));
    }

    #[test]
    fn test_null_metadata_means_no_citations() {
        let raw = json!({
            "choices": [{"message": {"content": "answer"}}],
            "citations": null,
            "search_results": null
        });
        let reply = parse_reply(&raw).unwrap();
        assert_eq!(reply.text, "answer");
        assert!(reply.citations.is_empty());
    }

    #[test]
    fn test_no_metadata_means_no_citations() {
        let raw = json!({"choices": [{"message": {"content": "plain"}}]});
        let reply = parse_reply(&raw).unwrap();
        assert!(reply.citations.is_empty());
    }

    #[test]
    fn test_duplicate_urls_collapse() {
        let raw = json!({
            "choices": [{"message": {"content": "x"}}],
            "citations": ["https://a.example", "https://a.example", " "]
        });
        let reply = parse_reply(&raw).unwrap();
        assert_eq!(reply.citations.len(), 1);
    }
}
