pub mod arxiv;
pub mod semantic_scholar;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// External paper sources the server knows how to query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    SemanticScholar,
    Arxiv,
}

impl Source {
    /// Every known source, in merge order.
    pub const ALL: [Source; 2] = [Source::SemanticScholar, Source::Arxiv];

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::SemanticScholar => "semantic_scholar",
            Source::Arxiv => "arxiv",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.as_str().eq_ignore_ascii_case(name))
    }

    /// Build the cross-source key `<source>_<native_id>`.
    pub fn source_id(&self, native_id: &str) -> String {
        format!("{}_{}", self.as_str(), native_id)
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Split a user-supplied paper id into an optional source and its native id.
///
/// Accepts `arxiv_<id>`, `arxiv:<id>`, `semantic_scholar_<id>` and `s2:<id>`.
/// Anything else is returned unchanged with no source attached.
pub fn split_source_prefix(id: &str) -> (Option<Source>, &str) {
    const PREFIXES: [(&str, Source); 4] = [
        ("semantic_scholar_", Source::SemanticScholar),
        ("s2:", Source::SemanticScholar),
        ("arxiv_", Source::Arxiv),
        ("arxiv:", Source::Arxiv),
    ];
    let id = id.trim();
    for (prefix, source) in PREFIXES {
        let matches = id
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if matches {
            return (Some(source), &id[prefix.len()..]);
        }
    }
    (None, id)
}

/// Normalized paper record shared by every source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub source_id: String,
    pub title: String,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub venue: String,
    pub url: String,
    pub pdf_url: Option<String>,
    /// Zero when the source does not track citations.
    pub citations: u32,
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
}

impl PaperRecord {
    /// Records without a title or key cannot be deduplicated or stored.
    pub fn is_mergeable(&self) -> bool {
        !self.source_id.trim().is_empty() && !self.title.trim().is_empty()
    }
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("API error [{status}]: {message}")]
    Api { status: u16, message: String },
}

/// A paper search backend.
///
/// Implementors provide the fallible `fetch_*` methods. Callers use
/// `search` and `get_details`, which never fail: errors are logged and
/// reduced to an empty result.
#[async_trait]
pub trait PaperSource: Send + Sync {
    fn source(&self) -> Source;

    fn name(&self) -> &'static str {
        self.source().as_str()
    }

    async fn fetch_page(
        &self,
        query: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<PaperRecord>, SourceError>;

    async fn fetch_paper(&self, native_id: &str) -> Result<Option<PaperRecord>, SourceError>;

    async fn search(&self, query: &str, limit: u32, offset: u32) -> Vec<PaperRecord> {
        match self.fetch_page(query, limit, offset).await {
            Ok(mut papers) => {
                papers.retain(PaperRecord::is_mergeable);
                tracing::debug!("{} returned {} papers", self.name(), papers.len());
                papers
            }
            Err(e) => {
                tracing::warn!("Source {} search failed: {}", self.name(), e);
                Vec::new()
            }
        }
    }

    async fn get_details(&self, native_id: &str) -> Option<PaperRecord> {
        match self.fetch_paper(native_id).await {
            Ok(paper) => paper.filter(PaperRecord::is_mergeable),
            Err(e) => {
                tracing::warn!("Source {} lookup of {} failed: {}", self.name(), native_id, e);
                None
            }
        }
    }
}

/// Resolve a single paper by prefixed or bare id.
///
/// A prefixed id is only tried against its own source; a bare id is
/// looked up on Semantic Scholar.
pub async fn find_paper(sources: &[Arc<dyn PaperSource>], id: &str) -> Option<PaperRecord> {
    let (prefix, native_id) = split_source_prefix(id);
    if native_id.is_empty() {
        return None;
    }
    let target = prefix.unwrap_or(Source::SemanticScholar);
    let Some(source) = sources.iter().find(|s| s.source() == target) else {
        tracing::warn!("Source {} is not enabled, cannot resolve {}", target, id);
        return None;
    };
    source.get_details(native_id).await
}

/// Collapse runs of whitespace (including newlines) into single spaces.
pub(crate) fn squash_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}


#[cfg(test)]
mod tests {
    use super::testing::{paper, FakeSource};
    use super::*;

    #[test]
    fn test_split_source_prefix() {
        assert_eq!(split_source_prefix("arxiv_2301.12345"), (Some(Source::Arxiv), "2301.12345"));
        assert_eq!(split_source_prefix("arXiv:2301.12345"), (Some(Source::Arxiv), "2301.12345"));
        assert_eq!(
            split_source_prefix("semantic_scholar_abc123"),
            (Some(Source::SemanticScholar), "abc123")
        );
        assert_eq!(split_source_prefix("s2:abc123"), (Some(Source::SemanticScholar), "abc123"));
        assert_eq!(split_source_prefix("abc123"), (None, "abc123"));
    }

    #[test]
    fn test_source_names() {
        assert_eq!(Source::from_name("ArXiv"), Some(Source::Arxiv));
        assert_eq!(Source::from_name(" semantic_scholar "), Some(Source::SemanticScholar));
        assert_eq!(Source::from_name("pubmed"), None);
        assert_eq!(Source::Arxiv.source_id("2301.1"), "arxiv_2301.1");
        assert_eq!(
            serde_json::to_string(&Source::SemanticScholar).unwrap(),
            "\"semantic_scholar\""
        );
    }

    #[tokio::test]
    async fn test_search_swallows_errors() {
        let src = FakeSource::new(Source::Arxiv, vec![paper(Source::Arxiv, "1", "A")]).failing();
        assert!(src.search("q", 10, 0).await.is_empty());
        assert!(src.get_details("1").await.is_none());
    }

    #[tokio::test]
    async fn test_search_drops_untitled_records() {
        let src = FakeSource::new(
            Source::Arxiv,
            vec![paper(Source::Arxiv, "1", "  "), paper(Source::Arxiv, "2", "Kept")],
        );
        let papers = src.search("q", 10, 0).await;
        assert_eq!(papers.len(), 1);
        assert_eq!(papers[0].title, "Kept");
    }

    #[tokio::test]
    async fn test_find_paper_routes_by_prefix() {
        let s2 = Arc::new(FakeSource::new(
            Source::SemanticScholar,
            vec![paper(Source::SemanticScholar, "abc", "From S2")],
        ));
        let arxiv = Arc::new(FakeSource::new(
            Source::Arxiv,
            vec![paper(Source::Arxiv, "2301.1", "From arXiv")],
        ));
        let sources: Vec<Arc<dyn PaperSource>> = vec![s2.clone(), arxiv.clone()];

        let p = find_paper(&sources, "arxiv:2301.1").await.unwrap();
        assert_eq!(p.title, "From arXiv");
        assert_eq!(s2.calls(), 0);

        let p = find_paper(&sources, "abc").await.unwrap();
        assert_eq!(p.title, "From S2");
        assert_eq!(arxiv.calls(), 1);

        assert!(find_paper(&sources, "arxiv_missing").await.is_none());
        assert!(find_paper(&sources, "").await.is_none());
    }

    #[tokio::test]
    async fn test_find_paper_disabled_source() {
        let arxiv: Arc<dyn PaperSource> = Arc::new(FakeSource::new(Source::Arxiv, vec![]));
        assert!(find_paper(&[arxiv], "s2:abc").await.is_none());
    }
}
