use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::apis::{PaperRecord, PaperSource, Source};

/// One page of merged search results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub results: Vec<PaperRecord>,
    /// Approximation only: `merged_count * (page + 1)`. Not a corpus count.
    pub total_estimate: usize,
    pub page: u32,
    pub limit: u32,
    pub query: String,
    /// Sources that were actually queried, in merge order.
    pub sources: Vec<Source>,
    pub duration_secs: f64,
}

/// Search every enabled source concurrently and merge the results.
///
/// Each source is asked for `limit * 2` records at offset
/// `(page - 1) * limit`; the surplus absorbs duplicates removed during the
/// merge. Sources missing from `source_filter` keep their merge slot but
/// are never called; an empty filter means every source. A failing source
/// contributes an empty list.
pub async fn federated_search(
    sources: &[Arc<dyn PaperSource>],
    query: &str,
    page: u32,
    limit: u32,
    source_filter: Option<&[String]>,
) -> SearchResult {
    let started = Instant::now();
    let page = page.max(1);
    let limit = limit.max(1);
    let offset = (page - 1).saturating_mul(limit);
    let per_source = limit.saturating_mul(2);
    let source_filter = source_filter.filter(|f| f.iter().any(|name| !name.trim().is_empty()));

    let is_enabled = |s: &Arc<dyn PaperSource>| {
        source_filter
            .map(|f| f.iter().any(|name| name.trim().eq_ignore_ascii_case(s.name())))
            .unwrap_or(true)
    };
    let queried: Vec<Source> = sources
        .iter()
        .filter(|&s| is_enabled(s))
        .map(|s| s.source())
        .collect();

    tracing::info!(
        "Searching {:?} for {:?} (page {}, limit {})",
        queried,
        query,
        page,
        limit
    );

    // join_all yields results in registry order, so the merge never
    // depends on which request finishes first.
    let tasks = sources.iter().map(|source| {
        let enabled = is_enabled(source);
        let source = Arc::clone(source);
        let query = query.to_string();
        async move {
            if !enabled {
                return Vec::new();
            }
            let name = source.name();
            let handle = tokio::spawn(async move { source.search(&query, per_source, offset).await });
            match handle.await {
                Ok(results) => {
                    tracing::info!("Found {} results from {}", results.len(), name);
                    results
                }
                Err(e) => {
                    tracing::warn!("Source {} task failed: {}", name, e);
                    Vec::new()
                }
            }
        }
    });
    let per_source_results = join_all(tasks).await;

    let merged = interleave_dedup(per_source_results);
    let total_estimate = estimate_total(merged.len(), page);
    let results = first_page(merged, limit as usize);
    let duration_secs = started.elapsed().as_secs_f64();

    tracing::info!(
        "Search completed in {:.3}s with {} results",
        duration_secs,
        results.len()
    );

    SearchResult {
        results,
        total_estimate,
        page,
        limit,
        query: query.to_string(),
        sources: queried,
        duration_secs,
    }
}

/// Interleave per-source lists (A0, B0, A1, B1, ...) and drop repeated titles.
///
/// Titles are compared case-insensitively; the first occurrence in merge
/// order wins. Records with a blank title are never emitted.
pub fn interleave_dedup(lists: Vec<Vec<PaperRecord>>) -> Vec<PaperRecord> {
    let longest = lists.iter().map(Vec::len).max().unwrap_or(0);
    let mut iters: Vec<_> = lists.into_iter().map(Vec::into_iter).collect();
    let mut seen_titles: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();

    for _ in 0..longest {
        for iter in iters.iter_mut() {
            let Some(paper) = iter.next() else {
                continue;
            };
            let key = paper.title.to_lowercase();
            if key.trim().is_empty() {
                continue;
            }
            if seen_titles.insert(key) {
                merged.push(paper);
            }
        }
    }

    tracing::debug!("Merged results: {} unique papers", merged.len());
    merged
}

/// Trim the merged list to one page. Offsets were already applied by the
/// sources, so this never skips entries.
fn first_page(mut merged: Vec<PaperRecord>, limit: usize) -> Vec<PaperRecord> {
    merged.truncate(limit);
    merged
}

/// Heuristic total kept for client compatibility; it grows with the page
/// number and says nothing about the real size of the result set.
fn estimate_total(merged_count: usize, page: u32) -> usize {
    merged_count.saturating_mul(page as usize + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::testing::{paper, FakeSource};
    use std::time::Duration;

    fn titled(source: Source, titles: &[&str]) -> Vec<PaperRecord> {
        titles
            .iter()
            .enumerate()
            .map(|(i, t)| paper(source, &i.to_string(), t))
            .collect()
    }

    fn merge(a: Vec<PaperRecord>, b: Vec<PaperRecord>) -> Vec<PaperRecord> {
        interleave_dedup(vec![a, b])
    }

    fn titles(papers: &[PaperRecord]) -> Vec<&str> {
        papers.iter().map(|p| p.title.as_str()).collect()
    }

    #[test]
    fn test_merge_interleaves() {
        let a = titled(Source::SemanticScholar, &["a0", "a1"]);
        let b = titled(Source::Arxiv, &["b0", "b1"]);
        assert_eq!(titles(&merge(a, b)), vec!["a0", "b0", "a1", "b1"]);
    }

    #[test]
    fn test_merge_uneven_lengths() {
        let a = titled(Source::SemanticScholar, &["a0"]);
        let b = titled(Source::Arxiv, &["b0", "b1", "b2"]);
        assert_eq!(titles(&merge(a, b)), vec!["a0", "b0", "b1", "b2"]);
        assert!(merge(vec![], vec![]).is_empty());
    }

    #[test]
    fn test_merge_dedups_case_insensitively() {
        let a = titled(Source::SemanticScholar, &["X"]);
        let b = titled(Source::Arxiv, &["x", "Y"]);
        let merged = merge(a, b);
        assert_eq!(titles(&merged), vec!["X", "Y"]);
        assert_eq!(merged[0].source, Source::SemanticScholar);
    }

    #[test]
    fn test_merge_drops_blank_titles() {
        let a = titled(Source::SemanticScholar, &["", "Kept"]);
        let b = titled(Source::Arxiv, &["   "]);
        assert_eq!(titles(&merge(a, b)), vec!["Kept"]);
    }

    #[test]
    fn test_first_page_does_not_offset() {
        let merged = titled(Source::Arxiv, &["p0", "p1", "p2", "p3"]);
        assert_eq!(titles(&first_page(merged, 2)), vec!["p0", "p1"]);
    }

    #[test]
    fn test_total_is_an_estimate() {
        // The estimate scales with the page number rather than counting
        // anything; callers must treat it as approximate.
        assert_eq!(estimate_total(10, 1), 20);
        assert_eq!(estimate_total(10, 3), 40);
        assert_eq!(estimate_total(0, 5), 0);
    }

    #[tokio::test]
    async fn test_merge_order_ignores_completion_order() {
        // The first source is much slower, but its records still lead.
        let slow = Arc::new(
            FakeSource::new(Source::SemanticScholar, titled(Source::SemanticScholar, &["a0", "a1"]))
                .with_delay(Duration::from_millis(100)),
        );
        let fast = Arc::new(FakeSource::new(Source::Arxiv, titled(Source::Arxiv, &["b0", "b1"])));
        let sources: Vec<Arc<dyn PaperSource>> = vec![slow, fast];

        let result = federated_search(&sources, "q", 1, 10, None).await;
        assert_eq!(titles(&result.results), vec!["a0", "b0", "a1", "b1"]);
        assert_eq!(result.sources, vec![Source::SemanticScholar, Source::Arxiv]);
    }

    #[tokio::test]
    async fn test_disabled_source_is_not_called() {
        let s2 = Arc::new(FakeSource::new(
            Source::SemanticScholar,
            titled(Source::SemanticScholar, &["a0"]),
        ));
        let arxiv = Arc::new(FakeSource::new(Source::Arxiv, titled(Source::Arxiv, &["b0", "b1"])));
        let sources: Vec<Arc<dyn PaperSource>> = vec![s2.clone(), arxiv.clone()];

        let filter = vec!["arxiv".to_string()];
        let result = federated_search(&sources, "q", 1, 10, Some(&filter)).await;
        assert_eq!(s2.calls(), 0);
        assert_eq!(arxiv.calls(), 1);
        assert_eq!(titles(&result.results), vec!["b0", "b1"]);
        assert_eq!(result.sources, vec![Source::Arxiv]);
    }

    #[tokio::test]
    async fn test_empty_filter_queries_every_source() {
        let s2 = Arc::new(FakeSource::new(
            Source::SemanticScholar,
            titled(Source::SemanticScholar, &["a0"]),
        ));
        let arxiv = Arc::new(FakeSource::new(Source::Arxiv, titled(Source::Arxiv, &["b0"])));
        let sources: Vec<Arc<dyn PaperSource>> = vec![s2.clone(), arxiv.clone()];

        let empty: Vec<String> = Vec::new();
        let result = federated_search(&sources, "q", 1, 10, Some(&empty)).await;
        assert_eq!(s2.calls(), 1);
        assert_eq!(arxiv.calls(), 1);
        assert_eq!(titles(&result.results), vec!["a0", "b0"]);
        assert_eq!(result.sources, vec![Source::SemanticScholar, Source::Arxiv]);

        let blank = vec![" ".to_string()];
        let result = federated_search(&sources, "q", 1, 10, Some(&blank)).await;
        assert_eq!(result.sources.len(), 2);
    }

    #[tokio::test]
    async fn test_failing_source_degrades_to_empty() {
        let broken = Arc::new(
            FakeSource::new(Source::SemanticScholar, titled(Source::SemanticScholar, &["a0"]))
                .failing(),
        );
        let arxiv = Arc::new(FakeSource::new(Source::Arxiv, titled(Source::Arxiv, &["b0"])));
        let sources: Vec<Arc<dyn PaperSource>> = vec![broken, arxiv];

        let result = federated_search(&sources, "q", 1, 10, None).await;
        assert_eq!(titles(&result.results), vec!["b0"]);
    }

    #[tokio::test]
    async fn test_pagination_parameters() {
        let s2 = Arc::new(FakeSource::new(Source::SemanticScholar, vec![]));
        let sources: Vec<Arc<dyn PaperSource>> = vec![s2.clone()];

        let result = federated_search(&sources, "q", 3, 5, None).await;
        assert_eq!(*s2.last_page.lock().unwrap(), Some((10, 10)));
        assert_eq!(result.page, 3);
        assert_eq!(result.limit, 5);
        assert_eq!(result.total_estimate, 0);

        // Page zero is treated as the first page.
        federated_search(&sources, "q", 0, 5, None).await;
        assert_eq!(*s2.last_page.lock().unwrap(), Some((10, 0)));
    }

    #[tokio::test]
    async fn test_search_properties() {
        let a = titled(
            Source::SemanticScholar,
            &["Deep Learning", "Graph Networks", "Shared Title", "Attention"],
        );
        let b = titled(Source::Arxiv, &["shared title", "Diffusion", "DEEP LEARNING", "Kernels"]);
        let sources: Vec<Arc<dyn PaperSource>> = vec![
            Arc::new(FakeSource::new(Source::SemanticScholar, a)),
            Arc::new(FakeSource::new(Source::Arxiv, b)),
        ];

        let result = federated_search(&sources, "q", 1, 3, None).await;
        assert!(result.results.len() <= 3);
        let mut seen = HashSet::new();
        for p in &result.results {
            assert!(!p.title.is_empty());
            assert!(!p.source_id.is_empty());
            assert!(seen.insert(p.title.to_lowercase()));
        }
        assert_eq!(titles(&result.results), vec!["Deep Learning", "shared title", "Graph Networks"]);
        // 6 unique titles merged, page 1
        assert_eq!(result.total_estimate, 12);
    }
}
