use std::sync::Arc;

use crate::analysis::{AnalysisError, AnalysisResult, Analyzer};
use crate::apis::{self, PaperRecord, PaperSource};
use crate::llm::GenerationHealth;
use crate::search::{self, SearchResult};
use crate::store::AnalysisStore;

/// The discovery, analysis and persistence pipeline behind the server tools.
pub struct ResearchService {
    sources: Vec<Arc<dyn PaperSource>>,
    analyzer: Analyzer,
    store: Option<AnalysisStore>,
}

impl ResearchService {
    pub fn new(
        sources: Vec<Arc<dyn PaperSource>>,
        analyzer: Analyzer,
        store: Option<AnalysisStore>,
    ) -> Self {
        Self {
            sources,
            analyzer,
            store,
        }
    }

    pub fn store(&self) -> Option<&AnalysisStore> {
        self.store.as_ref()
    }

    pub async fn search(
        &self,
        query: &str,
        page: u32,
        limit: u32,
        source_filter: Option<&[String]>,
    ) -> SearchResult {
        search::federated_search(&self.sources, query, page, limit, source_filter).await
    }

    pub async fn get_paper_details(&self, id: &str) -> Option<PaperRecord> {
        tracing::info!("Fetching details for paper: {}", id);
        apis::find_paper(&self.sources, id).await
    }

    /// Resolve, analyze and persist a paper.
    ///
    /// The freshly generated analysis is returned even when an earlier one
    /// is already stored for the same paper; the stored row is left as is.
    pub async fn analyze(&self, id: &str) -> Result<AnalysisResult, AnalysisError> {
        tracing::info!("Analyzing paper: {}", id);
        let paper = self
            .get_paper_details(id)
            .await
            .ok_or_else(|| AnalysisError::PaperNotFound(id.to_string()))?;

        let analysis = self.analyzer.analyze_paper(&paper).await?;

        if let Some(store) = &self.store {
            if analysis.is_degraded() {
                tracing::warn!("Not storing unparsed analysis of {}", paper.source_id);
            } else {
                store.store(&paper, &analysis).await;
            }
        }
        Ok(analysis)
    }

    pub async fn check_generation_health(&self) -> GenerationHealth {
        self.analyzer.check_health().await
    }

    pub fn model_id(&self) -> &str {
        self.analyzer.model_id()
    }
}
