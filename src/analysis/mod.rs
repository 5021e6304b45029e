pub mod parser;
pub mod prompt;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;

use crate::apis::PaperRecord;
use crate::llm::{GenerationBackend, GenerationError, GenerationHealth, GenerationOptions};

pub use parser::{parse_analysis, AnalysisResult};
pub use prompt::analysis_prompt;

/// Default number of generations allowed in flight at once.
pub const DEFAULT_GENERATION_CONCURRENCY: usize = 2;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Paper not found: {0}")]
    PaperNotFound(String),
    #[error("Generation failed: {0}")]
    Generation(#[from] GenerationError),
}

/// Runs papers through the generation backend under a concurrency ceiling.
///
/// Callers beyond the ceiling wait for a permit instead of failing.
pub struct Analyzer {
    backend: Arc<dyn GenerationBackend>,
    permits: Arc<Semaphore>,
    options: GenerationOptions,
}

impl Analyzer {
    pub fn new(backend: Arc<dyn GenerationBackend>, max_concurrent: usize) -> Self {
        Self {
            backend,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            options: GenerationOptions::default(),
        }
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    /// Generate and parse an analysis of `paper`.
    ///
    /// Backend failures are returned to the caller; the analyzer does not retry.
    pub async fn analyze_paper(&self, paper: &PaperRecord) -> Result<AnalysisResult, AnalysisError> {
        let prompt = analysis_prompt(paper);
        let raw = {
            // The semaphore is never closed, so acquire only fails if that changes.
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|_| GenerationError::Unavailable("generation pool closed".to_string()))?;
            tracing::debug!("Generating analysis for {}", paper.source_id);
            self.backend.generate(&prompt, &self.options).await
        };
        let raw = raw.map_err(|e| {
            tracing::error!("Error in paper analysis of {}: {}", paper.source_id, e);
            e
        })?;

        let analysis = parse_analysis(&raw);
        if analysis.is_degraded() {
            tracing::warn!("Analysis of {} had no recognizable sections", paper.source_id);
        } else {
            tracing::info!("Successfully analyzed paper: {}", paper.title);
        }
        Ok(analysis)
    }

    pub async fn check_health(&self) -> GenerationHealth {
        crate::llm::check_health(self.backend.as_ref()).await
    }
}
