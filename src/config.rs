use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use crate::analysis::DEFAULT_GENERATION_CONCURRENCY;
use crate::apis::{self, PaperSource, Source};
use crate::llm::ollama;

const USER_AGENT: &str = concat!("research-hub/", env!("CARGO_PKG_VERSION"));
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub db_path: PathBuf,
    pub semantic_scholar_api_key: Option<String>,
    pub enabled_source_names: Vec<String>,
    pub ollama_url: String,
    pub ollama_model: String,
    /// Applies to generation requests only; sources use `http_timeout`.
    pub ollama_timeout: Duration,
    pub generation_concurrency: usize,
    pub http_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = var("RESEARCH_HUB_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| home_dir(&var).join(".research-hub"));
        let db_path = var("RESEARCH_HUB_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("analyses.db"));

        let enabled_source_names = var("RESEARCH_HUB_SOURCES")
            .map(|s| {
                s.split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let generation_concurrency = var("RESEARCH_HUB_GENERATION_CONCURRENCY")
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_GENERATION_CONCURRENCY);
        let http_timeout = var("RESEARCH_HUB_HTTP_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
        let ollama_timeout = var("OLLAMA_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|n| *n > 0)
            .map(Duration::from_secs)
            .unwrap_or(ollama::DEFAULT_TIMEOUT);

        Self {
            data_dir,
            db_path,
            semantic_scholar_api_key: var("SEMANTIC_SCHOLAR_API_KEY").filter(|k| !k.is_empty()),
            enabled_source_names,
            ollama_url: var("OLLAMA_URL").unwrap_or_else(|| ollama::DEFAULT_URL.to_string()),
            ollama_model: var("OLLAMA_MODEL").unwrap_or_else(|| ollama::DEFAULT_MODEL.to_string()),
            ollama_timeout,
            generation_concurrency,
            http_timeout,
        }
    }

    fn should_enable(&self, source: Source) -> bool {
        self.enabled_source_names.is_empty()
            || self.enabled_source_names.iter().any(|n| n == source.as_str())
    }

    /// The shared HTTP client handed to every source and backend.
    pub fn http_client(&self) -> anyhow::Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.http_timeout)
            .build()
            .context("Failed to build HTTP client")
    }

    /// Build the enabled paper sources in merge order.
    pub fn build_sources(&self, client: &reqwest::Client) -> Vec<Arc<dyn PaperSource>> {
        let mut sources: Vec<Arc<dyn PaperSource>> = Vec::new();
        if self.should_enable(Source::SemanticScholar) {
            sources.push(Arc::new(apis::semantic_scholar::SemanticScholarClient::new(
                client.clone(),
                self.semantic_scholar_api_key.clone(),
            )));
        }
        if self.should_enable(Source::Arxiv) {
            sources.push(Arc::new(apis::arxiv::ArxivClient::new(client.clone())));
        }
        sources
    }

    /// Return a list of source status descriptions.
    pub fn source_status(&self) -> Vec<SourceStatus> {
        Source::ALL
            .into_iter()
            .map(|source| {
                let enabled = self.should_enable(source);
                let note = match source {
                    _ if !enabled => "Disabled by RESEARCH_HUB_SOURCES filter".to_string(),
                    Source::SemanticScholar if self.semantic_scholar_api_key.is_some() => {
                        "API key set".to_string()
                    }
                    Source::SemanticScholar => "No API key (rate limited)".to_string(),
                    Source::Arxiv => "No API key required".to_string(),
                };
                SourceStatus {
                    name: source.as_str().to_string(),
                    enabled,
                    note,
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub enabled: bool,
    pub note: String,
}

fn home_dir(var: &impl Fn(&str) -> Option<String>) -> PathBuf {
    var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}
