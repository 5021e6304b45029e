//! Text-generation backends used by the analysis pipeline.

pub mod ollama;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error [{status}]: {message}")]
    Api { status: u16, message: String },
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Sampling knobs forwarded to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.9,
        }
    }
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError>;

    fn model_id(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationHealth {
    pub status: HealthStatus,
    pub model: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Probe the backend with a trivial prompt. Failures are reported, never raised.
pub async fn check_health(backend: &dyn GenerationBackend) -> GenerationHealth {
    let model = backend.model_id().to_string();
    match backend.generate("Hi", &GenerationOptions::default()).await {
        Ok(_) => GenerationHealth {
            status: HealthStatus::Healthy,
            model,
            error: None,
        },
        Err(e) => {
            tracing::error!("Generation health check failed: {}", e);
            GenerationHealth {
                status: HealthStatus::Unhealthy,
                model,
                error: Some(e.to_string()),
            }
        }
    }
}
