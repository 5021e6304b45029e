use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{GenerationBackend, GenerationError, GenerationOptions};

pub const DEFAULT_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "llama3.2";
/// Local generation of a full analysis can take minutes on CPU.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Local Ollama server, called through its native `/api/generate` endpoint.
pub struct OllamaBackend {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OllamaBackend {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Per-request timeout; replaces the shared client's timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: Option<String>,
    error: Option<String>,
}

#[async_trait]
impl GenerationBackend for OllamaBackend {
    async fn generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, GenerationError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = serde_json::json!({
            "model": &self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": options.temperature,
                "top_p": options.top_p,
            },
        });
        let resp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let text = resp.text().await?;
        let parsed: Option<GenerateResponse> = serde_json::from_str(&text).ok();

        if !status.is_success() {
            let message = parsed
                .and_then(|p| p.error)
                .unwrap_or_else(|| text.chars().take(200).collect());
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        match parsed {
            Some(GenerateResponse { response: Some(r), .. }) => Ok(r),
            Some(GenerateResponse { error: Some(e), .. }) => Err(GenerationError::Unavailable(e)),
            _ => Err(GenerationError::Unavailable(
                "response body has no generated text".to_string(),
            )),
        }
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}
