//! Hosted embedding provider for OpenAI-compatible `/embeddings` endpoints.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::ProviderError;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Embedding provider backed by a keyed HTTP API.
pub struct HostedEmbeddingProvider {
    api_key: Option<String>,
    base_url: String,
    model: String,
    dimensions: usize,
    timeout: Duration,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
    #[serde(default)]
    index: usize,
}

impl HostedEmbeddingProvider {
    /// `dimensions` overrides the size looked up by [`model_dimensions`]; set it
    /// for models served by other OpenAI-compatible backends.
    pub fn new(
        api_key: Option<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        dimensions: Option<usize>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let model = model.into();
        let dimensions = dimensions
            .filter(|&d| d > 0)
            .unwrap_or_else(|| model_dimensions(&model));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Http(e.to_string()))?;
        Ok(Self {
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            dimensions,
            timeout,
            client,
        })
    }

    /// Build from config, reading the key from the configured environment variable.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self, ProviderError> {
        Self::new(
            std::env::var(&config.api_key_env).ok(),
            config.api_base_url.clone(),
            config.api_model.clone(),
            config.api_dimensions,
            Duration::from_secs(config.timeout_secs),
        )
    }
}

/// Known output sizes for OpenAI models; anything else defaults to 1536.
pub fn model_dimensions(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        "text-embedding-3-small" | "text-embedding-ada-002" => 1536,
        _ => 1536,
    }
}

#[async_trait]
impl EmbeddingProvider for HostedEmbeddingProvider {
    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ProviderError::Unavailable("no API key configured".into()))?;

        tracing::debug!(model = %self.model, batch = texts.len(), "requesting hosted embeddings");

        let body = serde_json::json!({
            "input": texts,
            "model": self.model,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_transport(e))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let mut parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

impl HostedEmbeddingProvider {
    fn map_transport(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout(self.timeout)
        } else {
            ProviderError::from(err)
        }
    }
}
