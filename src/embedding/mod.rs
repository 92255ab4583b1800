//! Text-to-vector embedding backends.
//!
//! Provides the [`EmbeddingProvider`] trait, a local ONNX implementation
//! ([`local::LocalEmbeddingProvider`]), an OpenAI-compatible hosted implementation
//! ([`hosted::HostedEmbeddingProvider`]), and the selection policy in
//! [`create_provider`].

pub mod hosted;
pub mod local;
pub mod vector;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::EmbeddingConfig;
use crate::error::ProviderError;

pub use vector::{cosine_similarity, deserialize_vector, serialize_vector};

/// Trait for embedding text into vectors.
///
/// `embed_batch` is order-preserving and returns one vector per input; an empty
/// input yields an empty output.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identifier stored alongside each vector this provider produces.
    fn model(&self) -> &str;

    /// Length of every vector this provider produces.
    fn dimensions(&self) -> usize;

    /// Whether the provider can currently serve requests (model present, key set).
    fn is_available(&self) -> bool;

    /// Embed a batch of texts.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::InvalidResponse("empty batch result".into()))
    }
}

/// Run `embed_batch` under a deadline.
///
/// Also checks that the provider returned one vector of the declared
/// dimensionality per input.
pub async fn embed_with_timeout(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
    timeout: Duration,
) -> Result<Vec<Vec<f32>>, ProviderError> {
    let vectors = tokio::time::timeout(timeout, provider.embed_batch(texts))
        .await
        .map_err(|_| ProviderError::Timeout(timeout))??;

    if vectors.len() != texts.len() {
        return Err(ProviderError::InvalidResponse(format!(
            "expected {} vectors, got {}",
            texts.len(),
            vectors.len()
        )));
    }
    let expected = provider.dimensions();
    if let Some(bad) = vectors.iter().find(|v| v.len() != expected) {
        return Err(ProviderError::DimensionMismatch {
            expected,
            actual: bad.len(),
        });
    }
    Ok(vectors)
}

/// Embed a single text under a deadline.
pub async fn embed_one_with_timeout(
    provider: &dyn EmbeddingProvider,
    text: &str,
    timeout: Duration,
) -> Result<Vec<f32>, ProviderError> {
    let mut vectors = embed_with_timeout(provider, &[text.to_string()], timeout).await?;
    vectors
        .pop()
        .ok_or_else(|| ProviderError::InvalidResponse("empty batch result".into()))
}

/// Create an embedding provider from config.
///
/// - `"local"`: ONNX Runtime + all-MiniLM-L6-v2, error if the model is missing.
/// - `"openai"`: hosted OpenAI-compatible API, error if no key is set.
/// - `"auto"`: local if its model files are present, else hosted if a key is set,
///   else no provider.
/// - `"none"`: no provider.
pub fn create_provider(
    config: &EmbeddingConfig,
) -> anyhow::Result<Option<Arc<dyn EmbeddingProvider>>> {
    match config.provider.as_str() {
        "local" => {
            let provider = local::LocalEmbeddingProvider::new(config)?;
            Ok(Some(Arc::new(provider)))
        }
        "openai" => {
            let provider = hosted::HostedEmbeddingProvider::from_config(config)?;
            anyhow::ensure!(
                provider.is_available(),
                "hosted embedding provider selected but ${} is not set",
                config.api_key_env
            );
            Ok(Some(Arc::new(provider)))
        }
        "auto" => Ok(auto_select(config)),
        "none" => Ok(None),
        other => anyhow::bail!(
            "unknown embedding provider: {other}. Supported: auto, local, openai, none"
        ),
    }
}

fn auto_select(config: &EmbeddingConfig) -> Option<Arc<dyn EmbeddingProvider>> {
    if local::LocalEmbeddingProvider::model_files_present(config) {
        match local::LocalEmbeddingProvider::new(config) {
            Ok(provider) => return Some(Arc::new(provider)),
            Err(e) => tracing::warn!(error = %e, "local embedding model failed to load"),
        }
    } else {
        tracing::debug!("local embedding model not downloaded");
    }

    match hosted::HostedEmbeddingProvider::from_config(config) {
        Ok(provider) if provider.is_available() => {
            tracing::info!(model = %provider.model(), "using hosted embedding provider");
            return Some(Arc::new(provider));
        }
        Ok(_) => tracing::debug!(env = %config.api_key_env, "no hosted embedding key"),
        Err(e) => tracing::warn!(error = %e, "hosted embedding provider failed to initialize"),
    }

    tracing::info!("no embedding provider available; semantic features disabled");
    None
}
