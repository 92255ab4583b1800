//! Local ONNX Runtime embedding provider.
//!
//! Implements [`EmbeddingProvider`] using the all-MiniLM-L6-v2 model via `ort`.
//! Handles tokenization, inference, mean pooling, and L2 normalization. Inference
//! is CPU-bound and runs on the blocking thread pool.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;

use super::vector::l2_normalize;
use super::EmbeddingProvider;
use crate::config::EmbeddingConfig;
use crate::error::ProviderError;

/// Output dimensionality of all-MiniLM-L6-v2.
pub const LOCAL_EMBEDDING_DIM: usize = 384;

/// Maximum sequence length for all-MiniLM-L6-v2 (trained at 256).
const MAX_SEQ_LEN: usize = 256;

const MODEL_FILE: &str = "model.onnx";
const TOKENIZER_FILE: &str = "tokenizer.json";

/// Loaded ONNX session and tokenizer, shared with blocking inference tasks.
struct LocalModel {
    session: Mutex<Session>,
    tokenizer: Tokenizer,
}

// Safety: Tokenizer is Send+Sync. Session is behind a Mutex, which guarantees
// exclusive access during run().
unsafe impl Send for LocalModel {}
unsafe impl Sync for LocalModel {}

/// Local ONNX-based embedding provider using all-MiniLM-L6-v2.
pub struct LocalEmbeddingProvider {
    model: Arc<LocalModel>,
    model_name: String,
}

impl LocalEmbeddingProvider {
    fn model_paths(config: &EmbeddingConfig) -> (PathBuf, PathBuf) {
        let cache_dir = crate::config::expand_tilde(&config.cache_dir);
        (cache_dir.join(MODEL_FILE), cache_dir.join(TOKENIZER_FILE))
    }

    /// `true` if both the ONNX model and tokenizer have been downloaded.
    pub fn model_files_present(config: &EmbeddingConfig) -> bool {
        let (model_path, tokenizer_path) = Self::model_paths(config);
        model_path.exists() && tokenizer_path.exists()
    }

    pub fn new(config: &EmbeddingConfig) -> anyhow::Result<Self> {
        let (model_path, tokenizer_path) = Self::model_paths(config);

        anyhow::ensure!(
            model_path.exists(),
            "ONNX model not found at {}. Run `ctxmem model download` first.",
            model_path.display()
        );
        anyhow::ensure!(
            tokenizer_path.exists(),
            "Tokenizer not found at {}. Run `ctxmem model download` first.",
            tokenizer_path.display()
        );

        let session = Session::builder()?
            .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&model_path)
            .context("failed to load ONNX model")?;

        tracing::info!(model = %model_path.display(), "ONNX model loaded");

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer: {e}"))?;

        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_SEQ_LEN,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("failed to set truncation: {e}"))?;

        tokenizer.with_padding(Some(tokenizers::PaddingParams {
            strategy: tokenizers::PaddingStrategy::BatchLongest,
            ..Default::default()
        }));

        Ok(Self {
            model: Arc::new(LocalModel {
                session: Mutex::new(session),
                tokenizer,
            }),
            model_name: config.model.clone(),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEmbeddingProvider {
    fn model(&self) -> &str {
        &self.model_name
    }

    fn dimensions(&self) -> usize {
        LOCAL_EMBEDDING_DIM
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || model.run(&texts))
            .await
            .map_err(|e| ProviderError::Backend(format!("inference task failed: {e}")))?
    }
}

impl LocalModel {
    fn run(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let backend = |e: &dyn std::fmt::Display| ProviderError::Backend(e.to_string());

        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| ProviderError::Backend(format!("tokenization failed: {e}")))?;

        let batch_size = encodings.len();
        let seq_len = encodings[0].get_ids().len();

        let mut input_ids = Vec::with_capacity(batch_size * seq_len);
        let mut attention_mask = Vec::with_capacity(batch_size * seq_len);
        for encoding in &encodings {
            input_ids.extend(encoding.get_ids().iter().map(|&id| id as i64));
            attention_mask.extend(encoding.get_attention_mask().iter().map(|&m| m as i64));
        }

        let shape = vec![batch_size as i64, seq_len as i64];
        let input_ids_tensor = Tensor::from_array((shape.clone(), input_ids.into_boxed_slice()))
            .map_err(|e| backend(&e))?;
        let attention_mask_tensor =
            Tensor::from_array((shape.clone(), attention_mask.clone().into_boxed_slice()))
                .map_err(|e| backend(&e))?;
        // single segment
        let token_type_ids = vec![0i64; batch_size * seq_len];
        let token_type_ids_tensor = Tensor::from_array((shape, token_type_ids.into_boxed_slice()))
            .map_err(|e| backend(&e))?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| ProviderError::Backend(format!("session lock poisoned: {e}")))?;

        let outputs = session
            .run(ort::inputs! {
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
                "token_type_ids" => token_type_ids_tensor,
            })
            .map_err(|e| backend(&e))?;

        // Output name varies by export.
        let token_emb_value = outputs
            .get("token_embeddings")
            .or_else(|| outputs.get("last_hidden_state"))
            .unwrap_or_else(|| &outputs[0]);

        let (dims, data) = token_emb_value
            .try_extract_tensor::<f32>()
            .map_err(|e| backend(&e))?;

        let dims: &[i64] = &dims;
        if dims.len() != 3 || dims[2] != LOCAL_EMBEDDING_DIM as i64 {
            return Err(ProviderError::InvalidResponse(format!(
                "unexpected token_embeddings shape {dims:?}, expected [batch, seq, {LOCAL_EMBEDDING_DIM}]"
            )));
        }
        let hidden_dim = dims[2] as usize;
        let actual_seq_len = dims[1] as usize;

        let mut results = Vec::with_capacity(batch_size);
        for b in 0..batch_size {
            let mut sum = vec![0.0f32; hidden_dim];
            let mut count = 0.0f32;

            for s in 0..actual_seq_len {
                let mask = attention_mask[b * seq_len + s] as f32;
                if mask > 0.0 {
                    let offset = (b * actual_seq_len + s) * hidden_dim;
                    for (d, acc) in sum.iter_mut().enumerate() {
                        *acc += data[offset + d] * mask;
                    }
                    count += mask;
                }
            }

            if count > 0.0 {
                sum.iter_mut().for_each(|x| *x /= count);
            }

            results.push(l2_normalize(&sum));
        }

        Ok(results)
    }
}
