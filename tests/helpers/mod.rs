#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ctxmem::embedding::EmbeddingProvider;
use ctxmem::error::ProviderError;
use ctxmem::memory::{MemoryStore, NewRecord, RecordType, StoreOptions};

pub const TEST_DIMS: usize = 64;

/// Open a fresh in-memory store scoped to `project`.
pub fn project_store(project: &str) -> MemoryStore {
    MemoryStore::open_in_memory(StoreOptions::project(project)).unwrap()
}

/// Open a fresh in-memory store in global mode.
pub fn global_store() -> MemoryStore {
    MemoryStore::open_in_memory(StoreOptions::global()).unwrap()
}

/// Add a record and return its id.
pub fn add(store: &mut MemoryStore, content: &str, record_type: RecordType, tags: &[&str]) -> i64 {
    store
        .add(NewRecord::new(content, record_type, "test").with_tags(tags.iter().copied()))
        .unwrap()
}

/// The three records used by the routing scenario.
pub fn seed_auth_scenario(store: &mut MemoryStore) -> (i64, i64, i64) {
    let jwt = add(store, "We use JWT tokens for authentication", RecordType::Decision, &["auth"]);
    let db = add(store, "Database uses PostgreSQL", RecordType::Decision, &["database"]);
    let login = add(
        store,
        "Login endpoint validates email",
        RecordType::Fact,
        &["auth", "validation"],
    );
    (jwt, db, login)
}

/// Deterministic bag-of-words provider: each lowercase word is hashed into one
/// of [`TEST_DIMS`] buckets and the counts are L2-normalized. Texts that share
/// words have positive cosine similarity.
pub struct HashingProvider {
    pub calls: AtomicUsize,
}

impl HashingProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
        })
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; TEST_DIMS];
        for word in text.split_whitespace() {
            let word: String = word
                .to_lowercase()
                .chars()
                .filter(|c| c.is_alphanumeric())
                .collect();
            if word.is_empty() {
                continue;
            }
            let bucket = word
                .bytes()
                .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize))
                % TEST_DIMS;
            v[bucket] += 1.0;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl EmbeddingProvider for HashingProvider {
    fn model(&self) -> &str {
        "test-hashing"
    }

    fn dimensions(&self) -> usize {
        TEST_DIMS
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vector(t)).collect())
    }
}

/// Provider that never answers in time.
pub struct StalledProvider;

#[async_trait]
impl EmbeddingProvider for StalledProvider {
    fn model(&self) -> &str {
        "test-hashing"
    }

    fn dimensions(&self) -> usize {
        TEST_DIMS
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }
}

/// Provider whose remote always refuses the request.
pub struct RejectingProvider;

#[async_trait]
impl EmbeddingProvider for RejectingProvider {
    fn model(&self) -> &str {
        "test-hashing"
    }

    fn dimensions(&self) -> usize {
        TEST_DIMS
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Err(ProviderError::Rejected {
            status: 401,
            message: "invalid api key".into(),
        })
    }
}
