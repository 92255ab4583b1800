//! Vector maintenance: attaching a provider and (re)computing stored embeddings.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::params;
use rusqlite::types::Value;

use crate::embedding::{embed_one_with_timeout, embed_with_timeout, serialize_vector, EmbeddingProvider};
use crate::error::{CryptoError, ProviderError, Result};
use crate::memory::store::{MemoryStore, RECORD_COLUMNS};

/// Records per provider request during bulk embedding.
pub const EMBED_BATCH_SIZE: usize = 10;

impl MemoryStore {
    /// Attach or detach the provider used for vectors. Replacing it does not
    /// touch vectors already stored.
    pub fn set_embedding_provider(&mut self, provider: Option<Arc<dyn EmbeddingProvider>>) {
        if let Some(p) = &provider {
            tracing::debug!(model = %p.model(), dimensions = p.dimensions(), "embedding provider attached");
        }
        self.provider = provider;
    }

    pub fn embedding_provider(&self) -> Option<&Arc<dyn EmbeddingProvider>> {
        self.provider.as_ref()
    }

    pub fn embed_timeout(&self) -> Duration {
        self.embed_timeout
    }

    fn require_provider(&self) -> Result<Arc<dyn EmbeddingProvider>> {
        self.provider
            .clone()
            .ok_or_else(|| ProviderError::Unavailable("no embedding provider configured".into()).into())
    }

    /// Compute and store the vector for one record.
    ///
    /// Returns `false` if the record is not visible to this store. Provider
    /// failures are returned to the caller.
    pub async fn update_embedding(&mut self, id: i64) -> Result<bool> {
        let provider = self.require_provider()?;
        let Some(record) = self.get(id)? else {
            return Ok(false);
        };
        let text = record
            .content
            .plaintext()
            .ok_or(CryptoError::DecryptionFailed)?
            .to_string();

        let vector = embed_one_with_timeout(provider.as_ref(), &text, self.embed_timeout).await?;
        self.conn.execute(
            "UPDATE records SET embedding = ?1, embedding_model = ?2 WHERE id = ?3",
            params![serialize_vector(&vector), provider.model(), id],
        )?;
        tracing::debug!(record_id = id, model = %provider.model(), "embedding stored");
        Ok(true)
    }

    /// Embed every record in scope that has no vector from the current model.
    ///
    /// Works in batches of `embed_batch_size`; each batch is committed before the
    /// next request, so a provider failure keeps the progress made so far.
    /// Records whose content cannot be decrypted are skipped. Returns how many
    /// vectors were written.
    pub async fn update_all_embeddings(&mut self) -> Result<usize> {
        self.update_all_embeddings_with_progress(|_| {}).await
    }

    /// [`update_all_embeddings`](Self::update_all_embeddings), reporting the
    /// number of records handled after each batch.
    pub async fn update_all_embeddings_with_progress<F>(&mut self, mut on_batch: F) -> Result<usize>
    where
        F: FnMut(usize),
    {
        let provider = self.require_provider()?;
        let model = provider.model().to_string();
        let mut after_id = 0i64;
        let mut written = 0usize;

        loop {
            let (mut conditions, mut values) = self.scope_conditions();
            conditions.push("(r.embedding IS NULL OR r.embedding_model IS NULL OR r.embedding_model != ?)".into());
            values.push(Value::Text(model.clone()));
            conditions.push("r.id > ?".into());
            values.push(Value::Integer(after_id));
            values.push(Value::Integer(self.embed_batch_size as i64));

            let sql = format!(
                "SELECT {RECORD_COLUMNS} FROM records r WHERE {} ORDER BY r.id LIMIT ?",
                conditions.join(" AND ")
            );
            let batch = self.query_records(&sql, &values)?;
            let Some(last) = batch.last() else {
                break;
            };
            after_id = last.id;
            let handled = batch.len();

            let (ids, texts): (Vec<i64>, Vec<String>) = batch
                .into_iter()
                .filter_map(|r| match r.content.plaintext() {
                    Some(text) => Some((r.id, text.to_string())),
                    None => {
                        tracing::warn!(record_id = r.id, "skipping undecryptable record");
                        None
                    }
                })
                .unzip();

            if !texts.is_empty() {
                let vectors = embed_with_timeout(provider.as_ref(), &texts, self.embed_timeout).await?;
                let tx = self.conn.transaction()?;
                {
                    let mut stmt = tx.prepare(
                        "UPDATE records SET embedding = ?1, embedding_model = ?2 WHERE id = ?3",
                    )?;
                    for (id, vector) in ids.iter().zip(&vectors) {
                        stmt.execute(params![serialize_vector(vector), model, id])?;
                    }
                }
                tx.commit()?;
                written += ids.len();
            }

            tracing::debug!(batch = handled, written, "embedding batch done");
            on_batch(handled);
        }

        tracing::info!(written, model = %model, "embedding pass complete");
        Ok(written)
    }

    /// Drop every stored vector in scope, e.g. before re-embedding with another model.
    pub fn clear_embeddings(&mut self) -> Result<usize> {
        let (conditions, values) = self.scope_conditions_on("");
        let filter = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };
        let cleared = self.conn.execute(
            &format!("UPDATE records SET embedding = NULL, embedding_model = NULL {filter}"),
            rusqlite::params_from_iter(values.iter()),
        )?;
        Ok(cleared)
    }

    /// Records in scope still lacking a vector from the attached provider's model.
    pub fn pending_embeddings(&self) -> Result<u64> {
        let Some(provider) = &self.provider else {
            return Ok(0);
        };
        let (mut conditions, mut values) = self.scope_conditions();
        conditions.push("(r.embedding IS NULL OR r.embedding_model IS NULL OR r.embedding_model != ?)".into());
        values.push(Value::Text(provider.model().to_string()));
        let sql = format!("SELECT COUNT(*) FROM records r WHERE {}", conditions.join(" AND "));
        let n: i64 = self
            .conn
            .query_row(&sql, rusqlite::params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(n as u64)
    }
}
