//! Bulk export and import of records as plain JSON.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::memory::store::{insert_row, require_text, InsertRow, MemoryStore};
use crate::memory::types::{ListFilter, Record};

/// Outcome of [`MemoryStore::import_records`].
#[derive(Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    /// Records that were still ciphertext or failed validation.
    pub skipped: usize,
}

impl MemoryStore {
    /// Every record in scope, oldest first, with content decrypted where possible.
    pub fn export_all(&self) -> Result<Vec<Record>> {
        let mut records = self.list(&ListFilter::default())?;
        records.reverse();
        Ok(records)
    }

    /// Insert previously exported records under fresh ids.
    ///
    /// Timestamps and vectors are preserved. In project mode every record lands
    /// in this store's project; in global mode each keeps its own. Content is
    /// re-sealed with this store's password, if any.
    pub fn import_records(&mut self, records: Vec<Record>) -> Result<ImportSummary> {
        let mut prepared = Vec::with_capacity(records.len());
        let mut summary = ImportSummary::default();

        for record in records {
            let Some(text) = record.content.plaintext() else {
                tracing::warn!(record_id = record.id, "skipping encrypted record on import");
                summary.skipped += 1;
                continue;
            };
            if require_text("content", text).is_err() || require_text("source", &record.source).is_err() {
                summary.skipped += 1;
                continue;
            }
            let project_id = match self.project_id() {
                Some(own) => Some(own.to_string()),
                None => record.project_id.clone(),
            };
            let stored_content = self.seal(text)?;
            let stored_metadata = self.seal_metadata(record.metadata.as_ref())?;
            let tags_json = serde_json::to_string(&record.tags)?;
            prepared.push((record, project_id, stored_content, stored_metadata, tags_json));
        }

        let index = self.password.is_none();
        let tx = self.conn.transaction()?;
        for (record, project_id, stored_content, stored_metadata, tags_json) in &prepared {
            insert_row(
                &tx,
                &InsertRow {
                    project_id: project_id.as_deref(),
                    stored_content,
                    index_content: if index { record.content.plaintext() } else { None },
                    record_type: record.record_type,
                    source: &record.source,
                    tags_json,
                    stored_metadata: stored_metadata.as_deref(),
                    embedding: record.embedding.as_ref(),
                    created_at: &record.created_at,
                    updated_at: &record.updated_at,
                },
            )?;
        }
        tx.commit()?;

        summary.imported = prepared.len();
        tracing::info!(imported = summary.imported, skipped = summary.skipped, "records imported");
        Ok(summary)
    }
}
