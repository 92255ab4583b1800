//! The record store: durable, project-scoped CRUD over the `records` table.
//!
//! [`MemoryStore`] owns the database handle and, optionally, a shared embedding
//! provider. Every read and write is confined to the store's project unless it
//! was opened in global mode. When a password is configured, `content` and
//! `metadata` are sealed with [`crate::crypto`] before they touch disk and the
//! keyword index is not populated for those rows.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, Transaction};

use crate::crypto;
use crate::db;
use crate::embedding::{deserialize_vector, serialize_vector, EmbeddingProvider};
use crate::error::{CryptoError, Error, Result};
use crate::memory::embeddings::EMBED_BATCH_SIZE;
use crate::memory::types::{
    Content, Embedding, Metadata, NewRecord, Record, RecordType, RecordUpdate,
};

/// Plaintext sealed into `schema_meta.key_check` to verify passwords on open.
const KEY_CHECK_PLAINTEXT: &str = "ctxmem-key-check";

pub(crate) const RECORD_COLUMNS: &str = "r.id, r.project_id, r.content, r.type, r.source, \
     r.tags, r.metadata, r.embedding, r.embedding_model, r.created_at, r.updated_at";

/// Which records a store instance can see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreScope {
    /// Only records belonging to this project.
    Project(String),
    /// Every record regardless of project.
    Global,
}

/// Options for opening a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub scope: StoreScope,
    /// Enables at-rest encryption of content and metadata.
    pub password: Option<String>,
    /// Deadline for each embedding provider call.
    pub embed_timeout: Duration,
    /// Records per embedding request in bulk passes.
    pub embed_batch_size: usize,
}

impl StoreOptions {
    pub fn project(project_id: impl Into<String>) -> Self {
        Self::with_scope(StoreScope::Project(project_id.into()))
    }

    pub fn global() -> Self {
        Self::with_scope(StoreScope::Global)
    }

    fn with_scope(scope: StoreScope) -> Self {
        Self {
            scope,
            password: None,
            embed_timeout: Duration::from_secs(30),
            embed_batch_size: EMBED_BATCH_SIZE,
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_embed_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn with_embed_batch_size(mut self, batch_size: usize) -> Self {
        self.embed_batch_size = batch_size.max(1);
        self
    }
}

/// Persistent, project-isolated record store.
pub struct MemoryStore {
    pub(crate) conn: Connection,
    pub(crate) scope: StoreScope,
    pub(crate) password: Option<String>,
    /// Set when `schema_meta.key_check` exists, i.e. some rows may be sealed.
    pub(crate) sealed_rows_possible: bool,
    pub(crate) provider: Option<Arc<dyn EmbeddingProvider>>,
    pub(crate) embed_timeout: Duration,
    pub(crate) embed_batch_size: usize,
    path: Option<PathBuf>,
}

/// Raw row before decryption.
pub(crate) struct RecordRow {
    id: i64,
    project_id: Option<String>,
    content: String,
    record_type: RecordType,
    source: String,
    tags: Option<String>,
    metadata: Option<String>,
    embedding: Option<Vec<u8>>,
    embedding_model: Option<String>,
    created_at: String,
    updated_at: String,
}

/// Column values for a row insert, already sealed if encryption is on.
pub(crate) struct InsertRow<'a> {
    pub project_id: Option<&'a str>,
    pub stored_content: &'a str,
    pub index_content: Option<&'a str>,
    pub record_type: RecordType,
    pub source: &'a str,
    pub tags_json: &'a str,
    pub stored_metadata: Option<&'a str>,
    pub embedding: Option<&'a Embedding>,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

impl MemoryStore {
    /// Open (or create) a store backed by the database file at `path`.
    pub fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
        let path = path.as_ref();
        let conn = db::open_database(path)?;
        Self::from_connection(conn, options, Some(path.to_path_buf()))
    }

    /// Open a store over a fresh in-memory database.
    pub fn open_in_memory(options: StoreOptions) -> Result<Self> {
        let conn = db::open_memory_database()?;
        Self::from_connection(conn, options, None)
    }

    fn from_connection(
        conn: Connection,
        options: StoreOptions,
        path: Option<PathBuf>,
    ) -> Result<Self> {
        if let StoreScope::Project(id) = &options.scope {
            require_text("project id", id)?;
        }

        let key_check = db::schema::get_meta(&conn, "key_check")?;
        match (&options.password, &key_check) {
            (Some(password), Some(token)) => {
                if crypto::decrypt(token, password)? != KEY_CHECK_PLAINTEXT {
                    return Err(CryptoError::DecryptionFailed.into());
                }
            }
            (Some(password), None) => {
                let token = crypto::encrypt(KEY_CHECK_PLAINTEXT, password)?;
                db::schema::set_meta(&conn, "key_check", &token)?;
                tracing::info!("encryption enabled for store");
            }
            (None, Some(_)) => {
                tracing::warn!("store holds encrypted records but was opened without a password");
            }
            (None, None) => {}
        }

        Ok(Self {
            sealed_rows_possible: key_check.is_some() || options.password.is_some(),
            conn,
            scope: options.scope,
            password: options.password,
            provider: None,
            embed_timeout: options.embed_timeout,
            embed_batch_size: options.embed_batch_size.max(1),
            path,
        })
    }

    /// Flush pending WAL pages and release the database handle.
    pub fn close(self) -> Result<()> {
        if self.path.is_some() {
            self.conn
                .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        }
        self.conn.close().map_err(|(_, e)| Error::Storage(e))?;
        Ok(())
    }

    /// The project this store is confined to, or `None` in global mode.
    pub fn project_id(&self) -> Option<&str> {
        match &self.scope {
            StoreScope::Project(id) => Some(id),
            StoreScope::Global => None,
        }
    }

    pub fn is_global(&self) -> bool {
        self.scope == StoreScope::Global
    }

    pub fn is_encrypted(&self) -> bool {
        self.password.is_some()
    }

    /// Validate and persist a new record. Returns its id.
    ///
    /// The record is keyword-searchable as soon as this returns.
    pub fn add(&mut self, record: NewRecord) -> Result<i64> {
        require_text("content", &record.content)?;
        require_text("source", &record.source)?;
        let project_id = self.resolve_project(record.project_id)?;

        let stored_content = self.seal(&record.content)?;
        let tags_json = serde_json::to_string(&record.tags)?;
        let stored_metadata = self.seal_metadata(record.metadata.as_ref())?;
        let now = now_timestamp();

        let tx = self.conn.transaction()?;
        let id = insert_row(
            &tx,
            &InsertRow {
                project_id: project_id.as_deref(),
                stored_content: &stored_content,
                index_content: self.password.is_none().then_some(record.content.as_str()),
                record_type: record.record_type,
                source: &record.source,
                tags_json: &tags_json,
                stored_metadata: stored_metadata.as_deref(),
                embedding: None,
                created_at: &now,
                updated_at: &now,
            },
        )?;
        tx.commit()?;

        tracing::debug!(
            record_id = id,
            record_type = %record.record_type,
            project = project_id.as_deref().unwrap_or("-"),
            "record added"
        );
        Ok(id)
    }

    /// Fetch a record by id. `None` if absent or outside this store's scope.
    pub fn get(&self, id: i64) -> Result<Option<Record>> {
        let (mut conditions, mut values) = self.scope_conditions();
        conditions.push("r.id = ?".into());
        values.push(Value::Integer(id));

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records r WHERE {}",
            conditions.join(" AND ")
        );
        Ok(self.query_records(&sql, &values)?.into_iter().next())
    }

    /// Apply a partial update.
    ///
    /// Returns `false` if nothing was supplied or the id is not visible to this
    /// store. Invalid values fail with [`Error::Validation`] before anything is written.
    pub fn update(&mut self, id: i64, update: RecordUpdate) -> Result<bool> {
        if update.is_empty() {
            return Ok(false);
        }
        if let Some(content) = &update.content {
            require_text("content", content)?;
        }
        if let Some(source) = &update.source {
            require_text("source", source)?;
        }

        let Some(existing) = self.get(id)? else {
            return Ok(false);
        };

        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        let sealed_content = update
            .content
            .as_deref()
            .map(|c| self.seal(c))
            .transpose()?;
        if let Some(stored) = &sealed_content {
            sets.push("content = ?");
            values.push(Value::Text(stored.clone()));
            // stale vector; recomputed by the next embedding pass
            sets.push("embedding = NULL");
            sets.push("embedding_model = NULL");
        }
        if let Some(record_type) = update.record_type {
            sets.push("type = ?");
            values.push(Value::Text(record_type.as_str().into()));
        }
        if let Some(source) = &update.source {
            sets.push("source = ?");
            values.push(Value::Text(source.clone()));
        }
        if let Some(tags) = &update.tags {
            sets.push("tags = ?");
            values.push(Value::Text(serde_json::to_string(tags)?));
        }
        if update.metadata.is_some() {
            sets.push("metadata = ?");
            match self.seal_metadata(update.metadata.as_ref())? {
                Some(stored) => values.push(Value::Text(stored)),
                None => values.push(Value::Null),
            }
        }

        sets.push("updated_at = ?");
        values.push(Value::Text(advance_timestamp(&existing.updated_at)));
        values.push(Value::Integer(id));

        let sql = format!("UPDATE records SET {} WHERE id = ?", sets.join(", "));
        let index_content = update.content.as_deref().filter(|_| self.password.is_none());

        let tx = self.conn.transaction()?;
        tx.execute(&sql, params_from_iter(values.iter()))?;
        if update.content.is_some() {
            remove_fts(&tx, id)?;
            if let Some(text) = index_content {
                insert_fts(&tx, id, text)?;
            }
        }
        tx.commit()?;

        tracing::debug!(record_id = id, fields = sets.len() - 1, "record updated");
        Ok(true)
    }

    /// Permanently remove a record. Returns `false` if it was not visible to this store.
    pub fn delete(&mut self, id: i64) -> Result<bool> {
        let (mut conditions, mut values) = self.scope_conditions_on("");
        conditions.push("id = ?".into());
        values.push(Value::Integer(id));
        let sql = format!("DELETE FROM records WHERE {}", conditions.join(" AND "));

        let tx = self.conn.transaction()?;
        let removed = tx.execute(&sql, params_from_iter(values.iter()))?;
        if removed > 0 {
            remove_fts(&tx, id)?;
        }
        tx.commit()?;

        if removed > 0 {
            tracing::debug!(record_id = id, "record deleted");
        }
        Ok(removed > 0)
    }

    /// Remove every record in scope. Returns how many were removed.
    pub fn clear(&mut self) -> Result<usize> {
        let (conditions, values) = self.scope_conditions_on("");
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let tx = self.conn.transaction()?;
        tx.execute(
            &format!("DELETE FROM records_fts WHERE rowid IN (SELECT id FROM records {where_clause})"),
            params_from_iter(values.iter()),
        )?;
        let removed = tx.execute(
            &format!("DELETE FROM records {where_clause}"),
            params_from_iter(values.iter()),
        )?;
        tx.commit()?;

        tracing::info!(removed, project = self.project_id().unwrap_or("*"), "store cleared");
        Ok(removed)
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    /// WHERE fragments confining a query on `records r` to this store's scope.
    pub(crate) fn scope_conditions(&self) -> (Vec<String>, Vec<Value>) {
        self.scope_conditions_on("r.")
    }

    /// Same as [`Self::scope_conditions`], with `prefix` in front of each column.
    /// Pass `""` for statements on the bare `records` table.
    pub(crate) fn scope_conditions_on(&self, prefix: &str) -> (Vec<String>, Vec<Value>) {
        match &self.scope {
            StoreScope::Project(id) => (
                vec![format!("{prefix}project_id = ?")],
                vec![Value::Text(id.clone())],
            ),
            StoreScope::Global => (Vec::new(), Vec::new()),
        }
    }

    pub(crate) fn resolve_project(&self, requested: Option<String>) -> Result<Option<String>> {
        match (&self.scope, requested) {
            (StoreScope::Global, requested) => Ok(requested),
            (StoreScope::Project(own), None) => Ok(Some(own.clone())),
            (StoreScope::Project(own), Some(req)) if req == *own => Ok(Some(req)),
            (StoreScope::Project(_), Some(req)) => Err(Error::validation(format!(
                "project override '{req}' is only allowed in global mode"
            ))),
        }
    }

    /// Run a `SELECT {RECORD_COLUMNS} ...` query and decrypt the results.
    pub(crate) fn query_records(&self, sql: &str, values: &[Value]) -> Result<Vec<Record>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), map_record_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows.into_iter().map(|row| self.hydrate(row)).collect())
    }

    pub(crate) fn seal(&self, plaintext: &str) -> Result<String> {
        match &self.password {
            Some(password) => Ok(crypto::encrypt(plaintext, password)?),
            None => Ok(plaintext.to_string()),
        }
    }

    pub(crate) fn seal_metadata(&self, metadata: Option<&Metadata>) -> Result<Option<String>> {
        metadata
            .map(|m| serde_json::to_string(m).map_err(Error::from).and_then(|json| self.seal(&json)))
            .transpose()
    }

    fn open_content(&self, id: i64, stored: String) -> Content {
        if !self.sealed_rows_possible || !crypto::looks_encrypted(&stored) {
            return Content::Plaintext(stored);
        }
        let Some(password) = &self.password else {
            return Content::Encrypted(stored);
        };
        match crypto::decrypt(&stored, password) {
            Ok(plaintext) => Content::Plaintext(plaintext),
            Err(e) => {
                tracing::warn!(record_id = id, error = %e, "could not decrypt record content");
                Content::Encrypted(stored)
            }
        }
    }

    fn open_metadata(&self, id: i64, stored: &str) -> Option<Metadata> {
        let json = if self.sealed_rows_possible && crypto::looks_encrypted(stored) {
            let password = self.password.as_ref()?;
            match crypto::decrypt(stored, password) {
                Ok(json) => json,
                Err(e) => {
                    tracing::warn!(record_id = id, error = %e, "could not decrypt record metadata");
                    return None;
                }
            }
        } else {
            stored.to_string()
        };
        serde_json::from_str(&json).ok()
    }

    fn hydrate(&self, row: RecordRow) -> Record {
        let metadata = row
            .metadata
            .as_deref()
            .and_then(|m| self.open_metadata(row.id, m));
        let tags = row
            .tags
            .as_deref()
            .and_then(|t| serde_json::from_str(t).ok())
            .unwrap_or_default();
        let embedding = match (row.embedding, row.embedding_model) {
            (Some(blob), Some(model)) => match deserialize_vector(&blob) {
                Ok(vector) => Some(Embedding { vector, model }),
                Err(e) => {
                    tracing::warn!(record_id = row.id, error = %e, "ignoring corrupt embedding");
                    None
                }
            },
            _ => None,
        };

        Record {
            id: row.id,
            project_id: row.project_id,
            content: self.open_content(row.id, row.content),
            record_type: row.record_type,
            source: row.source,
            tags,
            metadata,
            embedding,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

pub(crate) fn map_record_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecordRow> {
    let type_str: String = row.get(3)?;
    let record_type = type_str.parse::<RecordType>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, e.into())
    })?;
    Ok(RecordRow {
        id: row.get(0)?,
        project_id: row.get(1)?,
        content: row.get(2)?,
        record_type,
        source: row.get(4)?,
        tags: row.get(5)?,
        metadata: row.get(6)?,
        embedding: row.get(7)?,
        embedding_model: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

/// Insert a row and (optionally) its keyword index entry. Returns the new id.
pub(crate) fn insert_row(tx: &Transaction<'_>, row: &InsertRow<'_>) -> Result<i64> {
    let (blob, model) = match row.embedding {
        Some(e) => (Some(serialize_vector(&e.vector)), Some(e.model.as_str())),
        None => (None, None),
    };
    tx.execute(
        "INSERT INTO records (project_id, content, type, source, tags, metadata, embedding, \
         embedding_model, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            row.project_id,
            row.stored_content,
            row.record_type.as_str(),
            row.source,
            row.tags_json,
            row.stored_metadata,
            blob,
            model,
            row.created_at,
            row.updated_at,
        ],
    )?;
    let id = tx.last_insert_rowid();
    if let Some(text) = row.index_content {
        insert_fts(tx, id, text)?;
    }
    Ok(id)
}

/// Index content for keyword search. rowid mirrors `records.id`.
fn insert_fts(conn: &Connection, id: i64, content: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO records_fts (rowid, content) VALUES (?1, ?2)",
        params![id, content],
    )?;
    Ok(())
}

fn remove_fts(conn: &Connection, id: i64) -> Result<()> {
    conn.execute("DELETE FROM records_fts WHERE rowid = ?1", params![id])?;
    Ok(())
}

/// Reject empty or whitespace-only text.
pub(crate) fn require_text(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

/// Current time as a fixed-width RFC 3339 string, so lexical order is chronological.
pub(crate) fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// A timestamp strictly later than `previous`.
fn advance_timestamp(previous: &str) -> String {
    let now = Utc::now().trunc_subsecs(6);
    match DateTime::parse_from_rfc3339(previous) {
        Ok(prev) if prev.with_timezone(&Utc) >= now => {
            format_timestamp(prev.with_timezone(&Utc) + chrono::Duration::microseconds(1))
        }
        _ => format_timestamp(now),
    }
}
