use rusqlite::params_from_iter;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::memory::store::MemoryStore;
use crate::memory::types::RecordType;

/// Response from [`MemoryStore::stats`].
#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub total: u64,
    /// Every record type is present, including those with zero records.
    pub by_type: BTreeMap<String, u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub with_embeddings: u64,
    pub encrypted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest: Option<String>,
    pub db_size_bytes: u64,
}

impl MemoryStore {
    /// Number of records in scope.
    pub fn count(&self) -> Result<u64> {
        let (conditions, values) = self.scope_conditions();
        let sql = format!("SELECT COUNT(*) FROM records r {}", where_sql(&conditions));
        let total: i64 = self
            .conn
            .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        Ok(total as u64)
    }

    /// Counts by type and embedding coverage for records in scope.
    pub fn stats(&self) -> Result<StoreStats> {
        let (conditions, values) = self.scope_conditions();
        let filter = where_sql(&conditions);

        let mut by_type: BTreeMap<String, u64> = RecordType::ALL
            .iter()
            .map(|t| (t.as_str().to_string(), 0))
            .collect();
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT r.type, COUNT(*) FROM records r {filter} GROUP BY r.type"))?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (record_type, count) in rows {
            by_type.insert(record_type, count as u64);
        }

        let (with_embeddings, oldest, newest): (i64, Option<String>, Option<String>) =
            self.conn.query_row(
                &format!(
                    "SELECT COUNT(r.embedding), MIN(r.created_at), MAX(r.created_at) \
                     FROM records r {filter}"
                ),
                params_from_iter(values.iter()),
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;

        let db_size_bytes = self
            .conn
            .path()
            .filter(|p| !p.is_empty())
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StoreStats {
            total: by_type.values().sum(),
            by_type,
            project_id: self.project_id().map(str::to_string),
            with_embeddings: with_embeddings as u64,
            encrypted: self.is_encrypted(),
            oldest,
            newest,
            db_size_bytes,
        })
    }
}

fn where_sql(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}
