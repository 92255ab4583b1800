//! SQL DDL for the record store.
//!
//! Defines the `records` table, the `records_fts` (FTS5) keyword index and
//! `schema_meta`, which holds the schema version and the encryption key check.
//! All DDL uses `IF NOT EXISTS`.

use rusqlite::{Connection, OptionalExtension};

/// The schema version that the current binary writes.
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    project_id TEXT,
    content TEXT NOT NULL CHECK(length(trim(content)) > 0),
    type TEXT NOT NULL CHECK(type IN ('fact','decision','code','config','note')),
    source TEXT NOT NULL CHECK(length(trim(source)) > 0),
    tags TEXT,
    metadata TEXT,
    embedding BLOB,
    embedding_model TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_project ON records(project_id);
CREATE INDEX IF NOT EXISTS idx_records_type ON records(type);
CREATE INDEX IF NOT EXISTS idx_records_created ON records(created_at);
CREATE INDEX IF NOT EXISTS idx_records_project_created ON records(project_id, created_at);

-- Keyword index. rowid mirrors records.id; rows are written and removed
-- alongside the records they index.
CREATE VIRTUAL TABLE IF NOT EXISTS records_fts USING fts5(
    content,
    tokenize = 'unicode61'
);

CREATE TABLE IF NOT EXISTS schema_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

/// Initialize all schema tables. Idempotent (uses IF NOT EXISTS).
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_meta (key, value) VALUES ('schema_version', ?1)",
        [SCHEMA_VERSION.to_string()],
    )?;

    let version = get_schema_version(conn)?;
    if version != SCHEMA_VERSION {
        tracing::warn!(found = version, expected = SCHEMA_VERSION, "unexpected schema version");
    }

    Ok(())
}

/// Get the schema version recorded in the database.
pub fn get_schema_version(conn: &Connection) -> rusqlite::Result<u32> {
    Ok(get_meta(conn, "schema_version")?
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(0))
}

/// Read a value from `schema_meta`.
pub fn get_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM schema_meta WHERE key = ?1",
        [key],
        |row| row.get::<_, String>(0),
    )
    .optional()
}

/// Write a value to `schema_meta`.
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_meta (key, value) VALUES (?1, ?2)",
        [key, value],
    )?;
    Ok(())
}
