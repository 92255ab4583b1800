mod helpers;

use ctxmem::db;
use ctxmem::memory::{MemoryStore, RecordType, RecordUpdate, SearchFilter, StoreOptions};
use tempfile::TempDir;

#[test]
fn open_creates_missing_parent_directories() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("nested").join("deeper").join("memory.db");

    let store = MemoryStore::open(&path, StoreOptions::project("p")).unwrap();
    store.close().unwrap();
    assert!(path.exists());
}

#[test]
fn connections_wait_on_locks() {
    let tmp = TempDir::new().unwrap();
    let conn = db::open_database(tmp.path().join("memory.db")).unwrap();

    let timeout: i64 = conn.query_row("PRAGMA busy_timeout", [], |r| r.get(0)).unwrap();
    assert_eq!(timeout, 5000);
    let mode: String = conn.query_row("PRAGMA journal_mode", [], |r| r.get(0)).unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}

#[test]
fn records_survive_reopen() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("memory.db");

    let mut store = MemoryStore::open(&path, StoreOptions::project("p")).unwrap();
    let id = helpers::add(&mut store, "CI runs on every push", RecordType::Fact, &["ci"]);
    store.close().unwrap();

    let store = MemoryStore::open(&path, StoreOptions::project("p")).unwrap();
    let record = store.get(id).unwrap().unwrap();
    assert_eq!(record.content.as_str(), "CI runs on every push");
    assert_eq!(record.tags, vec!["ci"]);
    assert_eq!(store.search("push", &SearchFilter::default()).unwrap().len(), 1);
}

#[test]
fn updated_at_strictly_increases_across_rapid_updates() {
    let mut store = helpers::project_store("p");
    let id = helpers::add(&mut store, "v0", RecordType::Note, &[]);

    let mut previous = store.get(id).unwrap().unwrap().updated_at;
    for i in 1..=5 {
        store
            .update(id, RecordUpdate { content: Some(format!("v{i}")), ..Default::default() })
            .unwrap();
        let current = store.get(id).unwrap().unwrap().updated_at;
        assert!(current > previous, "{current} should be after {previous}");
        previous = current;
    }

    let record = store.get(id).unwrap().unwrap();
    assert!(record.updated_at > record.created_at);
}

#[test]
fn externally_written_rows_open_at_schema_version_one() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("shared.db");

    {
        let conn = rusqlite::Connection::open(&path).unwrap();
        db::schema::init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO records (project_id, content, type, source, tags, embedding_model, \
             created_at, updated_at) \
             VALUES ('p', 'Shared note about caching', 'note', 'old', '[\"shared\"]', NULL, \
             '2024-01-01T00:00:00.000000Z', '2024-01-01T00:00:00.000000Z')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO records_fts (rowid, content) VALUES (last_insert_rowid(), 'Shared note about caching')",
            [],
        )
        .unwrap();
    }

    let store = MemoryStore::open(&path, StoreOptions::project("p")).unwrap();
    let hits = store.search("caching", &SearchFilter::default()).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].tags, vec!["shared"]);
    assert!(hits[0].embedding.is_none());
    store.close().unwrap();

    let conn = rusqlite::Connection::open(&path).unwrap();
    assert_eq!(
        db::schema::get_schema_version(&conn).unwrap(),
        db::schema::SCHEMA_VERSION
    );
}
