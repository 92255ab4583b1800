//! Read paths: filtered listing, keyword search and semantic search.

use rusqlite::types::Value;

use crate::embedding::{cosine_similarity, embed_one_with_timeout};
use crate::error::Result;
use crate::memory::store::{MemoryStore, RECORD_COLUMNS};
use crate::memory::types::{ListFilter, Record, SearchFilter, SemanticFilter, SemanticMatch};

/// Result cap when a search filter leaves `limit` unset.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Similarity reported for keyword fallback hits when no vectors are involved.
pub const NEUTRAL_SIMILARITY: f32 = 0.5;

impl MemoryStore {
    /// Records in scope, newest first.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<Record>> {
        let (mut conditions, mut values) = self.scope_conditions();
        if let Some(record_type) = filter.record_type {
            conditions.push("r.type = ?".into());
            values.push(Value::Text(record_type.as_str().into()));
        }
        if let Some(tag) = filter.tag.as_deref().filter(|t| !t.is_empty()) {
            conditions.push(
                "EXISTS (SELECT 1 FROM json_each(r.tags) t \
                 WHERE instr(lower(t.value), lower(?)) > 0)"
                    .into(),
            );
            values.push(Value::Text(tag.to_string()));
        }
        values.push(sql_limit(filter.limit));

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records r {} \
             ORDER BY r.created_at DESC, r.id DESC LIMIT ?",
            where_clause(&conditions)
        );
        self.query_records(&sql, &values)
    }

    /// Keyword search, best match first.
    ///
    /// Every word of `query` must appear in the content. An empty query behaves
    /// like [`list`](Self::list) with the same type filter.
    ///
    /// Encrypted stores have no keyword index. They scan the decrypted content of
    /// every record in scope for the whole query as one case-insensitive
    /// substring, so word order matters there and partial words also match.
    pub fn search(&self, query: &str, filter: &SearchFilter) -> Result<Vec<Record>> {
        let limit = filter.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        let escaped = escape_fts_query(query);
        if escaped.is_empty() {
            return self.list_for_search(filter, limit);
        }

        if self.is_encrypted() {
            let needle = query.trim().to_lowercase();
            return self.scan_decrypted(filter, limit, |text| text.contains(needle.as_str()));
        }
        self.fts_search(escaped, filter, limit)
    }

    /// Records containing at least one of `terms`, best match first.
    pub(crate) fn search_any(&self, terms: &[String], filter: &SearchFilter) -> Result<Vec<Record>> {
        let limit = filter.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
        let expr = fts_any_query(terms);
        if expr.is_empty() {
            return self.list_for_search(filter, limit);
        }

        if self.is_encrypted() {
            let needles: Vec<String> = terms.iter().map(|t| t.to_lowercase()).collect();
            return self.scan_decrypted(filter, limit, |text| {
                needles.iter().any(|n| !n.is_empty() && text.contains(n.as_str()))
            });
        }
        self.fts_search(expr, filter, limit)
    }

    fn list_for_search(&self, filter: &SearchFilter, limit: usize) -> Result<Vec<Record>> {
        self.list(&ListFilter {
            record_type: filter.record_type,
            tag: None,
            limit: Some(limit),
        })
    }

    fn fts_search(&self, match_expr: String, filter: &SearchFilter, limit: usize) -> Result<Vec<Record>> {
        let (mut conditions, mut values) = self.scope_conditions();
        conditions.insert(0, "records_fts MATCH ?".into());
        values.insert(0, Value::Text(match_expr));
        if let Some(record_type) = filter.record_type {
            conditions.push("r.type = ?".into());
            values.push(Value::Text(record_type.as_str().into()));
        }
        values.push(sql_limit(Some(limit)));

        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records_fts \
             JOIN records r ON r.id = records_fts.rowid {} \
             ORDER BY records_fts.rank, r.id DESC LIMIT ?",
            where_clause(&conditions)
        );
        self.query_records(&sql, &values)
    }

    /// Linear scan over decrypted content, newest first. `matches` receives the
    /// lowercased plaintext.
    fn scan_decrypted<F>(&self, filter: &SearchFilter, limit: usize, matches: F) -> Result<Vec<Record>>
    where
        F: Fn(&str) -> bool,
    {
        let candidates = self.list(&ListFilter {
            record_type: filter.record_type,
            tag: None,
            limit: None,
        })?;
        tracing::debug!(candidates = candidates.len(), "scanning encrypted records");

        Ok(candidates
            .into_iter()
            .filter(|record| {
                record
                    .content
                    .plaintext()
                    .is_some_and(|text| matches(&text.to_lowercase()))
            })
            .take(limit)
            .collect())
    }

    /// Rank records by cosine similarity between their stored vector and the
    /// query's.
    ///
    /// Without a provider, or when the provider fails, this degrades to keyword
    /// search and reports [`NEUTRAL_SIMILARITY`] for every hit.
    pub async fn search_semantic(
        &self,
        query: &str,
        filter: &SemanticFilter,
    ) -> Result<Vec<SemanticMatch>> {
        let limit = filter.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);

        let Some(provider) = self.provider.clone() else {
            return self.keyword_fallback(query, filter, limit);
        };

        let query_vector =
            match embed_one_with_timeout(provider.as_ref(), query, self.embed_timeout).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, "query embedding failed, using keyword search");
                    return self.keyword_fallback(query, filter, limit);
                }
            };

        let (mut conditions, mut values) = self.scope_conditions();
        conditions.push("r.embedding IS NOT NULL".into());
        conditions.push("r.embedding_model = ?".into());
        values.push(Value::Text(provider.model().to_string()));
        if let Some(record_type) = filter.record_type {
            conditions.push("r.type = ?".into());
            values.push(Value::Text(record_type.as_str().into()));
        }
        let sql = format!(
            "SELECT {RECORD_COLUMNS} FROM records r {} ORDER BY r.id",
            where_clause(&conditions)
        );

        let mut matches = Vec::new();
        for record in self.query_records(&sql, &values)? {
            let Some(embedding) = &record.embedding else {
                continue;
            };
            if embedding.vector.len() != query_vector.len() {
                tracing::debug!(record_id = record.id, "skipping vector of different length");
                continue;
            }
            let similarity = cosine_similarity(&query_vector, &embedding.vector)?;
            if filter.min_score.is_some_and(|min| similarity < min) {
                continue;
            }
            matches.push(SemanticMatch { record, similarity });
        }

        matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        matches.truncate(limit);
        Ok(matches)
    }

    fn keyword_fallback(
        &self,
        query: &str,
        filter: &SemanticFilter,
        limit: usize,
    ) -> Result<Vec<SemanticMatch>> {
        let records = self.search(
            query,
            &SearchFilter {
                record_type: filter.record_type,
                limit: Some(limit),
            },
        )?;
        Ok(records
            .into_iter()
            .map(|record| SemanticMatch {
                record,
                similarity: NEUTRAL_SIMILARITY,
            })
            .collect())
    }
}

fn where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    }
}

/// SQLite treats a negative LIMIT as unbounded.
fn sql_limit(limit: Option<usize>) -> Value {
    Value::Integer(limit.map_or(-1, |l| l as i64))
}

/// Escape a user query for FTS5 MATCH syntax.
///
/// Wraps each whitespace-delimited word in double quotes so FTS5 treats them as
/// individual terms (implicit AND) and operators like `OR` lose their meaning.
pub(crate) fn escape_fts_query(query: &str) -> String {
    query
        .split_whitespace()
        .map(|word| format!("\"{}\"", word.replace('"', "")))
        .filter(|w| w != "\"\"")
        .collect::<Vec<_>>()
        .join(" ")
}

/// FTS5 expression matching any of `terms`: each term quoted, joined with `OR`.
pub(crate) fn fts_any_query(terms: &[String]) -> String {
    terms
        .iter()
        .map(|t| escape_fts_query(t))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" OR ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::store::StoreOptions;
    use crate::memory::types::{NewRecord, RecordType};

    fn seeded() -> MemoryStore {
        let mut store = MemoryStore::open_in_memory(StoreOptions::project("p")).unwrap();
        store
            .add(NewRecord::new("Auth uses JWT tokens", RecordType::Decision, "adr.md").with_tags(["Auth"]))
            .unwrap();
        store
            .add(NewRecord::new("Database is PostgreSQL", RecordType::Fact, "notes").with_tags(["db"]))
            .unwrap();
        store
            .add(NewRecord::new("JWT secret lives in vault", RecordType::Config, "env").with_tags(["auth-config"]))
            .unwrap();
        store
    }

    #[test]
    fn list_is_newest_first() {
        let store = seeded();
        let records = store.list(&ListFilter::default()).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].id > records[1].id && records[1].id > records[2].id);
    }

    #[test]
    fn list_filters_by_type_tag_and_limit() {
        let store = seeded();
        let facts = store
            .list(&ListFilter {
                record_type: Some(RecordType::Fact),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(facts.len(), 1);

        let auth = store
            .list(&ListFilter {
                tag: Some("AUTH".into()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(auth.len(), 2);

        let limited = store
            .list(&ListFilter {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn search_matches_keywords_case_insensitively() {
        let store = seeded();
        let hits = store.search("jwt", &SearchFilter::default()).unwrap();
        assert_eq!(hits.len(), 2);

        let typed = store
            .search(
                "JWT",
                &SearchFilter {
                    record_type: Some(RecordType::Config),
                    limit: None,
                },
            )
            .unwrap();
        assert_eq!(typed.len(), 1);
        assert_eq!(typed[0].record_type, RecordType::Config);
    }

    #[test]
    fn search_operators_are_literal() {
        let store = seeded();
        assert!(store.search("JWT OR nothing", &SearchFilter::default()).unwrap().is_empty());
        assert!(store.search("\"unbalanced", &SearchFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn empty_query_degrades_to_list() {
        let store = seeded();
        let hits = store.search("   ", &SearchFilter::default()).unwrap();
        assert_eq!(hits.len(), 3);
    }

    #[test]
    fn encrypted_search_scans_plaintext() {
        let mut store =
            MemoryStore::open_in_memory(StoreOptions::project("p").with_password("pw")).unwrap();
        store.add(NewRecord::new("Deploy key rotates weekly", RecordType::Fact, "ops")).unwrap();
        store.add(NewRecord::new("Deploy runs on Fridays", RecordType::Note, "ops")).unwrap();

        assert_eq!(store.search("deploy", &SearchFilter::default()).unwrap().len(), 2);
        assert_eq!(store.search("deploy KEY", &SearchFilter::default()).unwrap().len(), 1);
        assert!(store.search("rollback", &SearchFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn encrypted_search_matches_query_as_one_substring() {
        let mut store =
            MemoryStore::open_in_memory(StoreOptions::project("p").with_password("pw")).unwrap();
        store.add(NewRecord::new("Deploy key rotates weekly", RecordType::Fact, "ops")).unwrap();

        assert!(store.search("key deploy", &SearchFilter::default()).unwrap().is_empty());
        assert_eq!(store.search("  KEY ROT ", &SearchFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn search_any_needs_only_one_term() {
        let store = seeded();
        let terms = vec!["postgresql".to_string(), "nowhere".to_string()];
        assert!(store.search("postgresql nowhere", &SearchFilter::default()).unwrap().is_empty());

        let hits = store.search_any(&terms, &SearchFilter::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content.as_str(), "Database is PostgreSQL");

        let both = vec!["jwt".to_string(), "postgresql".to_string()];
        assert_eq!(store.search_any(&both, &SearchFilter::default()).unwrap().len(), 3);
        assert_eq!(store.search_any(&[], &SearchFilter::default()).unwrap().len(), 3);
    }

    #[test]
    fn search_any_on_encrypted_store_scans_terms() {
        let mut store =
            MemoryStore::open_in_memory(StoreOptions::project("p").with_password("pw")).unwrap();
        store.add(NewRecord::new("Deploy key rotates weekly", RecordType::Fact, "ops")).unwrap();
        store.add(NewRecord::new("Backups run nightly", RecordType::Fact, "ops")).unwrap();

        let terms = vec!["rollback".to_string(), "BACKUPS".to_string()];
        let hits = store.search_any(&terms, &SearchFilter::default()).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content.as_str(), "Backups run nightly");
    }

    #[tokio::test]
    async fn semantic_without_provider_matches_keyword_search() {
        let store = seeded();
        let keyword = store.search("PostgreSQL", &SearchFilter::default()).unwrap();
        let semantic = store
            .search_semantic("PostgreSQL", &SemanticFilter::default())
            .await
            .unwrap();

        assert_eq!(semantic.len(), keyword.len());
        for (m, r) in semantic.iter().zip(&keyword) {
            assert_eq!(m.record.id, r.id);
            assert_eq!(m.similarity, NEUTRAL_SIMILARITY);
        }
    }

    #[test]
    fn test_escape_fts_query() {
        assert_eq!(escape_fts_query("hello world"), "\"hello\" \"world\"");
        assert_eq!(escape_fts_query("rust OR python"), "\"rust\" \"OR\" \"python\"");
        assert_eq!(escape_fts_query("  spaces  "), "\"spaces\"");
        assert_eq!(escape_fts_query("\"\""), "");
    }

    #[test]
    fn test_fts_any_query() {
        let terms = vec!["jwt".to_string(), "\"\"".to_string(), "auth".to_string()];
        assert_eq!(fts_any_query(&terms), "\"jwt\" OR \"auth\"");
        assert_eq!(fts_any_query(&[]), "");
    }
}
