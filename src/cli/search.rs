use anyhow::Result;

use ctxmem::config::CtxmemConfig;
use ctxmem::memory::{RecordType, SearchFilter, SemanticFilter};

/// Keyword search from the terminal.
pub fn search(
    config: &CtxmemConfig,
    query: &str,
    record_type: Option<RecordType>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let store = super::open_store(config, false)?;
    let records = store.search(query, &SearchFilter { record_type, limit })?;

    if !json && !records.is_empty() {
        println!("Found {} result(s)\n", records.len());
    }
    super::print_records(&records, json)
}

/// Semantic search from the terminal.
pub async fn semantic(
    config: &CtxmemConfig,
    query: &str,
    record_type: Option<RecordType>,
    limit: Option<usize>,
    min_score: Option<f32>,
    json: bool,
) -> Result<()> {
    let store = super::open_store(config, true)?;
    if store.embedding_provider().is_none() {
        eprintln!("No embedding provider available; falling back to keyword search.");
    }

    let matches = store
        .search_semantic(
            query,
            &SemanticFilter {
                record_type,
                limit,
                min_score,
            },
        )
        .await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }
    if matches.is_empty() {
        println!("No results found.");
        return Ok(());
    }

    println!("Found {} result(s)\n", matches.len());
    for m in &matches {
        super::print_record_line(&m.record, Some(format!("similarity: {:.3}", m.similarity)));
    }
    Ok(())
}
