use anyhow::{Context, Result};
use std::path::Path;

use ctxmem::config::CtxmemConfig;

use super::export::ExportData;

/// Import records from a JSON export file.
///
/// Records get fresh ids; timestamps, tags and vectors are kept. In project
/// mode everything lands in the current project.
pub fn import(config: &CtxmemConfig, file: &Path) -> Result<()> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read import file: {}", file.display()))?;
    let data: ExportData = serde_json::from_str(&json).context("failed to parse import JSON")?;

    let mut store = super::open_store(config, false)?;
    println!("Importing {} record(s)...", data.records.len());
    let summary = store.import_records(data.records)?;
    store.close()?;

    println!("Import complete:");
    println!("  Records imported: {}", summary.imported);
    if summary.skipped > 0 {
        println!("  Records skipped:  {} (encrypted or invalid)", summary.skipped);
    }
    Ok(())
}
