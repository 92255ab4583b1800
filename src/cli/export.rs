use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use ctxmem::config::CtxmemConfig;
use ctxmem::memory::Record;

/// Export format: the records plus the project they came from.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExportData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub records: Vec<Record>,
}

/// Export every record in scope as JSON, to `output` or stdout.
pub fn export(config: &CtxmemConfig, output: Option<&Path>) -> Result<()> {
    let store = super::open_store(config, false)?;
    let data = ExportData {
        project_id: store.project_id().map(str::to_string),
        records: store.export_all()?,
    };

    let undecrypted = data.records.iter().filter(|r| r.content.is_encrypted()).count();
    let json = serde_json::to_string_pretty(&data)?;
    match output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("failed to write export file: {}", path.display()))?,
        None => println!("{json}"),
    }

    eprintln!("Exported {} record(s).", data.records.len());
    if undecrypted > 0 {
        eprintln!("warning: {undecrypted} record(s) could not be decrypted and will not import");
    }
    Ok(())
}
