use anyhow::{Context, Result};
use std::path::Path;

/// Print the resolved project root and id for `dir` (default: working directory).
pub fn project(dir: Option<&Path>, json: bool) -> Result<()> {
    let dir = match dir {
        Some(d) => d.to_path_buf(),
        None => std::env::current_dir().context("failed to read working directory")?,
    };
    let root = ctxmem::project::resolve_project_root(&dir);
    let id = ctxmem::project::project_id(&dir);

    if json {
        println!(
            "{}",
            serde_json::json!({ "root": root.display().to_string(), "project_id": id })
        );
    } else {
        println!("Project root: {}", root.display());
        println!("Project id:   {id}");
    }
    Ok(())
}
