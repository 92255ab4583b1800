use anyhow::Result;

use ctxmem::config::CtxmemConfig;

/// Display store statistics in the terminal.
pub fn stats(config: &CtxmemConfig, json: bool) -> Result<()> {
    let store = super::open_store(config, false)?;
    let response = store.stats()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&response)?);
        return Ok(());
    }

    println!("Record Statistics");
    println!("{}", "=".repeat(40));
    match &response.project_id {
        Some(project) => println!("  Project:             {project}"),
        None => println!("  Project:             (all projects)"),
    }
    println!("  Total records:       {}", response.total);
    println!("  With embeddings:     {}", response.with_embeddings);
    println!("  Encrypted:           {}", if response.encrypted { "yes" } else { "no" });
    println!();

    println!("By Type:");
    for (record_type, count) in &response.by_type {
        println!("  {:<12} {}", record_type, count);
    }
    println!();

    println!("Database size:         {} bytes", response.db_size_bytes);
    if let Some(ref oldest) = response.oldest {
        println!("Oldest record:         {oldest}");
    }
    if let Some(ref newest) = response.newest {
        println!("Newest record:         {newest}");
    }

    Ok(())
}
