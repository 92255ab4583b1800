//! CLI record commands: add, get, list, update, delete, clear.

use anyhow::{bail, Context, Result};
use std::io::Write;

use ctxmem::config::CtxmemConfig;
use ctxmem::memory::{ListFilter, Metadata, NewRecord, RecordType, RecordUpdate};

pub struct AddArgs {
    pub content: String,
    pub record_type: RecordType,
    pub source: String,
    pub tags: Vec<String>,
    pub metadata: Option<String>,
    pub project: Option<String>,
    pub embed: bool,
}

pub struct UpdateArgs {
    pub content: Option<String>,
    pub record_type: Option<RecordType>,
    pub source: Option<String>,
    pub tags: Option<Vec<String>>,
    pub metadata: Option<String>,
}

fn parse_metadata(raw: Option<&str>) -> Result<Option<Metadata>> {
    raw.map(|s| serde_json::from_str::<Metadata>(s).context("metadata must be a JSON object"))
        .transpose()
}

pub async fn add(config: &CtxmemConfig, args: AddArgs, json: bool) -> Result<()> {
    let mut store = super::open_store(config, args.embed)?;

    let mut record = NewRecord::new(args.content, args.record_type, args.source).with_tags(args.tags);
    if let Some(metadata) = parse_metadata(args.metadata.as_deref())? {
        record = record.with_metadata(metadata);
    }
    if let Some(project) = args.project {
        record = record.with_project(project);
    }

    let id = store.add(record)?;

    if args.embed {
        match store.embedding_provider() {
            Some(_) => {
                store.update_embedding(id).await.context("failed to embed record")?;
            }
            None => eprintln!("No embedding provider available; record stored without a vector."),
        }
    }

    if json {
        println!("{}", serde_json::json!({ "id": id }));
    } else {
        println!("Stored record #{id}");
    }
    store.close()?;
    Ok(())
}

pub fn get(config: &CtxmemConfig, id: i64, json: bool) -> Result<()> {
    let store = super::open_store(config, false)?;
    let Some(record) = store.get(id)? else {
        bail!("record #{id} not found");
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!("Record #{}", record.id);
    println!("{}", "=".repeat(40));
    println!("  Type:     {}", record.record_type);
    println!("  Source:   {}", record.source);
    if !record.tags.is_empty() {
        println!("  Tags:     {}", record.tags.join(", "));
    }
    if let Some(project) = &record.project_id {
        println!("  Project:  {project}");
    }
    println!("  Created:  {}", record.created_at);
    println!("  Updated:  {}", record.updated_at);
    if let Some(embedding) = &record.embedding {
        println!("  Vector:   {} dims ({})", embedding.vector.len(), embedding.model);
    }
    if let Some(metadata) = &record.metadata {
        println!("  Metadata: {}", serde_json::Value::Object(metadata.clone()));
    }
    println!();
    println!("{}", record.content);
    if record.content.is_encrypted() {
        eprintln!("warning: content could not be decrypted with the configured password");
    }
    Ok(())
}

pub fn list(
    config: &CtxmemConfig,
    record_type: Option<RecordType>,
    tag: Option<String>,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let store = super::open_store(config, false)?;
    let records = store.list(&ListFilter {
        record_type,
        tag,
        limit,
    })?;
    super::print_records(&records, json)
}

pub fn update(config: &CtxmemConfig, id: i64, args: UpdateArgs) -> Result<()> {
    let mut store = super::open_store(config, false)?;
    let update = RecordUpdate {
        content: args.content,
        record_type: args.record_type,
        source: args.source,
        tags: args.tags,
        metadata: parse_metadata(args.metadata.as_deref())?,
    };
    if update.is_empty() {
        bail!("nothing to update; pass at least one of --content, --type, --source, --tag, --metadata");
    }

    if store.update(id, update)? {
        println!("Updated record #{id}");
    } else {
        bail!("record #{id} not found");
    }
    store.close()?;
    Ok(())
}

pub fn delete(config: &CtxmemConfig, id: i64) -> Result<()> {
    let mut store = super::open_store(config, false)?;
    if store.delete(id)? {
        println!("Deleted record #{id}");
    } else {
        bail!("record #{id} not found");
    }
    store.close()?;
    Ok(())
}

/// Delete every record in scope after confirmation.
pub fn clear(config: &CtxmemConfig, yes: bool) -> Result<()> {
    let mut store = super::open_store(config, false)?;
    let scope = match store.project_id() {
        Some(id) => format!("project {id}"),
        None => "ALL projects".to_string(),
    };

    if !yes {
        println!("WARNING: This will permanently delete every record in {scope}.");
        println!("Database: {}", config.resolved_db_path().display());
        print!("\nType YES to confirm: ");
        std::io::stdout().flush()?;

        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if input.trim() != "YES" {
            bail!("clear cancelled");
        }
    }

    let removed = store.clear()?;
    println!("Removed {removed} record(s) from {scope}.");
    store.close()?;
    Ok(())
}
