pub mod export;
pub mod fuse;
pub mod import;
pub mod project;
pub mod re_embed;
pub mod records;
pub mod route;
pub mod search;
pub mod stats;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use ctxmem::config::{CtxmemConfig, EmbeddingConfig};
use ctxmem::memory::{MemoryStore, Record, StoreOptions};

const MODEL_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/onnx/model.onnx";
const TOKENIZER_URL: &str =
    "https://huggingface.co/sentence-transformers/all-MiniLM-L6-v2/resolve/main/tokenizer.json";

/// Open the configured store, scoped to the current project unless global mode
/// is on. The embedding provider is attached only when `with_provider` is set.
pub fn open_store(config: &CtxmemConfig, with_provider: bool) -> Result<MemoryStore> {
    let mut options = if config.storage.global {
        StoreOptions::global()
    } else {
        let project_id = match &config.storage.project_id {
            Some(id) => id.clone(),
            None => ctxmem::project::current_project_id()
                .context("failed to derive project id from the working directory")?,
        };
        StoreOptions::project(project_id)
    };
    options = options
        .with_embed_timeout(Duration::from_secs(config.embedding.timeout_secs))
        .with_embed_batch_size(config.embedding.batch_size);
    if let Some(password) = config.encryption_password()? {
        options = options.with_password(password);
    }

    let db_path = config.resolved_db_path();
    let mut store = MemoryStore::open(&db_path, options)
        .with_context(|| format!("failed to open store at {}", db_path.display()))?;

    if with_provider {
        let provider = ctxmem::embedding::create_provider(&config.embedding)
            .context("failed to create embedding provider")?;
        store.set_embedding_provider(provider);
    }
    Ok(store)
}

/// Print records as a numbered list, or as JSON.
pub fn print_records(records: &[Record], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No records found.");
        return Ok(());
    }
    for record in records {
        print_record_line(record, None);
    }
    Ok(())
}

pub fn print_record_line(record: &Record, score: Option<String>) {
    let score = score.map(|s| format!(" ({s})")).unwrap_or_default();
    let tags = if record.tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", record.tags.join(", "))
    };
    println!("  #{} {}{}{}", record.id, record.record_type, tags, score);
    println!("     {}", preview(record.content.as_str(), 120));
    if record.content.is_encrypted() {
        println!("     (content could not be decrypted)");
    }
    println!();
}

/// First `max_chars` characters, with "..." if cut.
pub fn preview(content: &str, max_chars: usize) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// Download the ONNX embedding model and tokenizer to the cache directory.
pub async fn model_download(config: &EmbeddingConfig) -> Result<()> {
    let cache_dir = ctxmem::config::expand_tilde(&config.cache_dir);
    std::fs::create_dir_all(&cache_dir)
        .with_context(|| format!("failed to create cache dir: {}", cache_dir.display()))?;

    let model_path = cache_dir.join("model.onnx");
    let tokenizer_path = cache_dir.join("tokenizer.json");

    if model_path.exists() {
        println!("Model already exists at {}", model_path.display());
    } else {
        println!("Downloading model.onnx (~90MB)...");
        download_file(MODEL_URL, &model_path).await?;
        println!("Model saved to {}", model_path.display());
    }

    if tokenizer_path.exists() {
        println!("Tokenizer already exists at {}", tokenizer_path.display());
    } else {
        println!("Downloading tokenizer.json...");
        download_file(TOKENIZER_URL, &tokenizer_path).await?;
        println!("Tokenizer saved to {}", tokenizer_path.display());
    }

    println!("Model download complete.");
    Ok(())
}

/// Stream a URL to disk with a progress bar. Writes to a temp file, then renames.
async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let mut response = reqwest::get(url)
        .await
        .with_context(|| format!("HTTP request failed for {url}"))?;

    anyhow::ensure!(
        response.status().is_success(),
        "download failed with HTTP {}",
        response.status()
    );

    let pb = match response.content_length() {
        Some(size) => {
            let pb = ProgressBar::new(size);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("  {bar:40.cyan/blue} {bytes}/{total_bytes} ({eta})")?
                    .progress_chars("##-"),
            );
            pb
        }
        None => ProgressBar::new_spinner(),
    };

    let tmp_path = dest.with_extension("tmp");
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .with_context(|| format!("failed to create temp file: {}", tmp_path.display()))?;

    while let Some(chunk) = response.chunk().await.context("error reading response")? {
        file.write_all(&chunk).await.context("error writing to file")?;
        pb.inc(chunk.len() as u64);
    }
    file.flush().await?;
    drop(file);

    tokio::fs::rename(&tmp_path, dest)
        .await
        .context("failed to rename temp file")?;

    pb.finish_and_clear();
    Ok(())
}
