//! CLI `re-embed` command: compute embeddings for records that lack one.

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use ctxmem::config::CtxmemConfig;

/// Embed every record without a vector from the configured model. With `all`,
/// existing vectors are dropped first.
pub async fn re_embed(config: &CtxmemConfig, all: bool) -> Result<()> {
    let mut store = super::open_store(config, true)?;
    let model = match store.embedding_provider() {
        Some(provider) => provider.model().to_string(),
        None => anyhow::bail!(
            "no embedding provider available; run `ctxmem model download` or set ${}",
            config.embedding.api_key_env
        ),
    };

    if all {
        let cleared = store.clear_embeddings()?;
        tracing::info!(cleared, "dropped existing embeddings");
    }

    let pending = store.pending_embeddings()?;
    if pending == 0 {
        println!("All records already have embeddings from '{model}'.");
        return Ok(());
    }

    println!("Embedding {pending} record(s) with model '{model}'...");

    let pb = ProgressBar::new(pending);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("  {bar:40.cyan/blue} {pos}/{len} ({eta})")?
            .progress_chars("##-"),
    );

    let written = store
        .update_all_embeddings_with_progress(|n| pb.inc(n as u64))
        .await
        .context("embedding pass failed; completed batches were kept")?;

    pb.finish_and_clear();
    store.close()?;

    println!("Embedded {written} record(s) with model '{model}'.");
    Ok(())
}
