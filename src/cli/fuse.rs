use anyhow::{Context, Result};
use std::io::Read;
use std::path::PathBuf;

use ctxmem::config::CtxmemConfig;
use ctxmem::fusion::{DedupeStrategy, FuseOptions, Fuser, OutputFormat, SourceDescriptor};

pub struct FuseArgs {
    pub sources_file: Option<PathBuf>,
    pub queries: Vec<String>,
    pub tasks: Vec<String>,
    pub files: Vec<PathBuf>,
    pub inline: Vec<String>,
    pub max_tokens: usize,
    pub dedupe: DedupeStrategy,
    pub format: OutputFormat,
}

fn read_sources(path: &PathBuf) -> Result<Vec<SourceDescriptor>> {
    let raw = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read sources from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read sources file: {}", path.display()))?
    };
    serde_json::from_str(&raw).context("sources must be a JSON array of source descriptors")
}

/// Fuse the given sources and print the result.
pub async fn fuse(config: &CtxmemConfig, args: FuseArgs, json: bool) -> Result<()> {
    let mut sources = match &args.sources_file {
        Some(path) => read_sources(path)?,
        None => Vec::new(),
    };
    sources.extend(args.queries.into_iter().map(|query| SourceDescriptor::Memory { query, weight: None }));
    sources.extend(args.tasks.into_iter().map(|task| SourceDescriptor::Task {
        task,
        limit: None,
        weight: None,
    }));
    sources.extend(args.files.into_iter().map(|path| SourceDescriptor::File { path, weight: None }));
    sources.extend(args.inline.into_iter().map(|data| SourceDescriptor::Inline { data, weight: None }));

    let needs_store = sources
        .iter()
        .any(|s| matches!(s, SourceDescriptor::Memory { .. } | SourceDescriptor::Task { .. }));
    let store = if needs_store {
        Some(super::open_store(config, config.router.semantic > 0.0)?)
    } else {
        None
    };
    let fuser = match &store {
        Some(store) => Fuser::new(store).with_router_weights(config.router.weights()),
        None => Fuser::without_store(),
    };

    let options = FuseOptions {
        sources,
        max_tokens: args.max_tokens,
        dedupe: args.dedupe,
        format: args.format,
    };
    let result = fuser.fuse(&options).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!("{}", result.content);
    eprintln!(
        "\n{} tokens (from {}, saved {} / {}%)",
        result.token_count, result.original_token_count, result.saved_tokens, result.savings_percentage
    );
    Ok(())
}
