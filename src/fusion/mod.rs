//! Context fusion: merge heterogeneous sources into one deduplicated,
//! token-budgeted blob.

pub mod dedupe;
pub mod format;

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::memory::{MemoryStore, Record, SearchFilter};
use crate::router::{RouteOptions, Router, RouterWeights};

pub use dedupe::DedupeStrategy;
pub use format::{estimate_tokens, OutputFormat};

pub const DEFAULT_MAX_TOKENS: usize = 4000;

/// Records fetched per `memory` source.
const MEMORY_SOURCE_LIMIT: usize = 10;

/// Where one piece of context comes from. Deserializes from
/// `{"type": "...", ...}`; unknown types become [`SourceDescriptor::Unsupported`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceDescriptor {
    /// Keyword search over the store.
    Memory {
        query: String,
        #[serde(default)]
        weight: Option<f64>,
    },
    /// Records routed for a task description.
    Task {
        task: String,
        #[serde(default)]
        limit: Option<usize>,
        #[serde(default)]
        weight: Option<f64>,
    },
    /// A file read from disk; missing or unreadable files are dropped.
    File {
        path: PathBuf,
        #[serde(default)]
        weight: Option<f64>,
    },
    /// Conversation text, used verbatim.
    Session {
        data: String,
        #[serde(default)]
        weight: Option<f64>,
    },
    /// Literal text, used verbatim.
    Inline {
        data: String,
        #[serde(default)]
        weight: Option<f64>,
    },
    #[serde(other)]
    Unsupported,
}

impl SourceDescriptor {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Memory { .. } => "memory",
            Self::Task { .. } => "task",
            Self::File { .. } => "file",
            Self::Session { .. } => "session",
            Self::Inline { .. } => "inline",
            Self::Unsupported => "unsupported",
        }
    }

    pub fn weight(&self) -> f64 {
        match self {
            Self::Memory { weight, .. }
            | Self::Task { weight, .. }
            | Self::File { weight, .. }
            | Self::Session { weight, .. }
            | Self::Inline { weight, .. } => weight.unwrap_or(1.0),
            Self::Unsupported => 1.0,
        }
    }
}

/// One fetched piece of content.
#[derive(Debug, Clone, PartialEq)]
pub struct FusionChunk {
    pub source_type: String,
    pub content: String,
    pub weight: f64,
}

#[derive(Debug, Clone)]
pub struct FuseOptions {
    pub sources: Vec<SourceDescriptor>,
    pub max_tokens: usize,
    pub dedupe: DedupeStrategy,
    pub format: OutputFormat,
}

impl Default for FuseOptions {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            dedupe: DedupeStrategy::Exact,
            format: OutputFormat::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceCount {
    #[serde(rename = "type")]
    pub source_type: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FuseResult {
    pub content: String,
    pub token_count: usize,
    /// Per-type counts of chunks that survived deduplication.
    pub sources: Vec<SourceCount>,
    /// Token estimate of everything fetched, before deduplication.
    pub original_token_count: usize,
    pub saved_tokens: usize,
    pub savings_percentage: u32,
}

/// Fetches, deduplicates, orders and truncates context sources.
pub struct Fuser<'a> {
    store: Option<&'a MemoryStore>,
    router_weights: RouterWeights,
}

impl<'a> Fuser<'a> {
    pub fn new(store: &'a MemoryStore) -> Self {
        Self {
            store: Some(store),
            router_weights: RouterWeights::default(),
        }
    }

    /// A fuser without a store; `memory` and `task` sources yield nothing.
    pub fn without_store() -> Self {
        Self {
            store: None,
            router_weights: RouterWeights::default(),
        }
    }

    pub fn with_router_weights(mut self, weights: RouterWeights) -> Self {
        self.router_weights = weights;
        self
    }

    pub async fn fuse(&self, options: &FuseOptions) -> Result<FuseResult> {
        let mut chunks = Vec::with_capacity(options.sources.len());
        for source in &options.sources {
            if let Some(content) = self.fetch(source).await? {
                chunks.push(FusionChunk {
                    source_type: source.kind().to_string(),
                    content,
                    weight: source.weight(),
                });
            }
        }

        let original_token_count: usize = chunks.iter().map(|c| estimate_tokens(&c.content)).sum();
        let fetched = chunks.len();

        let mut chunks = dedupe::dedupe(chunks, options.dedupe);
        let sources = count_by_type(&chunks);
        chunks.sort_by(|a, b| b.weight.total_cmp(&a.weight));

        let content = format::assemble(&chunks, options.max_tokens, options.format);
        let token_count = estimate_tokens(&content);
        let saved_tokens = original_token_count.saturating_sub(token_count);
        let savings_percentage = if original_token_count == 0 {
            0
        } else {
            (100.0 * saved_tokens as f64 / original_token_count as f64).round() as u32
        };

        tracing::debug!(
            fetched,
            kept = chunks.len(),
            token_count,
            original_token_count,
            "fused context"
        );

        Ok(FuseResult {
            content,
            token_count,
            sources,
            original_token_count,
            saved_tokens,
            savings_percentage,
        })
    }

    async fn fetch(&self, source: &SourceDescriptor) -> Result<Option<String>> {
        match source {
            SourceDescriptor::Memory { query, .. } => {
                let Some(store) = self.store else {
                    return Ok(None);
                };
                let records = store.search(
                    query,
                    &SearchFilter {
                        record_type: None,
                        limit: Some(MEMORY_SOURCE_LIMIT),
                    },
                )?;
                Ok(join_records(&records))
            }
            SourceDescriptor::Task { task, limit, .. } => {
                let Some(store) = self.store else {
                    return Ok(None);
                };
                let router = Router::with_weights(store, self.router_weights);
                let options = RouteOptions {
                    limit: limit.unwrap_or(crate::router::DEFAULT_ROUTE_LIMIT),
                    ..Default::default()
                };
                let records = router.route(task, &options).await?;
                Ok(join_records(&records))
            }
            SourceDescriptor::File { path, .. } => match tokio::fs::read_to_string(path).await {
                Ok(text) => Ok(Some(text)),
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping unreadable file source");
                    Ok(None)
                }
            },
            SourceDescriptor::Session { data, .. } | SourceDescriptor::Inline { data, .. } => {
                Ok(Some(data.clone()))
            }
            SourceDescriptor::Unsupported => {
                tracing::debug!("skipping unsupported source");
                Ok(None)
            }
        }
    }
}

/// One line per record; `None` when there are none.
fn join_records(records: &[Record]) -> Option<String> {
    if records.is_empty() {
        return None;
    }
    Some(
        records
            .iter()
            .map(|r| format!("[{}] {}", r.record_type, r.content))
            .collect::<Vec<_>>()
            .join("\n"),
    )
}

/// Counts per source type, in order of first appearance.
fn count_by_type(chunks: &[FusionChunk]) -> Vec<SourceCount> {
    let mut counts: Vec<SourceCount> = Vec::new();
    for chunk in chunks {
        match counts.iter_mut().find(|c| c.source_type == chunk.source_type) {
            Some(entry) => entry.count += 1,
            None => counts.push(SourceCount {
                source_type: chunk.source_type.clone(),
                count: 1,
            }),
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{NewRecord, RecordType, StoreOptions};

    fn session(data: &str) -> SourceDescriptor {
        SourceDescriptor::Session {
            data: data.into(),
            weight: None,
        }
    }

    #[tokio::test]
    async fn exact_dedupe_collapses_identical_sessions() {
        let result = Fuser::without_store()
            .fuse(&FuseOptions {
                sources: vec![session("Same"), session("Same")],
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(
            result.sources,
            vec![SourceCount {
                source_type: "session".into(),
                count: 1
            }]
        );
        assert_eq!(result.content, "[session] Same");
        assert_eq!(result.original_token_count, 2);
        assert_eq!(result.saved_tokens, 0);
    }

    #[tokio::test]
    async fn higher_weight_comes_first() {
        let result = Fuser::without_store()
            .fuse(&FuseOptions {
                sources: vec![
                    session("low"),
                    SourceDescriptor::Inline {
                        data: "high".into(),
                        weight: Some(2.0),
                    },
                ],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.content, "[inline] high\n\n[session] low");
    }

    #[tokio::test]
    async fn missing_file_and_unknown_sources_are_dropped() {
        let sources: Vec<SourceDescriptor> = serde_json::from_str(
            r#"[
                {"type": "file", "path": "/definitely/not/here.txt"},
                {"type": "telepathy", "data": "?"},
                {"type": "inline", "data": "kept"}
            ]"#,
        )
        .unwrap();
        assert!(matches!(sources[1], SourceDescriptor::Unsupported));

        let result = Fuser::without_store()
            .fuse(&FuseOptions {
                sources,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.content, "[inline] kept");
        assert_eq!(result.sources.len(), 1);
    }

    #[tokio::test]
    async fn file_source_reads_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "from disk").unwrap();

        let result = Fuser::without_store()
            .fuse(&FuseOptions {
                sources: vec![SourceDescriptor::File { path, weight: None }],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.content, "[file] from disk");
    }

    #[tokio::test]
    async fn memory_and_task_sources_pull_from_store() {
        let mut store = MemoryStore::open_in_memory(StoreOptions::project("p")).unwrap();
        store
            .add(NewRecord::new("Cache entries expire after an hour", RecordType::Fact, "t"))
            .unwrap();

        let result = Fuser::new(&store)
            .fuse(&FuseOptions {
                sources: vec![
                    SourceDescriptor::Memory {
                        query: "cache".into(),
                        weight: None,
                    },
                    SourceDescriptor::Task {
                        task: "tune cache expiry".into(),
                        limit: Some(1),
                        weight: None,
                    },
                ],
                dedupe: DedupeStrategy::None,
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(result.sources.len(), 2);
        assert!(result.content.contains("[memory] [fact] Cache entries expire after an hour"));
        assert!(result.content.contains("[task] [fact] Cache entries"));
    }

    #[tokio::test]
    async fn budget_and_savings_stay_in_range() {
        let sources: Vec<SourceDescriptor> = (0..10)
            .map(|i| session(&format!("{i} {}", "lorem ipsum dolor sit amet ".repeat(30))))
            .collect();
        for max_tokens in [50, 300, 1000, 100_000] {
            let result = Fuser::without_store()
                .fuse(&FuseOptions {
                    sources: sources.clone(),
                    max_tokens,
                    ..Default::default()
                })
                .await
                .unwrap();
            assert!(result.token_count <= max_tokens);
            assert!(result.savings_percentage <= 100);
            assert_eq!(
                result.saved_tokens,
                result.original_token_count.saturating_sub(result.token_count)
            );
        }
    }

    #[tokio::test]
    async fn empty_sources_give_empty_output() {
        let result = Fuser::without_store()
            .fuse(&FuseOptions {
                format: OutputFormat::Json,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.content, "[]");
        assert_eq!(result.savings_percentage, 0);
        assert!(result.sources.is_empty());
    }
}
