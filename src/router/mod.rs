//! Task-relevance ranking over the record store.
//!
//! [`Router`] pulls candidates matching any keyword of a task description,
//! topped up with the newest records, optionally embeds the task, and scores
//! each candidate on recency, tag overlap, type priority, keyword density and
//! semantic similarity, plus a small bonus for sharing path segments with the
//! file being edited.

pub mod keywords;
pub mod scoring;

use serde::Serialize;

use crate::embedding::embed_one_with_timeout;
use crate::error::Result;
use crate::memory::{ListFilter, MemoryStore, Record, RecordType, SearchFilter};

pub use keywords::extract_keywords;
pub use scoring::{file_proximity, keyword_density, recency_score, tag_match, type_priority};

/// Candidates returned when the caller does not ask for a specific number.
pub const DEFAULT_ROUTE_LIMIT: usize = 5;

/// How many candidates are fetched per requested result.
const CANDIDATE_FACTOR: usize = 3;

/// Relative importance of each scoring feature.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RouterWeights {
    pub recency: f64,
    pub tag_match: f64,
    pub type_priority: f64,
    pub keyword_density: f64,
    pub semantic: f64,
}

impl Default for RouterWeights {
    fn default() -> Self {
        Self {
            recency: 0.15,
            tag_match: 0.15,
            type_priority: 0.10,
            keyword_density: 0.20,
            semantic: 0.40,
        }
    }
}

impl RouterWeights {
    /// Negative weights become zero and the rest are scaled to sum to 1.
    /// All-zero weights fall back to the defaults.
    pub fn normalized(self) -> Self {
        let w = Self {
            recency: self.recency.max(0.0),
            tag_match: self.tag_match.max(0.0),
            type_priority: self.type_priority.max(0.0),
            keyword_density: self.keyword_density.max(0.0),
            semantic: self.semantic.max(0.0),
        };
        let sum = w.recency + w.tag_match + w.type_priority + w.keyword_density + w.semantic;
        if sum <= f64::EPSILON {
            return Self::default();
        }
        Self {
            recency: w.recency / sum,
            tag_match: w.tag_match / sum,
            type_priority: w.type_priority / sum,
            keyword_density: w.keyword_density / sum,
            semantic: w.semantic / sum,
        }
    }
}

/// Options for a routing call.
#[derive(Debug, Clone)]
pub struct RouteOptions {
    /// File being edited; records from nearby paths get a bonus.
    pub current_file: Option<String>,
    pub tags: Vec<String>,
    pub record_type: Option<RecordType>,
    pub limit: usize,
}

impl Default for RouteOptions {
    fn default() -> Self {
        Self {
            current_file: None,
            tags: Vec::new(),
            record_type: None,
            limit: DEFAULT_ROUTE_LIMIT,
        }
    }
}

/// A record with its relevance score in `[0, 1]` and a human-readable explanation.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub record: Record,
    pub score: f64,
    pub reason: String,
}

/// Ranks store records against a task description.
pub struct Router<'a> {
    store: &'a MemoryStore,
    weights: RouterWeights,
}

impl<'a> Router<'a> {
    pub fn new(store: &'a MemoryStore) -> Self {
        Self::with_weights(store, RouterWeights::default())
    }

    pub fn with_weights(store: &'a MemoryStore, weights: RouterWeights) -> Self {
        Self {
            store,
            weights: weights.normalized(),
        }
    }

    pub fn weights(&self) -> RouterWeights {
        self.weights
    }

    /// The most relevant records for `task`, best first.
    pub async fn route(&self, task: &str, options: &RouteOptions) -> Result<Vec<Record>> {
        Ok(self
            .route_with_scores(task, options)
            .await?
            .into_iter()
            .map(|c| c.record)
            .collect())
    }

    /// Like [`route`](Self::route), keeping each record's score and reason.
    pub async fn route_with_scores(
        &self,
        task: &str,
        options: &RouteOptions,
    ) -> Result<Vec<ScoredCandidate>> {
        if options.limit == 0 {
            return Ok(Vec::new());
        }

        let keywords = extract_keywords(task);
        let fetch = options.limit.saturating_mul(CANDIDATE_FACTOR);
        let mut candidates = self.store.search_any(
            &keywords,
            &SearchFilter {
                record_type: options.record_type,
                limit: Some(fetch),
            },
        )?;
        // keyword hits first, then the newest records up to the candidate budget
        if candidates.len() < fetch {
            let recent = self.store.list(&ListFilter {
                record_type: options.record_type,
                tag: None,
                limit: Some(fetch),
            })?;
            for record in recent {
                if candidates.len() >= fetch {
                    break;
                }
                if !candidates.iter().any(|c| c.id == record.id) {
                    candidates.push(record);
                }
            }
        }
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let query_vector = self.query_embedding(task).await;
        let ctx = scoring::ScoringContext {
            keywords: &keywords,
            tags: &options.tags,
            current_file: options.current_file.as_deref(),
            query_vector: query_vector.as_deref(),
            weights: self.weights,
            now: chrono::Utc::now(),
        };

        let mut scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|record| scoring::score_record(record, &ctx))
            .collect();
        // sort_by is stable, so ties keep retrieval order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(options.limit);

        tracing::debug!(
            keywords = keywords.len(),
            returned = scored.len(),
            semantic = query_vector.is_some(),
            "routed task"
        );
        Ok(scored)
    }

    /// Embed the task if semantic scoring is enabled. Provider failures degrade
    /// to keyword-only scoring.
    async fn query_embedding(&self, task: &str) -> Option<Vec<f32>> {
        if self.weights.semantic <= 0.0 {
            return None;
        }
        let provider = self.store.embedding_provider()?;
        match embed_one_with_timeout(provider.as_ref(), task, self.store.embed_timeout()).await {
            Ok(vector) => Some(vector),
            Err(e) => {
                tracing::warn!(error = %e, "task embedding failed, scoring by keywords only");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{NewRecord, StoreOptions};

    fn scenario_store() -> MemoryStore {
        let mut store = MemoryStore::open_in_memory(StoreOptions::project("p")).unwrap();
        store
            .add(
                NewRecord::new("We use JWT tokens for authentication", RecordType::Decision, "adr/001.md")
                    .with_tags(["auth"]),
            )
            .unwrap();
        store
            .add(
                NewRecord::new("Database uses PostgreSQL", RecordType::Decision, "adr/002.md")
                    .with_tags(["database"]),
            )
            .unwrap();
        store
            .add(
                NewRecord::new("Login endpoint validates email", RecordType::Fact, "src/login.rs")
                    .with_tags(["auth", "validation"]),
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn routes_jwt_task_to_jwt_record() {
        let store = scenario_store();
        let router = Router::new(&store);
        let records = router
            .route(
                "implementing user authentication with JWT",
                &RouteOptions {
                    limit: 2,
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().any(|r| r.content.as_str().contains("JWT")));
        assert!(records[0].content.as_str().contains("JWT"));
    }

    #[tokio::test]
    async fn zero_limit_and_empty_store_yield_nothing() {
        let store = scenario_store();
        let router = Router::new(&store);
        let none = router
            .route("auth", &RouteOptions { limit: 0, ..Default::default() })
            .await
            .unwrap();
        assert!(none.is_empty());

        let empty = MemoryStore::open_in_memory(StoreOptions::project("empty")).unwrap();
        let routed = Router::new(&empty)
            .route("anything at all", &RouteOptions::default())
            .await
            .unwrap();
        assert!(routed.is_empty());
    }

    #[tokio::test]
    async fn scores_are_clamped_and_sorted() {
        let store = scenario_store();
        let scored = Router::new(&store)
            .route_with_scores(
                "authentication",
                &RouteOptions {
                    current_file: Some("adr/001.md".into()),
                    tags: vec!["auth".into()],
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        assert!(!scored.is_empty());
        assert!(scored.iter().all(|c| (0.0..=1.0).contains(&c.score)));
        assert!(scored.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn weights_normalize() {
        let w = RouterWeights {
            recency: 1.0,
            tag_match: 1.0,
            type_priority: 1.0,
            keyword_density: 1.0,
            semantic: -3.0,
        }
        .normalized();
        assert_eq!(w.semantic, 0.0);
        assert!((w.recency - 0.25).abs() < 1e-12);

        let zero = RouterWeights {
            recency: 0.0,
            tag_match: 0.0,
            type_priority: 0.0,
            keyword_density: 0.0,
            semantic: 0.0,
        };
        assert_eq!(zero.normalized(), RouterWeights::default());
    }
}
