//! Per-record relevance features and their weighted combination.

use chrono::{DateTime, Utc};

use crate::embedding::cosine_similarity;
use crate::memory::{Record, RecordType};
use crate::router::{RouterWeights, ScoredCandidate};

/// Upper bound of the additive file-proximity bonus.
pub const FILE_BONUS_MAX: f64 = 0.1;

/// Everything a single routing call scores candidates against.
pub(crate) struct ScoringContext<'a> {
    pub keywords: &'a [String],
    pub tags: &'a [String],
    pub current_file: Option<&'a str>,
    pub query_vector: Option<&'a [f32]>,
    pub weights: RouterWeights,
    pub now: DateTime<Utc>,
}

/// `max(0.1, 1 - age_in_days / 30)`; 0.5 when the timestamp cannot be parsed.
pub fn recency_score(created_at: &str, now: DateTime<Utc>) -> f64 {
    match DateTime::parse_from_rfc3339(created_at) {
        Ok(ts) => {
            let age_days = (now - ts.with_timezone(&Utc)).num_seconds() as f64 / 86_400.0;
            (1.0 - age_days / 30.0).clamp(0.1, 1.0)
        }
        Err(_) => 0.5,
    }
}

fn recency_bucket(created_at: &str, now: DateTime<Utc>) -> &'static str {
    match DateTime::parse_from_rfc3339(created_at) {
        Ok(ts) => match (now - ts.with_timezone(&Utc)).num_days() {
            d if d < 1 => "today",
            d if d < 7 => "this week",
            d if d < 30 => "this month",
            _ => "older",
        },
        Err(_) => "unknown",
    }
}

/// Fraction of `wanted` tags present on the record (case-insensitive). 1.0 if none wanted.
pub fn tag_match(record_tags: &[String], wanted: &[String]) -> f64 {
    if wanted.is_empty() {
        return 1.0;
    }
    let hits = wanted
        .iter()
        .filter(|w| record_tags.iter().any(|t| t.eq_ignore_ascii_case(w)))
        .count();
    hits as f64 / wanted.len() as f64
}

pub fn type_priority(record_type: RecordType) -> f64 {
    match record_type {
        RecordType::Decision => 1.0,
        RecordType::Fact => 0.8,
        RecordType::Code => 0.7,
        RecordType::Config => 0.6,
        RecordType::Note => 0.5,
    }
}

/// Fraction of `keywords` found as substrings of `content`, case-insensitive.
/// 0.5 when there are no keywords.
pub fn keyword_density(content: &str, keywords: &[String]) -> f64 {
    if keywords.is_empty() {
        return 0.5;
    }
    let haystack = content.to_lowercase();
    let hits = keywords.iter().filter(|k| haystack.contains(k.as_str())).count();
    hits as f64 / keywords.len() as f64
}

fn path_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split(['/', '\\']).filter(|s| !s.is_empty() && *s != ".")
}

/// Additive bonus for path segments shared between a record's source and the
/// file being edited: `min(shared / 3, 1) * 0.1`.
pub fn file_proximity(source: &str, current_file: &str) -> f64 {
    let source_segments: Vec<&str> = path_segments(source).collect();
    let mut counted: Vec<&str> = Vec::new();
    for seg in path_segments(current_file) {
        if source_segments.contains(&seg) && !counted.contains(&seg) {
            counted.push(seg);
        }
    }
    (counted.len() as f64 / 3.0).min(1.0) * FILE_BONUS_MAX
}

/// Score one record. Semantic weight falls back onto keyword density when the
/// query or the record has no comparable vector.
pub(crate) fn score_record(record: Record, ctx: &ScoringContext<'_>) -> ScoredCandidate {
    let content = record.content.as_str();
    let recency = recency_score(&record.created_at, ctx.now);
    let tags = tag_match(&record.tags, ctx.tags);
    let priority = type_priority(record.record_type);
    let density = keyword_density(content, ctx.keywords);

    let semantic = match (ctx.query_vector, record.embedding.as_ref()) {
        (Some(query), Some(embedding)) => cosine_similarity(query, &embedding.vector)
            .ok()
            .map(|cos| (f64::from(cos) + 1.0) / 2.0),
        _ => None,
    };

    let w = ctx.weights;
    let mut score = w.recency * recency + w.tag_match * tags + w.type_priority * priority;
    score += match semantic {
        Some(sim) => w.keyword_density * density + w.semantic * sim,
        None => (w.keyword_density + w.semantic) * density,
    };
    if let Some(file) = ctx.current_file {
        score += file_proximity(&record.source, file);
    }

    let reason = build_reason(&record, ctx, semantic.is_some());
    ScoredCandidate {
        record,
        score: score.clamp(0.0, 1.0),
        reason,
    }
}

fn build_reason(record: &Record, ctx: &ScoringContext<'_>, semantic: bool) -> String {
    let mut parts = vec![format!("type={}", record.record_type)];

    let haystack = record.content.as_str().to_lowercase();
    let matched: Vec<&str> = ctx
        .keywords
        .iter()
        .filter(|k| haystack.contains(k.as_str()))
        .take(3)
        .map(String::as_str)
        .collect();
    if !matched.is_empty() {
        parts.push(format!("keywords={}", matched.join(",")));
    }

    let tags: Vec<&str> = ctx
        .tags
        .iter()
        .filter(|w| record.tags.iter().any(|t| t.eq_ignore_ascii_case(w)))
        .map(String::as_str)
        .collect();
    if !tags.is_empty() {
        parts.push(format!("tags={}", tags.join(",")));
    }

    parts.push(format!("recency={}", recency_bucket(&record.created_at, ctx.now)));
    parts.push(if semantic { "semantic" } else { "keyword-only" }.to_string());
    parts.join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{Content, Embedding};
    use chrono::{Duration, SecondsFormat};

    fn record(record_type: RecordType, content: &str, created_at: String) -> Record {
        Record {
            id: 1,
            project_id: Some("p".into()),
            content: Content::Plaintext(content.into()),
            record_type,
            source: "src/auth/jwt.rs".into(),
            tags: vec!["auth".into()],
            metadata: None,
            embedding: None,
            created_at: created_at.clone(),
            updated_at: created_at,
        }
    }

    fn ts(now: DateTime<Utc>, days_ago: i64) -> String {
        (now - Duration::days(days_ago)).to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    fn ctx<'a>(keywords: &'a [String], weights: RouterWeights, now: DateTime<Utc>) -> ScoringContext<'a> {
        ScoringContext {
            keywords,
            tags: &[],
            current_file: None,
            query_vector: None,
            weights,
            now,
        }
    }

    #[test]
    fn recency_decays_to_floor() {
        let now = Utc::now();
        assert!((recency_score(&ts(now, 0), now) - 1.0).abs() < 1e-3);
        assert!((recency_score(&ts(now, 15), now) - 0.5).abs() < 1e-3);
        assert_eq!(recency_score(&ts(now, 90), now), 0.1);
        assert_eq!(recency_score("yesterday-ish", now), 0.5);
    }

    #[test]
    fn tag_match_fraction() {
        let tags = vec!["Auth".to_string(), "api".to_string()];
        assert_eq!(tag_match(&tags, &[]), 1.0);
        assert_eq!(tag_match(&tags, &["auth".into(), "db".into()]), 0.5);
        assert_eq!(tag_match(&[], &["auth".into()]), 0.0);
    }

    #[test]
    fn type_priority_order() {
        let order: Vec<f64> = [
            RecordType::Decision,
            RecordType::Fact,
            RecordType::Code,
            RecordType::Config,
            RecordType::Note,
        ]
        .into_iter()
        .map(type_priority)
        .collect();
        assert!(order.windows(2).all(|w| w[0] > w[1]));
    }

    #[test]
    fn keyword_density_counts_substrings() {
        let kws = vec!["jwt".to_string(), "auth".to_string(), "redis".to_string(), "token".to_string()];
        assert_eq!(keyword_density("We use JWT tokens for authentication", &kws), 0.75);
        assert_eq!(keyword_density("anything", &[]), 0.5);
    }

    #[test]
    fn file_proximity_caps_at_bonus() {
        assert_eq!(file_proximity("notes.md", "src/main.rs"), 0.0);
        let one = file_proximity("src/auth/jwt.rs", "src/db/pool.rs");
        assert!((one - FILE_BONUS_MAX / 3.0).abs() < 1e-9);
        assert_eq!(file_proximity("src/auth/jwt.rs", "src\\auth\\jwt.rs"), FILE_BONUS_MAX);
        assert_eq!(file_proximity("a/b/c/d/e", "a/b/c/d/e"), FILE_BONUS_MAX);
    }

    #[test]
    fn missing_vectors_shift_weight_to_keywords() {
        let now = Utc::now();
        let kws = vec!["jwt".to_string()];
        let weights = RouterWeights::default();
        let hit = score_record(record(RecordType::Note, "jwt", ts(now, 0)), &ctx(&kws, weights, now));
        let miss = score_record(record(RecordType::Note, "nothing", ts(now, 0)), &ctx(&kws, weights, now));
        // the full keyword + semantic share separates them
        assert!((hit.score - miss.score - (weights.keyword_density + weights.semantic)).abs() < 1e-6);
        assert!(hit.reason.contains("keyword-only"));
    }

    #[test]
    fn semantic_used_when_both_vectors_exist() {
        let now = Utc::now();
        let mut r = record(RecordType::Fact, "x", ts(now, 0));
        r.embedding = Some(Embedding {
            vector: vec![1.0, 0.0],
            model: "m".into(),
        });
        let query = [1.0f32, 0.0];
        let kws: Vec<String> = Vec::new();
        let context = ScoringContext {
            query_vector: Some(&query),
            ..ctx(&kws, RouterWeights::default(), now)
        };
        let scored = score_record(r, &context);
        assert!(scored.reason.ends_with("semantic"));
        assert!(scored.score > 0.0 && scored.score <= 1.0);
    }

    #[test]
    fn type_weight_is_monotonic_for_decisions() {
        let now = Utc::now();
        let created = ts(now, 3);
        let kws = vec!["cache".to_string()];
        let mut last_gap = f64::MIN;
        for w in [0.0, 0.1, 0.3, 0.6, 1.0, 2.0] {
            let weights = RouterWeights {
                type_priority: w,
                ..RouterWeights::default()
            }
            .normalized();
            let decision = score_record(record(RecordType::Decision, "cache layer", created.clone()), &ctx(&kws, weights, now));
            let note = score_record(record(RecordType::Note, "cache layer", created.clone()), &ctx(&kws, weights, now));
            let gap = decision.score - note.score;
            assert!(gap >= 0.0);
            assert!(gap >= last_gap - 1e-12);
            last_gap = gap;
        }
    }

    #[test]
    fn reason_lists_matches() {
        let now = Utc::now();
        let kws = vec!["jwt".to_string(), "auth".to_string()];
        let tags = vec!["AUTH".to_string()];
        let context = ScoringContext {
            tags: &tags,
            ..ctx(&kws, RouterWeights::default(), now)
        };
        let scored = score_record(record(RecordType::Decision, "JWT auth", ts(now, 0)), &context);
        assert_eq!(
            scored.reason,
            "type=decision; keywords=jwt,auth; tags=AUTH; recency=today; keyword-only"
        );
    }
}
