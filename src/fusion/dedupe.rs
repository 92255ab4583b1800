use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::FusionChunk;

/// Word-set overlap above which two chunks count as duplicates.
pub const SEMANTIC_DUPLICATE_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DedupeStrategy {
    /// Drop chunks whose trimmed, lowercased content was already seen.
    #[default]
    Exact,
    /// Drop chunks whose word-set Jaccard similarity to a kept chunk exceeds 0.8.
    Semantic,
    /// Keep everything.
    None,
}

impl std::str::FromStr for DedupeStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(Self::Exact),
            "semantic" => Ok(Self::Semantic),
            "none" => Ok(Self::None),
            _ => Err(format!("unknown dedupe strategy: {s}. Supported: exact, semantic, none")),
        }
    }
}

/// Remove duplicates; the first occurrence wins.
pub fn dedupe(chunks: Vec<FusionChunk>, strategy: DedupeStrategy) -> Vec<FusionChunk> {
    match strategy {
        DedupeStrategy::None => chunks,
        DedupeStrategy::Exact => {
            let mut seen = HashSet::new();
            chunks
                .into_iter()
                .filter(|c| seen.insert(c.content.trim().to_lowercase()))
                .collect()
        }
        DedupeStrategy::Semantic => {
            let mut kept: Vec<(FusionChunk, HashSet<String>)> = Vec::new();
            for chunk in chunks {
                let words = word_set(&chunk.content);
                let duplicate = kept
                    .iter()
                    .any(|(_, existing)| jaccard(&words, existing) > SEMANTIC_DUPLICATE_THRESHOLD);
                if !duplicate {
                    kept.push((chunk, words));
                }
            }
            kept.into_iter().map(|(chunk, _)| chunk).collect()
        }
    }
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// |A ∩ B| / |A ∪ B|, with two empty sets counting as identical.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}
