//! Rendering and budget-constrained assembly of fused output.

use serde::{Deserialize, Serialize};

use super::FusionChunk;

/// Shortest tail fragment worth appending when a chunk does not fit whole.
pub const MIN_FRAGMENT_CHARS: usize = 100;

const ELLIPSIS: &str = "...";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// `[type] content` blocks separated by blank lines.
    #[default]
    Text,
    /// `### TYPE (weight: w)` sections separated by rules.
    Markdown,
    /// An array of `{type, content, weight}` objects.
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "markdown" | "md" => Ok(Self::Markdown),
            "json" => Ok(Self::Json),
            _ => Err(format!("unknown output format: {s}. Supported: text, markdown, json")),
        }
    }
}

/// Approximate token count: one token per four characters, rounded up.
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

pub fn render(chunks: &[FusionChunk], format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => chunks
            .iter()
            .map(|c| format!("[{}] {}", c.source_type, c.content))
            .collect::<Vec<_>>()
            .join("\n\n"),
        OutputFormat::Markdown => chunks
            .iter()
            .map(|c| {
                format!(
                    "### {} (weight: {})\n\n{}",
                    c.source_type.to_uppercase(),
                    c.weight,
                    c.content
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n---\n\n"),
        OutputFormat::Json => serde_json::Value::Array(
            chunks
                .iter()
                .map(|c| {
                    serde_json::json!({
                        "type": c.source_type,
                        "content": c.content,
                        "weight": c.weight,
                    })
                })
                .collect(),
        )
        .to_string(),
    }
}

/// Greedily add chunks in order while the rendered output stays within
/// `max_tokens`. The first chunk that does not fit is cut to the longest
/// prefix that does (plus an ellipsis) if that prefix is at least
/// [`MIN_FRAGMENT_CHARS`] long; nothing after it is considered.
pub fn assemble(chunks: &[FusionChunk], max_tokens: usize, format: OutputFormat) -> String {
    let mut included: Vec<FusionChunk> = Vec::new();

    for chunk in chunks {
        included.push(chunk.clone());
        if estimate_tokens(&render(&included, format)) <= max_tokens {
            continue;
        }
        included.pop();
        if let Some(fragment) = fit_fragment(&included, chunk, max_tokens, format) {
            included.push(fragment);
        }
        break;
    }

    render(&included, format)
}

/// Longest prefix of `chunk` that still fits after `included`.
fn fit_fragment(
    included: &[FusionChunk],
    chunk: &FusionChunk,
    max_tokens: usize,
    format: OutputFormat,
) -> Option<FusionChunk> {
    let chars: Vec<char> = chunk.content.chars().collect();
    let mut candidate: Vec<FusionChunk> = included.to_vec();
    candidate.push(FusionChunk {
        content: String::new(),
        ..chunk.clone()
    });

    let mut fits = |n: usize| -> bool {
        let mut text: String = chars[..n].iter().collect();
        text.push_str(ELLIPSIS);
        if let Some(last) = candidate.last_mut() {
            last.content = text;
        }
        estimate_tokens(&render(&candidate, format)) <= max_tokens
    };

    // largest n in [0, len) that fits; fits() is monotone in n
    let (mut lo, mut hi) = (0usize, chars.len());
    while lo < hi {
        let mid = lo + (hi - lo + 1) / 2;
        if fits(mid) {
            lo = mid;
        } else {
            hi = mid - 1;
        }
    }

    if lo < MIN_FRAGMENT_CHARS || !fits(lo) {
        return None;
    }
    let mut content: String = chars[..lo].iter().collect();
    content.push_str(ELLIPSIS);
    Some(FusionChunk {
        content,
        ..chunk.clone()
    })
}
