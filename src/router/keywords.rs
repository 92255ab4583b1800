use std::collections::HashSet;

/// Words too common to say anything about a task.
const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "with", "this", "that", "from", "into", "onto", "are", "was", "were",
    "will", "would", "should", "could", "have", "has", "had", "not", "but", "you", "your", "our",
    "can", "all", "any", "how", "what", "when", "where", "which", "who", "why", "about", "then",
    "than", "them", "they", "their", "there", "these", "those", "its", "also", "been", "being",
    "does", "did", "just", "some", "such", "only", "more", "most", "other", "over", "very",
    "each", "both", "via", "per", "out", "off", "need", "needs", "want", "make", "let", "get",
];

/// Extract search keywords from a task description.
///
/// Lowercases, replaces everything except alphanumerics, `-` and `_` with
/// spaces, then drops tokens of two characters or fewer and stop words.
/// Duplicates are removed keeping first-seen order.
pub fn extract_keywords(text: &str) -> Vec<String> {
    let normalized: String = text
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { ' ' })
        .collect();

    let mut seen = HashSet::new();
    normalized
        .split_whitespace()
        .filter(|w| w.chars().count() > 2 && !STOP_WORDS.contains(w))
        .filter(|w| seen.insert(*w))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_short_words_and_stop_words() {
        assert_eq!(
            extract_keywords("implementing user authentication with JWT"),
            vec!["implementing", "user", "authentication", "jwt"]
        );
    }

    #[test]
    fn strips_punctuation_but_keeps_dashes_and_underscores() {
        assert_eq!(
            extract_keywords("Fix rate-limit in api_client.rs!"),
            vec!["fix", "rate-limit", "api_client"]
        );
    }

    #[test]
    fn dedupes_preserving_order() {
        assert_eq!(extract_keywords("cache Cache CACHE layer cache"), vec!["cache", "layer"]);
    }

    #[test]
    fn empty_and_noise_inputs() {
        assert!(extract_keywords("").is_empty());
        assert!(extract_keywords("a an to of ?? !!").is_empty());
    }
}
