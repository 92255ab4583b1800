//! Core record type definitions.
//!
//! Defines [`RecordType`] (the closed set of memory kinds), [`Content`] (plaintext
//! or undecryptable ciphertext), [`Record`] (a full stored row), and the input
//! shapes for writes and filtered reads.

use serde::{Deserialize, Serialize};

/// String-keyed map of arbitrary JSON values.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// The closed set of record kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    /// A fact about the project or its environment.
    Fact,
    /// An architectural or process decision.
    Decision,
    /// A note about a piece of code.
    Code,
    /// A configuration detail.
    Config,
    /// Anything else worth remembering.
    Note,
}

impl RecordType {
    pub const ALL: [RecordType; 5] = [
        Self::Fact,
        Self::Decision,
        Self::Code,
        Self::Config,
        Self::Note,
    ];

    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fact => "fact",
            Self::Decision => "decision",
            Self::Code => "code",
            Self::Config => "config",
            Self::Note => "note",
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fact" => Ok(Self::Fact),
            "decision" => Ok(Self::Decision),
            "code" => Ok(Self::Code),
            "config" => Ok(Self::Config),
            "note" => Ok(Self::Note),
            _ => Err(format!("unknown record type: {s}")),
        }
    }
}

/// Record content as returned by reads.
///
/// `Encrypted` carries the stored token when it could not be decrypted with the
/// store's password, so callers can tell a decryption failure from real text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "text", rename_all = "snake_case")]
pub enum Content {
    Plaintext(String),
    Encrypted(String),
}

impl Content {
    /// The text as stored: plaintext, or the raw token for undecryptable rows.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Plaintext(s) | Self::Encrypted(s) => s,
        }
    }

    /// The plaintext, if available.
    pub fn plaintext(&self) -> Option<&str> {
        match self {
            Self::Plaintext(s) => Some(s),
            Self::Encrypted(_) => None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        matches!(self, Self::Encrypted(_))
    }
}

impl std::fmt::Display for Content {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored vector together with the model that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub vector: Vec<f32>,
    pub model: String,
}

/// A memory record, matching the `records` table schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    /// Store-local, monotonically assigned id.
    pub id: i64,
    /// Owning project. `None` only for records written in global mode without an override.
    pub project_id: Option<String>,
    pub content: Content,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    /// Provenance: file path, tool name, conversation id.
    pub source: String,
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Embedding>,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
    /// RFC 3339 last-modification timestamp.
    pub updated_at: String,
}

/// Input for [`crate::memory::MemoryStore::add`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecord {
    pub content: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    pub source: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
    /// Explicit project; honoured only in global mode.
    #[serde(default)]
    pub project_id: Option<String>,
}

impl NewRecord {
    pub fn new(content: impl Into<String>, record_type: RecordType, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            record_type,
            source: source.into(),
            tags: Vec::new(),
            metadata: None,
            project_id: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }
}

/// Partial update for [`crate::memory::MemoryStore::update`]. Only `Some` fields change.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordUpdate {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, rename = "type")]
    pub record_type: Option<RecordType>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

impl RecordUpdate {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.record_type.is_none()
            && self.source.is_none()
            && self.tags.is_none()
            && self.metadata.is_none()
    }
}

/// Filter for `list`. All supplied fields must match.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub record_type: Option<RecordType>,
    /// Case-insensitive substring matched against each tag.
    pub tag: Option<String>,
    pub limit: Option<usize>,
}

/// Filter for keyword `search`.
#[derive(Debug, Clone, Default)]
pub struct SearchFilter {
    pub record_type: Option<RecordType>,
    pub limit: Option<usize>,
}

/// Filter for `search_semantic`.
#[derive(Debug, Clone, Default)]
pub struct SemanticFilter {
    pub record_type: Option<RecordType>,
    pub limit: Option<usize>,
    pub min_score: Option<f32>,
}

/// A record paired with its similarity to a semantic query.
#[derive(Debug, Clone, Serialize)]
pub struct SemanticMatch {
    pub record: Record,
    pub similarity: f32,
}
