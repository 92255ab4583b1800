//! Local-first, per-project context memory for AI coding assistants.
//!
//! ctxmem persists short textual records (facts, decisions, code notes,
//! configuration details and free-form notes), retrieves them by keyword or by
//! meaning, picks the subset most relevant to a task, and merges several
//! context sources into one block that fits a token budget. Content can be
//! encrypted at rest.
//!
//! | Type | Typical use | Router priority |
//! |------|-------------|-----------------|
//! | **decision** | Architectural and process decisions | 1.0 |
//! | **fact** | Facts about the project or environment | 0.8 |
//! | **code** | Notes about specific code | 0.7 |
//! | **config** | Configuration details | 0.6 |
//! | **note** | Anything else | 0.5 |
//!
//! # Architecture
//!
//! - **Storage**: SQLite with an FTS5 keyword index; vectors stored as
//!   little-endian `f32` blobs next to each record
//! - **Isolation**: every operation is scoped to a project id derived from the
//!   repository root, unless the store is opened in global mode
//! - **Embeddings**: local ONNX Runtime with all-MiniLM-L6-v2 (384 dimensions) or
//!   an OpenAI-compatible hosted API; both optional
//! - **Encryption**: AES-256-GCM with PBKDF2-SHA256 derived keys
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`crypto`]: Password-based authenticated encryption of text
//! - [`db`]: SQLite initialization and schema
//! - [`embedding`]: Embedding providers, vector encoding, cosine similarity
//! - [`error`]: Error types
//! - [`fusion`]: Merging context sources under a token budget
//! - [`memory`]: The record store: CRUD, keyword and semantic search, stats
//! - [`project`]: Project root discovery and project ids
//! - [`router`]: Ranking records by relevance to a task

pub mod config;
pub mod crypto;
pub mod db;
pub mod embedding;
pub mod error;
pub mod fusion;
pub mod memory;
pub mod project;
pub mod router;

pub use error::{Error, Result};
