pub mod embeddings;
pub mod search;
pub mod stats;
pub mod store;
pub mod transfer;
pub mod types;

pub use stats::StoreStats;
pub use store::{MemoryStore, StoreOptions, StoreScope};
pub use transfer::ImportSummary;
pub use types::{
    Content, Embedding, ListFilter, Metadata, NewRecord, Record, RecordType, RecordUpdate,
    SearchFilter, SemanticFilter, SemanticMatch,
};
