//! Conversation history and personal facts

pub mod extraction;
pub mod store;

pub use extraction::{key_bucket, ExtractedFact, FactKind, MemoryExtractor};
pub use store::{Exchange, MemoryStore};
