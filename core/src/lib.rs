pub mod agent;
pub mod assistant;
pub mod config;
pub mod error;
pub mod llm;
pub mod memory;
pub mod rag;

// Re-exports for convenience
pub use assistant::{PersonalAssistant, QueryResult};
pub use config::Config;
pub use error::{AideError, Result};
pub use llm::{ChatBackend, LlmClient};
pub use memory::MemoryStore;
pub use rag::KnowledgeBase;
