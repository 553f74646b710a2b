//! LLM access
//!
//! [`ChatBackend`] is the seam the rest of the crate talks to; [`LlmClient`]
//! is the OpenAI-compatible HTTP implementation.

pub mod chat;
pub mod client;

pub use chat::{ChatMessage, MessageRole};
pub use client::{LlmClient, LlmConfig};

use crate::error::{AideError, Result};
use async_trait::async_trait;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";
pub const STRUCTURED_SYSTEM_PROMPT: &str =
    "You are a helpful assistant that outputs structured data.";
pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// Anything that can answer a chat conversation
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Run a chat completion and return the assistant's text
    async fn chat(&self, messages: &[ChatMessage], max_tokens: Option<u32>) -> Result<String>;

    /// Chat with a provider-side `response_format` constraint.
    ///
    /// Backends that cannot enforce a format fall back to a plain chat.
    async fn chat_formatted(
        &self,
        messages: &[ChatMessage],
        _response_format: &serde_json::Value,
    ) -> Result<String> {
        self.chat(messages, None).await
    }

    /// Single prompt with an optional system message
    async fn generate(&self, prompt: &str, system: Option<&str>) -> Result<String> {
        let messages = vec![
            ChatMessage::system(system.unwrap_or(DEFAULT_SYSTEM_PROMPT)),
            ChatMessage::user(prompt),
        ];
        self.chat(&messages, Some(DEFAULT_MAX_TOKENS)).await
    }

    /// Prompt for JSON output and parse it
    async fn generate_structured(
        &self,
        prompt: &str,
        response_format: &serde_json::Value,
    ) -> Result<serde_json::Value> {
        let messages = vec![
            ChatMessage::system(STRUCTURED_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        let raw = self.chat_formatted(&messages, response_format).await?;
        serde_json::from_str(raw.trim()).map_err(|e| AideError::Json(e.to_string()))
    }
}
