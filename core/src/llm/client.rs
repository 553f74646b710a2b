//! LLM Client implementation
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint (OpenAI,
//! Ollama, LM Studio, OpenRouter, ...).

use super::chat::{ChatMessage, ChatRequest, ChatResponse};
use super::ChatBackend;
use crate::config::LlmSettings;
use crate::error::{AideError, Result};
use async_trait::async_trait;
use rand::Rng;
use reqwest::{Client as HttpClient, StatusCode};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Resolved client configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
    pub max_retries: u32,
    /// First backoff delay; doubled after every retry
    pub retry_base_delay: Duration,
}

impl LlmConfig {
    pub fn from_settings(settings: &LlmSettings) -> Self {
        Self {
            base_url: settings.base_url.clone(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout: Duration::from_secs(settings.timeout_secs),
            max_retries: settings.max_retries,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

/// Main LLM Client
pub struct LlmClient {
    config: LlmConfig,
    http_client: HttpClient,
}

impl LlmClient {
    /// Create a new LLM client
    pub fn new(config: LlmConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(AideError::MissingConfig {
                key: "OPENAI_API_KEY".to_string(),
            });
        }

        let http_client = HttpClient::builder()
            .timeout(config.timeout)
            .user_agent(concat!("aide/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AideError::InvalidConfig {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(LlmClient {
            config,
            http_client,
        })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'))
    }

    async fn send(&self, request: &ChatRequest<'_>) -> Result<String> {
        let response = self
            .http_client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(classify_failure(status, &body));
        }

        let parsed: ChatResponse = serde_json::from_str(&body).map_err(|e| {
            warn!("Failed to parse chat response: {}. Raw body: {}", e, body);
            AideError::Json(e.to_string())
        })?;

        if let Some(usage) = parsed.usage {
            debug!(
                "Chat usage: prompt={} completion={} total={}",
                usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
            );
        }

        parsed.first_content().ok_or_else(|| AideError::ProviderError {
            status: status.as_u16(),
            message: "response contained no choices".to_string(),
        })
    }

    /// Send with jittered exponential backoff on transient failures
    async fn send_with_retry(&self, request: &ChatRequest<'_>) -> Result<String> {
        let mut attempt = 0;
        let mut delay = self.config.retry_base_delay;

        loop {
            match self.send(request).await {
                Ok(content) => return Ok(content),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    attempt += 1;
                    warn!(
                        "LLM request failed ({}), retrying in {:?} (attempt {}/{})",
                        e, delay, attempt, self.config.max_retries
                    );
                    sleep(delay).await;

                    let base_ms = delay.as_millis() as i64;
                    let jitter_ms = rand::thread_rng().gen_range(-(base_ms / 4)..=(base_ms / 4));
                    delay = Duration::from_millis(((base_ms * 2) + jitter_ms).max(0) as u64);
                }
                Err(e) => {
                    warn!("LLM request failed: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

/// Map a non-success HTTP status and body to an error
fn classify_failure(status: StatusCode, body: &str) -> AideError {
    let message = extract_error_message(body);
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => AideError::Unauthorized { message },
        StatusCode::TOO_MANY_REQUESTS if body.contains("insufficient_quota") => {
            AideError::QuotaExceeded { message }
        }
        StatusCode::TOO_MANY_REQUESTS => AideError::RateLimitExceeded { message },
        _ => AideError::ProviderError {
            status: status.as_u16(),
            message,
        },
    }
}

/// Pull `error.message` out of an OpenAI-style error body, else the raw body
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("error")
                .and_then(|e| e.get("message").or(Some(e)))
                .and_then(|m| m.as_str().map(str::to_string))
        })
        .unwrap_or_else(|| body.chars().take(300).collect())
}

#[async_trait]
impl ChatBackend for LlmClient {
    async fn chat(&self, messages: &[ChatMessage], max_tokens: Option<u32>) -> Result<String> {
        info!(
            "Chat request: model={}, messages={}",
            self.config.model,
            messages.len()
        );
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: Some(max_tokens.unwrap_or(self.config.max_tokens)),
            response_format: None,
        };
        self.send_with_retry(&request).await
    }

    async fn chat_formatted(
        &self,
        messages: &[ChatMessage],
        response_format: &serde_json::Value,
    ) -> Result<String> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            temperature: self.config.temperature,
            max_tokens: None,
            response_format: Some(response_format),
        };
        self.send_with_retry(&request).await
    }
}
