//! Configuration Store
//!
//! Handles loading/saving the TOML config file and layering environment
//! overrides on top of it.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::error::{AideError, Result};

/// Unified aide configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// LLM endpoint settings
    #[serde(default)]
    pub llm: LlmSettings,

    /// Assistant behaviour
    #[serde(default)]
    pub assistant: AssistantSettings,

    /// Web search tool
    #[serde(default)]
    pub web_search: WebSearchConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from the default location (or defaults), then apply `.env`
    /// files and environment overrides.
    pub fn load_or_default() -> Self {
        let mut config = Self::default_path()
            .filter(|path| path.exists())
            .and_then(|path| match Self::load(&path) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Ignoring unreadable config {}: {}", path.display(), e);
                    None
                }
            })
            .unwrap_or_default();

        let files = super::env::load_env_files();
        config.apply_env_overrides(super::env::layered_lookup(|key| std::env::var(key).ok(), &files));
        config
    }

    /// Get default config file path
    pub fn default_path() -> Option<PathBuf> {
        super::get_config_dir().map(|d| d.join("config.toml"))
    }

    /// Apply overrides from a variable lookup.
    ///
    /// The lookup is injected so tests never touch the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("OPENAI_API_KEY") {
            self.llm.api_key = v;
        }
        if let Some(v) = lookup("OPENAI_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = lookup("MODEL_NAME") {
            self.llm.model = v;
        }
        override_parsed(&lookup, "TEMPERATURE", &mut self.llm.temperature);
        override_parsed(
            &lookup,
            "MAX_CONVERSATION_HISTORY",
            &mut self.assistant.max_conversation_history,
        );
        if let Some(v) = lookup("DATABASE_PATH") {
            self.assistant.database_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("KNOWLEDGE_BASE_PATH") {
            self.assistant.knowledge_base_path = PathBuf::from(v);
        }
        override_parsed(&lookup, "TOP_K_RETRIEVAL", &mut self.assistant.top_k_retrieval);
        override_parsed(&lookup, "MAX_REACT_STEPS", &mut self.assistant.max_react_steps);
    }

    /// Check that everything needed to talk to the LLM is present
    pub fn validate(&self) -> Result<()> {
        if self.llm.api_key.trim().is_empty() {
            return Err(AideError::MissingConfig {
                key: "OPENAI_API_KEY".to_string(),
            });
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(AideError::InvalidConfig {
                message: format!("temperature {} is outside 0.0..=2.0", self.llm.temperature),
            });
        }
        Ok(())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse::<T>() {
            Ok(v) => *target = v,
            Err(_) => warn!("Ignoring {}={:?}: not a valid value", key, raw),
        }
    }
}

/// LLM (OpenAI-compatible) endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LlmSettings {
    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    /// Model name
    #[serde(default = "default_model")]
    pub model: String,

    /// Temperature (0.0 - 2.0)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Completion token cap
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Retries for transient failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: String::new(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    500
}

fn default_timeout() -> u64 {
    120
}

fn default_max_retries() -> u32 {
    3
}

/// How candidate answers are produced for a query
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Generate every candidate and keep the best-scoring one
    #[default]
    Ensemble,
    /// Route to one branch through the stage pipeline
    Routed,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Ensemble => write!(f, "ensemble"),
            Strategy::Routed => write!(f, "routed"),
        }
    }
}

/// Assistant behaviour settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssistantSettings {
    #[serde(default = "default_history")]
    pub max_conversation_history: usize,

    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    #[serde(default = "default_knowledge_path")]
    pub knowledge_base_path: PathBuf,

    #[serde(default = "default_top_k")]
    pub top_k_retrieval: usize,

    #[serde(default = "default_react_steps")]
    pub max_react_steps: usize,

    #[serde(default = "default_true")]
    pub learning_enabled: bool,

    #[serde(default)]
    pub strategy: Strategy,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            max_conversation_history: default_history(),
            database_path: default_database_path(),
            knowledge_base_path: default_knowledge_path(),
            top_k_retrieval: default_top_k(),
            max_react_steps: default_react_steps(),
            learning_enabled: true,
            strategy: Strategy::default(),
        }
    }
}

fn default_history() -> usize {
    10
}

fn default_database_path() -> PathBuf {
    PathBuf::from("conversations.db")
}

fn default_knowledge_path() -> PathBuf {
    PathBuf::from("./data/knowledge")
}

fn default_top_k() -> usize {
    3
}

fn default_react_steps() -> usize {
    3
}

fn default_true() -> bool {
    true
}

/// Web search backend selection
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum SearchProvider {
    /// Canned offline results
    #[default]
    Mock,
    /// SerpAPI (Google results)
    Serpapi,
}

/// Web search tool configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebSearchConfig {
    #[serde(default)]
    pub provider: SearchProvider,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub api_key: String,

    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

impl Default for WebSearchConfig {
    fn default() -> Self {
        Self {
            provider: SearchProvider::default(),
            api_key: String::new(),
            max_results: default_max_results(),
        }
    }
}

fn default_max_results() -> usize {
    3
}
