//! Configuration management
//!
//! A single TOML file plus environment overrides. `.env` files are honoured
//! for the variables the assistant reads.

pub mod env;
pub mod store;

pub use store::{
    AssistantSettings, Config, LlmSettings, SearchProvider, Strategy, WebSearchConfig,
};

use std::path::PathBuf;

/// Get the configuration directory path
pub fn get_config_dir() -> Option<PathBuf> {
    if let Some(dir) = dirs::config_dir() {
        return Some(dir.join("aide"));
    }

    dirs::home_dir().map(|home| home.join(".config").join("aide"))
}
