//! `aide graph`: export the routed pipeline diagram

use anyhow::{Context, Result};
use base64::Engine;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

pub const MERMAID_FILE: &str = "assistant_graph.mermaid";
pub const PNG_FILE: &str = "assistant_graph.png";
const MERMAID_INK: &str = "https://mermaid.ink/img/";

/// Write the Mermaid text (and optionally a PNG) into `dir`.
///
/// Returns the files that were written. A failed PNG download is logged and
/// leaves only the Mermaid file.
pub async fn export(dir: &Path, png: bool) -> Result<Vec<PathBuf>> {
    let text = aide_core::agent::mermaid();
    let mermaid_path = dir.join(MERMAID_FILE);
    std::fs::write(&mermaid_path, &text)
        .with_context(|| format!("Failed to write {}", mermaid_path.display()))?;
    let mut written = vec![mermaid_path];

    if png {
        let png_path = dir.join(PNG_FILE);
        match fetch_png(&text).await {
            Ok(bytes) => {
                std::fs::write(&png_path, bytes)
                    .with_context(|| format!("Failed to write {}", png_path.display()))?;
                written.push(png_path);
            }
            Err(e) => warn!("PNG rendering skipped: {:#}", e),
        }
    }
    Ok(written)
}

pub fn render_url(text: &str) -> String {
    let encoded = base64::engine::general_purpose::URL_SAFE.encode(text.as_bytes());
    format!("{}{}", MERMAID_INK, encoded)
}

async fn fetch_png(text: &str) -> Result<Vec<u8>> {
    let url = render_url(text);
    debug!("Fetching {}", url);
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let response = client.get(&url).send().await?.error_for_status()?;
    Ok(response.bytes().await?.to_vec())
}
