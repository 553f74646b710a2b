use async_trait::async_trait;
use chrono::Local;
use serde_json::{json, Map, Value};

use crate::agent::tool::Tool;
use crate::error::Result;

pub struct TimeTool;

#[async_trait]
impl Tool for TimeTool {
    fn name(&self) -> &str {
        "get_time"
    }

    fn description(&self) -> &str {
        "Get current date and time information"
    }

    async fn execute(&self, _params: &Map<String, Value>) -> Result<Value> {
        let now = Local::now();
        Ok(json!({
            "current_time": now.format("%Y-%m-%d %H:%M:%S").to_string(),
            "timezone": "local",
            "timestamp": now.timestamp_micros() as f64 / 1_000_000.0,
            "formats": {
                "iso": now.naive_local().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
                "readable": now.format("%A, %B %d, %Y at %I:%M %p").to_string()
            }
        }))
    }
}
