use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{AideError, Result};

/// One named argument a tool accepts
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolParameter {
    #[serde(skip)]
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ToolParameter {
    pub fn new(name: &str, kind: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            description: description.to_string(),
            default: None,
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// A trait for tools that can be executed by the assistant.
///
/// Tools receive their arguments as a JSON object and answer with a JSON
/// value. Argument problems should be reported as
/// [`AideError::InvalidToolArguments`].
#[async_trait]
pub trait Tool: Send + Sync {
    /// The name of the tool (e.g., "get_weather")
    fn name(&self) -> &str;

    /// A brief description of what the tool does
    fn description(&self) -> &str;

    fn parameters(&self) -> Vec<ToolParameter> {
        Vec::new()
    }

    /// Execute the tool with the provided arguments
    async fn execute(&self, params: &Map<String, Value>) -> Result<Value>;
}

/// Fetch a required, non-empty string argument
pub fn required_str<'a>(
    params: &'a Map<String, Value>,
    key: &str,
    tool_name: &str,
) -> Result<&'a str> {
    params
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AideError::InvalidToolArguments {
            tool_name: tool_name.to_string(),
            reason: format!("{} parameter is required", capitalize(key)),
        })
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required_str() {
        let params = json!({"location": " Paris ", "empty": ""});
        let params = params.as_object().unwrap();
        assert_eq!(required_str(params, "location", "t").unwrap(), "Paris");

        let err = required_str(params, "empty", "t").unwrap_err();
        assert_eq!(err.to_string(), "Empty parameter is required");
        assert!(required_str(params, "missing", "t").is_err());
    }

    #[test]
    fn test_parameter_serialization_omits_name() {
        let param = ToolParameter::new("max_results", "integer", "Maximum number of results")
            .with_default(json!(3));
        assert_eq!(
            serde_json::to_value(&param).unwrap(),
            json!({"type": "integer", "description": "Maximum number of results", "default": 3})
        );
    }
}
