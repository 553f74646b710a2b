//! Tool registry
//!
//! Holds tools in registration order and isolates callers from tool
//! failures: [`ToolRegistry::execute`] always answers with a JSON value,
//! reporting problems as `{"error": "..."}`.

use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::agent::tool::Tool;
use crate::agent::tools::{CalculatorTool, TimeTool, WeatherTool, WebSearchTool};
use crate::config::WebSearchConfig;
use crate::error::{AideError, Result};

#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
}

impl ToolRegistry {
    /// Create a new, empty tool registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in tools
    pub fn with_builtin_tools(web_search: &WebSearchConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(WeatherTool));
        registry.register(Box::new(CalculatorTool));
        registry.register(Box::new(TimeTool));
        registry.register(Box::new(WebSearchTool::new(web_search.clone())));
        registry
    }

    /// Register a tool; a tool with the same name is replaced in place
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        match self.tools.iter_mut().find(|t| t.name() == tool.name()) {
            Some(slot) => *slot = tool,
            None => self.tools.push(tool),
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.iter().find(|t| t.name() == name).map(|t| &**t)
    }

    /// Like [`get`](Self::get), but an unknown name is a `ToolNotFound` error
    pub fn lookup(&self, name: &str) -> Result<&dyn Tool> {
        self.get(name).ok_or_else(|| AideError::ToolNotFound {
            tool_name: name.to_string(),
        })
    }

    /// Tool names in registration order
    pub fn list_tools(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    /// One line per tool, for prompts
    pub fn descriptions(&self) -> String {
        self.tools
            .iter()
            .map(|tool| {
                let mut line = format!("{}: {}", tool.name(), tool.description());
                let params = tool.parameters();
                if !params.is_empty() {
                    let list: Vec<String> =
                        params.iter().map(|p| format!("{}: {}", p.name, p.kind)).collect();
                    line.push_str(&format!(" | Parameters: {}", list.join(", ")));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn get_tool_info(&self, name: &str) -> Option<Value> {
        let tool = self.get(name)?;
        let parameters: Map<String, Value> = tool
            .parameters()
            .into_iter()
            .map(|p| {
                let schema = serde_json::to_value(&p).unwrap_or(Value::Null);
                (p.name, schema)
            })
            .collect();
        Some(json!({
            "name": tool.name(),
            "description": tool.description(),
            "parameters": parameters
        }))
    }

    /// Execute a tool call with error isolation
    pub async fn execute(&self, name: &str, params: &Map<String, Value>) -> Value {
        let tool = match self.lookup(name) {
            Ok(tool) => tool,
            Err(e) => {
                warn!("{}", e);
                return json!({"error": e.to_string()});
            }
        };

        info!(tool = name, ?params, "Executing tool");
        match tool.execute(params).await {
            Ok(value) => value,
            Err(e) => {
                warn!("Tool {} failed: {}", name, e);
                let message = match e {
                    AideError::InvalidToolArguments { reason, .. } => reason,
                    AideError::ToolExecutionFailed { error, .. } => error,
                    other => format!("Tool execution failed: {}", other),
                };
                json!({"error": message})
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "flaky"
        }

        fn description(&self) -> &str {
            "Always fails"
        }

        async fn execute(&self, _params: &Map<String, Value>) -> Result<Value> {
            Err(AideError::Storage("disk on fire".into()))
        }
    }

    fn registry() -> ToolRegistry {
        ToolRegistry::with_builtin_tools(&WebSearchConfig::default())
    }

    #[test]
    fn test_builtin_order_and_descriptions() {
        let registry = registry();
        assert_eq!(
            registry.list_tools(),
            vec!["get_weather", "calculator", "get_time", "web_search"]
        );

        let descriptions = registry.descriptions();
        let lines: Vec<&str> = descriptions.lines().collect();
        assert_eq!(
            lines[0],
            "get_weather: Get current weather information for a location | Parameters: location: string"
        );
        assert_eq!(lines[2], "get_time: Get current date and time information");
        assert!(lines[3].ends_with("Parameters: query: string, max_results: integer"));
    }

    #[test]
    fn test_tool_info() {
        let info = registry().get_tool_info("web_search").unwrap();
        assert_eq!(info["parameters"]["max_results"]["default"], 3);
        assert!(registry().get_tool_info("nope").is_none());
    }

    #[tokio::test]
    async fn test_execute_reports_errors_as_json() {
        let mut registry = registry();
        registry.register(Box::new(FailingTool));

        let missing = registry.execute("teleport", &Map::new()).await;
        assert_eq!(missing, json!({"error": "Tool 'teleport' not found"}));

        let bad_args = registry.execute("get_weather", &Map::new()).await;
        assert_eq!(bad_args, json!({"error": "Location parameter is required"}));

        let failed = registry.execute("flaky", &Map::new()).await;
        assert_eq!(
            failed,
            json!({"error": "Tool execution failed: storage error: disk on fire"})
        );

        let params = json!({"expression": "2 + 2"});
        let ok = registry.execute("calculator", params.as_object().unwrap()).await;
        assert_eq!(ok["result"], 4);
    }

    #[test]
    fn test_lookup_unknown_tool() {
        let registry = registry();
        assert_eq!(registry.lookup("calculator").unwrap().name(), "calculator");
        match registry.lookup("teleport") {
            Err(AideError::ToolNotFound { tool_name }) => assert_eq!(tool_name, "teleport"),
            other => panic!("expected ToolNotFound, got {:?}", other.map(|t| t.name())),
        }
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = registry();
        registry.register(Box::new(WeatherTool));
        assert_eq!(registry.list_tools().len(), 4);
        assert_eq!(registry.list_tools()[0], "get_weather");
    }
}
