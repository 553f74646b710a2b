use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::agent::tool::{required_str, Tool, ToolParameter};
use crate::config::{SearchProvider, WebSearchConfig};
use crate::error::{AideError, Result};

const SERPAPI_URL: &str = "https://serpapi.com/search.json";

/// A tool for searching the web, either canned (mock) or through SerpAPI
pub struct WebSearchTool {
    config: WebSearchConfig,
    client: reqwest::Client,
    endpoint: String,
}

impl WebSearchTool {
    pub fn new(config: WebSearchConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent(concat!("aide/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            config,
            client,
            endpoint: SERPAPI_URL.to_string(),
        }
    }

    #[cfg(test)]
    fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }

    fn mock_results(query: &str, max_results: usize) -> Vec<Value> {
        let mut results = vec![
            json!({
                "title": format!("Result 1 for {}", query),
                "snippet": format!("This is information about {} from the web.", query),
                "url": "https://example.com/1"
            }),
            json!({
                "title": format!("Result 2 for {}", query),
                "snippet": format!("More details about {} found online.", query),
                "url": "https://example.com/2"
            }),
        ];
        results.truncate(max_results);
        results
    }

    async fn call_serpapi(&self, query: &str, max_results: usize) -> Result<Vec<Value>> {
        if self.config.api_key.is_empty() {
            return Err(AideError::MissingConfig {
                key: "web_search.api_key".to_string(),
            });
        }

        let resp: Value = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("api_key", self.config.api_key.as_str())])
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = resp.get("error").and_then(|e| e.as_str()) {
            return Err(AideError::ToolExecutionFailed {
                tool_name: self.name().to_string(),
                error: format!("SerpAPI error: {}", error),
            });
        }

        let results = resp
            .get("organic_results")
            .and_then(|r| r.as_array())
            .map(|organic| {
                organic
                    .iter()
                    .take(max_results)
                    .map(|res| {
                        let field = |key: &str| res.get(key).and_then(|v| v.as_str()).unwrap_or("");
                        json!({
                            "title": field("title"),
                            "snippet": field("snippet"),
                            "url": field("link")
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(results)
    }
}

#[async_trait]
impl Tool for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the web for information"
    }

    fn parameters(&self) -> Vec<ToolParameter> {
        vec![
            ToolParameter::new("query", "string", "Search query"),
            ToolParameter::new("max_results", "integer", "Maximum number of results")
                .with_default(json!(self.config.max_results)),
        ]
    }

    async fn execute(&self, params: &Map<String, Value>) -> Result<Value> {
        let query = required_str(params, "query", self.name())?;
        let max_results = params
            .get("max_results")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .unwrap_or(self.config.max_results);

        debug!("web_search ({:?}): {}", self.config.provider, query);
        let results = match self.config.provider {
            SearchProvider::Mock => Self::mock_results(query, max_results),
            SearchProvider::Serpapi => self.call_serpapi(query, max_results).await?,
        };

        Ok(json!({
            "query": query,
            "results": results,
            "source": "web_search_api"
        }))
    }
}
