use serde::Serialize;
use serde_json::Value;

/// Where a candidate answer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Tool,
    Rag,
    React,
    DirectLlm,
    Fallback,
    Error,
}

impl ResponseSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseSource::Tool => "tool",
            ResponseSource::Rag => "rag",
            ResponseSource::React => "react",
            ResponseSource::DirectLlm => "direct_llm",
            ResponseSource::Fallback => "fallback",
            ResponseSource::Error => "error",
        }
    }
}

impl std::fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One possible answer to a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateResponse {
    pub content: String,
    pub source: ResponseSource,
    pub confidence: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_data: Option<Value>,
}

impl CandidateResponse {
    pub fn new(content: impl Into<String>, source: ResponseSource, confidence: f64) -> Self {
        Self {
            content: content.into(),
            source,
            confidence,
            method: None,
            tool_name: None,
            tool_data: None,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_tool(mut self, name: impl Into<String>, data: Value) -> Self {
        self.tool_name = Some(name.into());
        self.tool_data = Some(data);
        self
    }

    pub fn fallback() -> Self {
        Self::new(
            "I'm currently unable to process your request. Please try again.",
            ResponseSource::Fallback,
            0.1,
        )
    }
}
