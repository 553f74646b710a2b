//! ReAct reasoning loop
//!
//! The model alternates Thought / Action / Action Input steps. Tool actions
//! are executed through the [`ToolRegistry`] and their results fed back as
//! observations until the model responds or the step budget runs out.

use chrono::Local;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info};

use super::parser::{parse_react_response, value_to_text, RESPOND};
use super::tool_registry::ToolRegistry;
use crate::error::Result;
use crate::llm::{ChatBackend, ChatMessage};
use crate::memory::Exchange;

/// Tools whose output answers a query on its own when the query names them
const DIRECT_ANSWER_TOOLS: [&str; 2] = ["calculator", "get_time"];
/// Exchanges of history shown to the model
const HISTORY_WINDOW: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct ReactContext {
    pub conversation_history: Vec<Exchange>,
}

/// One recorded step of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Thought {
    pub step: usize,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action_input: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observation: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    /// The model chose `respond`
    Response,
    /// A direct-answer tool settled the query
    ToolResponse,
    /// The loop ended without a `respond`
    FinalResponse,
}

impl OutcomeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::Response => "response",
            OutcomeKind::ToolResponse => "tool_response",
            OutcomeKind::FinalResponse => "final_response",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReactOutcome {
    pub kind: OutcomeKind,
    pub content: String,
    pub thought_trace: Vec<Thought>,
    pub steps_taken: usize,
}

pub struct ReActAgent {
    backend: Arc<dyn ChatBackend>,
    tools: Arc<ToolRegistry>,
    max_steps: usize,
    trace: Mutex<Vec<Thought>>,
}

impl ReActAgent {
    pub fn new(backend: Arc<dyn ChatBackend>, tools: Arc<ToolRegistry>, max_steps: usize) -> Self {
        Self {
            backend,
            tools,
            max_steps,
            trace: Mutex::new(Vec::new()),
        }
    }

    /// Reason about `query`, using tools as needed
    pub async fn think(
        &self,
        query: &str,
        context: &ReactContext,
        max_steps: Option<usize>,
    ) -> Result<ReactOutcome> {
        let max_steps = max_steps.unwrap_or(self.max_steps);
        self.trace.lock().clear();

        let mut messages = vec![
            ChatMessage::system(self.build_system_prompt(context)),
            ChatMessage::user(query),
        ];

        for step in 0..max_steps {
            info!("ReAct step {}/{}", step + 1, max_steps);

            let reply = self.backend.chat(&messages, None).await?;
            let parsed = parse_react_response(&reply);
            debug!(
                "ReAct step {}: action={:?} input={:?}",
                step + 1,
                parsed.action,
                parsed.action_input
            );

            let mut thought = Thought {
                step,
                timestamp: Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
                thought: parsed.thought,
                action: parsed.action,
                action_input: parsed.action_input,
                observation: None,
            };

            let Some(action) = thought.action.clone() else {
                self.trace.lock().push(thought);
                break;
            };

            if action == RESPOND {
                let content = match thought.action_input.as_ref().map(value_to_text) {
                    Some(text) if !text.is_empty() => text,
                    _ => {
                        let prompt = format!(
                            "Based on the reasoning process, provide a final answer to: {}",
                            query
                        );
                        self.backend.generate(&prompt, None).await?
                    }
                };
                self.trace.lock().push(thought);
                return Ok(self.outcome(OutcomeKind::Response, content, step + 1));
            }

            let params = match thought.action_input.clone() {
                Some(Value::Object(map)) => map,
                Some(other) => {
                    let mut map = Map::new();
                    map.insert("input".to_string(), other);
                    map
                }
                None => Map::new(),
            };
            let result = self.tools.execute(&action, &params).await;
            let observation = serde_json::to_string_pretty(&result)?;
            messages.push(ChatMessage::assistant(reply));
            messages.push(ChatMessage::system(format!("Observation: {}", observation)));
            thought.observation = Some(result.clone());
            self.trace.lock().push(thought);

            if is_final_answer(&result, query) {
                let content = format_tool_response(&result);
                return Ok(self.outcome(OutcomeKind::ToolResponse, content, step + 1));
            }
        }

        let content = self.backend.chat(&messages, None).await?;
        Ok(self.outcome(OutcomeKind::FinalResponse, content, max_steps))
    }

    fn outcome(&self, kind: OutcomeKind, content: String, steps_taken: usize) -> ReactOutcome {
        info!("ReAct finished: {} after {} steps", kind.as_str(), steps_taken);
        ReactOutcome {
            kind,
            content,
            thought_trace: self.thought_trace(),
            steps_taken,
        }
    }

    /// Trace of the most recent run
    pub fn thought_trace(&self) -> Vec<Thought> {
        self.trace.lock().clone()
    }

    pub fn clear_trace(&self) {
        self.trace.lock().clear();
    }

    fn build_system_prompt(&self, context: &ReactContext) -> String {
        let mut prompt = format!(
            r#"You are a reasoning assistant that uses tools to solve problems. Follow this format exactly:

Thought: Analyze the problem and decide what to do next. Consider what information you need.
Action: Choose one of: {tools} OR respond
Action Input: JSON parameters for the tool OR the final answer if action is respond

Available tools:
{descriptions}

Guidelines:
- Use tools when you need specific information (weather, calculations, time, web search)
- Use 'respond' when you have enough information to answer directly
- Be concise in your thoughts
- If a tool returns an error, try a different approach
- After getting information from tools, synthesize it into a coherent response

Example:
Thought: I need to calculate the total cost first.
Action: calculator
Action Input: {{"expression": "25 * 4 + 10"}}

Thought: Now I have the calculation result, I can provide the total cost.
Action: respond
Action Input: The total cost for 25 items at $4 each plus $10 shipping is $110.

Now, solve the following problem:"#,
            tools = self.tools.list_tools().join(", "),
            descriptions = self.tools.descriptions(),
        );

        let history = &context.conversation_history;
        if !history.is_empty() {
            prompt.push_str("\n\nRecent conversation history:\n");
            for exchange in &history[history.len().saturating_sub(HISTORY_WINDOW)..] {
                prompt.push_str(&format!(
                    "User: {}\nAssistant: {}\n",
                    exchange.message, exchange.response
                ));
            }
        }
        prompt
    }
}

fn is_final_answer(result: &Value, query: &str) -> bool {
    if result.get("error").is_some() {
        return false;
    }
    let query = query.to_lowercase();
    DIRECT_ANSWER_TOOLS.iter().any(|tool| query.contains(tool))
}

fn format_tool_response(result: &Value) -> String {
    let field = |key: &str| result.get(key).map(value_to_text).unwrap_or_default();

    if let Some(error) = result.get("error") {
        format!("Tool error: {}", value_to_text(error))
    } else if let Some(value) = result.get("result") {
        format!("The result is: {}", value_to_text(value))
    } else if let Some(time) = result.get("current_time") {
        format!("The current time is: {}", value_to_text(time))
    } else if result.get("temperature").is_some() {
        format!(
            "Weather in {}: {}, {}",
            field("location"),
            field("temperature"),
            field("conditions")
        )
    } else {
        serde_json::to_string_pretty(result).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebSearchConfig;
    use crate::llm::testing::ScriptedBackend;
    use crate::llm::MessageRole;
    use serde_json::json;

    fn agent(backend: Arc<ScriptedBackend>) -> ReActAgent {
        let tools = Arc::new(ToolRegistry::with_builtin_tools(&WebSearchConfig::default()));
        ReActAgent::new(backend, tools, 3)
    }

    #[tokio::test]
    async fn test_respond_with_input() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            "Thought: I know this.\nAction: respond\nAction Input: Paris is the capital of France.",
        ]));
        let agent = agent(backend.clone());
        let outcome = agent
            .think("What is the capital of France?", &ReactContext::default(), None)
            .await
            .unwrap();

        assert_eq!(outcome.kind, OutcomeKind::Response);
        assert_eq!(outcome.content, "Paris is the capital of France.");
        assert_eq!(outcome.steps_taken, 1);
        assert_eq!(outcome.thought_trace.len(), 1);
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn test_respond_without_input_generates_answer() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            "Thought: done\nAction: respond",
            "Generated final answer",
        ]));
        let outcome = agent(backend.clone())
            .think("hello", &ReactContext::default(), None)
            .await
            .unwrap();
        assert_eq!(outcome.content, "Generated final answer");
        let seen = backend.seen.lock();
        assert!(seen[1][1].content.starts_with("Based on the reasoning process"));
    }

    #[tokio::test]
    async fn test_tool_step_then_response() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            "Thought: need weather\nAction: get_weather\nAction Input: {\"location\": \"Paris\"}",
            "Thought: got it\nAction: respond\nAction Input: It is sunny in Paris.",
        ]));
        let outcome = agent(backend.clone())
            .think("Weather in Paris?", &ReactContext::default(), None)
            .await
            .unwrap();

        assert_eq!(outcome.kind, OutcomeKind::Response);
        assert_eq!(outcome.steps_taken, 2);
        assert_eq!(outcome.thought_trace[0].observation.as_ref().unwrap()["conditions"], "Sunny");

        let seen = backend.seen.lock();
        let observation = seen[1].last().unwrap();
        assert_eq!(observation.role, MessageRole::System);
        assert!(observation.content.starts_with("Observation: {"));
    }

    struct Echo;

    #[async_trait::async_trait]
    impl crate::agent::Tool for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Returns its arguments"
        }

        async fn execute(&self, params: &Map<String, Value>) -> crate::error::Result<Value> {
            Ok(json!({ "received": params }))
        }
    }

    #[tokio::test]
    async fn test_scalar_action_input_is_wrapped() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            "Thought: echo it\nAction: echo\nAction Input: 42",
            "Action: respond\nAction Input: done",
        ]));
        let mut tools = ToolRegistry::new();
        tools.register(Box::new(Echo));
        let agent = ReActAgent::new(backend.clone(), Arc::new(tools), 3);
        let outcome = agent
            .think("repeat after me", &ReactContext::default(), None)
            .await
            .unwrap();

        let step = &outcome.thought_trace[0];
        assert_eq!(step.action_input, Some(json!(42)));
        assert_eq!(step.observation, Some(json!({"received": {"input": 42}})));
        assert_eq!(outcome.content, "done");
    }

    #[tokio::test]
    async fn test_direct_answer_tool_short_circuits() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            "Thought: multiply\nAction: calculator\nAction Input: {\"expression\": \"15 * 7\"}",
        ]));
        let outcome = agent(backend)
            .think("Use the calculator for 15 * 7", &ReactContext::default(), None)
            .await
            .unwrap();
        assert_eq!(outcome.kind, OutcomeKind::ToolResponse);
        assert_eq!(outcome.content, "The result is: 105");
        assert_eq!(outcome.steps_taken, 1);
    }

    #[tokio::test]
    async fn test_no_action_ends_loop_with_final_chat() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            "I am not following the format.",
            "Final synthesized answer",
        ]));
        let outcome = agent(backend.clone())
            .think("anything", &ReactContext::default(), Some(5))
            .await
            .unwrap();
        assert_eq!(outcome.kind, OutcomeKind::FinalResponse);
        assert_eq!(outcome.content, "Final synthesized answer");
        assert_eq!(outcome.steps_taken, 5);
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_step_budget_exhausted() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            "Action: get_time",
            "Action: get_time",
            "Out of steps answer",
        ]));
        let outcome = agent(backend.clone())
            .think("what now", &ReactContext::default(), Some(2))
            .await
            .unwrap();
        assert_eq!(outcome.kind, OutcomeKind::FinalResponse);
        assert_eq!(outcome.thought_trace.len(), 2);
        assert_eq!(backend.calls(), 3);
    }

    #[tokio::test]
    async fn test_history_in_prompt_and_trace_reset() {
        let backend = Arc::new(ScriptedBackend::always(
            "Action: respond\nAction Input: ok",
        ));
        let agent = agent(backend.clone());
        let context = ReactContext {
            conversation_history: (0..5)
                .map(|i| Exchange::new(format!("q{}", i), format!("a{}", i)))
                .collect(),
        };
        agent.think("hi", &context, None).await.unwrap();

        let system = backend.seen.lock()[0][0].content.clone();
        assert!(system.contains("Choose one of: get_weather, calculator, get_time, web_search OR respond"));
        assert!(system.contains("User: q4\nAssistant: a4"));
        assert!(system.contains("User: q2"));
        assert!(!system.contains("User: q1"));

        assert_eq!(agent.thought_trace().len(), 1);
        agent.clear_trace();
        assert!(agent.thought_trace().is_empty());
    }

    #[tokio::test]
    async fn test_llm_failure_propagates() {
        let backend = Arc::new(ScriptedBackend::quota_exhausted());
        assert!(agent(backend)
            .think("hi", &ReactContext::default(), None)
            .await
            .is_err());
    }

    #[test]
    fn test_format_tool_response() {
        assert_eq!(
            format_tool_response(&json!({"location": "Rome", "temperature": "22°C", "conditions": "Sunny"})),
            "Weather in Rome: 22°C, Sunny"
        );
        assert_eq!(
            format_tool_response(&json!({"current_time": "2024-01-01 10:00:00"})),
            "The current time is: 2024-01-01 10:00:00"
        );
        assert_eq!(format_tool_response(&json!({"error": "bad"})), "Tool error: bad");
    }
}
