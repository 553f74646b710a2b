//! Routed answering as an explicit stage graph
//!
//! ```text
//! extract_memory -> load_context -> route_query -> run_{tool,rag,react,llm}
//!   -> collect -> select -> refine -> store -> end
//! ```
//!
//! `collect` sends an empty branch back through `run_llm` once, so every run
//! reaches `select` with at least one candidate.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::candidate::{CandidateResponse, ResponseSource};
use super::evaluator::Route;
use super::react::ReactContext;
use crate::assistant::{PersonalAssistant, QueryResult};
use crate::error::{AideError, Result};
use crate::memory::Exchange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ExtractMemory,
    LoadContext,
    RouteQuery,
    RunTool,
    RunRag,
    RunReact,
    RunLlm,
    Collect,
    Select,
    Refine,
    Store,
    End,
}

impl Stage {
    pub const ALL: [Stage; 12] = [
        Stage::ExtractMemory,
        Stage::LoadContext,
        Stage::RouteQuery,
        Stage::RunTool,
        Stage::RunRag,
        Stage::RunReact,
        Stage::RunLlm,
        Stage::Collect,
        Stage::Select,
        Stage::Refine,
        Stage::Store,
        Stage::End,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::ExtractMemory => "extract_memory",
            Stage::LoadContext => "load_context",
            Stage::RouteQuery => "route_query",
            Stage::RunTool => "run_tool",
            Stage::RunRag => "run_rag",
            Stage::RunReact => "run_react",
            Stage::RunLlm => "run_llm",
            Stage::Collect => "collect",
            Stage::Select => "select",
            Stage::Refine => "refine",
            Stage::Store => "store",
            Stage::End => "end",
        }
    }

    /// Branch stage taken for a route
    pub fn for_route(route: Route) -> Stage {
        match route {
            Route::Tool => Stage::RunTool,
            Route::Rag => Stage::RunRag,
            Route::React => Stage::RunReact,
            Route::DirectLlm => Stage::RunLlm,
        }
    }

    /// Mermaid node id and shape class
    fn node(&self) -> (char, &'static str) {
        let index = Stage::ALL.iter().position(|s| s == self).unwrap_or(0);
        let id = (b'A' + index as u8) as char;
        let class = match self {
            Stage::ExtractMemory | Stage::LoadContext => "init",
            Stage::RouteQuery | Stage::Select => "decision",
            Stage::RunTool => "tool",
            Stage::RunRag => "rag",
            Stage::RunReact => "react",
            Stage::RunLlm => "llm",
            Stage::Collect => "collect",
            Stage::Refine => "memory",
            Stage::Store | Stage::End => "final",
        };
        (id, class)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything one run knows about the query being answered
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssistantState {
    pub user_id: String,
    pub session_id: String,
    pub query: String,
    pub memories: BTreeMap<String, String>,
    pub history: Vec<Exchange>,
    pub route: Option<Route>,
    pub responses: Vec<CandidateResponse>,
    pub selected: Option<CandidateResponse>,
    pub refined: Option<String>,
    pub result: Option<QueryResult>,
    pub visited: Vec<Stage>,
}

impl AssistantState {
    pub fn new(user_id: &str, session_id: &str, query: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            query: query.to_string(),
            ..Default::default()
        }
    }

    pub fn visited_names(&self) -> Vec<&'static str> {
        self.visited.iter().map(Stage::name).collect()
    }
}

pub struct Pipeline<'a> {
    assistant: &'a PersonalAssistant,
}

impl<'a> Pipeline<'a> {
    pub fn new(assistant: &'a PersonalAssistant) -> Self {
        Self { assistant }
    }

    pub async fn run(&self, mut state: AssistantState) -> Result<AssistantState> {
        let mut stage = Stage::ExtractMemory;
        let mut llm_fallback_used = false;

        loop {
            debug!("Pipeline stage: {}", stage);
            state.visited.push(stage);

            stage = match stage {
                Stage::ExtractMemory => {
                    self.assistant.extract_memory(&state.user_id, &state.query)?;
                    Stage::LoadContext
                }
                Stage::LoadContext => {
                    self.assistant.load_context(&mut state)?;
                    Stage::RouteQuery
                }
                Stage::RouteQuery => {
                    let route = self.assistant.router().route(&state.query);
                    state.route = Some(route);
                    Stage::for_route(route)
                }
                Stage::RunTool => {
                    let candidates = self.assistant.tool_candidates(&state.query, &state.history).await;
                    state.responses.extend(candidates);
                    Stage::Collect
                }
                Stage::RunRag => {
                    let candidate =
                        self.assistant
                            .rag_candidate(&state.query, &state.history, &state.memories);
                    state.responses.extend(candidate);
                    Stage::Collect
                }
                Stage::RunReact => {
                    let context = ReactContext {
                        conversation_history: state.history.clone(),
                    };
                    match self.assistant.react_agent().think(&state.query, &context, None).await {
                        Ok(outcome) => state.responses.push(
                            CandidateResponse::new(outcome.content, ResponseSource::React, 0.85)
                                .with_method(format!("react_{}", outcome.kind.as_str())),
                        ),
                        Err(e) => warn!("ReAct run failed: {}", e),
                    }
                    Stage::Collect
                }
                Stage::RunLlm => {
                    let candidate = self.assistant.direct_llm_candidate(&state.query).await;
                    state.responses.push(candidate);
                    Stage::Collect
                }
                Stage::Collect => {
                    if state.responses.is_empty() && !llm_fallback_used {
                        llm_fallback_used = true;
                        debug!("Routed branch produced nothing, falling back to the LLM");
                        Stage::RunLlm
                    } else {
                        Stage::Select
                    }
                }
                Stage::Select => {
                    let evaluation = self
                        .assistant
                        .evaluator()
                        .evaluate(&state.query, &state.responses);
                    state.selected = Some(evaluation.selected);
                    Stage::Refine
                }
                Stage::Refine => {
                    if let Some(selected) = state.selected.as_mut() {
                        let refined = self
                            .assistant
                            .refine_candidate(selected, &state.query, &state.memories)
                            .await;
                        state.refined = refined;
                    }
                    Stage::Store
                }
                Stage::Store => {
                    let selected = state
                        .selected
                        .clone()
                        .ok_or_else(|| AideError::Storage("no response was selected".to_string()))?;
                    let result = self.assistant.finish(&state, selected)?;
                    state.result = Some(result);
                    Stage::End
                }
                Stage::End => break,
            };
        }

        Ok(state)
    }
}

/// Graph of the routed pipeline as Mermaid `graph TD` text
pub fn mermaid() -> String {
    let n = |stage: Stage| stage.node().0;
    let mut lines = vec!["graph TD".to_string()];

    lines.push(format!(
        "    {}[{}] --> {}[{}]",
        n(Stage::ExtractMemory),
        Stage::ExtractMemory,
        n(Stage::LoadContext),
        Stage::LoadContext
    ));
    lines.push(format!(
        "    {} --> {}{{{}}}",
        n(Stage::LoadContext),
        n(Stage::RouteQuery),
        Stage::RouteQuery
    ));
    lines.push(String::new());

    let routes = [Route::Tool, Route::Rag, Route::React, Route::DirectLlm];
    for route in routes {
        let branch = Stage::for_route(route);
        lines.push(format!(
            "    {} -->|{}| {}[{}]",
            n(Stage::RouteQuery),
            route,
            n(branch),
            branch
        ));
    }
    lines.push(String::new());

    for (i, route) in routes.iter().enumerate() {
        let branch = Stage::for_route(*route);
        if i == 0 {
            lines.push(format!("    {} --> {}[{}]", n(branch), n(Stage::Collect), Stage::Collect));
        } else {
            lines.push(format!("    {} --> {}", n(branch), n(Stage::Collect)));
        }
    }
    lines.push(format!(
        "    {} -.->|empty| {}",
        n(Stage::Collect),
        n(Stage::RunLlm)
    ));
    lines.push(String::new());

    let tail = [Stage::Collect, Stage::Select, Stage::Refine, Stage::Store, Stage::End];
    for pair in tail.windows(2) {
        lines.push(format!("    {} --> {}[{}]", n(pair[0]), n(pair[1]), pair[1]));
    }
    lines.push(String::new());

    let fills: BTreeMap<&str, &str> = [
        ("init", "#e1f5fe"),
        ("decision", "#fff3e0"),
        ("tool", "#f3e5f5"),
        ("rag", "#e8f5e8"),
        ("react", "#fce4ec"),
        ("llm", "#fff3e0"),
        ("collect", "#f1f8e9"),
        ("memory", "#e0f7fa"),
        ("final", "#e8f5e8"),
    ]
    .into_iter()
    .collect();

    for stage in Stage::ALL {
        let (id, class) = stage.node();
        lines.push(format!("    style {} fill:{}", id, fills[class]));
    }
    lines.push(String::new());

    let mut members: BTreeMap<&str, Vec<String>> = BTreeMap::new();
    for stage in Stage::ALL {
        let (id, class) = stage.node();
        members.entry(class).or_default().push(id.to_string());
    }
    for (class, fill) in &fills {
        lines.push(format!("    classDef {} fill:{}", class, fill));
    }
    for (class, ids) in &members {
        lines.push(format!("    class {} {}", ids.join(","), class));
    }

    lines.join("\n")
}
