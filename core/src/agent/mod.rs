//! Answering machinery
//!
//! ```text
//!   query ──► IntelligentRouter ──► tool | rag | react | llm ──► ResponseEvaluator
//!                                     │
//!                          ToolRegistry ◄── ReActAgent
//! ```
//!
//! The [`Pipeline`] drives these pieces for the routed strategy; the
//! ensemble strategy in [`crate::assistant`] uses the tools and candidates
//! directly.

pub mod candidate;
pub mod evaluator;
pub mod parser;
pub mod pipeline;
pub mod react;
pub mod tool;
pub mod tool_registry;
pub mod tools;

pub use candidate::{CandidateResponse, ResponseSource};
pub use evaluator::{Evaluation, IntelligentRouter, ResponseEvaluator, Route, RoutingDecision};
pub use pipeline::{mermaid, AssistantState, Pipeline, Stage};
pub use react::{OutcomeKind, ReActAgent, ReactContext, ReactOutcome, Thought};
pub use tool::{Tool, ToolParameter};
pub use tool_registry::ToolRegistry;
