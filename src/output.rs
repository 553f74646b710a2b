//! Output formatting
//!
//! Everything the CLI prints to stdout goes through here.

use aide_core::agent::{ReactOutcome, ToolRegistry};
use aide_core::assistant::PerformanceMetrics;
use aide_core::memory::Exchange;
use aide_core::rag::{KnowledgeStats, ScoredDocument};
use aide_core::QueryResult;
use console::Style;
use serde_json::Value;
use std::collections::BTreeMap;

const RULE_WIDTH: usize = 50;

pub struct OutputFormatter {
    blue: Style,
    green: Style,
    yellow: Style,
    dim: Style,
    bold: Style,
}

impl Default for OutputFormatter {
    fn default() -> Self {
        Self {
            blue: Style::new().blue(),
            green: Style::new().green(),
            yellow: Style::new().yellow(),
            dim: Style::new().dim(),
            bold: Style::new().bold(),
        }
    }
}

impl OutputFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn print_question(&self, question: &str) {
        println!("{} {}", self.bold.apply_to("Question:"), question);
        println!("{}", self.dim.apply_to("Processing..."));
        println!("{}", "-".repeat(RULE_WIDTH));
    }

    pub fn print_answer(&self, result: &QueryResult) {
        println!("{} {}", self.bold.apply_to("Answer:"), result.response);
        println!(
            "{}",
            self.dim.apply_to(format!(
                "source: {}  confidence: {:.2}  session: {}",
                result.source, result.confidence, result.session_id
            ))
        );
    }

    pub fn print_metrics(&self, metrics: &PerformanceMetrics) {
        println!();
        println!("{}", self.bold.apply_to("Performance metrics:"));
        println!("  total queries: {}", metrics.total_queries);
        for (source, count) in &metrics.sources_used {
            println!("  {}: {}", self.blue.apply_to(source), count);
        }
        println!("  learning opportunities: {}", metrics.learning_opportunities);
        println!("  memory used: {}", metrics.memory_usage_count);
        self.print_knowledge_stats(&metrics.rag_statistics);
    }

    pub fn print_react(&self, outcome: &ReactOutcome) {
        for thought in &outcome.thought_trace {
            println!("{}", self.bold.apply_to(format!("Step {}", thought.step)));
            if let Some(text) = &thought.thought {
                println!("  {} {}", self.yellow.apply_to("Thought:"), text);
            }
            if let Some(action) = &thought.action {
                println!("  {} {}", self.blue.apply_to("Action:"), action);
            }
            if let Some(input) = &thought.action_input {
                println!("  {} {}", self.blue.apply_to("Input:"), compact(input));
            }
            if let Some(observation) = &thought.observation {
                println!("  {} {}", self.green.apply_to("Observation:"), compact(observation));
            }
        }
        println!("{}", "-".repeat(RULE_WIDTH));
        println!(
            "{} {}",
            self.bold.apply_to(format!("Answer ({}):", outcome.kind.as_str())),
            outcome.content
        );
    }

    pub fn print_tools(&self, registry: &ToolRegistry) {
        for name in registry.list_tools() {
            let Some(tool) = registry.get(name) else {
                continue;
            };
            println!("{}: {}", self.green.apply_to(name), tool.description());
            for param in tool.parameters() {
                println!(
                    "    {} ({}) {}",
                    param.name,
                    self.dim.apply_to(&param.kind),
                    param.description
                );
            }
        }
    }

    pub fn print_memories(&self, user: &str, memories: &BTreeMap<String, String>) {
        if memories.is_empty() {
            println!("No memories stored for {}", user);
            return;
        }
        for (key, value) in memories {
            println!("{} {}", self.blue.apply_to(format!("{}:", key)), value);
        }
    }

    pub fn print_history(&self, history: &[Exchange]) {
        if history.is_empty() {
            println!("No conversation history");
            return;
        }
        for exchange in history {
            println!("{} {}", self.yellow.apply_to("You:"), exchange.message);
            println!("{} {}", self.green.apply_to("Aide:"), exchange.response);
        }
    }

    pub fn print_search(&self, hits: &[ScoredDocument]) {
        if hits.is_empty() {
            println!("No matching documents");
            return;
        }
        for hit in hits {
            println!(
                "{} {}",
                self.blue.apply_to(format!("[{:.2}] {}", hit.relevance_score, hit.document.source)),
                hit.document.content
            );
        }
    }

    pub fn print_knowledge_stats(&self, stats: &KnowledgeStats) {
        println!("{}", self.bold.apply_to("Knowledge base:"));
        println!("  documents: {}", stats.total_documents);
        for (source, count) in &stats.sources_distribution {
            println!("    {}: {}", source, count);
        }
        println!("  learned patterns: {}", stats.learned_patterns);
        println!("  last updated: {}", stats.last_updated);
    }

    pub fn print_done(&self, message: &str) {
        println!("{} {}", self.green.apply_to("✓"), message);
    }
}

fn compact(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
