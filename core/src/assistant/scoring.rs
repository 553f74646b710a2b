//! Heuristics behind the ensemble strategy
//!
//! Deciding which tools a query wants, what arguments to give them, how to
//! phrase their output and how to rank the competing answers.

use regex::Regex;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::agent::{CandidateResponse, ResponseSource};
use crate::memory::Exchange;

/// Phrases that mark an answer as a non-answer
const FAILURE_PHRASES: [&str; 5] = ["error", "unable", "cannot", "don't know", "i don't have"];
const TOOL_QUERY_KEYWORDS: [&str; 6] = ["weather", "calculate", "time", "search", "math", "temperature"];
const CONFIDENCE_KEYWORDS: [&str; 4] = ["calculate", "weather", "time", "search"];
/// Exchanges of history that can make a tool relevant again
const RECENT_EXCHANGES: usize = 2;
const MAX_MEMORY_FACTS: usize = 10;

pub const DEFAULT_WEATHER_LOCATION: &str = "Delhi";

struct ToolTriggers {
    patterns: Vec<Regex>,
    keywords: &'static [&'static str],
}

struct Patterns {
    calculator: ToolTriggers,
    weather: ToolTriggers,
    time: ToolTriggers,
    web_search: ToolTriggers,
    arithmetic: Regex,
    verbal_arithmetic: Vec<(Regex, &'static str)>,
    locations: Vec<Regex>,
    search_subjects: Vec<Regex>,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("static pattern"))
        .collect()
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        calculator: ToolTriggers {
            patterns: compile(&[
                r"\d+\.?\d*\s*[+\-*/]\s*\d+\.?\d*",
                r"calculate",
                r"what is \d+",
                r"\d+ plus \d+",
                r"\d+ minus \d+",
                r"\d+ times \d+",
                r"\d+ divided by \d+",
                r"sum of",
                r"product of",
                r"difference between",
            ]),
            keywords: &["calculate", "math", "add", "subtract", "multiply", "divide", "sum", "product"],
        },
        weather: ToolTriggers {
            patterns: compile(&[
                r"weather(?: in| at| for)?\s+([a-z]+)",
                r"temperature(?: in| at| for)?\s+([a-z]+)",
                r"forecast(?: in| at| for)?\s+([a-z]+)",
                r"how is the weather",
                r"how's the weather",
            ]),
            keywords: &["weather", "temperature", "forecast", "rain", "sunny", "hot", "cold"],
        },
        time: ToolTriggers {
            patterns: compile(&[
                r"what is the time",
                r"what's the time",
                r"current time",
                r"what time is it",
                r"time now",
                r"date and time",
            ]),
            keywords: &["time", "current time", "what time", "clock", "date"],
        },
        web_search: ToolTriggers {
            patterns: compile(&[r"search for", r"find information about", r"look up", r"google"]),
            keywords: &["search", "find", "look up", "information about"],
        },
        arithmetic: Regex::new(r"(\d+\.?\d*)\s*([+\-*/])\s*(\d+\.?\d*)").expect("static pattern"),
        verbal_arithmetic: vec![
            (r"(\d+)\s+plus\s+(\d+)", "+"),
            (r"(\d+)\s+minus\s+(\d+)", "-"),
            (r"(\d+)\s+times\s+(\d+)", "*"),
            (r"(\d+)\s+divided by\s+(\d+)", "/"),
            (r"sum of (\d+) and (\d+)", "+"),
            (r"product of (\d+) and (\d+)", "*"),
            (r"difference between (\d+) and (\d+)", "-"),
        ]
        .into_iter()
        .map(|(p, op)| (Regex::new(p).expect("static pattern"), op))
        .collect(),
        locations: compile(&[
            r"weather(?: in| at| for)?\s+([a-z]+(?:\s+[a-z]+)*)",
            r"temperature(?: in| at| for)?\s+([a-z]+(?:\s+[a-z]+)*)",
            r"forecast(?: in| at| for)?\s+([a-z]+(?:\s+[a-z]+)*)",
            r"in\s+([a-z]+(?:\s+[a-z]+)*)(?:\s+weather|\s+temperature)",
            r"at\s+([a-z]+(?:\s+[a-z]+)*)(?:\s+weather|\s+temperature)",
        ]),
        search_subjects: compile(&[
            r"search for\s+(.+)",
            r"find information about\s+(.+)",
            r"look up\s+(.+)",
            r"google\s+(.+)",
        ]),
    })
}

fn recent_text(history: &[Exchange]) -> String {
    history[history.len().saturating_sub(RECENT_EXCHANGES)..]
        .iter()
        .map(|e| format!("{} {}", e.message, e.response))
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Whether `tool_name` should be tried for a (lowercased) query
pub fn is_tool_relevant(query_lower: &str, tool_name: &str, history: &[Exchange]) -> bool {
    let p = patterns();
    let triggers = match tool_name {
        "calculator" => &p.calculator,
        "get_weather" => &p.weather,
        "get_time" => &p.time,
        "web_search" => &p.web_search,
        _ => return false,
    };

    triggers.patterns.iter().any(|re| re.is_match(query_lower))
        || triggers.keywords.iter().any(|k| query_lower.contains(k))
        || (!history.is_empty() && recent_text(history).contains(tool_name))
}

/// Arguments for a tool, read out of the query text
pub fn extract_tool_params(query: &str, tool_name: &str) -> Map<String, Value> {
    let query_lower = query.to_lowercase();
    let p = patterns();

    let params = match tool_name {
        "calculator" => calculator_expression(&query_lower).map(|e| json!({"expression": e})),
        "get_weather" => {
            let location = p
                .locations
                .iter()
                .filter_map(|re| re.captures(&query_lower))
                .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
                .find(|loc| loc.chars().count() > 1)
                .unwrap_or_else(|| DEFAULT_WEATHER_LOCATION.to_string());
            Some(json!({"location": location}))
        }
        "web_search" => {
            let subject = p
                .search_subjects
                .iter()
                .find_map(|re| re.captures(&query_lower))
                .and_then(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
                .unwrap_or_else(|| query.to_string());
            Some(json!({"query": subject, "max_results": 3}))
        }
        _ => None,
    };

    match params {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

fn calculator_expression(query_lower: &str) -> Option<String> {
    let p = patterns();
    if let Some(c) = p.arithmetic.captures(query_lower) {
        return Some(format!("{} {} {}", &c[1], &c[2], &c[3]));
    }
    p.verbal_arithmetic.iter().find_map(|(re, op)| {
        re.captures(query_lower)
            .map(|c| format!("{} {} {}", &c[1], op, &c[2]))
    })
}

fn text_field(result: &Value, key: &str) -> String {
    match result.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

/// Turn a tool result into an answer sentence
pub fn format_tool_response(result: &Value, tool_name: &str) -> String {
    if result.get("error").is_some() {
        return format!(
            "Sorry, I couldn't process your request: {}",
            text_field(result, "error")
        );
    }

    let formatted = match tool_name {
        "calculator" if result.get("result").is_some() => {
            Some(format!("The result is {}", text_field(result, "result")))
        }
        "get_weather" if result.get("location").is_some() && result.get("temperature").is_some() => {
            Some(format!(
                "Current weather in {}: {}",
                text_field(result, "location"),
                text_field(result, "temperature")
            ))
        }
        "get_time" if result.get("current_time").is_some() => Some(format!(
            "The current time is {}",
            text_field(result, "current_time")
        )),
        "web_search" => result
            .get("results")
            .and_then(Value::as_array)
            .and_then(|results| results.first())
            .map(|first| {
                first
                    .get("snippet")
                    .and_then(Value::as_str)
                    .unwrap_or("No details available")
                    .to_string()
            }),
        _ => None,
    };

    formatted.unwrap_or_else(|| result.to_string())
}

pub fn tool_confidence(result: &Value, query_lower: &str, tool_name: &str) -> f64 {
    match tool_name {
        "calculator" if result.get("result").is_some() && result.get("error").is_none() => {
            return 0.95
        }
        "get_time" => return 0.95,
        "get_weather" if result.get("temperature").is_some() => return 0.90,
        "get_weather" => return 0.80,
        _ => {}
    }

    let mentioned = query_lower.contains(tool_name)
        || CONFIDENCE_KEYWORDS.iter().any(|k| query_lower.contains(k));
    let confidence: f64 = if mentioned { 0.90 } else { 0.85 };
    confidence.min(0.95)
}

fn long_terms(text: &str) -> std::collections::HashSet<String> {
    text.split_whitespace()
        .filter(|w| w.chars().count() > 3)
        .map(str::to_lowercase)
        .collect()
}

/// Points used to pick the ensemble winner (floored at 10)
pub fn response_score(candidate: &CandidateResponse, query: &str) -> f64 {
    let source = candidate.source;
    let content = candidate.content.as_str();

    let mut score = match source {
        ResponseSource::Tool => 90.0,
        ResponseSource::Rag => 70.0,
        ResponseSource::DirectLlm => 65.0,
        ResponseSource::Fallback => 10.0,
        _ => 50.0,
    };

    if !content.is_empty() {
        let words = content.split_whitespace().count() as f64;
        score += if source == ResponseSource::Tool {
            if (5.0..=50.0).contains(&words) {
                20.0
            } else if words < 5.0 {
                10.0
            } else {
                (words * 0.3).min(20.0)
            }
        } else {
            (words * 0.5).min(20.0)
        };
    }

    let lower = content.to_lowercase();
    if FAILURE_PHRASES.iter().any(|p| lower.contains(p)) {
        score -= 40.0;
    }

    let query_terms = long_terms(query);
    if !query_terms.is_empty() {
        let common = query_terms.intersection(&long_terms(content)).count() as f64;
        score += common / query_terms.len() as f64 * 30.0;
    }

    if source == ResponseSource::Tool {
        let query_lower = query.to_lowercase();
        if TOOL_QUERY_KEYWORDS.iter().any(|k| query_lower.contains(k)) {
            score += 25.0;
        }
    }

    if candidate.method.as_deref().is_some_and(|m| m.contains("memory")) {
        score += 15.0;
    }

    score.max(10.0)
}

/// Append memory and recent-history terms to a retrieval query
pub fn enhance_query_with_memory(
    query: &str,
    history: &[Exchange],
    memories: &BTreeMap<String, String>,
) -> String {
    let mut raw_terms: Vec<&str> = memories
        .values()
        .flat_map(|value| value.split_whitespace())
        .filter(|w| w.chars().count() > 3)
        .collect();

    for exchange in &history[history.len().saturating_sub(RECENT_EXCHANGES)..] {
        raw_terms.extend(exchange.message.split_whitespace().take(3));
        raw_terms.extend(exchange.response.split_whitespace().take(3));
    }

    if raw_terms.is_empty() {
        return query.to_string();
    }

    let mut unique: Vec<String> = Vec::new();
    for term in raw_terms {
        if term.chars().count() <= 3 {
            continue;
        }
        let term = term.to_lowercase();
        if !unique.contains(&term) {
            unique.push(term);
        }
    }
    format!("{} {}", query, unique.join(" "))
}

/// `key: value` lines for refinement: values deduplicated, trivial ones
/// dropped, at most ten
pub fn unique_memory_facts(memories: &BTreeMap<String, String>) -> Vec<String> {
    let mut seen: Vec<&str> = Vec::new();
    let mut facts = Vec::new();
    for (key, value) in memories {
        if seen.contains(&value.as_str()) || value.trim().chars().count() <= 2 {
            continue;
        }
        seen.push(value);
        facts.push(format!("{}: {}", key, value));
    }
    facts.truncate(MAX_MEMORY_FACTS);
    facts
}
