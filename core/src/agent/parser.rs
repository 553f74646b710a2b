//! ReAct reply parsing
//!
//! Models answer in a loose `Thought: / Action: / Action Input:` layout.
//! Matching is case-insensitive and tolerant of missing sections.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Action name that ends the loop with an answer
pub const RESPOND: &str = "respond";

/// Sections recovered from one model reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedStep {
    pub thought: Option<String>,
    pub action: Option<String>,
    pub action_input: Option<Value>,
}

struct Markers {
    thought: Regex,
    action: Regex,
    action_name: Regex,
    action_input: Regex,
}

fn markers() -> &'static Markers {
    static MARKERS: OnceLock<Markers> = OnceLock::new();
    MARKERS.get_or_init(|| Markers {
        thought: Regex::new(r"(?i)thought:").expect("static pattern"),
        action: Regex::new(r"(?i)action:").expect("static pattern"),
        action_name: Regex::new(r"(?i)action:\s*(\w+)").expect("static pattern"),
        action_input: Regex::new(r"(?i)action input:").expect("static pattern"),
    })
}

/// Text after `start`, up to the next `stop` marker or the end
fn section<'a>(text: &'a str, start: &Regex, stop: &Regex) -> Option<&'a str> {
    let begin = start.find(text)?.end();
    let rest = &text[begin..];
    let end = stop.find(rest).map(|m| m.start()).unwrap_or(rest.len());
    Some(rest[..end].trim())
}

pub fn parse_react_response(response: &str) -> ParsedStep {
    let m = markers();
    let mut parsed = ParsedStep {
        thought: section(response, &m.thought, &m.action).map(str::to_string),
        action: m
            .action_name
            .captures(response)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_lowercase()),
        action_input: None,
    };

    let input = section(response, &m.action_input, &m.thought)
        .filter(|text| !text.is_empty() && !text.eq_ignore_ascii_case("null"));
    if let Some(input) = input {
        parsed.action_input = Some(parse_action_input(input, parsed.action.as_deref()));
    }
    parsed
}

fn parse_action_input(input: &str, action: Option<&str>) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(input) {
        return value;
    }
    if action == Some(RESPOND) {
        return Value::String(input.to_string());
    }
    extract_json_objects(input)
        .first()
        .and_then(|object| serde_json::from_str(object).ok())
        .unwrap_or_else(|| Value::String(input.to_string()))
}

/// Balanced `{...}` spans in `content`, skipping braces inside strings
pub fn extract_json_objects(content: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_string = false;
    let mut escape = false;
    let mut depth: i32 = 0;
    let mut start: Option<usize> = None;

    for (i, ch) in content.char_indices() {
        if in_string {
            if escape {
                escape = false;
                continue;
            }
            match ch {
                '\\' => escape = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        out.push(&content[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    out
}

/// Render an action input as plain text
pub fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_step() {
        let parsed = parse_react_response(
            "Thought: I need to multiply.\nAction: Calculator\nAction Input: {\"expression\": \"15 * 7\"}",
        );
        assert_eq!(parsed.thought.as_deref(), Some("I need to multiply."));
        assert_eq!(parsed.action.as_deref(), Some("calculator"));
        assert_eq!(parsed.action_input, Some(json!({"expression": "15 * 7"})));
    }

    #[test]
    fn test_respond_keeps_raw_text() {
        let parsed = parse_react_response(
            "thought: done\naction: respond\naction input: The answer is {roughly} 42.",
        );
        assert_eq!(parsed.action.as_deref(), Some(RESPOND));
        assert_eq!(
            parsed.action_input,
            Some(json!("The answer is {roughly} 42."))
        );
    }

    #[test]
    fn test_embedded_json_is_recovered() {
        let parsed = parse_react_response(
            "Action: get_weather\nAction Input: use {\"location\": \"Oslo\"} please",
        );
        assert_eq!(parsed.action_input, Some(json!({"location": "Oslo"})));
    }

    #[test]
    fn test_unparseable_input_stays_text() {
        let parsed = parse_react_response("Action: web_search\nAction Input: rust async {oops");
        assert_eq!(parsed.action_input, Some(json!("rust async {oops")));
    }

    #[test]
    fn test_null_and_missing_input() {
        let parsed = parse_react_response("Thought: hmm\nAction: respond\nAction Input: null");
        assert_eq!(parsed.action_input, None);

        let parsed = parse_react_response("Just some prose without structure.");
        assert_eq!(parsed, ParsedStep::default());
    }

    #[test]
    fn test_input_stops_at_next_thought() {
        let parsed = parse_react_response(
            "Action: calculator\nAction Input: {\"expression\": \"1+1\"}\nThought: next",
        );
        assert_eq!(parsed.action_input, Some(json!({"expression": "1+1"})));
    }

    #[test]
    fn test_extract_json_objects_skips_string_braces() {
        let objects = extract_json_objects(r#"a {"k": "}"} b {"n": {"m": 1}}"#);
        assert_eq!(objects, vec![r#"{"k": "}"}"#, r#"{"n": {"m": 1}}"#]);
    }
}
