//! Response evaluation and query routing
//!
//! [`ResponseEvaluator`] scores candidate answers on relevance,
//! completeness, coherence and source reliability. [`IntelligentRouter`]
//! picks the strategy a query should be answered with. Both keep a bounded
//! history of their decisions.

use chrono::Local;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::sync::OnceLock;
use tracing::{debug, info};

use super::candidate::{CandidateResponse, ResponseSource};

const HISTORY_LIMIT: usize = 100;

const RELEVANCE_WEIGHT: f64 = 0.35;
const COMPLETENESS_WEIGHT: f64 = 0.25;
const COHERENCE_WEIGHT: f64 = 0.20;
const SOURCE_WEIGHT: f64 = 0.20;

const INCOMPLETENESS_PHRASES: [&str; 5] = [
    "i don't know",
    "i'm not sure",
    "i can't answer",
    "no information",
    "don't have enough",
];
const TRANSITION_WORDS: [&str; 5] = [
    "however",
    "therefore",
    "additionally",
    "furthermore",
    "consequently",
];

fn now_iso() -> String {
    Local::now().naive_local().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn push_bounded<T>(history: &mut VecDeque<T>, entry: T) {
    history.push_back(entry);
    while history.len() > HISTORY_LIMIT {
        history.pop_front();
    }
}

fn last_n<T: Clone>(history: &VecDeque<T>, limit: usize) -> Vec<T> {
    history
        .iter()
        .skip(history.len().saturating_sub(limit))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub relevance_score: f64,
    pub completeness_score: f64,
    pub coherence_score: f64,
    pub source_score: f64,
    pub composite_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub index: usize,
    pub candidate: CandidateResponse,
    pub scores: ScoreBreakdown,
}

#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub selected: CandidateResponse,
    pub all_scores: Vec<ScoredCandidate>,
    pub reason: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRecord {
    pub query: String,
    pub evaluation: Evaluation,
}

#[derive(Default)]
pub struct ResponseEvaluator {
    history: Mutex<VecDeque<EvaluationRecord>>,
}

impl ResponseEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pick the best candidate; ties go to the earliest one
    pub fn evaluate(&self, query: &str, responses: &[CandidateResponse]) -> Evaluation {
        if responses.is_empty() {
            return Evaluation {
                selected: CandidateResponse::new(
                    "No responses were generated.",
                    ResponseSource::Error,
                    0.0,
                ),
                all_scores: Vec::new(),
                reason: "no_responses".to_string(),
                timestamp: now_iso(),
            };
        }

        let all_scores: Vec<ScoredCandidate> = responses
            .iter()
            .enumerate()
            .map(|(index, candidate)| ScoredCandidate {
                index,
                candidate: candidate.clone(),
                scores: score_candidate(query, candidate),
            })
            .collect();

        let mut best = &all_scores[0];
        for scored in &all_scores[1..] {
            if scored.scores.composite_score > best.scores.composite_score {
                best = scored;
            }
        }

        let evaluation = Evaluation {
            selected: best.candidate.clone(),
            reason: format!("Highest composite score: {:.3}", best.scores.composite_score),
            timestamp: now_iso(),
            all_scores: all_scores.clone(),
        };
        debug!(
            "Selected {} response ({})",
            evaluation.selected.source, evaluation.reason
        );

        push_bounded(
            &mut self.history.lock(),
            EvaluationRecord {
                query: query.to_string(),
                evaluation: evaluation.clone(),
            },
        );
        evaluation
    }

    pub fn history(&self, limit: usize) -> Vec<EvaluationRecord> {
        last_n(&self.history.lock(), limit)
    }
}

fn score_candidate(query: &str, candidate: &CandidateResponse) -> ScoreBreakdown {
    let content = candidate.content.as_str();
    let relevance_score = relevance_score(query, content);
    let completeness_score = completeness_score(content);
    let coherence_score = coherence_score(content);
    let source_score = source_score(candidate.source);

    let composite = (relevance_score * RELEVANCE_WEIGHT
        + completeness_score * COMPLETENESS_WEIGHT
        + coherence_score * COHERENCE_WEIGHT
        + source_score * SOURCE_WEIGHT)
        * candidate.confidence;

    ScoreBreakdown {
        relevance_score,
        completeness_score,
        coherence_score,
        source_score,
        composite_score: composite.min(1.0),
    }
}

fn long_terms(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .filter(|term| term.chars().count() > 3)
        .map(str::to_lowercase)
        .collect()
}

fn relevance_score(query: &str, response: &str) -> f64 {
    if query.is_empty() || response.is_empty() {
        return 0.0;
    }

    let query_terms = long_terms(query);
    if query_terms.is_empty() {
        return 0.5;
    }
    let response_terms = long_terms(response);
    let overlap = query_terms.intersection(&response_terms).count() as f64 / query_terms.len() as f64;

    let query_words = query.split_whitespace().count();
    let response_words = response.split_whitespace().count();
    let length_score = if query_words <= 5 {
        match response_words {
            n if n < 5 => 0.3,
            n if n > 100 => 0.7,
            _ => 1.0,
        }
    } else {
        match response_words {
            n if n < 10 => 0.2,
            n if n > 200 => 0.8,
            _ => 1.0,
        }
    };

    overlap * 0.7 + length_score * 0.3
}

fn sentence_splitter() -> &'static Regex {
    static SPLITTER: OnceLock<Regex> = OnceLock::new();
    SPLITTER.get_or_init(|| Regex::new(r"[.!?]+").expect("static pattern"))
}

fn completeness_score(response: &str) -> f64 {
    if response.is_empty() {
        return 0.0;
    }

    let word_count = response.split_whitespace().count() as f64;
    let sentence_count = sentence_splitter().split(response).count() as f64;
    let base = (word_count / 50.0).min(1.0) * 0.6 + (sentence_count / 3.0).min(1.0) * 0.4;

    let lower = response.to_lowercase();
    if INCOMPLETENESS_PHRASES.iter().any(|p| lower.contains(p)) {
        base * 0.5
    } else {
        base
    }
}

fn coherence_score(response: &str) -> f64 {
    if response.is_empty() {
        return 0.0;
    }

    let sentences: Vec<&str> = sentence_splitter().split(response).collect();
    let total_words: usize = sentences.iter().map(|s| s.split_whitespace().count()).sum();
    let average = total_words as f64 / sentences.len().max(1) as f64;

    let structure = if (8.0..=20.0).contains(&average) {
        1.0
    } else if (5.0..=25.0).contains(&average) {
        0.8
    } else {
        0.5
    };

    let lower = response.to_lowercase();
    let transitions = TRANSITION_WORDS.iter().filter(|w| lower.contains(*w)).count() as f64;

    structure * 0.7 + (transitions / 3.0).min(1.0) * 0.3
}

fn source_score(source: ResponseSource) -> f64 {
    match source {
        ResponseSource::Tool => 0.9,
        ResponseSource::Rag => 0.8,
        ResponseSource::React => 0.85,
        ResponseSource::DirectLlm => 0.7,
        ResponseSource::Fallback => 0.3,
        ResponseSource::Error => 0.1,
    }
}

/// Strategy a query is answered with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Tool,
    Rag,
    React,
    DirectLlm,
}

impl Route {
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::Tool => "tool",
            Route::Rag => "rag",
            Route::React => "react",
            Route::DirectLlm => "direct_llm",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteCandidate {
    pub route: Route,
    pub confidence: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RoutingDecision {
    pub query: String,
    pub selected_route: Route,
    pub confidence: f64,
    pub reason: String,
    pub all_routes: Vec<RouteCandidate>,
    pub timestamp: String,
}

const TOOL_KEYWORDS: [(&str, &[&str]); 4] = [
    ("weather", &["weather", "temperature", "forecast"]),
    (
        "calculator",
        &["calculate", "math", "equation", "times", "plus", "minus"],
    ),
    ("time", &["time", "current time", "what time", "date"]),
    (
        "web_search",
        &["search for", "find information about", "look up"],
    ),
];

const KNOWLEDGE_PHRASES: [&str; 9] = [
    "what is",
    "who is",
    "explain",
    "tell me about",
    "define",
    "capital of",
    "founder of",
    "invented by",
    "located in",
];

const COMPLEXITY_WORDS: [&str; 3] = ["complex", "multiple", "various"];

#[derive(Default)]
pub struct IntelligentRouter {
    history: Mutex<VecDeque<RoutingDecision>>,
}

impl IntelligentRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(&self, query: &str) -> Route {
        self.decide(query).selected_route
    }

    /// Route a query and return the full decision
    pub fn decide(&self, query: &str) -> RoutingDecision {
        let query_lower = query.to_lowercase();
        let mut routes = Vec::new();

        if let Some((tool, _)) = TOOL_KEYWORDS
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| query_lower.contains(k)))
        {
            routes.push(RouteCandidate {
                route: Route::Tool,
                confidence: 0.8,
                reason: format!("Detected tool: {}", tool),
            });
        }

        if KNOWLEDGE_PHRASES.iter().any(|k| query_lower.contains(k)) {
            routes.push(RouteCandidate {
                route: Route::Rag,
                confidence: 0.7,
                reason: "Knowledge-based query".to_string(),
            });
        }

        let before_question = query.split('?').next().unwrap_or("");
        let indicators = [
            query.split_whitespace().count() > 10,
            query_lower.contains("and") && query_lower.contains("or"),
            COMPLEXITY_WORDS.iter().any(|w| query_lower.contains(w)),
            query.contains('?') && before_question.contains(' '),
        ];
        let react_confidence =
            indicators.iter().filter(|held| **held).count() as f64 / indicators.len() as f64;
        if react_confidence > 0.5 {
            routes.push(RouteCandidate {
                route: Route::React,
                confidence: react_confidence,
                reason: "Complex query requiring reasoning".to_string(),
            });
        }

        routes.push(RouteCandidate {
            route: Route::DirectLlm,
            confidence: 0.6,
            reason: "General query".to_string(),
        });

        let mut best = &routes[0];
        for candidate in &routes[1..] {
            if candidate.confidence > best.confidence {
                best = candidate;
            }
        }

        let decision = RoutingDecision {
            query: query.to_string(),
            selected_route: best.route,
            confidence: best.confidence,
            reason: best.reason.clone(),
            all_routes: routes.clone(),
            timestamp: now_iso(),
        };
        info!(
            "Routed query to {} ({:.2}): {}",
            decision.selected_route, decision.confidence, decision.reason
        );
        push_bounded(&mut self.history.lock(), decision.clone());
        decision
    }

    pub fn history(&self, limit: usize) -> Vec<RoutingDecision> {
        last_n(&self.history.lock(), limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(content: &str, source: ResponseSource, confidence: f64) -> CandidateResponse {
        CandidateResponse::new(content, source, confidence)
    }

    #[test]
    fn test_no_responses_falls_back() {
        let evaluation = ResponseEvaluator::new().evaluate("anything", &[]);
        assert_eq!(evaluation.reason, "no_responses");
        assert_eq!(evaluation.selected.source, ResponseSource::Error);
        assert_eq!(evaluation.selected.confidence, 0.0);
    }

    #[test]
    fn test_relevance_components() {
        // no long words in the query
        assert_eq!(relevance_score("is it", "whatever"), 0.5);
        // full overlap, short query, 4-word reply -> 0.7 + 0.3 * 0.3
        let score = relevance_score("capital France", "capital france is paris");
        assert!((score - 0.79).abs() < 1e-9);
        assert_eq!(relevance_score("", "x"), 0.0);
    }

    #[test]
    fn test_completeness_penalty() {
        let text = "I don't know. Sorry.";
        // 4 words, 3 pieces ("I don't know", " Sorry", "")
        let expected = ((4.0 / 50.0) * 0.6 + 0.4) * 0.5;
        assert!((completeness_score(text) - expected).abs() < 1e-9);
    }

    #[test]
    fn test_coherence_transitions() {
        let text = "The first idea holds true for most common cases here. However the second one needs care, therefore we check it.";
        let score = coherence_score(text);
        // average words per piece is 20 / 3 -> 0.8 structure, two transitions
        let expected = 0.8 * 0.7 + (2.0 / 3.0) * 0.3;
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_source_reliability_and_confidence_decide() {
        let evaluator = ResponseEvaluator::new();
        let responses = vec![
            candidate("The result is 105", ResponseSource::DirectLlm, 0.7),
            candidate("The result is 105", ResponseSource::Tool, 0.95),
        ];
        let evaluation = evaluator.evaluate("what is 15 times 7", &responses);
        assert_eq!(evaluation.selected.source, ResponseSource::Tool);
        assert_eq!(evaluation.all_scores.len(), 2);
        assert!(evaluation.reason.starts_with("Highest composite score: "));
    }

    #[test]
    fn test_tie_keeps_first() {
        let evaluator = ResponseEvaluator::new();
        let responses = vec![
            candidate("same words here", ResponseSource::Rag, 0.5).with_method("a"),
            candidate("same words here", ResponseSource::Rag, 0.5).with_method("b"),
        ];
        let evaluation = evaluator.evaluate("words", &responses);
        assert_eq!(evaluation.selected.method.as_deref(), Some("a"));
    }

    #[test]
    fn test_evaluation_history_is_bounded() {
        let evaluator = ResponseEvaluator::new();
        let responses = vec![candidate("ok", ResponseSource::Rag, 0.5)];
        for i in 0..105 {
            evaluator.evaluate(&format!("q{}", i), &responses);
        }
        assert_eq!(evaluator.history(1000).len(), HISTORY_LIMIT);
        let last = evaluator.history(2);
        assert_eq!(last[0].query, "q103");
        assert_eq!(last[1].query, "q104");
    }

    #[test]
    fn test_router_routes() {
        let router = IntelligentRouter::new();
        assert_eq!(router.route("What's the weather in Paris"), Route::Tool);
        assert_eq!(router.route("Tell me about Rust"), Route::Rag);
        assert_eq!(router.route("hello there"), Route::DirectLlm);
        assert_eq!(
            router.route("Could you compare multiple complex options and decide whether tea or coffee suits a long study night?"),
            Route::React
        );
    }

    #[test]
    fn test_tool_beats_rag_on_higher_confidence() {
        let router = IntelligentRouter::new();
        let decision = router.decide("what is the time");
        assert_eq!(decision.selected_route, Route::Tool);
        assert_eq!(decision.reason, "Detected tool: time");
        assert_eq!(decision.all_routes.len(), 3);
        assert_eq!(router.history(10).len(), 1);
    }

    #[test]
    fn test_routing_history_is_bounded() {
        let router = IntelligentRouter::new();
        for i in 0..105 {
            router.decide(&format!("hello {}", i));
        }
        assert_eq!(router.history(1000).len(), HISTORY_LIMIT);
        let last = router.history(1);
        assert_eq!(last[0].query, "hello 104");
        assert_eq!(router.history(1000)[0].query, "hello 5");
    }
}
