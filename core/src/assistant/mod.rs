//! The personal assistant
//!
//! Ties memory, retrieval, tools and the LLM together. Two strategies are
//! available: `ensemble` asks every source and ranks the answers with fixed
//! heuristics; `routed` sends the query down one branch of the
//! [`Pipeline`](crate::agent::Pipeline) and lets the evaluator choose.

pub mod scoring;

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::agent::{
    AssistantState, CandidateResponse, IntelligentRouter, Pipeline, ReActAgent, ResponseEvaluator,
    ResponseSource, ToolRegistry,
};
use crate::config::{Config, Strategy};
use crate::error::{AideError, Result};
use crate::llm::ChatBackend;
use crate::memory::{key_bucket, Exchange, MemoryExtractor, MemoryStore};
use crate::rag::{Document, KnowledgeBase, KnowledgeStats, ScoredDocument};

pub const QUOTA_MESSAGE: &str = "Unable to complete this request because the API quota is exhausted.";

const LEARNING_THRESHOLD: f64 = 0.7;
const MIN_REFINABLE_CHARS: usize = 10;

/// Outcome of one answered query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub response: String,
    pub session_id: String,
    pub source: ResponseSource,
    pub confidence: f64,
    pub learning_applied: bool,
    pub memory_used: bool,
    pub user_memories_count: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
struct Counters {
    total_queries: u64,
    sources_used: BTreeMap<String, u64>,
    learning_opportunities: u64,
    memory_usage_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetrics {
    pub total_queries: u64,
    pub sources_used: BTreeMap<String, u64>,
    pub learning_opportunities: u64,
    pub memory_usage_count: u64,
    pub rag_statistics: KnowledgeStats,
}

pub struct PersonalAssistant {
    config: Config,
    backend: Arc<dyn ChatBackend>,
    memory: MemoryStore,
    knowledge: Mutex<KnowledgeBase>,
    tools: Arc<ToolRegistry>,
    extractor: MemoryExtractor,
    react: ReActAgent,
    evaluator: ResponseEvaluator,
    router: IntelligentRouter,
    learning_enabled: AtomicBool,
    counters: Mutex<Counters>,
}

impl PersonalAssistant {
    /// Open the stores named in `config` and assemble the assistant
    pub fn new(config: Config, backend: Arc<dyn ChatBackend>) -> Result<Self> {
        let settings = &config.assistant;
        let memory = MemoryStore::open(&settings.database_path, settings.max_conversation_history)?;
        let knowledge = KnowledgeBase::open(&settings.knowledge_base_path, settings.top_k_retrieval)?;
        Self::with_stores(config, backend, memory, knowledge)
    }

    pub fn with_stores(
        config: Config,
        backend: Arc<dyn ChatBackend>,
        memory: MemoryStore,
        knowledge: KnowledgeBase,
    ) -> Result<Self> {
        let tools = Arc::new(ToolRegistry::with_builtin_tools(&config.web_search));
        let react = ReActAgent::new(
            backend.clone(),
            tools.clone(),
            config.assistant.max_react_steps,
        );
        info!(
            "Assistant ready: strategy={}, tools={}",
            config.assistant.strategy,
            tools.list_tools().join(",")
        );

        Ok(Self {
            learning_enabled: AtomicBool::new(config.assistant.learning_enabled),
            config,
            backend,
            memory,
            knowledge: Mutex::new(knowledge),
            tools,
            extractor: MemoryExtractor::new(),
            react,
            evaluator: ResponseEvaluator::new(),
            router: IntelligentRouter::new(),
            counters: Mutex::new(Counters::default()),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn react_agent(&self) -> &ReActAgent {
        &self.react
    }

    pub fn evaluator(&self) -> &ResponseEvaluator {
        &self.evaluator
    }

    pub fn router(&self) -> &IntelligentRouter {
        &self.router
    }

    /// Answer a query for a user, remembering the exchange
    pub async fn process_query(
        &self,
        user_id: &str,
        query: &str,
        session_id: Option<&str>,
    ) -> Result<QueryResult> {
        if query.trim().is_empty() {
            return Err(AideError::invalid_input("query is empty"));
        }
        let session_id = session_id
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        self.counters.lock().total_queries += 1;
        let state = AssistantState::new(user_id, &session_id, query);

        match self.config.assistant.strategy {
            Strategy::Ensemble => self.run_ensemble(state).await,
            Strategy::Routed => {
                let state = Pipeline::new(self).run(state).await?;
                debug!("Pipeline visited: {}", state.visited_names().join(" -> "));
                state
                    .result
                    .ok_or_else(|| AideError::Storage("pipeline finished without a result".to_string()))
            }
        }
    }

    async fn run_ensemble(&self, mut state: AssistantState) -> Result<QueryResult> {
        self.extract_memory(&state.user_id, &state.query)?;
        self.load_context(&mut state)?;

        let mut candidates = vec![self.direct_llm_candidate(&state.query).await];
        candidates.extend(self.rag_candidate(&state.query, &state.history, &state.memories));
        candidates.extend(self.tool_candidates(&state.query, &state.history).await);

        let mut selected = select_by_score(&state.query, candidates);
        if !state.memories.is_empty() {
            self.refine_candidate(&mut selected, &state.query, &state.memories)
                .await;
        }
        self.finish(&state, selected)
    }

    /// Store a personal fact found in the query, if any
    pub(crate) fn extract_memory(&self, user_id: &str, query: &str) -> Result<()> {
        if let Some(fact) = self.extractor.extract(query) {
            debug!("Remembering {} fact for {}: {}", fact.kind, user_id, fact.value);
            self.memory.store_memory(user_id, &fact.key, &fact.value)?;
        }
        Ok(())
    }

    pub(crate) fn load_context(&self, state: &mut AssistantState) -> Result<()> {
        state.history = self
            .memory
            .get_recent_conversations(&state.user_id, &state.session_id, None)?;
        state.memories = self.memory.get_user_memories(&state.user_id)?;
        Ok(())
    }

    /// LLM call that degrades to the quota message instead of failing
    async fn safe_generate(&self, prompt: &str) -> String {
        match self.backend.generate(prompt, None).await {
            Ok(text) => text,
            Err(e) => {
                if e.is_quota() {
                    warn!("LLM quota exhausted: {}", e);
                } else {
                    warn!("LLM call failed: {}", e);
                }
                QUOTA_MESSAGE.to_string()
            }
        }
    }

    pub(crate) async fn direct_llm_candidate(&self, query: &str) -> CandidateResponse {
        let prompt = format!(
            "You are a helpful assistant. Answer the user's question clearly.\n\nQuestion: {}\n\nResponse:",
            query
        );
        let content = self.safe_generate(&prompt).await;
        CandidateResponse::new(content, ResponseSource::DirectLlm, 0.7).with_method("llm_basic")
    }

    pub(crate) fn rag_candidate(
        &self,
        query: &str,
        history: &[Exchange],
        memories: &BTreeMap<String, String>,
    ) -> Option<CandidateResponse> {
        let enhanced = scoring::enhance_query_with_memory(query, history, memories);
        let context = self.knowledge.lock().query(&enhanced)?;
        Some(CandidateResponse::new(context, ResponseSource::Rag, 0.85).with_method("rag_basic"))
    }

    pub(crate) async fn tool_candidates(
        &self,
        query: &str,
        history: &[Exchange],
    ) -> Vec<CandidateResponse> {
        let query_lower = query.to_lowercase();
        let mut candidates = Vec::new();

        for name in self.tools.list_tools() {
            if !scoring::is_tool_relevant(&query_lower, name, history) {
                continue;
            }
            let params = scoring::extract_tool_params(query, name);
            let result = self.tools.execute(name, &params).await;
            if result.get("error").is_some() {
                debug!("Skipping {} candidate: {}", name, result["error"]);
                continue;
            }

            let content = scoring::format_tool_response(&result, name);
            let confidence = scoring::tool_confidence(&result, &query_lower, name);
            candidates.push(
                CandidateResponse::new(content, ResponseSource::Tool, confidence)
                    .with_method(format!("tool_{}", name))
                    .with_tool(name, result),
            );
        }
        candidates
    }

    /// Personalise a non-tool answer with the user's memories.
    ///
    /// Returns the refined text when it replaced the original.
    pub(crate) async fn refine_candidate(
        &self,
        selected: &mut CandidateResponse,
        query: &str,
        memories: &BTreeMap<String, String>,
    ) -> Option<String> {
        if memories.is_empty() || selected.source == ResponseSource::Tool {
            return None;
        }
        let original = selected.content.as_str();
        if original.trim().chars().count() < MIN_REFINABLE_CHARS
            || original.to_lowercase().contains("unable to complete")
        {
            return None;
        }

        let facts = scoring::unique_memory_facts(memories);
        if facts.is_empty() {
            return None;
        }
        let memory_facts = facts
            .iter()
            .map(|fact| format!("- {}", fact))
            .collect::<Vec<_>>()
            .join("\n");

        let prompt = format!(
            r#"You are a helpful personal assistant. The user has asked you a question, and you have access to facts about them.

User's Question: "{}"

Facts about the user:
{}

Instructions:
1. Answer the user's question directly.
2. Use the relevant facts about the user.
3. Keep the response short and specific.
4. Avoid generic motivational language.

Generate the personalized response:"#,
            query, memory_facts
        );

        let refined = self.safe_generate(&prompt).await;
        let usable = refined != QUOTA_MESSAGE
            && refined.trim().chars().count() > MIN_REFINABLE_CHARS
            && !refined.to_lowercase().contains("unable to complete");
        if !usable {
            return None;
        }
        debug!("Refined {} answer with {} memories", selected.source, facts.len());
        selected.content = refined.clone();
        Some(refined)
    }

    /// Learn from, persist and account for the chosen answer
    pub(crate) fn finish(
        &self,
        state: &AssistantState,
        selected: CandidateResponse,
    ) -> Result<QueryResult> {
        let learning_enabled = self.learning_enabled.load(Ordering::Relaxed);
        if learning_enabled && selected.confidence > LEARNING_THRESHOLD {
            self.counters.lock().learning_opportunities += 1;
            let learned = self.knowledge.lock().learn_from_interaction(
                &state.query,
                &selected.content,
                selected.source.as_str(),
            );
            if let Err(e) = learned {
                warn!("Learning from interaction failed: {}", e);
            }
        }

        self.memory.store_conversation(
            &state.user_id,
            &state.session_id,
            &state.query,
            &selected.content,
        )?;

        let memory_used = !state.history.is_empty() || !state.memories.is_empty();
        {
            let mut counters = self.counters.lock();
            *counters
                .sources_used
                .entry(selected.source.as_str().to_string())
                .or_insert(0) += 1;
            if memory_used {
                counters.memory_usage_count += 1;
            }
        }

        info!(
            "Answered from {} (confidence {:.2})",
            selected.source, selected.confidence
        );
        Ok(QueryResult {
            response: selected.content,
            session_id: state.session_id.clone(),
            source: selected.source,
            confidence: selected.confidence,
            learning_applied: learning_enabled,
            memory_used,
            user_memories_count: state.memories.len(),
        })
    }

    pub fn get_conversation_history(&self, user_id: &str, session_id: &str) -> Result<Vec<Exchange>> {
        self.memory.get_recent_conversations(user_id, session_id, None)
    }

    pub fn get_user_memories(&self, user_id: &str) -> Result<BTreeMap<String, String>> {
        self.memory.get_user_memories(user_id)
    }

    /// Delete a user's memories and conversations
    pub fn forget_user(&self, user_id: &str) -> Result<usize> {
        let removed = self.memory.clear_user(user_id)?;
        info!("Forgot {} rows for {}", removed, user_id);
        Ok(removed)
    }

    pub fn get_performance_metrics(&self) -> PerformanceMetrics {
        let counters = self.counters.lock().clone();
        PerformanceMetrics {
            total_queries: counters.total_queries,
            sources_used: counters.sources_used,
            learning_opportunities: counters.learning_opportunities,
            memory_usage_count: counters.memory_usage_count,
            rag_statistics: self.knowledge.lock().statistics(),
        }
    }

    pub fn enable_learning(&self, enabled: bool) {
        self.learning_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn add_knowledge(&self, content: &str, source: &str) -> Result<()> {
        let document = Document::new(content, source).with_confidence(0.8).added_now();
        self.knowledge.lock().add_document(document)
    }

    pub fn knowledge_search(&self, query: &str, k: Option<usize>) -> Vec<ScoredDocument> {
        self.knowledge.lock().search(query, k)
    }

    pub fn knowledge_statistics(&self) -> KnowledgeStats {
        self.knowledge.lock().statistics()
    }

    /// Record a user's correction.
    ///
    /// The correction becomes a user memory, so later answers are refined
    /// with it, and a high-confidence document, so retrieval can surface it.
    /// When the session has a previous exchange the document is tied to
    /// that question.
    pub fn record_feedback(&self, user_id: &str, session_id: &str, correction: &str) -> Result<()> {
        let correction = correction.trim();
        if correction.is_empty() {
            return Err(AideError::invalid_input("feedback is empty"));
        }

        let key = format!("feedback_{}", key_bucket(correction));
        self.memory.store_memory(user_id, &key, correction)?;

        let last_question = self
            .memory
            .get_recent_conversations(user_id, session_id, Some(1))?
            .pop()
            .map(|exchange| exchange.message);
        let content = match last_question {
            Some(question) => format!("Question: {}\nCorrection: {}", question, correction),
            None => correction.to_string(),
        };
        let document = Document::new(content, "user_feedback")
            .with_confidence(0.9)
            .added_now();
        self.knowledge.lock().add_document(document)?;
        info!("Recorded feedback from {}", user_id);
        Ok(())
    }
}

/// Ensemble selection: highest heuristic score wins (first on ties) and its
/// score becomes the confidence
fn select_by_score(query: &str, candidates: Vec<CandidateResponse>) -> CandidateResponse {
    let mut best: Option<(f64, CandidateResponse)> = None;
    for candidate in candidates {
        let score = scoring::response_score(&candidate, query);
        debug!("Candidate {} scored {:.1}", candidate.source, score);
        if best.as_ref().map_or(true, |(top, _)| score > *top) {
            best = Some((score, candidate));
        }
    }

    match best {
        Some((score, mut candidate)) => {
            candidate.confidence = (score / 100.0).min(0.95);
            candidate
        }
        None => CandidateResponse::fallback(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::ScriptedBackend;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        assistant: PersonalAssistant,
        backend: Arc<ScriptedBackend>,
    }

    fn fixture(backend: ScriptedBackend, strategy: Strategy) -> Fixture {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.assistant.database_path = dir.path().join("conversations.db");
        config.assistant.knowledge_base_path = dir.path().join("knowledge");
        config.assistant.strategy = strategy;

        let backend = Arc::new(backend);
        let assistant = PersonalAssistant::new(config, backend.clone()).unwrap();
        Fixture {
            _dir: dir,
            assistant,
            backend,
        }
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let f = fixture(ScriptedBackend::always("x"), Strategy::Ensemble);
        assert!(matches!(
            f.assistant.process_query("u", "   ", None).await,
            Err(AideError::InvalidInput { .. })
        ));
    }

    #[tokio::test]
    async fn test_calculator_wins_ensemble() {
        let f = fixture(
            ScriptedBackend::always("Fifteen times seven is one hundred and five."),
            Strategy::Ensemble,
        );
        let result = f
            .assistant
            .process_query("u", "What is 15 * 7?", Some("s"))
            .await
            .unwrap();

        assert_eq!(result.response, "The result is 105");
        assert_eq!(result.source, ResponseSource::Tool);
        assert_eq!(result.confidence, 0.95);
        assert_eq!(result.session_id, "s");
        assert!(!result.memory_used);

        let history = f.assistant.get_conversation_history("u", "s").unwrap();
        assert_eq!(history, vec![Exchange::new("What is 15 * 7?", "The result is 105")]);
    }

    #[tokio::test]
    async fn test_memory_is_extracted_and_used_for_refinement() {
        let f = fixture(
            ScriptedBackend::always("Nice to meet you, I will remember that."),
            Strategy::Ensemble,
        );
        let first = f
            .assistant
            .process_query("alice", "My name is Alice", None)
            .await
            .unwrap();
        assert_eq!(first.user_memories_count, 1);
        assert!(first.memory_used);
        assert_eq!(first.session_id.len(), 36);

        let memories = f.assistant.get_user_memories("alice").unwrap();
        assert_eq!(memories[&format!("name_{}", key_bucket("alice"))], "alice");

        // direct answer + refinement
        let calls_before = f.backend.calls();
        f.assistant
            .process_query("alice", "Recommend a book", Some("s1"))
            .await
            .unwrap();
        assert_eq!(f.backend.calls() - calls_before, 2);
        let refine_prompt = f.backend.seen.lock().last().unwrap()[1].content.clone();
        assert!(refine_prompt.contains("- name_"));
        assert!(refine_prompt.contains("User's Question: \"Recommend a book\""));
    }

    #[tokio::test]
    async fn test_quota_failure_degrades_gracefully() {
        let f = fixture(ScriptedBackend::quota_exhausted(), Strategy::Ensemble);
        let result = f
            .assistant
            .process_query("u", "Tell me a story", Some("s"))
            .await
            .unwrap();
        assert_eq!(result.response, QUOTA_MESSAGE);
        assert_eq!(result.source, ResponseSource::DirectLlm);
        // 65 + 11 words at 0.5 - 40 for "unable"
        assert!((result.confidence - 0.305).abs() < 1e-9);
        assert_eq!(f.assistant.get_performance_metrics().learning_opportunities, 0);
    }

    #[tokio::test]
    async fn test_confident_answers_are_learned_and_retrieved() {
        let answer = "Volcanoes erupt when pressure from molten magma, gases and rock builds beneath the crust and forces material upward.";
        let f = fixture(ScriptedBackend::always(answer), Strategy::Ensemble);

        let first = f
            .assistant
            .process_query("u", "Explain how volcanoes erupt", Some("s"))
            .await
            .unwrap();
        assert!(first.confidence > LEARNING_THRESHOLD);
        let metrics = f.assistant.get_performance_metrics();
        assert_eq!(metrics.learning_opportunities, 1);
        assert_eq!(metrics.rag_statistics.total_documents, 1);
        assert_eq!(metrics.sources_used["direct_llm"], 1);

        let hits = f.assistant.knowledge_search("volcanoes", None);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.source, "learned_from_direct_llm");
    }

    #[tokio::test]
    async fn test_learning_can_be_disabled() {
        let answer = "Volcanoes erupt when pressure from molten magma, gases and rock builds beneath the crust and forces material upward.";
        let f = fixture(ScriptedBackend::always(answer), Strategy::Ensemble);
        f.assistant.enable_learning(false);
        let result = f
            .assistant
            .process_query("u", "Explain how volcanoes erupt", None)
            .await
            .unwrap();
        assert!(!result.learning_applied);
        assert_eq!(f.assistant.knowledge_statistics().total_documents, 0);
    }

    #[tokio::test]
    async fn test_routed_tool_query_visits_tool_branch() {
        let f = fixture(ScriptedBackend::always("unused"), Strategy::Routed);
        let state = Pipeline::new(&f.assistant)
            .run(AssistantState::new("u", "s", "calculate 6 * 7"))
            .await
            .unwrap();

        assert_eq!(state.route, Some(crate::agent::Route::Tool));
        assert_eq!(
            state.visited_names(),
            vec![
                "extract_memory",
                "load_context",
                "route_query",
                "run_tool",
                "collect",
                "select",
                "refine",
                "store",
                "end"
            ]
        );
        let result = state.result.unwrap();
        assert_eq!(result.response, "The result is 42");
        assert_eq!(f.backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_routed_empty_rag_falls_back_to_llm() {
        let f = fixture(
            ScriptedBackend::always("Rust is a systems programming language."),
            Strategy::Routed,
        );
        let state = Pipeline::new(&f.assistant)
            .run(AssistantState::new("u", "s", "Tell me about Rust"))
            .await
            .unwrap();

        assert_eq!(
            &state.visited_names()[3..6],
            &["run_rag", "collect", "run_llm"]
        );
        assert_eq!(state.responses.len(), 1);
        assert_eq!(state.result.unwrap().source, ResponseSource::DirectLlm);
    }

    #[tokio::test]
    async fn test_routed_react_branch() {
        let f = fixture(
            ScriptedBackend::new(vec![
                "Thought: easy\nAction: respond\nAction Input: Tea is better for a long study night because it has less caffeine.",
            ]),
            Strategy::Routed,
        );
        let result = f
            .assistant
            .process_query(
                "u",
                "Could you compare multiple complex options and decide whether tea or coffee suits a long study night?",
                Some("s"),
            )
            .await
            .unwrap();
        assert_eq!(result.source, ResponseSource::React);
        assert!(result.response.starts_with("Tea is better"));
    }

    #[tokio::test]
    async fn test_feedback_becomes_memory_and_document() {
        let f = fixture(ScriptedBackend::always("The capital of Australia is Sydney."), Strategy::Ensemble);
        f.assistant
            .process_query("u", "What is the capital of Australia?", Some("s"))
            .await
            .unwrap();
        f.assistant
            .record_feedback("u", "s", "The capital of Australia is Canberra")
            .unwrap();

        let memories = f.assistant.get_user_memories("u").unwrap();
        assert!(memories.keys().any(|k| k.starts_with("feedback_")));

        let hits = f.assistant.knowledge_search("Australia Canberra", None);
        let feedback = hits
            .iter()
            .find(|h| h.document.source == "user_feedback")
            .unwrap();
        assert_eq!(feedback.document.confidence, Some(0.9));
        assert!(feedback.document.content.starts_with("Question: What is the capital of Australia?"));
    }

    #[tokio::test]
    async fn test_forget_user() {
        let f = fixture(ScriptedBackend::always("Hello there, nice to meet you."), Strategy::Ensemble);
        f.assistant
            .process_query("u", "My name is Bob", Some("s"))
            .await
            .unwrap();
        assert!(f.assistant.forget_user("u").unwrap() >= 2);
        assert!(f.assistant.get_user_memories("u").unwrap().is_empty());
        assert!(f.assistant.get_conversation_history("u", "s").unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_add_knowledge_feeds_rag_candidate() {
        let f = fixture(ScriptedBackend::always("ok"), Strategy::Ensemble);
        f.assistant
            .add_knowledge("The Eiffel Tower is located in Paris and was completed in 1889.", "user_input")
            .unwrap();
        let result = f
            .assistant
            .process_query("u", "Where is the Eiffel Tower located?", Some("s"))
            .await
            .unwrap();
        assert_eq!(result.source, ResponseSource::Rag);
        assert!(result.response.contains("1889"));
    }

    #[test]
    fn test_select_by_score_falls_back() {
        let selected = select_by_score("q", Vec::new());
        assert_eq!(selected.source, ResponseSource::Fallback);
        assert_eq!(selected.confidence, 0.1);
    }
}
