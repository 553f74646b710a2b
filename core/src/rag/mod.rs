//! Dynamic knowledge base
//!
//! A keyword retrieval store that grows from conversations. Documents live in
//! `knowledge_base.json`; term associations learned from past answers live in
//! `learned_queries.json` and are used to widen later searches.

use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::error::{AideError, Result};

pub const KNOWLEDGE_FILE: &str = "knowledge_base.json";
pub const LEARNING_FILE: &str = "learned_queries.json";

const STOP_WORDS: [&str; 11] = ["the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for"];
const STRIP_CHARS: &[char] = &['.', ',', '!', '?', ';', ':', '"', '(', ')', '[', ']', '{', '}'];
const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Minimum answer length (in words) worth learning from
const MIN_LEARN_WORDS: usize = 10;
const LEARNED_CONFIDENCE: f64 = 0.7;
const DEFAULT_CONFIDENCE: f64 = 0.5;
/// Related terms borrowed per query term when widening a search
const EXPANSION_PER_TERM: usize = 3;

/// A retrievable piece of knowledge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub content: String,
    #[serde(default = "unknown_source")]
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub learned_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Fields written by other tools are carried through untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn unknown_source() -> String {
    "unknown".to_string()
}

impl Document {
    pub fn new(content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source: source.into(),
            learned_date: None,
            added_date: None,
            confidence: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }

    pub fn added_now(mut self) -> Self {
        self.added_date = Some(timestamp(Local::now().naive_local()));
        self
    }

    fn learned_at(mut self, at: NaiveDateTime) -> Self {
        self.learned_date = Some(timestamp(at));
        self
    }
}

/// A document with its retrieval score
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDocument {
    #[serde(flatten)]
    pub document: Document,
    pub relevance_score: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KnowledgeMetadata {
    last_updated: String,
    document_count: usize,
    source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct KnowledgeFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<KnowledgeMetadata>,
    #[serde(default)]
    documents: Vec<Document>,
}

/// Summary of the knowledge base contents
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeStats {
    pub total_documents: usize,
    pub sources_distribution: BTreeMap<String, usize>,
    pub learned_patterns: usize,
    pub last_updated: String,
}

pub struct KnowledgeBase {
    dir: PathBuf,
    documents: Vec<Document>,
    learned_queries: BTreeMap<String, Vec<String>>,
    default_k: usize,
}

impl KnowledgeBase {
    /// Open the knowledge base stored under `dir`, creating it if missing
    pub fn open(dir: impl AsRef<Path>, default_k: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;

        let mut kb = Self {
            dir,
            documents: Vec::new(),
            learned_queries: BTreeMap::new(),
            default_k,
        };

        let knowledge_path = kb.knowledge_path();
        if knowledge_path.exists() {
            kb.documents = read_json::<KnowledgeFile>(&knowledge_path)
                .map(|f| f.documents)
                .unwrap_or_default();
        } else {
            kb.save_documents()?;
        }

        let learning_path = kb.learning_path();
        if learning_path.exists() {
            kb.learned_queries = read_json(&learning_path).unwrap_or_default();
        }

        info!(
            "Knowledge base loaded: {} documents, {} learned patterns",
            kb.documents.len(),
            kb.learned_queries.len()
        );
        Ok(kb)
    }

    pub fn knowledge_path(&self) -> PathBuf {
        self.dir.join(KNOWLEDGE_FILE)
    }

    pub fn learning_path(&self) -> PathBuf {
        self.dir.join(LEARNING_FILE)
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn add_document(&mut self, document: Document) -> Result<()> {
        if document.content.trim().is_empty() {
            return Err(AideError::invalid_input("document content is empty"));
        }
        self.documents.push(document);
        self.save_documents()
    }

    /// Learn from an answer: keep it as a document and associate its terms
    /// with the query's terms. Short answers are ignored. Returns whether
    /// anything was learned.
    pub fn learn_from_interaction(&mut self, query: &str, response: &str, source: &str) -> Result<bool> {
        if response.split_whitespace().count() <= MIN_LEARN_WORDS {
            return Ok(false);
        }

        let document = Document::new(
            format!("Question: {}\nAnswer: {}", query, response),
            format!("learned_from_{}", source),
        )
        .with_confidence(LEARNED_CONFIDENCE)
        .learned_at(Local::now().naive_local());
        self.add_document(document)?;

        let response_terms = extract_terms(response);
        for q_term in extract_terms(query) {
            let related = self.learned_queries.entry(q_term).or_default();
            for r_term in &response_terms {
                if !related.contains(r_term) {
                    related.push(r_term.clone());
                }
            }
        }
        self.save_learned_queries()?;
        debug!("Learned from interaction (source={})", source);
        Ok(true)
    }

    /// Rank documents against `query`; `k` defaults to the configured top-k
    pub fn search(&self, query: &str, k: Option<usize>) -> Vec<ScoredDocument> {
        self.search_at(query, k, Local::now().naive_local())
    }

    fn search_at(&self, query: &str, k: Option<usize>, now: NaiveDateTime) -> Vec<ScoredDocument> {
        let k = k.unwrap_or(self.default_k);
        let query_terms = extract_terms(&self.expand_query(query));

        let mut results: Vec<ScoredDocument> = self
            .documents
            .iter()
            .filter_map(|doc| {
                let score = score_document(doc, &query_terms, now);
                (score > 0.0).then(|| ScoredDocument {
                    document: doc.clone(),
                    relevance_score: score,
                })
            })
            .collect();

        results.sort_by(|a, b| {
            b.relevance_score
                .partial_cmp(&a.relevance_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        results.truncate(k);
        results
    }

    /// Widen a query with terms learned alongside its own terms
    fn expand_query(&self, query: &str) -> String {
        let query_terms = extract_terms(query);
        let mut expanded: BTreeSet<String> = query_terms.iter().cloned().collect();
        for term in &query_terms {
            if let Some(related) = self.learned_queries.get(term) {
                expanded.extend(related.iter().take(EXPANSION_PER_TERM).cloned());
            }
        }
        let extra: Vec<&str> = expanded.iter().map(String::as_str).collect();
        format!("{} {}", query, extra.join(" "))
    }

    /// Context for a question: the top two hits joined by newlines
    pub fn query(&self, question: &str) -> Option<String> {
        let hits = self.search(question, None);
        if hits.is_empty() {
            return None;
        }
        Some(
            hits.iter()
                .take(2)
                .map(|h| h.document.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        )
    }

    pub fn statistics(&self) -> KnowledgeStats {
        let mut sources_distribution = BTreeMap::new();
        for doc in &self.documents {
            *sources_distribution.entry(doc.source.clone()).or_insert(0) += 1;
        }
        KnowledgeStats {
            total_documents: self.documents.len(),
            sources_distribution,
            learned_patterns: self.learned_queries.len(),
            last_updated: timestamp(Local::now().naive_local()),
        }
    }

    fn save_documents(&self) -> Result<()> {
        let file = KnowledgeFile {
            metadata: Some(KnowledgeMetadata {
                last_updated: timestamp(Local::now().naive_local()),
                document_count: self.documents.len(),
                source: "dynamic_learning".to_string(),
            }),
            documents: self.documents.clone(),
        };
        write_json(&self.knowledge_path(), &file)
    }

    fn save_learned_queries(&self) -> Result<()> {
        write_json(&self.learning_path(), &self.learned_queries)
    }
}

/// Lowercased content words: longer than three characters, not a stop word,
/// with surrounding punctuation removed
pub fn extract_terms(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split_whitespace()
        .filter(|word| word.chars().count() > 3 && !STOP_WORDS.contains(word))
        .map(|word| word.trim_matches(STRIP_CHARS).to_string())
        .filter(|term| !term.is_empty())
        .collect()
}

fn score_document(doc: &Document, query_terms: &[String], now: NaiveDateTime) -> f64 {
    if query_terms.is_empty() {
        return 0.0;
    }

    let content = doc.content.to_lowercase();
    let matches = query_terms
        .iter()
        .filter(|term| content.contains(term.as_str()))
        .count();
    let term_score = matches as f64 / query_terms.len() as f64;

    let recency_boost = doc
        .learned_date
        .as_deref()
        .and_then(parse_timestamp)
        .map(|learned| {
            let days_ago = (now - learned).num_days() as f64;
            (1.0 - days_ago / 30.0).max(0.5)
        })
        .unwrap_or(1.0);

    let confidence = doc.confidence.unwrap_or(DEFAULT_CONFIDENCE);
    term_score * recency_boost * confidence
}

fn timestamp(at: NaiveDateTime) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATE_FORMAT)
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_local()))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Option<T> {
    let parsed = std::fs::read_to_string(path)
        .map_err(|e| e.to_string())
        .and_then(|raw| serde_json::from_str(&raw).map_err(|e| e.to_string()));
    match parsed {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Ignoring unreadable {}: {}", path.display(), e);
            None
        }
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    std::fs::write(path, body)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> KnowledgeBase {
        KnowledgeBase::open(dir.path().join("knowledge"), 3).unwrap()
    }

    #[test]
    fn test_extract_terms() {
        assert_eq!(
            extract_terms("What is the Capital of France? (Paris)"),
            vec!["what", "capital", "france", "paris"]
        );
        // length is checked before punctuation is stripped
        assert_eq!(extract_terms("cat. dog"), vec!["cat"]);
    }

    #[test]
    fn test_open_creates_empty_knowledge_file() {
        let dir = TempDir::new().unwrap();
        let kb = open(&dir);
        assert!(kb.knowledge_path().exists());
        assert!(kb.documents().is_empty());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(kb.knowledge_path()).unwrap()).unwrap();
        assert_eq!(raw["metadata"]["source"], "dynamic_learning");
        assert_eq!(raw["metadata"]["document_count"], 0);
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let kb_dir = dir.path().join("knowledge");
        std::fs::create_dir_all(&kb_dir).unwrap();
        std::fs::write(kb_dir.join(KNOWLEDGE_FILE), "{not json").unwrap();
        let kb = KnowledgeBase::open(&kb_dir, 3).unwrap();
        assert!(kb.documents().is_empty());
    }

    #[test]
    fn test_add_document_rejects_empty_content() {
        let dir = TempDir::new().unwrap();
        let mut kb = open(&dir);
        assert!(kb.add_document(Document::new("  ", "user_input")).is_err());
    }

    #[test]
    fn test_search_scores_by_term_overlap_and_confidence() {
        let dir = TempDir::new().unwrap();
        let mut kb = open(&dir);
        kb.add_document(Document::new("Paris is the capital of France", "atlas").with_confidence(0.8))
            .unwrap();
        kb.add_document(Document::new("Berlin is the capital of Germany", "atlas"))
            .unwrap();
        kb.add_document(Document::new("Bananas are yellow", "fruit")).unwrap();

        let hits = kb.search("capital of France", None);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].document.content, "Paris is the capital of France");
        // terms: capital, france (each doubled by expansion) -> 4/4 * 0.8
        assert!((hits[0].relevance_score - 0.8).abs() < 1e-9);
        // only "capital" matches -> 2/4 * 0.5
        assert!((hits[1].relevance_score - 0.25).abs() < 1e-9);

        assert_eq!(kb.search("capital", Some(1)).len(), 1);
        assert!(kb.search("spaceships", None).is_empty());
    }

    #[test]
    fn test_recency_boost_decays() {
        let dir = TempDir::new().unwrap();
        let mut kb = open(&dir);
        let now = Local::now().naive_local();
        kb.documents.push(
            Document::new("rust ownership rules", "learned_from_rag")
                .with_confidence(1.0)
                .learned_at(now - Duration::days(15)),
        );
        kb.documents.push(
            Document::new("rust borrowing rules", "learned_from_rag")
                .with_confidence(1.0)
                .learned_at(now - Duration::days(90)),
        );

        let hits = kb.search_at("rust rules", None, now);
        assert!((hits[0].relevance_score - 0.5).abs() < 1e-9);
        assert!((hits[1].relevance_score - 0.5).abs() < 1e-9);

        let hits = kb.search_at("rust ownership", None, now);
        // 15 days -> boost 0.5 as well, floor is 0.5
        assert!((hits[0].relevance_score - 0.5).abs() < 1e-9);

        let fresh = kb.search_at("rust ownership", None, now - Duration::days(15));
        assert!((fresh[0].relevance_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_learning_expands_future_queries() {
        let dir = TempDir::new().unwrap();
        let mut kb = open(&dir);
        let answer = "Photosynthesis converts sunlight water and carbon dioxide into glucose and oxygen";
        assert!(kb
            .learn_from_interaction("explain photosynthesis", answer, "direct_llm")
            .unwrap());
        assert!(!kb.learn_from_interaction("hi", "too short to learn", "direct_llm").unwrap());

        assert_eq!(kb.documents().len(), 1);
        assert_eq!(kb.documents()[0].source, "learned_from_direct_llm");
        assert_eq!(kb.documents()[0].confidence, Some(0.7));
        let related = &kb.learned_queries["photosynthesis"];
        assert_eq!(&related[..3], &["photosynthesis", "converts", "sunlight"]);

        let reopened = open(&dir);
        assert_eq!(reopened.learned_queries.len(), 2);
        assert!(reopened.query("photosynthesis").unwrap().starts_with("Question: explain"));
    }

    #[test]
    fn test_query_joins_top_two() {
        let dir = TempDir::new().unwrap();
        let mut kb = open(&dir);
        for text in ["alpha beta gamma", "alpha beta", "alpha"] {
            kb.add_document(Document::new(text, "t")).unwrap();
        }
        assert_eq!(
            kb.query("alpha beta gamma").unwrap(),
            "alpha beta gamma\nalpha beta"
        );
        assert!(kb.query("zzzz").is_none());
    }

    #[test]
    fn test_extra_fields_survive_round_trip() {
        let dir = TempDir::new().unwrap();
        let kb_dir = dir.path().join("knowledge");
        std::fs::create_dir_all(&kb_dir).unwrap();
        std::fs::write(
            kb_dir.join(KNOWLEDGE_FILE),
            r#"{"documents":[{"content":"seed fact","source":"seed","tags":["x"]}]}"#,
        )
        .unwrap();
        let mut kb = KnowledgeBase::open(&kb_dir, 3).unwrap();
        kb.add_document(Document::new("second", "user_input")).unwrap();

        let reopened = KnowledgeBase::open(&kb_dir, 3).unwrap();
        assert_eq!(reopened.documents()[0].extra["tags"], serde_json::json!(["x"]));
        let stats = reopened.statistics();
        assert_eq!(stats.total_documents, 2);
        assert_eq!(stats.sources_distribution["seed"], 1);
    }
}
