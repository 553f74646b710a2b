//! Personal fact extraction
//!
//! Pulls simple facts ("my name is ...", "i like ...") out of a user message
//! so they can be stored as user memories. Pattern order matters: the first
//! pattern that matches wins.

use regex::Regex;

/// Kind of fact a pattern captures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactKind {
    Name,
    Age,
    Location,
    Favorite,
    Likes,
    Dislikes,
    Occupation,
    Custom,
}

impl FactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FactKind::Name => "name",
            FactKind::Age => "age",
            FactKind::Location => "location",
            FactKind::Favorite => "favorite",
            FactKind::Likes => "likes",
            FactKind::Dislikes => "dislikes",
            FactKind::Occupation => "occupation",
            FactKind::Custom => "custom",
        }
    }
}

impl std::fmt::Display for FactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A fact ready to be stored under `key`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedFact {
    pub key: String,
    pub value: String,
    pub kind: FactKind,
}

/// Stable 0..1000 bucket for a string (FNV-1a).
///
/// Used to build memory keys, which must stay the same across runs so that
/// repeating a fact replaces the stored row instead of adding a new one.
pub fn key_bucket(text: &str) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in text.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash % 1000
}

const MEMORY_INDICATORS: [&str; 3] = ["remember that", "don't forget", "my"];

pub struct MemoryExtractor {
    patterns: Vec<(Regex, FactKind)>,
}

impl MemoryExtractor {
    pub fn new() -> Self {
        let table = [
            (r"my (?:name is|name's) (\w+)", FactKind::Name),
            (r"i am (\w+) years old", FactKind::Age),
            (r"i am from (\w+)", FactKind::Location),
            (r"my favorite (?:subject|color|food|movie) is (\w+)", FactKind::Favorite),
            (r"i (?:like|love|enjoy) (\w+)", FactKind::Likes),
            (r"i (?:hate|dislike) (\w+)", FactKind::Dislikes),
            (r"i work as (\w+)", FactKind::Occupation),
        ];
        let patterns = table
            .into_iter()
            .map(|(pattern, kind)| (Regex::new(pattern).expect("valid regex"), kind))
            .collect();
        Self { patterns }
    }

    /// Extract at most one fact from a message
    pub fn extract(&self, query: &str) -> Option<ExtractedFact> {
        let query_lower = query.to_lowercase();

        for (regex, kind) in &self.patterns {
            if let Some(value) = regex
                .captures(&query_lower)
                .and_then(|cap| cap.get(1))
                .map(|m| m.as_str().trim().to_string())
            {
                return Some(ExtractedFact {
                    key: format!("{}_{}", kind, key_bucket(&value)),
                    value,
                    kind: *kind,
                });
            }
        }

        self.extract_custom(&query_lower)
    }

    /// "my X is Y" / "remember that X is Y" style statements
    fn extract_custom(&self, query_lower: &str) -> Option<ExtractedFact> {
        if !MEMORY_INDICATORS.iter().any(|i| query_lower.contains(i)) {
            return None;
        }
        if !query_lower.contains("is") {
            return None;
        }

        let parts: Vec<&str> = query_lower.split(" is ").collect();
        let [key_part, value_part] = parts.as_slice() else {
            return None;
        };

        let key_part = key_part
            .replace("my ", "")
            .replace("remember that ", "")
            .trim()
            .to_string();
        let value_part = value_part.trim();
        if key_part.is_empty() || value_part.is_empty() {
            return None;
        }

        Some(ExtractedFact {
            key: format!("custom_{}", key_bucket(&key_part)),
            value: format!("{}: {}", key_part, value_part),
            kind: FactKind::Custom,
        })
    }
}

impl Default for MemoryExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_extraction() {
        let fact = MemoryExtractor::new().extract("Hi, My name is Alice!").unwrap();
        assert_eq!(fact.kind, FactKind::Name);
        assert_eq!(fact.value, "alice");
        assert_eq!(fact.key, format!("name_{}", key_bucket("alice")));
    }

    #[test]
    fn test_first_pattern_wins() {
        // "i am from" comes before "i like" in the table
        let fact = MemoryExtractor::new()
            .extract("I like pizza and I am from Rome")
            .unwrap();
        assert_eq!(fact.kind, FactKind::Location);
        assert_eq!(fact.value, "rome");
    }

    #[test]
    fn test_likes_and_occupation() {
        let extractor = MemoryExtractor::new();
        assert_eq!(extractor.extract("I enjoy hiking").unwrap().kind, FactKind::Likes);
        let fact = extractor.extract("I work as engineer").unwrap();
        assert_eq!(fact.kind, FactKind::Occupation);
        assert_eq!(fact.value, "engineer");
    }

    #[test]
    fn test_custom_fact() {
        let fact = MemoryExtractor::new()
            .extract("Remember that my birthday is March 3rd")
            .unwrap();
        assert_eq!(fact.kind, FactKind::Custom);
        assert_eq!(fact.value, "birthday: march 3rd");
        assert_eq!(fact.key, format!("custom_{}", key_bucket("birthday")));
    }

    #[test]
    fn test_custom_requires_exactly_one_is() {
        let extractor = MemoryExtractor::new();
        assert!(extractor.extract("my point is that this is odd").is_none());
        assert!(extractor.extract("What is the weather?").is_none());
    }

    #[test]
    fn test_no_fact() {
        assert!(MemoryExtractor::new().extract("How far is the moon?").is_none());
    }

    #[test]
    fn test_key_bucket_is_stable() {
        assert_eq!(key_bucket("alice"), key_bucket("alice"));
        assert!(key_bucket("anything at all") < 1000);
    }
}
