//! Similarity memory over past recommendations
//!
//! Matches enrich PM and risk prompts with lessons from comparable
//! situations; they never feed the numeric scoring path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// One retrieved past recommendation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMatch {
    /// The stored situation text that matched
    pub matched_situation: String,
    /// The recommendation recorded for that situation
    pub recommendation: String,
    /// Similarity in [0,1], higher is closer
    pub similarity: f64,
}

/// Collaborator storing and retrieving past recommendations by situation text
#[async_trait]
pub trait SimilarityMemory: Send + Sync {
    /// Retrieve up to `n` most similar past situations, best first
    async fn retrieve_similar(&self, situation: &str, n: usize) -> Vec<MemoryMatch>;

    /// Record a situation and the recommendation made for it
    async fn store(&self, situation: &str, recommendation: &str);
}

#[derive(Debug, Clone)]
struct MemoryRecord {
    situation: String,
    recommendation: String,
    terms: HashMap<String, f64>,
    norm: f64,
}

/// In-memory similarity store using bag-of-words cosine similarity.
///
/// A stand-in for an embedding-backed store with the same contract; good
/// enough to surface lessons from prior runs within one process lifetime.
#[derive(Default)]
pub struct InMemorySimilarityMemory {
    records: RwLock<Vec<MemoryRecord>>,
}

impl InMemorySimilarityMemory {
    /// Create an empty memory
    pub fn new() -> Self {
        Self::default()
    }

    fn vectorize(text: &str) -> (HashMap<String, f64>, f64) {
        let mut terms: HashMap<String, f64> = HashMap::new();
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| t.len() > 2)
        {
            *terms.entry(token.to_string()).or_insert(0.0) += 1.0;
        }
        let norm = terms.values().map(|v| v * v).sum::<f64>().sqrt();
        (terms, norm)
    }

    fn cosine(a: &MemoryRecord, terms: &HashMap<String, f64>, norm: f64) -> f64 {
        if a.norm == 0.0 || norm == 0.0 {
            return 0.0;
        }
        let dot: f64 = terms
            .iter()
            .filter_map(|(t, v)| a.terms.get(t).map(|w| v * w))
            .sum();
        dot / (a.norm * norm)
    }
}

#[async_trait]
impl SimilarityMemory for InMemorySimilarityMemory {
    async fn retrieve_similar(&self, situation: &str, n: usize) -> Vec<MemoryMatch> {
        let (terms, norm) = Self::vectorize(situation);
        let records = self.records.read().await;
        let mut scored: Vec<MemoryMatch> = records
            .iter()
            .map(|r| MemoryMatch {
                matched_situation: r.situation.clone(),
                recommendation: r.recommendation.clone(),
                similarity: Self::cosine(r, &terms, norm),
            })
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(n);
        scored
    }

    async fn store(&self, situation: &str, recommendation: &str) {
        let (terms, norm) = Self::vectorize(situation);
        let mut records = self.records.write().await;
        records.push(MemoryRecord {
            situation: situation.to_string(),
            recommendation: recommendation.to_string(),
            terms,
            norm,
        });
    }
}

/// Format retrieved matches as a prompt block
pub fn format_lessons(matches: &[MemoryMatch]) -> String {
    if matches.is_empty() {
        return "(no past lessons)".to_string();
    }
    matches
        .iter()
        .map(|m| m.recommendation.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_retrieve_orders_by_similarity() {
        let memory = InMemorySimilarityMemory::new();
        memory
            .store(
                "semiconductor demand surge with strong datacenter revenue",
                "Bought on AI capex cycle; worked out",
            )
            .await;
        memory
            .store(
                "retail chain facing margin compression and weak guidance",
                "Avoided; margin pressure persisted",
            )
            .await;

        let matches = memory
            .retrieve_similar("datacenter revenue acceleration in semiconductors", 2)
            .await;
        assert_eq!(matches.len(), 2);
        assert!(matches[0].similarity >= matches[1].similarity);
        assert!(matches[0].matched_situation.contains("semiconductor"));
    }

    #[tokio::test]
    async fn test_retrieve_truncates_to_n() {
        let memory = InMemorySimilarityMemory::new();
        for i in 0..5 {
            memory.store(&format!("situation {i}"), "lesson").await;
        }
        let matches = memory.retrieve_similar("situation", 2).await;
        assert_eq!(matches.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_memory_returns_nothing() {
        let memory = InMemorySimilarityMemory::new();
        assert!(memory.retrieve_similar("anything", 3).await.is_empty());
        assert_eq!(format_lessons(&[]), "(no past lessons)");
    }
}
