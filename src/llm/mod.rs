//! Verdict producer seam for LLM-backed stages

mod openai;

pub use openai::{OpenAiConfig, OpenAiProducer};

use crate::error::Result;
use async_trait::async_trait;

/// Sampling parameters forwarded to the producer
#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
}

impl Default for CompletionOptions {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2048,
            temperature: 0.2,
        }
    }
}

/// Collaborator producing verdict text from a bounded prompt.
///
/// Implementations return whatever the model said; callers are responsible
/// for tolerant parsing and fallbacks. An `Err` here is recoverable at every
/// call site and never aborts a run.
#[async_trait]
pub trait VerdictProducer: Send + Sync {
    /// Generate a completion for the given system/user prompt pair
    async fn produce(
        &self,
        system: &str,
        user: &str,
        options: &CompletionOptions,
    ) -> Result<String>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
