//! Self-consistency review pass applied to draft structured verdicts
//!
//! A second producer invocation re-scores a draft against its own evidence.
//! The reviewer may adjust score and recommendation fields only; if its
//! output is empty or fails to parse as JSON, callers keep the draft.

use crate::error::Result;
use crate::llm::{CompletionOptions, VerdictProducer};
use crate::prompts;
use crate::verdict::extract_json_object;
use std::sync::Arc;

/// Outcome of one review pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// The reviewer returned a usable revision
    Revised(String),
    /// The review failed or returned nothing usable; the draft stands
    DraftKept(String),
}

impl ReviewOutcome {
    /// The accepted verdict text, whichever side it came from
    pub fn accepted(&self) -> &str {
        match self {
            ReviewOutcome::Revised(s) | ReviewOutcome::DraftKept(s) => s,
        }
    }
}

/// Generic re-scoring pass for any draft JSON verdict
pub struct SelfConsistencyReviewer {
    producer: Arc<dyn VerdictProducer>,
    options: CompletionOptions,
}

impl SelfConsistencyReviewer {
    /// Create a reviewer over the given producer
    pub fn new(producer: Arc<dyn VerdictProducer>, options: CompletionOptions) -> Self {
        Self { producer, options }
    }

    /// Review a draft verdict for the labeled role.
    ///
    /// Never returns an error: every failure mode degrades to keeping the
    /// draft. Re-running on an already-consistent verdict is expected to
    /// return the same numbers, so repeated application does not drift.
    pub async fn review(&self, draft: &str, analyst_label: &str) -> ReviewOutcome {
        match self.try_review(draft, analyst_label).await {
            Ok(Some(revised)) => ReviewOutcome::Revised(revised),
            Ok(None) => {
                tracing::debug!(analyst_label, "review output unusable, keeping draft");
                ReviewOutcome::DraftKept(draft.to_string())
            }
            Err(err) => {
                tracing::warn!(analyst_label, error = %err, "review pass failed, keeping draft");
                ReviewOutcome::DraftKept(draft.to_string())
            }
        }
    }

    async fn try_review(&self, draft: &str, analyst_label: &str) -> Result<Option<String>> {
        let system = prompts::review_system_prompt(analyst_label);
        let user = prompts::review_user_prompt(draft);
        let raw = self.producer.produce(&system, &user, &self.options).await?;

        let Some(json) = extract_json_object(&raw) else {
            return Ok(None);
        };
        if serde_json::from_str::<serde_json::Value>(json)
            .map(|v| v.is_object())
            .unwrap_or(false)
        {
            Ok(Some(json.to_string()))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeskError;
    use async_trait::async_trait;

    struct ScriptedProducer {
        response: std::result::Result<String, String>,
    }

    #[async_trait]
    impl VerdictProducer for ScriptedProducer {
        async fn produce(
            &self,
            _system: &str,
            _user: &str,
            _options: &CompletionOptions,
        ) -> Result<String> {
            self.response
                .clone()
                .map_err(DeskError::LlmError)
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn reviewer(response: std::result::Result<String, String>) -> SelfConsistencyReviewer {
        SelfConsistencyReviewer::new(
            Arc::new(ScriptedProducer { response }),
            CompletionOptions::default(),
        )
    }

    const DRAFT: &str = r#"{"analyst": "News Analyst", "recommendation": "Hold", "conviction": 0.5}"#;

    #[tokio::test]
    async fn test_valid_revision_accepted() {
        let revised = r#"{"analyst": "News Analyst", "recommendation": "Hold", "conviction": 0.45}"#;
        let outcome = reviewer(Ok(revised.to_string()))
            .review(DRAFT, "News Analyst")
            .await;
        assert_eq!(outcome, ReviewOutcome::Revised(revised.to_string()));
    }

    #[tokio::test]
    async fn test_fenced_revision_unwrapped() {
        let outcome = reviewer(Ok(format!("```json\n{DRAFT}\n```")))
            .review(DRAFT, "News Analyst")
            .await;
        assert_eq!(outcome.accepted(), DRAFT);
        assert!(matches!(outcome, ReviewOutcome::Revised(_)));
    }

    #[tokio::test]
    async fn test_unparsable_review_keeps_draft() {
        let outcome = reviewer(Ok("I cannot review this.".to_string()))
            .review(DRAFT, "News Analyst")
            .await;
        assert_eq!(outcome, ReviewOutcome::DraftKept(DRAFT.to_string()));
    }

    #[tokio::test]
    async fn test_producer_error_keeps_draft() {
        let outcome = reviewer(Err("backend down".to_string()))
            .review(DRAFT, "News Analyst")
            .await;
        assert_eq!(outcome, ReviewOutcome::DraftKept(DRAFT.to_string()));
    }

    #[tokio::test]
    async fn test_idempotent_on_consistent_draft() {
        // A reviewer that echoes its input (the consistent-verdict case)
        // must not drift the numbers across repeated application.
        let first = reviewer(Ok(DRAFT.to_string())).review(DRAFT, "News Analyst").await;
        let second = reviewer(Ok(first.accepted().to_string()))
            .review(first.accepted(), "News Analyst")
            .await;
        assert_eq!(first.accepted(), second.accepted());
    }
}
