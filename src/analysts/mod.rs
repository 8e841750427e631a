//! Specialist analyst tasks
//!
//! Five independently schedulable specialists share one execution flow:
//! gather inputs, clip oversized payloads, draft a structured verdict via the
//! producer, run the self-consistency review, publish into the run. A
//! specialist degrades on upstream failures but never aborts the run.

mod fundamentals;
mod market;
mod news;
mod sentiment;
mod valuation;

use crate::config::DeskConfig;
use crate::engine::run::{AnalysisRun, StageId};
use crate::error::DeskError;
use crate::llm::{CompletionOptions, VerdictProducer};
use crate::prompts::{clip_text, output_format_instructions};
use crate::providers::MarketDataProvider;
use crate::review::SelfConsistencyReviewer;
use crate::verdict::parse_verdict;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// The five specialist variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalystKind {
    Market,
    Sentiment,
    News,
    Fundamentals,
    Valuation,
}

impl AnalystKind {
    /// All variants in scheduling order
    pub fn all() -> [AnalystKind; 5] {
        [
            AnalystKind::Market,
            AnalystKind::Sentiment,
            AnalystKind::News,
            AnalystKind::Fundamentals,
            AnalystKind::Valuation,
        ]
    }

    /// Label attached to the verdict; drives PM role inference downstream
    pub fn label(&self) -> &'static str {
        match self {
            AnalystKind::Market => "Market/Technical Analyst",
            AnalystKind::Sentiment => "Social/Sentiment Analyst",
            AnalystKind::News => "News Analyst",
            AnalystKind::Fundamentals => "Fundamental Analyst",
            AnalystKind::Valuation => "Valuation Analyst",
        }
    }

    /// Stage key owned by this specialist
    pub fn stage_id(&self) -> StageId {
        match self {
            AnalystKind::Market => StageId::Market,
            AnalystKind::Sentiment => StageId::Sentiment,
            AnalystKind::News => StageId::News,
            AnalystKind::Fundamentals => StageId::Fundamentals,
            AnalystKind::Valuation => StageId::Valuation,
        }
    }

    fn system_prompt(&self) -> &'static str {
        match self {
            AnalystKind::Market => market::SYSTEM_PROMPT,
            AnalystKind::Sentiment => sentiment::SYSTEM_PROMPT,
            AnalystKind::News => news::SYSTEM_PROMPT,
            AnalystKind::Fundamentals => fundamentals::SYSTEM_PROMPT,
            AnalystKind::Valuation => valuation::SYSTEM_PROMPT,
        }
    }
}

/// One schedulable specialist bound to its collaborators
pub struct SpecialistTask {
    kind: AnalystKind,
    provider: Arc<dyn MarketDataProvider>,
    producer: Arc<dyn VerdictProducer>,
    reviewer: SelfConsistencyReviewer,
    config: Arc<DeskConfig>,
    options: CompletionOptions,
}

impl SpecialistTask {
    /// Create a specialist of the given kind
    pub fn new(
        kind: AnalystKind,
        provider: Arc<dyn MarketDataProvider>,
        producer: Arc<dyn VerdictProducer>,
        config: Arc<DeskConfig>,
    ) -> Self {
        let options = CompletionOptions {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        };
        let reviewer = SelfConsistencyReviewer::new(Arc::clone(&producer), options.clone());
        Self {
            kind,
            provider,
            producer,
            reviewer,
            config,
            options,
        }
    }

    /// The specialist's kind
    pub fn kind(&self) -> AnalystKind {
        self.kind
    }

    /// Run the full specialist flow against the given run.
    ///
    /// Always publishes a non-empty stage output, even when every upstream
    /// input and the producer itself failed.
    pub async fn execute(&self, run: &AnalysisRun) {
        let stage = self.kind.stage_id();
        let label = self.kind.label();
        run.stage_started(stage).await;
        tracing::info!(run = %run.id, analyst = label, "specialist started");

        let inputs = self.gather(run).await;
        let prompt = self.build_prompt(run, &inputs);

        let draft = match self
            .producer
            .produce(self.kind.system_prompt(), &prompt, &self.options)
            .await
        {
            Ok(draft) => draft,
            Err(err) => {
                tracing::warn!(run = %run.id, analyst = label, error = %err, "draft failed, publishing degraded verdict");
                let degraded = serde_json::json!({
                    "analyst": label,
                    "error": err.to_string(),
                })
                .to_string();
                run.publish_stage(stage, degraded).await;
                run.stage_ended(stage).await;
                return;
            }
        };

        let accepted = self.reviewer.review(&draft, label).await;
        let output = accepted.accepted().to_string();
        self.audit_verdict(run, label, &output);
        run.publish_stage(stage, output).await;
        run.stage_ended(stage).await;
    }

    /// Surface schema and cross-field problems in the accepted output.
    ///
    /// The verdict is published as-is either way: a conviction that
    /// contradicts its stated category is a signal about the model worth
    /// keeping in the record, not something to silently rewrite.
    fn audit_verdict(&self, run: &AnalysisRun, label: &str, output: &str) {
        match parse_verdict(output) {
            Some(verdict) => {
                if !verdict.is_internally_consistent() {
                    tracing::warn!(
                        run = %run.id,
                        analyst = label,
                        conviction = verdict.conviction,
                        category = %verdict.conviction_category,
                        "verdict conviction inconsistent with stated category"
                    );
                }
            }
            None => {
                let err = DeskError::VerdictParse {
                    stage: label.to_string(),
                    reason: "accepted output does not match the verdict schema".to_string(),
                };
                tracing::warn!(run = %run.id, analyst = label, error = %err, "verdict audit failed");
            }
        }
    }

    async fn gather(&self, run: &AnalysisRun) -> Vec<(String, String)> {
        let provider = self.provider.as_ref();
        match self.kind {
            AnalystKind::Market => market::gather(provider, run).await,
            AnalystKind::Sentiment => sentiment::gather(provider, run).await,
            AnalystKind::News => news::gather(provider, run).await,
            AnalystKind::Fundamentals => fundamentals::gather(provider, run).await,
            AnalystKind::Valuation => valuation::gather(provider, run).await,
        }
    }

    fn build_prompt(&self, run: &AnalysisRun, inputs: &[(String, String)]) -> String {
        let mut prompt = format!(
            "Analyze {ticker} as of {as_of} using only the data below.\n\n",
            ticker = run.ticker,
            as_of = run.as_of
        );
        for (label, payload) in inputs {
            let clipped = clip_text(payload, label, self.config.clip_budget);
            prompt.push_str(&format!("### {label}\n{clipped}\n\n"));
        }
        prompt.push_str(&output_format_instructions(
            self.kind.label(),
            self.kind == AnalystKind::Valuation,
        ));
        prompt
    }
}
