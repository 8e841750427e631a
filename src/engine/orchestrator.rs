//! Fan-out/fan-in driver for one analysis run
//!
//! `TradingDesk` schedules the selected specialists in parallel, releases
//! aggregation through the join gate the moment every gated output exists,
//! then runs the risk review over the aggregate. Valuation is scheduled
//! unconditionally as enrichment and never holds the gate.

use super::join::JoinGate;
use super::run::{AnalysisRun, RunSnapshot, StageId};
use crate::analysts::{AnalystKind, SpecialistTask};
use crate::config::DeskConfig;
use crate::error::{DeskError, Result};
use crate::llm::{CompletionOptions, VerdictProducer};
use crate::memory::{format_lessons, SimilarityMemory};
use crate::prompts;
use crate::providers::MarketDataProvider;
use crate::scoring::aggregate::{directional_score, PmAggregate};
use crate::scoring::risk::{FinalDecision, RiskAdjustmentEngine};
use crate::verdict::{extract_json_object, extract_pm_entry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Completed run: snapshot plus the typed aggregation and decision records
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub snapshot: RunSnapshot,
    pub aggregate: PmAggregate,
    /// Qualitative synthesis of the aggregate; absent when the producer failed
    pub narrative: Option<String>,
    pub decision: FinalDecision,
}

/// The desk: bound collaborators plus configuration, reusable across runs
pub struct TradingDesk {
    config: Arc<DeskConfig>,
    provider: Arc<dyn MarketDataProvider>,
    producer: Arc<dyn VerdictProducer>,
    memory: Arc<dyn SimilarityMemory>,
}

impl TradingDesk {
    /// Create a desk over the given collaborators
    pub fn new(
        config: DeskConfig,
        provider: Arc<dyn MarketDataProvider>,
        producer: Arc<dyn VerdictProducer>,
        memory: Arc<dyn SimilarityMemory>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            provider,
            producer,
            memory,
        }
    }

    fn options(&self) -> CompletionOptions {
        CompletionOptions {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        }
    }

    /// Analysts scheduled for a run: the configured selection, deduplicated,
    /// with valuation always appended.
    fn scheduled(&self) -> Vec<AnalystKind> {
        let mut kinds: Vec<AnalystKind> = Vec::new();
        for kind in &self.config.selected_analysts {
            if !kinds.contains(kind) {
                kinds.push(*kind);
            }
        }
        if !kinds.contains(&AnalystKind::Valuation) {
            kinds.push(AnalystKind::Valuation);
        }
        kinds
    }

    /// Run the full pipeline for one (ticker, as-of) submission.
    ///
    /// Configuration problems are the only fatal pre-scheduling errors; once
    /// the fan-out starts, failures degrade individual stages instead of
    /// aborting the run.
    pub async fn analyze(&self, ticker: &str, as_of: &str) -> Result<AnalysisReport> {
        validate_ticker(ticker)?;
        self.config.validate()?;

        let run = Arc::new(AnalysisRun::new(ticker, as_of, self.config.cache_wait));
        let scheduled = self.scheduled();
        let gate = JoinGate::new(&scheduled);
        tracing::info!(
            run = %run.id,
            ticker,
            as_of,
            analysts = scheduled.len(),
            "analysis run started"
        );

        let mut tasks = JoinSet::new();
        for kind in &scheduled {
            let task = SpecialistTask::new(
                *kind,
                Arc::clone(&self.provider),
                Arc::clone(&self.producer),
                Arc::clone(&self.config),
            );
            let run = Arc::clone(&run);
            tasks.spawn(async move { task.execute(&run).await });
        }

        let mut aggregate: Option<PmAggregate> = None;
        let mut narrative: Option<String> = None;
        let mut lessons = String::new();

        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                tracing::error!(run = %run.id, error = %err, "specialist task panicked");
            }
            if gate.try_fire(&run).await {
                let (agg, narr, lsn) = self.aggregate_stage(&run, &scheduled).await;
                aggregate = Some(agg);
                narrative = narr;
                lessons = lsn;
            }
        }

        // Every specialist publishes a non-empty output even on failure, so a
        // closed gate here means a stage key was never written at all.
        let aggregate = match aggregate {
            Some(aggregate) => aggregate,
            None => {
                return Err(DeskError::DataUnavailable {
                    ticker: ticker.to_string(),
                    reason: "required analyst outputs never arrived".to_string(),
                })
            }
        };

        let decision = self.risk_stage(&run, &aggregate, &lessons).await;
        self.record_lesson(&run, &decision).await;

        let snapshot = run.snapshot().await;
        tracing::info!(
            run = %run.id,
            direction = %decision.final_recommendation,
            adjusted = decision.adjusted_conviction,
            "analysis run finished"
        );
        Ok(AnalysisReport {
            snapshot,
            aggregate,
            narrative,
            decision,
        })
    }

    /// Aggregation stage: collect published verdicts, compute the directional
    /// score, then wrap it in a narrative synthesis whose numbers stay
    /// subordinate to the computed aggregate.
    async fn aggregate_stage(
        &self,
        run: &AnalysisRun,
        scheduled: &[AnalystKind],
    ) -> (PmAggregate, Option<String>, String) {
        run.stage_started(StageId::Aggregation).await;

        let outputs = run.stage_outputs().await;
        let mut entries = Vec::new();
        let mut reports = Vec::new();
        for kind in scheduled {
            let Some(output) = outputs.get(&kind.stage_id()) else {
                continue;
            };
            reports.push((kind.label().to_string(), output.clone()));
            match extract_pm_entry(output, kind.label()) {
                Some(entry) => entries.push(entry),
                None => {
                    tracing::warn!(
                        run = %run.id,
                        analyst = kind.label(),
                        "verdict unusable for scoring, dropped from aggregate"
                    );
                }
            }
        }

        let mut aggregate = directional_score(&entries, self.config.pm_threshold);

        let situation = reports
            .iter()
            .map(|(label, text)| format!("{label}: {text}"))
            .collect::<Vec<_>>()
            .join("\n");
        let matches = self
            .memory
            .retrieve_similar(&situation, self.config.memory_matches)
            .await;
        let lessons = format_lessons(&matches);

        let prompt = prompts::pm_narrative_prompt(&aggregate, &reports, &lessons);
        let narrative = match self.producer.produce("", &prompt, &self.options()).await {
            Ok(text) => {
                if aggregate.conflict_level.is_none() {
                    aggregate.conflict_level = extract_conflict_level(&text);
                }
                Some(text)
            }
            Err(err) => {
                tracing::warn!(run = %run.id, error = %err, "narrative synthesis failed, keeping numeric aggregate");
                None
            }
        };

        run.set_aggregate(aggregate.clone()).await;
        let published = serde_json::to_string(&aggregate)
            .unwrap_or_else(|_| "{\"error\": \"aggregate serialization failed\"}".to_string());
        run.publish_stage(StageId::Aggregation, published).await;
        run.stage_ended(StageId::Aggregation).await;

        (aggregate, narrative, lessons)
    }

    /// Risk review stage over the frozen aggregate
    async fn risk_stage(
        &self,
        run: &AnalysisRun,
        aggregate: &PmAggregate,
        lessons: &str,
    ) -> FinalDecision {
        run.stage_started(StageId::RiskReview).await;

        let outputs = run.stage_outputs().await;
        let reports: Vec<(String, String)> = AnalystKind::all()
            .iter()
            .filter_map(|kind| {
                outputs
                    .get(&kind.stage_id())
                    .map(|output| (kind.label().to_string(), output.clone()))
            })
            .collect();

        let engine = RiskAdjustmentEngine::new(Arc::clone(&self.producer), self.options());
        let decision = engine.evaluate(aggregate, &reports, lessons).await;

        run.set_decision(decision.clone()).await;
        let published = serde_json::to_string(&decision)
            .unwrap_or_else(|_| "{\"error\": \"decision serialization failed\"}".to_string());
        run.publish_stage(StageId::RiskReview, published).await;
        run.stage_ended(StageId::RiskReview).await;
        decision
    }

    async fn record_lesson(&self, run: &AnalysisRun, decision: &FinalDecision) {
        let situation = format!(
            "{} as of {}: {}",
            run.ticker,
            run.as_of,
            run.stage_outputs()
                .await
                .values()
                .cloned()
                .collect::<Vec<_>>()
                .join("\n")
        );
        let lesson = format!(
            "{} on {}: {} with adjusted conviction {:.2}. {}",
            run.ticker,
            run.as_of,
            decision.final_recommendation,
            decision.adjusted_conviction,
            decision.explanation
        );
        self.memory.store(&situation, &lesson).await;
    }
}

/// Pull `summary.conflict_level` out of a narrative response, if present
fn extract_conflict_level(narrative: &str) -> Option<f64> {
    let json = extract_json_object(narrative)?;
    let value: serde_json::Value = serde_json::from_str(json).ok()?;
    let conflict = value.pointer("/summary/conflict_level")?.as_f64()?;
    Some(conflict.clamp(0.0, 1.0))
}

fn validate_ticker(ticker: &str) -> Result<()> {
    let valid = !ticker.is_empty()
        && ticker.len() <= 12
        && ticker
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(DeskError::InvalidTicker(ticker.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysts::tests::FakeProvider;
    use crate::memory::InMemorySimilarityMemory;
    use crate::verdict::Recommendation;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Produces a Buy verdict for every analyst request, a narrative for the
    /// PM request, and a risk JSON for risk requests.
    struct DeskProducer {
        calls: AtomicUsize,
    }

    impl DeskProducer {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl VerdictProducer for DeskProducer {
        async fn produce(
            &self,
            _system: &str,
            user: &str,
            _options: &CompletionOptions,
        ) -> crate::error::Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if user.contains("Risk Manager") || user.contains("verifier for the Risk Manager") {
                return Ok(r#"{
                    "risk_level": "Medium",
                    "risk_factor_rc": 0.2,
                    "risk_factor_rm": "None",
                    "disagreement": 0.0,
                    "valuation_uncertainty": 0.1,
                    "sentiment_risk_score": 0.0,
                    "macro_risk_warning": "None",
                    "final_recommendation": "Buy",
                    "recommendation_adjustment": "trim position size",
                    "explanation": "residual single-name risk"
                }"#
                .to_string());
            }
            if let Some(rest) = user.split("Draft JSON to review:\n").nth(1) {
                let draft = rest.split("\n\nRe-evaluate").next().unwrap_or(rest);
                return Ok(draft.to_string());
            }
            if user.contains("PM Engine") {
                return Ok(r#"{
                    "module": "AnalystAggregation",
                    "summary": {
                        "overall_signal": "Bullish",
                        "bullish_strength": 0.75,
                        "bearish_strength": 0.0,
                        "conflict_level": 0.1,
                        "interpretation": "aligned views"
                    },
                    "bullish_indicators": [],
                    "bearish_indicators": [],
                    "conflicting_indicators": []
                }"#
                .to_string());
            }
            let label = user
                .split("- Set \"analyst\" to \"")
                .nth(1)
                .and_then(|rest| rest.split('"').next())
                .unwrap_or("Analyst");
            Ok(serde_json::json!({
                "analyst": label,
                "recommendation": "Buy",
                "conviction": 0.75,
                "conviction_category": "High",
                "evidence_strength": 0.8,
                "signal_clarity": 0.8,
                "data_quality": 0.8,
                "uncertainty_penalty": 0.1,
                "key_factors": ["a", "b", "c", "d", "e"],
                "risks": ["x", "y"],
                "overall_comment": "constructive",
                "time_horizon": "6",
                "confidence_level": "High",
                "data_sources": ["prices"]
            })
            .to_string())
        }

        fn name(&self) -> &str {
            "desk-test"
        }
    }

    fn desk() -> TradingDesk {
        TradingDesk::new(
            DeskConfig::default(),
            Arc::new(FakeProvider { fail_news: false }),
            Arc::new(DeskProducer::new()),
            Arc::new(InMemorySimilarityMemory::new()),
        )
    }

    #[tokio::test]
    async fn test_full_run_produces_buy_report() {
        let report = desk().analyze("AAPL", "2025-06-02").await.unwrap();

        assert_eq!(report.aggregate.direction, Recommendation::Buy);
        assert_eq!(report.decision.final_recommendation, Recommendation::Buy);
        assert!(report.decision.adjusted_conviction <= report.decision.original_conviction);
        assert!(report.narrative.is_some());
        // All five specialists plus aggregation and risk review published.
        assert_eq!(report.snapshot.stages.len(), 7);
    }

    #[tokio::test]
    async fn test_conflict_level_lifted_from_narrative() {
        let report = desk().analyze("AAPL", "2025-06-02").await.unwrap();
        assert_eq!(report.aggregate.conflict_level, Some(0.1));
    }

    #[tokio::test]
    async fn test_invalid_ticker_rejected_before_scheduling() {
        let err = desk().analyze("not a ticker!!", "2025-06-02").await.unwrap_err();
        assert!(matches!(err, DeskError::InvalidTicker(_)));
    }

    #[tokio::test]
    async fn test_valuation_always_scheduled() {
        let desk = TradingDesk::new(
            DeskConfig::builder()
                .selected_analysts(vec![AnalystKind::Market])
                .build()
                .unwrap(),
            Arc::new(FakeProvider { fail_news: false }),
            Arc::new(DeskProducer::new()),
            Arc::new(InMemorySimilarityMemory::new()),
        );
        let report = desk.analyze("MSFT", "2025-06-02").await.unwrap();
        assert!(report.snapshot.stages.contains_key("valuation"));
    }

    #[tokio::test]
    async fn test_lessons_accumulate_across_runs() {
        let memory = Arc::new(InMemorySimilarityMemory::new());
        let desk = TradingDesk::new(
            DeskConfig::default(),
            Arc::new(FakeProvider { fail_news: false }),
            Arc::new(DeskProducer::new()),
            Arc::clone(&memory) as Arc<dyn SimilarityMemory>,
        );
        desk.analyze("AAPL", "2025-06-02").await.unwrap();

        let matches = memory.retrieve_similar("AAPL analysis", 1).await;
        assert_eq!(matches.len(), 1);
        assert!(matches[0].recommendation.contains("Buy"));
    }

    #[test]
    fn test_ticker_validation() {
        assert!(validate_ticker("AAPL").is_ok());
        assert!(validate_ticker("BRK.B").is_ok());
        assert!(validate_ticker("").is_err());
        assert!(validate_ticker("WAY-TOO-LONG-SYMBOL").is_err());
    }
}
