//! Per-run state: stage outputs, timings, shared cache, final records
//!
//! One `AnalysisRun` exists per (ticker, as-of) submission. Stage outputs are
//! append/update-only and each stage key is written by exactly one task, so
//! the map itself is the only synchronization the publishers need.

use crate::cache::SharedFetchCache;
use crate::scoring::aggregate::PmAggregate;
use crate::scoring::risk::FinalDecision;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Identifier of one pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Market,
    Sentiment,
    News,
    Fundamentals,
    Valuation,
    Aggregation,
    RiskReview,
}

impl StageId {
    /// Stable name used in snapshots and logs
    pub fn name(&self) -> &'static str {
        match self {
            StageId::Market => "market",
            StageId::Sentiment => "sentiment",
            StageId::News => "news",
            StageId::Fundamentals => "fundamentals",
            StageId::Valuation => "valuation",
            StageId::Aggregation => "aggregation",
            StageId::RiskReview => "risk_review",
        }
    }
}

/// Wall-clock bounds of one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTiming {
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl StageTiming {
    /// Elapsed time, if the stage has ended
    pub fn elapsed(&self) -> Option<Duration> {
        self.ended_at
            .map(|end| (end - self.started_at).to_std().unwrap_or(Duration::ZERO))
    }
}

/// Mutable state of one analysis run
pub struct AnalysisRun {
    pub id: Uuid,
    pub ticker: String,
    pub as_of: String,
    pub created_at: DateTime<Utc>,
    pub cache: SharedFetchCache,
    stages: RwLock<HashMap<StageId, String>>,
    timings: RwLock<HashMap<StageId, StageTiming>>,
    aggregate: RwLock<Option<PmAggregate>>,
    decision: RwLock<Option<FinalDecision>>,
}

impl AnalysisRun {
    /// Create a run for the given ticker and as-of date
    pub fn new(ticker: impl Into<String>, as_of: impl Into<String>, cache_wait: Duration) -> Self {
        Self {
            id: Uuid::new_v4(),
            ticker: ticker.into(),
            as_of: as_of.into(),
            created_at: Utc::now(),
            cache: SharedFetchCache::new(cache_wait),
            stages: RwLock::new(HashMap::new()),
            timings: RwLock::new(HashMap::new()),
            aggregate: RwLock::new(None),
            decision: RwLock::new(None),
        }
    }

    /// Record the start timestamp of a stage
    pub async fn stage_started(&self, stage: StageId) {
        let mut timings = self.timings.write().await;
        timings.insert(
            stage,
            StageTiming {
                started_at: Utc::now(),
                ended_at: None,
            },
        );
    }

    /// Record the end timestamp of a stage
    pub async fn stage_ended(&self, stage: StageId) {
        let mut timings = self.timings.write().await;
        if let Some(timing) = timings.get_mut(&stage) {
            timing.ended_at = Some(Utc::now());
        }
    }

    /// Publish a stage output.
    ///
    /// Each stage key is owned by exactly one task; publishing twice for the
    /// same key overwrites, which only happens on the owner's own retries.
    pub async fn publish_stage(&self, stage: StageId, output: String) {
        {
            let mut stages = self.stages.write().await;
            stages.insert(stage, output);
        }
        tracing::info!(run = %self.id, stage = stage.name(), "stage output published");
    }

    /// Read one stage output
    pub async fn stage_output(&self, stage: StageId) -> Option<String> {
        let stages = self.stages.read().await;
        stages.get(&stage).cloned()
    }

    /// Consistent snapshot of every published stage output
    pub async fn stage_outputs(&self) -> HashMap<StageId, String> {
        self.stages.read().await.clone()
    }

    /// Whether a stage output is present and non-empty
    pub async fn stage_nonempty(&self, stage: StageId) -> bool {
        let stages = self.stages.read().await;
        stages
            .get(&stage)
            .map(|s| !s.trim().is_empty())
            .unwrap_or(false)
    }

    /// Store the PM aggregate (append-only: written once)
    pub async fn set_aggregate(&self, aggregate: PmAggregate) {
        let mut slot = self.aggregate.write().await;
        *slot = Some(aggregate);
    }

    /// Read the PM aggregate
    pub async fn aggregate(&self) -> Option<PmAggregate> {
        self.aggregate.read().await.clone()
    }

    /// Store the final decision; the run is immutable afterwards
    pub async fn set_decision(&self, decision: FinalDecision) {
        let mut slot = self.decision.write().await;
        *slot = Some(decision);
    }

    /// Read the final decision
    pub async fn decision(&self) -> Option<FinalDecision> {
        self.decision.read().await.clone()
    }

    /// Serializable snapshot for the polling surface
    pub async fn snapshot(&self) -> RunSnapshot {
        let stages = self.stages.read().await.clone();
        let timings = self.timings.read().await;
        let stage_timings = timings
            .iter()
            .map(|(stage, timing)| {
                (
                    stage.name().to_string(),
                    StageElapsed {
                        started_at: timing.started_at,
                        ended_at: timing.ended_at,
                        elapsed_ms: timing.elapsed().map(|d| d.as_millis() as u64),
                    },
                )
            })
            .collect();

        RunSnapshot {
            id: self.id,
            ticker: self.ticker.clone(),
            as_of: self.as_of.clone(),
            created_at: self.created_at,
            stages: stages
                .into_iter()
                .map(|(k, v)| (k.name().to_string(), v))
                .collect(),
            stage_timings,
            aggregate: self.aggregate.read().await.clone(),
            decision: self.decision.read().await.clone(),
        }
    }
}

/// Elapsed-time view of one stage for snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageElapsed {
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub elapsed_ms: Option<u64>,
}

/// Point-in-time view of a run, safe to hand to pollers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub id: Uuid,
    pub ticker: String,
    pub as_of: String,
    pub created_at: DateTime<Utc>,
    pub stages: HashMap<String, String>,
    pub stage_timings: HashMap<String, StageElapsed>,
    pub aggregate: Option<PmAggregate>,
    pub decision: Option<FinalDecision>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_and_read_stage() {
        let run = AnalysisRun::new("AAPL", "2025-06-02", Duration::from_millis(100));
        assert!(!run.stage_nonempty(StageId::Market).await);

        run.publish_stage(StageId::Market, "{\"recommendation\": \"Buy\"}".to_string())
            .await;
        assert!(run.stage_nonempty(StageId::Market).await);
        assert!(run
            .stage_output(StageId::Market)
            .await
            .unwrap()
            .contains("Buy"));
    }

    #[tokio::test]
    async fn test_blank_output_counts_as_empty() {
        let run = AnalysisRun::new("AAPL", "2025-06-02", Duration::from_millis(100));
        run.publish_stage(StageId::News, "   ".to_string()).await;
        assert!(!run.stage_nonempty(StageId::News).await);
    }

    #[tokio::test]
    async fn test_timings_record_start_and_end() {
        let run = AnalysisRun::new("AAPL", "2025-06-02", Duration::from_millis(100));
        run.stage_started(StageId::Market).await;
        run.stage_ended(StageId::Market).await;

        let snapshot = run.snapshot().await;
        let timing = snapshot.stage_timings.get("market").unwrap();
        assert!(timing.ended_at.is_some());
        assert!(timing.elapsed_ms.is_some());
    }

    #[tokio::test]
    async fn test_snapshot_serializes() {
        let run = AnalysisRun::new("AAPL", "2025-06-02", Duration::from_millis(100));
        run.publish_stage(StageId::Market, "{}".to_string()).await;
        let snapshot = run.snapshot().await;
        let json = serde_json::to_string(&snapshot).unwrap();
        assert!(json.contains("\"ticker\":\"AAPL\""));
    }
}
