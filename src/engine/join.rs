//! Join gate releasing aggregation once all required analyst outputs exist
//!
//! Valuation is tracked like any other stage but never gates: it runs in
//! parallel and must not block progression. The gate fires at most once per
//! run regardless of how many publications arrive afterwards.

use super::run::{AnalysisRun, StageId};
use crate::analysts::AnalystKind;
use std::sync::atomic::{AtomicBool, Ordering};

/// Observable gate state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Waiting,
    Ready,
}

/// Barrier between the analyst fan-out and the aggregation stage
pub struct JoinGate {
    required: Vec<StageId>,
    fired: AtomicBool,
}

impl JoinGate {
    /// Build a gate for the selected analysts, excluding Valuation
    pub fn new(selected: &[AnalystKind]) -> Self {
        let required = selected
            .iter()
            .filter(|kind| **kind != AnalystKind::Valuation)
            .map(|kind| kind.stage_id())
            .collect();
        Self {
            required,
            fired: AtomicBool::new(false),
        }
    }

    /// Stages the gate waits for
    pub fn required(&self) -> &[StageId] {
        &self.required
    }

    /// Whether every required output is present and non-empty
    pub async fn is_ready(&self, run: &AnalysisRun) -> bool {
        for stage in &self.required {
            if !run.stage_nonempty(*stage).await {
                return false;
            }
        }
        true
    }

    /// Current state against the given run
    pub async fn state(&self, run: &AnalysisRun) -> GateState {
        if self.is_ready(run).await {
            GateState::Ready
        } else {
            GateState::Waiting
        }
    }

    /// Fire exactly once: returns true for the single caller that observes
    /// the waiting-to-ready transition, false for everyone else.
    pub async fn try_fire(&self, run: &AnalysisRun) -> bool {
        if !self.is_ready(run).await {
            return false;
        }
        let first = !self.fired.swap(true, Ordering::SeqCst);
        if first {
            tracing::info!(run = %run.id, "join gate ready, releasing aggregation");
        }
        first
    }

    /// Whether the gate already fired
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}
