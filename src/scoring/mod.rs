//! Deterministic scoring: the PM directional aggregate and risk decay.

pub mod aggregate;
pub mod risk;

pub use aggregate::{directional_score, AnalystRole, PmAggregate, PmInput};
pub use risk::{apply_risk_decay, FinalDecision, RiskAdjustmentEngine, RiskFactors, RiskLevel};
