//! Run orchestration: per-run state, the aggregation join gate, and the
//! fan-out/fan-in driver.

pub mod join;
pub mod orchestrator;
pub mod run;

pub use join::{GateState, JoinGate};
pub use orchestrator::{AnalysisReport, TradingDesk};
pub use run::{AnalysisRun, RunSnapshot, StageId};
