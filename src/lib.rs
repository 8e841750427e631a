//! Multi-analyst trading decision pipeline.
//!
//! A run takes one ticker and an as-of date through three phases:
//!
//! 1. **Fan-out**: the selected specialists (market, sentiment, news,
//!    fundamentals) and the always-on valuation analyst each gather their own
//!    upstream data, draft a structured verdict, and pass it through a
//!    self-consistency review. Correlated financial-statement fetches are
//!    deduplicated through a shared per-run cache.
//! 2. **Aggregation**: a join gate releases the PM stage once every gated
//!    verdict exists. The composite directional score is computed from fixed
//!    role weights, and a narrative pass wraps the numbers without authority
//!    over them.
//! 3. **Risk review**: five risk factors decay the PM conviction
//!    multiplicatively. Risk can shrink the position but never flips the
//!    direction.
//!
//! ```no_run
//! use agent_trading::config::DeskConfig;
//! use agent_trading::engine::TradingDesk;
//! use agent_trading::llm::OpenAiProducer;
//! use agent_trading::memory::InMemorySimilarityMemory;
//! use agent_trading::providers::{RestDataProvider, RestProviderConfig};
//! use std::sync::Arc;
//!
//! # async fn demo() -> agent_trading::error::Result<()> {
//! let desk = TradingDesk::new(
//!     DeskConfig::default(),
//!     Arc::new(RestDataProvider::new(RestProviderConfig::from_env()?)?),
//!     Arc::new(OpenAiProducer::from_env()?),
//!     Arc::new(InMemorySimilarityMemory::new()),
//! );
//! let report = desk.analyze("AAPL", "2025-06-02").await?;
//! println!("{}", report.decision.final_recommendation);
//! # Ok(())
//! # }
//! ```

pub mod analysts;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod memory;
pub mod prompts;
pub mod providers;
pub mod review;
pub mod scoring;
pub mod verdict;

pub use analysts::AnalystKind;
pub use config::DeskConfig;
pub use engine::{AnalysisReport, TradingDesk};
pub use error::{DeskError, Result};
pub use scoring::{FinalDecision, PmAggregate};
pub use verdict::Recommendation;
