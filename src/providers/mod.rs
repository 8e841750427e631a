//! Upstream market-data collaborator seam
//!
//! The pipeline only depends on the call signatures and result shapes here.
//! Every operation returns a textual payload destined for a prompt; transport
//! details live in the implementations.

mod rest;

pub use rest::{RestDataProvider, RestProviderConfig};

use crate::error::Result;
use async_trait::async_trait;

/// Upstream data operations keyed by ticker and as-of date or date range.
///
/// Implementations must return either a structured payload or an `Err` the
/// caller converts into an explicit error payload; they never panic.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Daily price bars for a window ending at `as_of`
    async fn price_window(&self, ticker: &str, as_of: &str, lookback_days: u32) -> Result<String>;

    /// Technical indicator values (RSI, MACD, moving averages) as of the date
    async fn indicators(&self, ticker: &str, as_of: &str) -> Result<String>;

    /// Fundamental snapshot
    async fn fundamentals(&self, ticker: &str, as_of: &str) -> Result<String>;

    /// Quarterly balance sheet
    async fn balance_sheet(&self, ticker: &str, as_of: &str) -> Result<String>;

    /// Quarterly cashflow statement
    async fn cashflow(&self, ticker: &str, as_of: &str) -> Result<String>;

    /// Quarterly income statement
    async fn income_statement(&self, ticker: &str, as_of: &str) -> Result<String>;

    /// Company headlines for a window ending at `as_of`
    async fn company_news(&self, ticker: &str, as_of: &str, lookback_days: u32) -> Result<String>;

    /// Global/macro headlines for a window ending at `as_of`
    async fn global_news(&self, as_of: &str, lookback_days: u32) -> Result<String>;

    /// Insider sentiment summary
    async fn insider_sentiment(&self, ticker: &str, as_of: &str) -> Result<String>;

    /// Insider transactions
    async fn insider_transactions(&self, ticker: &str, as_of: &str) -> Result<String>;

    /// Latest traded price as of the date
    async fn current_price(&self, ticker: &str, as_of: &str) -> Result<String>;

    /// Peer-company tickers
    async fn peer_companies(&self, ticker: &str) -> Result<String>;
}

/// Convert a fetch result into prompt text, substituting an explicit error
/// payload on failure. Upstream errors degrade the verdict, never the run.
pub fn or_error_payload(result: Result<String>, label: &str) -> String {
    match result {
        Ok(payload) => payload,
        Err(err) => {
            tracing::warn!(label, error = %err, "upstream fetch failed, substituting error payload");
            serde_json::json!({
                "error": err.to_string(),
                "source": label,
            })
            .to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DeskError;

    #[test]
    fn test_or_error_payload_passthrough() {
        let payload = or_error_payload(Ok("{\"close\": 101.5}".to_string()), "prices");
        assert_eq!(payload, "{\"close\": 101.5}");
    }

    #[test]
    fn test_or_error_payload_substitution() {
        let payload = or_error_payload(
            Err(DeskError::ApiError("rate limited".to_string())),
            "prices",
        );
        let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
        assert_eq!(value["source"], "prices");
        assert!(value["error"].as_str().unwrap().contains("rate limited"));
    }
}
