//! Market/technical specialist: price action and indicator readings

use crate::engine::run::AnalysisRun;
use crate::providers::{or_error_payload, MarketDataProvider};

/// Trading days of price history handed to the specialist
const PRICE_LOOKBACK_DAYS: u32 = 90;

pub(super) const SYSTEM_PROMPT: &str = "You are a technical market analyst on an \
equity research desk. You judge a stock purely on price action: trend structure, \
momentum, support and resistance, and indicator readings such as RSI, MACD and \
moving averages. You never consider fundamentals or news. Ground every claim in \
the supplied data and state when the data is too thin to call a direction.";

pub(super) async fn gather(
    provider: &dyn MarketDataProvider,
    run: &AnalysisRun,
) -> Vec<(String, String)> {
    let prices = provider
        .price_window(&run.ticker, &run.as_of, PRICE_LOOKBACK_DAYS)
        .await;
    let indicators = provider.indicators(&run.ticker, &run.as_of).await;
    vec![
        (
            "price history".to_string(),
            or_error_payload(prices, "price history"),
        ),
        (
            "technical indicators".to_string(),
            or_error_payload(indicators, "technical indicators"),
        ),
    ]
}
