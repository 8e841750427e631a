//! Sentiment specialist: insider activity and company chatter

use crate::engine::run::AnalysisRun;
use crate::providers::{or_error_payload, MarketDataProvider};

const NEWS_LOOKBACK_DAYS: u32 = 7;

pub(super) const SYSTEM_PROMPT: &str = "You are a sentiment analyst on an equity \
research desk. You read insider sentiment, insider transactions and recent \
company coverage to judge how insiders and the market feel about the stock right \
now. Distinguish durable shifts in tone from one-off noise, and say plainly when \
the signal is too weak to act on.";

pub(super) async fn gather(
    provider: &dyn MarketDataProvider,
    run: &AnalysisRun,
) -> Vec<(String, String)> {
    let insider_sentiment = provider.insider_sentiment(&run.ticker, &run.as_of).await;
    let insider_transactions = provider
        .insider_transactions(&run.ticker, &run.as_of)
        .await;
    let news = provider
        .company_news(&run.ticker, &run.as_of, NEWS_LOOKBACK_DAYS)
        .await;
    vec![
        (
            "insider sentiment".to_string(),
            or_error_payload(insider_sentiment, "insider sentiment"),
        ),
        (
            "insider transactions".to_string(),
            or_error_payload(insider_transactions, "insider transactions"),
        ),
        (
            "recent company coverage".to_string(),
            or_error_payload(news, "recent company coverage"),
        ),
    ]
}
