//! News specialist: company headlines against the macro backdrop

use crate::engine::run::AnalysisRun;
use crate::providers::{or_error_payload, MarketDataProvider};

const NEWS_LOOKBACK_DAYS: u32 = 7;

pub(super) const SYSTEM_PROMPT: &str = "You are a news analyst on an equity \
research desk. You weigh recent company headlines against the broader macro and \
market backdrop to judge whether the news flow supports or undermines the stock. \
Separate material developments from filler coverage and flag any macro condition \
that could dominate the company-specific story.";

pub(super) async fn gather(
    provider: &dyn MarketDataProvider,
    run: &AnalysisRun,
) -> Vec<(String, String)> {
    let company = provider
        .company_news(&run.ticker, &run.as_of, NEWS_LOOKBACK_DAYS)
        .await;
    let global = provider.global_news(&run.as_of, NEWS_LOOKBACK_DAYS).await;
    vec![
        (
            "company headlines".to_string(),
            or_error_payload(company, "company headlines"),
        ),
        (
            "global and macro headlines".to_string(),
            or_error_payload(global, "global and macro headlines"),
        ),
    ]
}
