//! Valuation specialist: fair-value estimate from the shared statement bundle
//!
//! Runs alongside the gated analysts and contributes an enrichment verdict;
//! the aggregation gate does not wait for it.

use crate::cache::FetchedStatements;
use crate::engine::run::AnalysisRun;
use crate::providers::{or_error_payload, MarketDataProvider};

pub(super) const SYSTEM_PROMPT: &str = "You are a valuation analyst on an equity \
research desk. You estimate what the stock is worth from its statements, current \
price and peer set, using multiples and simple cash-flow reasoning, then compare \
that estimate to the market price. State your fair-value range, the method behind \
it, and how wide the uncertainty band is.";

pub(super) async fn gather(
    provider: &dyn MarketDataProvider,
    run: &AnalysisRun,
) -> Vec<(String, String)> {
    let bundle = run
        .cache
        .acquire_or_fetch(&run.ticker, &run.as_of, "valuation", || async {
            Ok(FetchedStatements {
                fundamentals: or_error_payload(
                    provider.fundamentals(&run.ticker, &run.as_of).await,
                    "fundamental snapshot",
                ),
                balance_sheet: or_error_payload(
                    provider.balance_sheet(&run.ticker, &run.as_of).await,
                    "balance sheet",
                ),
                cashflow: or_error_payload(
                    provider.cashflow(&run.ticker, &run.as_of).await,
                    "cashflow statement",
                ),
                income_statement: or_error_payload(
                    provider.income_statement(&run.ticker, &run.as_of).await,
                    "income statement",
                ),
            })
        })
        .await;

    let mut inputs = match bundle {
        Ok(bundle) => vec![
            (
                "fundamental snapshot".to_string(),
                bundle.fundamentals.clone(),
            ),
            ("balance sheet".to_string(), bundle.balance_sheet.clone()),
            ("cashflow statement".to_string(), bundle.cashflow.clone()),
            (
                "income statement".to_string(),
                bundle.income_statement.clone(),
            ),
        ],
        Err(err) => vec![(
            "financial statements".to_string(),
            or_error_payload(Err(err), "financial statements"),
        )],
    };

    let price = provider.current_price(&run.ticker, &run.as_of).await;
    let peers = provider.peer_companies(&run.ticker).await;
    inputs.push((
        "current price".to_string(),
        or_error_payload(price, "current price"),
    ));
    inputs.push((
        "peer companies".to_string(),
        or_error_payload(peers, "peer companies"),
    ));
    inputs
}
