//! Fundamentals specialist: financial statements and quality of earnings
//!
//! Statement fetches go through the shared per-run cache so the valuation
//! specialist reuses the same bundle instead of hitting the upstream twice.

use crate::cache::FetchedStatements;
use crate::engine::run::AnalysisRun;
use crate::providers::{or_error_payload, MarketDataProvider};

pub(super) const SYSTEM_PROMPT: &str = "You are a fundamental analyst on an \
equity research desk. You work from the financial statements: revenue and margin \
trajectory, balance-sheet strength, cash generation and earnings quality. You do \
not chart prices or follow headlines. Anchor every judgement to a figure in the \
statements and call out line items that look inconsistent across them.";

pub(super) async fn gather(
    provider: &dyn MarketDataProvider,
    run: &AnalysisRun,
) -> Vec<(String, String)> {
    let bundle = run
        .cache
        .acquire_or_fetch(&run.ticker, &run.as_of, "fundamentals", || async {
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

    match bundle {
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
    }
}
