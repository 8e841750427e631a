//! Command-line runner: one analysis run for a ticker and as-of date.
//!
//! ```text
//! DATA_API_BASE=http://localhost:8300/api/v1 \
//! OPENAI_API_KEY=sk-... \
//! desk AAPL 2025-06-02
//! ```

use agent_trading::config::DeskConfig;
use agent_trading::engine::TradingDesk;
use agent_trading::llm::OpenAiProducer;
use agent_trading::memory::InMemorySimilarityMemory;
use agent_trading::providers::{RestDataProvider, RestProviderConfig};
use anyhow::{bail, Context};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let ticker = match args.next() {
        Some(ticker) => ticker,
        None => bail!("usage: desk <TICKER> [AS_OF_DATE]"),
    };
    let as_of = args
        .next()
        .unwrap_or_else(|| chrono::Utc::now().format("%Y-%m-%d").to_string());

    let config = DeskConfig::default().with_env_model();
    let mut provider_config =
        RestProviderConfig::from_env().context("data provider configuration")?;
    provider_config.timeout = config.request_timeout;
    provider_config.cache_ttl = config.data_cache_ttl;
    let provider = RestDataProvider::new(provider_config).context("data provider setup")?;
    let producer = OpenAiProducer::from_env().context("verdict producer setup")?;

    let desk = TradingDesk::new(
        config,
        Arc::new(provider),
        Arc::new(producer),
        Arc::new(InMemorySimilarityMemory::new()),
    );

    let report = desk
        .analyze(&ticker, &as_of)
        .await
        .with_context(|| format!("analysis of {ticker} as of {as_of}"))?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
