//! REST/JSON implementation of the market-data collaborator
//!
//! Talks to a data gateway exposing flat JSON endpoints per dataset and keeps
//! a TTL cache of responses so repeated runs against the same (ticker, date)
//! do not re-hit the upstream.

use super::MarketDataProvider;
use crate::error::{DeskError, Result};
use async_trait::async_trait;
use cached::{Cached, TimedCache};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Configuration for the REST data provider
#[derive(Debug, Clone)]
pub struct RestProviderConfig {
    /// Base URL of the data gateway, e.g. "http://localhost:8300/api/v1"
    pub base_url: String,
    /// Optional bearer token
    pub api_key: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// TTL for cached responses
    pub cache_ttl: Duration,
}

impl RestProviderConfig {
    /// Create a config for the given gateway base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: None,
            timeout: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(3600),
        }
    }

    /// Attach a bearer token
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Build a config from `DATA_API_BASE` / `DATA_API_KEY`
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("DATA_API_BASE")
            .map_err(|_| DeskError::ConfigError("DATA_API_BASE not set".to_string()))?;
        let mut config = Self::new(base_url);
        if let Ok(key) = std::env::var("DATA_API_KEY") {
            config.api_key = Some(key);
        }
        Ok(config)
    }
}

/// Market-data provider backed by a JSON REST gateway
pub struct RestDataProvider {
    client: Client,
    config: RestProviderConfig,
    cache: Arc<RwLock<TimedCache<String, String>>>,
}

impl RestDataProvider {
    /// Create a provider with the given configuration
    pub fn new(config: RestProviderConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let cache = Arc::new(RwLock::new(TimedCache::with_lifespan(config.cache_ttl)));
        Ok(Self {
            client,
            config,
            cache,
        })
    }

    async fn get(&self, endpoint: &str, params: &[(&str, String)]) -> Result<String> {
        let cache_key = format!(
            "{endpoint}?{}",
            params
                .iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect::<Vec<_>>()
                .join("&")
        );

        {
            let mut cache = self.cache.write().await;
            if let Some(hit) = cache.cache_get(&cache_key) {
                tracing::debug!(endpoint, "data cache hit");
                return Ok(hit.clone());
            }
        }

        let url = format!("{}/{endpoint}", self.config.base_url);
        let mut request = self.client.get(&url).query(params);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        tracing::debug!(endpoint, "fetching from data gateway");
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(DeskError::ApiError(format!(
                "{endpoint} returned {status}: {detail}"
            )));
        }

        let body: serde_json::Value = response.json().await?;
        let payload = body.to_string();

        let mut cache = self.cache.write().await;
        let _ = cache.cache_set(cache_key, payload.clone());
        Ok(payload)
    }
}

#[async_trait]
impl MarketDataProvider for RestDataProvider {
    async fn price_window(&self, ticker: &str, as_of: &str, lookback_days: u32) -> Result<String> {
        self.get(
            "prices",
            &[
                ("ticker", ticker.to_string()),
                ("as_of", as_of.to_string()),
                ("lookback_days", lookback_days.to_string()),
            ],
        )
        .await
    }

    async fn indicators(&self, ticker: &str, as_of: &str) -> Result<String> {
        self.get(
            "indicators",
            &[("ticker", ticker.to_string()), ("as_of", as_of.to_string())],
        )
        .await
    }

    async fn fundamentals(&self, ticker: &str, as_of: &str) -> Result<String> {
        self.get(
            "fundamentals",
            &[("ticker", ticker.to_string()), ("as_of", as_of.to_string())],
        )
        .await
    }

    async fn balance_sheet(&self, ticker: &str, as_of: &str) -> Result<String> {
        self.get(
            "balance-sheet",
            &[
                ("ticker", ticker.to_string()),
                ("as_of", as_of.to_string()),
                ("freq", "quarterly".to_string()),
            ],
        )
        .await
    }

    async fn cashflow(&self, ticker: &str, as_of: &str) -> Result<String> {
        self.get(
            "cashflow",
            &[
                ("ticker", ticker.to_string()),
                ("as_of", as_of.to_string()),
                ("freq", "quarterly".to_string()),
            ],
        )
        .await
    }

    async fn income_statement(&self, ticker: &str, as_of: &str) -> Result<String> {
        self.get(
            "income-statement",
            &[
                ("ticker", ticker.to_string()),
                ("as_of", as_of.to_string()),
                ("freq", "quarterly".to_string()),
            ],
        )
        .await
    }

    async fn company_news(&self, ticker: &str, as_of: &str, lookback_days: u32) -> Result<String> {
        self.get(
            "news",
            &[
                ("ticker", ticker.to_string()),
                ("as_of", as_of.to_string()),
                ("lookback_days", lookback_days.to_string()),
            ],
        )
        .await
    }

    async fn global_news(&self, as_of: &str, lookback_days: u32) -> Result<String> {
        self.get(
            "global-news",
            &[
                ("as_of", as_of.to_string()),
                ("lookback_days", lookback_days.to_string()),
            ],
        )
        .await
    }

    async fn insider_sentiment(&self, ticker: &str, as_of: &str) -> Result<String> {
        self.get(
            "insider-sentiment",
            &[("ticker", ticker.to_string()), ("as_of", as_of.to_string())],
        )
        .await
    }

    async fn insider_transactions(&self, ticker: &str, as_of: &str) -> Result<String> {
        self.get(
            "insider-transactions",
            &[("ticker", ticker.to_string()), ("as_of", as_of.to_string())],
        )
        .await
    }

    async fn current_price(&self, ticker: &str, as_of: &str) -> Result<String> {
        self.get(
            "quote",
            &[("ticker", ticker.to_string()), ("as_of", as_of.to_string())],
        )
        .await
    }

    async fn peer_companies(&self, ticker: &str) -> Result<String> {
        self.get("peers", &[("ticker", ticker.to_string())]).await
    }
}
