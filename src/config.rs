//! Configuration for the trading desk pipeline

use crate::analysts::AnalystKind;
use crate::error::{DeskError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for one trading desk instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeskConfig {
    /// Analysts scheduled for each run. Valuation always runs in parallel and
    /// is added implicitly; listing it here is allowed but redundant.
    pub selected_analysts: Vec<AnalystKind>,

    /// Directional threshold for the PM aggregate (Buy if S >= theta, Sell if S <= -theta)
    pub pm_threshold: f64,

    /// Character budget applied to each textual payload before prompting
    pub clip_budget: usize,

    /// Bounded wait applied when another task holds the shared fetch in flight
    pub cache_wait: Duration,

    /// Model identifier passed to the verdict producer
    pub model: String,

    /// Sampling temperature for verdict production
    pub temperature: f32,

    /// Maximum tokens per verdict completion
    pub max_tokens: usize,

    /// Number of past recommendations retrieved from similarity memory
    pub memory_matches: usize,

    /// Cache TTL for upstream data responses
    pub data_cache_ttl: Duration,

    /// Request timeout for upstream calls
    pub request_timeout: Duration,
}

impl Default for DeskConfig {
    fn default() -> Self {
        Self {
            selected_analysts: vec![
                AnalystKind::Market,
                AnalystKind::Sentiment,
                AnalystKind::News,
                AnalystKind::Fundamentals,
            ],
            pm_threshold: 0.33,
            clip_budget: 8_000,
            cache_wait: Duration::from_millis(500),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 2048,
            memory_matches: 2,
            data_cache_ttl: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl DeskConfig {
    /// Create a new configuration builder
    pub fn builder() -> DeskConfigBuilder {
        DeskConfigBuilder::default()
    }

    /// Validate the configuration.
    ///
    /// An empty analyst selection is the only fatal pre-scheduling error: the
    /// run must never start without at least one gated specialist.
    pub fn validate(&self) -> Result<()> {
        let gated = self
            .selected_analysts
            .iter()
            .filter(|k| **k != AnalystKind::Valuation)
            .count();
        if gated == 0 {
            return Err(DeskError::ConfigError(
                "no analysts selected for the run".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.pm_threshold) {
            return Err(DeskError::ConfigError(format!(
                "pm_threshold must be in [0,1], got {}",
                self.pm_threshold
            )));
        }

        if self.clip_budget == 0 {
            return Err(DeskError::ConfigError(
                "clip_budget must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Model identifier from `DESK_MODEL`, keeping the configured default otherwise
    pub fn with_env_model(mut self) -> Self {
        if let Ok(model) = std::env::var("DESK_MODEL") {
            self.model = model;
        }
        self
    }
}

/// Builder for DeskConfig
#[derive(Debug, Default)]
pub struct DeskConfigBuilder {
    selected_analysts: Option<Vec<AnalystKind>>,
    pm_threshold: Option<f64>,
    clip_budget: Option<usize>,
    cache_wait: Option<Duration>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<usize>,
    memory_matches: Option<usize>,
    data_cache_ttl: Option<Duration>,
    request_timeout: Option<Duration>,
}

impl DeskConfigBuilder {
    /// Set the analysts scheduled per run
    pub fn selected_analysts(mut self, analysts: Vec<AnalystKind>) -> Self {
        self.selected_analysts = Some(analysts);
        self
    }

    /// Set the PM directional threshold
    pub fn pm_threshold(mut self, theta: f64) -> Self {
        self.pm_threshold = Some(theta);
        self
    }

    /// Set the payload character budget
    pub fn clip_budget(mut self, budget: usize) -> Self {
        self.clip_budget = Some(budget);
        self
    }

    /// Set the bounded wait for in-flight shared fetches
    pub fn cache_wait(mut self, wait: Duration) -> Self {
        self.cache_wait = Some(wait);
        self
    }

    /// Set the verdict producer model
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Set the sampling temperature
    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the completion token cap
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set how many similar past recommendations are retrieved
    pub fn memory_matches(mut self, n: usize) -> Self {
        self.memory_matches = Some(n);
        self
    }

    /// Set the upstream response cache TTL
    pub fn data_cache_ttl(mut self, ttl: Duration) -> Self {
        self.data_cache_ttl = Some(ttl);
        self
    }

    /// Set the upstream request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<DeskConfig> {
        let defaults = DeskConfig::default();

        let config = DeskConfig {
            selected_analysts: self.selected_analysts.unwrap_or(defaults.selected_analysts),
            pm_threshold: self.pm_threshold.unwrap_or(defaults.pm_threshold),
            clip_budget: self.clip_budget.unwrap_or(defaults.clip_budget),
            cache_wait: self.cache_wait.unwrap_or(defaults.cache_wait),
            model: self.model.unwrap_or(defaults.model),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            memory_matches: self.memory_matches.unwrap_or(defaults.memory_matches),
            data_cache_ttl: self.data_cache_ttl.unwrap_or(defaults.data_cache_ttl),
            request_timeout: self.request_timeout.unwrap_or(defaults.request_timeout),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DeskConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pm_threshold, 0.33);
        assert_eq!(config.selected_analysts.len(), 4);
    }

    #[test]
    fn test_builder_overrides() {
        let config = DeskConfig::builder()
            .selected_analysts(vec![AnalystKind::Market, AnalystKind::News])
            .pm_threshold(0.25)
            .clip_budget(4_000)
            .build()
            .unwrap();

        assert_eq!(config.pm_threshold, 0.25);
        assert_eq!(config.clip_budget, 4_000);
        assert_eq!(config.selected_analysts.len(), 2);
    }

    #[test]
    fn test_no_analysts_is_fatal() {
        let err = DeskConfig::builder()
            .selected_analysts(vec![])
            .build()
            .unwrap_err();
        assert!(matches!(err, DeskError::ConfigError(_)));
    }

    #[test]
    fn test_valuation_alone_does_not_satisfy_selection() {
        // Valuation never gates the run, so it cannot be the only selection.
        let err = DeskConfig::builder()
            .selected_analysts(vec![AnalystKind::Valuation])
            .build()
            .unwrap_err();
        assert!(matches!(err, DeskError::ConfigError(_)));
    }

    #[test]
    fn test_threshold_out_of_range() {
        let err = DeskConfig::builder().pm_threshold(1.5).build().unwrap_err();
        assert!(matches!(err, DeskError::ConfigError(_)));
    }
}
