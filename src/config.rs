//! Gateway configuration.
//!
//! Everything account-specific (warehouse routes, budget ceilings) and every
//! tunable bound comes from here; nothing is hardcoded per account. All
//! sections default, so an empty file is a valid configuration.
//!
//! ```toml
//! [upstream]
//! base_url = "https://ads.example.com"
//! page_size = 500
//! aggregate_timeout_secs = 60
//!
//! [resilience]
//! requests_per_second = 10.0
//! burst = 20
//!
//! [cache]
//! performance_secs = 3600
//! reference_secs = 86400
//!
//! [warehouse]
//! price_per_tib = "6.25"
//! default_budget = "10"
//!
//! [warehouse.routes.1234567890]
//! project = "ads-export"
//! dataset = "acme"
//!
//! [analysis]
//! max_recommendations = 10
//! max_summary_bytes = 16384
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};

use crate::analysis::MAX_RECOMMENDATIONS;
use crate::cache::CacheTtls;
use crate::error::AdsError;
use crate::rate_limit::ResilienceConfig;
use crate::upstream::{ADS_API_BASE_URL, DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::warehouse::WarehouseConfig;

/// Smallest accepted summary size bound. An empty summary always fits.
pub const MIN_SUMMARY_BYTES: usize = 4096;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Upstream data API
    pub upstream: UpstreamConfig,
    /// Rate limiter, breaker and retry bounds
    pub resilience: ResilienceConfig,
    /// Cache TTLs per category
    pub cache: CacheTtls,
    /// Warehouse routes, pricing and budgets
    pub warehouse: WarehouseConfig,
    /// Output bounds
    pub analysis: AnalysisConfig,
}

impl GatewayConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(contents: &str) -> Result<Self, AdsError> {
        let config: GatewayConfig = toml::from_str(contents)
            .map_err(|e| AdsError::Config(format!("failed to parse TOML config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, AdsError> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| AdsError::Config(format!("failed to read config file: {}", e)))?;
        let config = Self::from_toml_str(&contents)?;
        tracing::info!(path = %path.display(), "loaded gateway config");
        Ok(config)
    }

    /// Check cross-field bounds.
    pub fn validate(&self) -> Result<(), AdsError> {
        let upstream = &self.upstream;
        if upstream.page_size == 0 || upstream.page_size > MAX_PAGE_SIZE {
            return Err(AdsError::Config(format!(
                "upstream.page_size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        if upstream.page_timeout.is_zero()
            || upstream.aggregate_timeout.is_zero()
            || upstream.request_timeout.is_zero()
        {
            return Err(AdsError::Config("upstream timeouts must be positive".into()));
        }
        // Otherwise the request timeout fires first and partial data is never reported
        if upstream.aggregate_timeout >= upstream.request_timeout {
            return Err(AdsError::Config(
                "upstream.aggregate_timeout_secs must be below upstream.request_timeout_secs".into(),
            ));
        }
        if upstream.max_pages == 0 {
            return Err(AdsError::Config("upstream.max_pages must be positive".into()));
        }
        let rate = self.resilience.requests_per_second;
        if rate.is_nan() || rate <= 0.0 {
            return Err(AdsError::Config(
                "resilience.requests_per_second must be positive".into(),
            ));
        }
        if self.warehouse.price_per_tib.is_sign_negative() {
            return Err(AdsError::Config("warehouse.price_per_tib must not be negative".into()));
        }
        let analysis = &self.analysis;
        if analysis.max_recommendations == 0 || analysis.max_recommendations > MAX_RECOMMENDATIONS {
            return Err(AdsError::Config(format!(
                "analysis.max_recommendations must be between 1 and {}",
                MAX_RECOMMENDATIONS
            )));
        }
        if analysis.max_summary_bytes < MIN_SUMMARY_BYTES {
            return Err(AdsError::Config(format!(
                "analysis.max_summary_bytes must be at least {}",
                MIN_SUMMARY_BYTES
            )));
        }
        Ok(())
    }
}

/// Upstream data API settings.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// API base URL
    pub base_url: String,
    /// Records per page
    pub page_size: u32,
    /// Timeout for one page fetch, retries included
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "page_timeout_secs")]
    pub page_timeout: Duration,
    /// Deadline for all pages of one record kind
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "aggregate_timeout_secs")]
    pub aggregate_timeout: Duration,
    /// Wall-clock budget of one gateway call, end to end
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "request_timeout_secs")]
    pub request_timeout: Duration,
    /// Upper bound on pages per logical request
    pub max_pages: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: ADS_API_BASE_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            page_timeout: Duration::from_secs(15),
            aggregate_timeout: Duration::from_secs(60),
            request_timeout: Duration::from_secs(90),
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

/// Output bounds for analysis summaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Cap on recommendations, applied on top of per-request parameters
    pub max_recommendations: usize,
    /// Serialized summary size bound
    pub max_summary_bytes: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_recommendations: MAX_RECOMMENDATIONS,
            max_summary_bytes: 16_384,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_empty_document_is_default() {
        let config = GatewayConfig::from_toml_str("").unwrap();
        assert_eq!(config, GatewayConfig::default());
        assert_eq!(config.upstream.page_size, 500);
        assert_eq!(config.cache.performance, Duration::from_secs(3600));
        assert_eq!(config.analysis.max_summary_bytes, 16_384);
    }

    #[test]
    fn test_full_document() {
        let toml = r#"
            [upstream]
            base_url = "http://localhost:9000"
            page_size = 100
            aggregate_timeout_secs = 5

            [resilience]
            requests_per_second = 2.5

            [cache]
            performance_secs = 60

            [warehouse]
            price_per_tib = "5"

            [warehouse.routes.acct-1]
            project = "p1"
            dataset = "d1"

            [warehouse.budgets]
            acct-1 = "2.50"

            [analysis]
            max_recommendations = 5
        "#;
        let config = GatewayConfig::from_toml_str(toml).unwrap();

        assert_eq!(config.upstream.base_url, "http://localhost:9000");
        assert_eq!(config.upstream.page_size, 100);
        assert_eq!(config.upstream.aggregate_timeout, Duration::from_secs(5));
        assert_eq!(config.upstream.page_timeout, Duration::from_secs(15));
        assert_eq!(config.cache.performance, Duration::from_secs(60));
        assert_eq!(config.cache.reference, Duration::from_secs(86_400));
        assert_eq!(config.warehouse.price_per_tib, Decimal::from(5));
        assert_eq!(config.warehouse.route("acct-1").unwrap().project, "p1");
        assert_eq!(config.warehouse.budget_for("acct-1"), Decimal::new(250, 2));
        assert_eq!(config.analysis.max_recommendations, 5);
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        for toml in [
            "[upstream]\npage_size = 0",
            "[upstream]\npage_size = 501",
            "[upstream]\nrequest_timeout_secs = 0",
            "[upstream]\naggregate_timeout_secs = 90\nrequest_timeout_secs = 60",
            "[upstream]\naggregate_timeout_secs = 60\nrequest_timeout_secs = 60",
            "[analysis]\nmax_recommendations = 11",
            "[analysis]\nmax_summary_bytes = 100",
            "[resilience]\nrequests_per_second = 0.0",
        ] {
            assert!(
                matches!(GatewayConfig::from_toml_str(toml), Err(AdsError::Config(_))),
                "accepted: {}",
                toml
            );
        }
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let err = GatewayConfig::from_toml_str("[upstream\n").unwrap_err();
        assert!(matches!(err, AdsError::Config(msg) if msg.starts_with("failed to parse")));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = GatewayConfig::load("/nonexistent/gateway.toml").await.unwrap_err();
        assert!(matches!(err, AdsError::Config(_)));
    }
}
