//! Resilience for upstream calls.
//!
//! The upstream data API and the warehouse both enforce quotas and fail
//! transiently. Every call goes through one shared [`Resilience`] instance:
//!
//! - **Circuit breaker**: fails fast while the upstream is unhealthy
//! - **Token bucket**: smooths bursts to a steady request rate
//! - **Per-account quota** (optional): caps calls per account per minute
//! - **Retry**: bounded exponential backoff for transient failures only
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use ads_insight_client::upstream::AdsRestClient;
//! use ads_insight_client::rate_limit::{Resilience, ResilienceConfig, ResilientClient};
//!
//! let resilience = Resilience::shared(&ResilienceConfig::default());
//! let client = ResilientClient::new(AdsRestClient::new(), resilience);
//!
//! // Every page fetch is now guarded
//! let page = client.fetch_page(&request, None).await?;
//! ```
//!
//! ## Low-Level Pieces
//!
//! The breaker and bucket are plain data and can be driven directly:
//!
//! ```rust
//! use ads_insight_client::rate_limit::{BreakerConfig, CircuitBreaker, CircuitState, TokenBucket};
//! use tokio::time::Instant;
//!
//! let now = Instant::now();
//! let breaker = CircuitBreaker::new(BreakerConfig::default());
//! assert_eq!(breaker.state(now), CircuitState::Closed);
//!
//! let mut bucket = TokenBucket::new(20, 10.0, now);
//! assert!(bucket.try_take(now).is_ok());
//! ```

mod breaker;
mod client;
mod resilience;
mod token_bucket;

pub use breaker::{Admission, CircuitBreaker, CircuitState};
pub use client::ResilientClient;
pub use resilience::{Permit, Resilience};
pub use token_bucket::TokenBucket;

use std::num::NonZeroU32;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{DurationMilliSeconds, DurationSeconds, serde_as};

/// Resilience configuration.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Whether to enforce the breaker and limiters at all.
    pub enabled: bool,
    /// Steady-state token refill rate.
    pub requests_per_second: f64,
    /// Bucket capacity.
    pub burst: u32,
    /// Longest a caller waits for capacity before [`crate::AdsError::Backpressure`].
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "max_wait_ms")]
    pub max_wait: Duration,
    /// Circuit breaker thresholds.
    pub breaker: BreakerConfig,
    /// Retry bounds for transient failures.
    pub retry: RetryConfig,
    /// Optional per-account call quota.
    pub per_account_calls_per_minute: Option<NonZeroU32>,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            requests_per_second: 10.0,
            burst: 20,
            max_wait: Duration::from_secs(5),
            breaker: BreakerConfig::default(),
            retry: RetryConfig::default(),
            per_account_calls_per_minute: None,
        }
    }
}

/// Circuit breaker thresholds.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerConfig {
    /// Failure ratio above which the breaker opens.
    pub failure_ratio: f64,
    /// Calls required in the window before the ratio is considered.
    pub minimum_calls: u32,
    /// Rolling window for counting outcomes.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "window_secs")]
    pub window: Duration,
    /// Time spent open before trial calls are admitted.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "cool_down_secs")]
    pub cool_down: Duration,
    /// Concurrent trial calls admitted while half-open.
    pub half_open_trials: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_ratio: 0.5,
            minimum_calls: 5,
            window: Duration::from_secs(60),
            cool_down: Duration::from_secs(30),
            half_open_trials: 1,
        }
    }
}

/// Retry bounds.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Smallest backoff.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "min_backoff_ms")]
    pub min_backoff: Duration,
    /// Largest backoff, also the cap on an upstream `Retry-After`.
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "max_backoff_ms")]
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            min_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}
