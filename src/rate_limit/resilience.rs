//! Shared resilience wrapper: circuit breaker, token bucket, per-account
//! quota and bounded exponential backoff applied uniformly to upstream calls.
//!
//! # Example
//!
//! ```rust,no_run
//! use ads_insight_client::rate_limit::{Resilience, ResilienceConfig};
//! use ads_insight_client::AdsError;
//!
//! # async fn demo() -> Result<(), AdsError> {
//! let resilience = Resilience::new(ResilienceConfig::default());
//! let answer = resilience
//!     .call("1234567890", || async { Ok::<_, AdsError>(42) })
//!     .await?;
//! assert_eq!(answer, 42);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, SystemTime};

use governor::clock::{Clock, DefaultClock};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::{RetryDecision, RetryPolicy};
use tokio::time::Instant;

use crate::error::AdsError;
use crate::rate_limit::breaker::{Admission, CircuitBreaker, CircuitState};
use crate::rate_limit::token_bucket::TokenBucket;
use crate::rate_limit::ResilienceConfig;

static SHARED: OnceLock<Arc<Resilience>> = OnceLock::new();

/// State guarded by one lock. Nothing inside performs I/O.
struct GuardState {
    breaker: CircuitBreaker,
    bucket: TokenBucket,
    quota: Option<DefaultKeyedRateLimiter<String>>,
}

impl GuardState {
    fn new(config: &ResilienceConfig, now: Instant) -> Self {
        Self {
            breaker: CircuitBreaker::new(config.breaker.clone()),
            bucket: TokenBucket::new(config.burst, config.requests_per_second, now),
            quota: Self::quota(config),
        }
    }

    fn quota(config: &ResilienceConfig) -> Option<DefaultKeyedRateLimiter<String>> {
        config
            .per_account_calls_per_minute
            .map(|per_minute| RateLimiter::keyed(Quota::per_minute(per_minute)))
    }

    fn quota_wait(&self, scope: &str) -> Option<Duration> {
        let quota = self.quota.as_ref()?;
        match quota.check_key(&scope.to_string()) {
            Ok(()) => None,
            Err(not_until) => Some(not_until.wait_time_from(DefaultClock::default().now())),
        }
    }
}

/// Circuit breaker plus rate limiter guarding one upstream dependency.
///
/// One instance is meant to be shared by every request in the process (see
/// [`Resilience::shared`]) so breaker and bucket state persist across
/// requests. Tests construct private instances or call [`Resilience::reset`].
pub struct Resilience {
    config: ResilienceConfig,
    state: Mutex<GuardState>,
    retry_policy: ExponentialBackoff,
}

impl Resilience {
    /// Create a new, independent instance.
    pub fn new(config: ResilienceConfig) -> Self {
        let min = config.retry.min_backoff;
        let max = config.retry.max_backoff.max(min);
        let retry_policy = ExponentialBackoff::builder()
            .retry_bounds(min, max)
            .build_with_max_retries(config.retry.max_retries);

        Self {
            state: Mutex::new(GuardState::new(&config, Instant::now())),
            config,
            retry_policy,
        }
    }

    /// The process-wide instance, created on first use.
    ///
    /// `config` only takes effect on the call that initializes the instance.
    pub fn shared(config: &ResilienceConfig) -> Arc<Resilience> {
        SHARED
            .get_or_init(|| Arc::new(Resilience::new(config.clone())))
            .clone()
    }

    /// Get the current configuration.
    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, GuardState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current breaker state.
    pub fn circuit_state(&self) -> CircuitState {
        self.lock().breaker.state(Instant::now())
    }

    /// Tokens currently available in the bucket.
    pub fn available_tokens(&self) -> f64 {
        self.lock().bucket.available(Instant::now())
    }

    /// Restore a clean state: breaker closed, bucket full, quotas cleared.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.breaker.reset();
        state.bucket.reset(Instant::now());
        state.quota = GuardState::quota(&self.config);
        tracing::debug!("resilience state reset");
    }

    /// One non-blocking admission attempt.
    ///
    /// `Ok(Ok(admission))` admits, `Ok(Err(wait))` asks the caller to wait,
    /// `Err` rejects outright.
    fn try_acquire(&self, scope: &str) -> Result<Result<Admission, Duration>, AdsError> {
        let mut state = self.lock();
        let now = Instant::now();

        let admission = state
            .breaker
            .try_admit(now)
            .map_err(|retry_after| AdsError::CircuitOpen { retry_after })?;

        if let Err(wait) = state.bucket.try_take(now) {
            state.breaker.on_release(admission);
            return Ok(Err(wait));
        }

        if let Some(wait) = state.quota_wait(scope) {
            state.bucket.refund();
            state.breaker.on_release(admission);
            return Ok(Err(wait));
        }

        Ok(Ok(admission))
    }

    /// Acquire a permit for one upstream call.
    ///
    /// Fails fast with [`AdsError::CircuitOpen`] while the breaker is open and
    /// waits for bucket or quota capacity up to the configured bound, after
    /// which it fails with [`AdsError::Backpressure`].
    pub async fn acquire(&self, scope: &str) -> Result<Permit<'_>, AdsError> {
        if !self.config.enabled {
            return Ok(Permit {
                resilience: self,
                admission: None,
            });
        }

        let deadline = Instant::now() + self.config.max_wait;
        loop {
            match self.try_acquire(scope)? {
                Ok(admission) => {
                    return Ok(Permit {
                        resilience: self,
                        admission: Some(admission),
                    });
                }
                Err(wait) => {
                    if Instant::now() + wait > deadline {
                        tracing::warn!(
                            wait_ms = wait.as_millis() as u64,
                            "rate limiter backpressure"
                        );
                        return Err(AdsError::Backpressure { retry_after: wait });
                    }
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Run `operation` under the breaker and limiter, retrying transient
    /// failures with bounded exponential backoff.
    ///
    /// Non-retryable errors propagate immediately and leave breaker state
    /// untouched.
    pub async fn call<T, F, Fut>(&self, scope: &str, mut operation: F) -> Result<T, AdsError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AdsError>>,
    {
        let started = SystemTime::now();
        let mut retries = 0u32;

        loop {
            let permit = self.acquire(scope).await?;
            match operation().await {
                Ok(value) => {
                    permit.record_outcome(true);
                    return Ok(value);
                }
                Err(err) if err.counts_toward_breaker() => {
                    permit.record_outcome(false);
                    match self.retry_policy.should_retry(started, retries) {
                        RetryDecision::Retry { execute_after } => {
                            let mut delay = execute_after
                                .duration_since(SystemTime::now())
                                .unwrap_or_default();
                            if let Some(suggested) = err.retry_after() {
                                delay = delay.max(suggested.min(self.config.retry.max_backoff));
                            }
                            retries += 1;
                            tracing::warn!(
                                retry = retries,
                                delay_ms = delay.as_millis() as u64,
                                error = %err,
                                "retrying transient upstream failure"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::DoNotRetry => {
                            tracing::warn!(retries, error = %err, "giving up after retries");
                            return Err(err);
                        }
                    }
                }
                Err(err) => {
                    permit.release();
                    return Err(err);
                }
            }
        }
    }

    /// Run `operation` exactly once under the breaker and limiter.
    ///
    /// For calls with side effects upstream (billed queries): a timed-out
    /// attempt may still have run, so it is never repeated.
    pub async fn call_once<T, Fut>(&self, scope: &str, operation: Fut) -> Result<T, AdsError>
    where
        Fut: Future<Output = Result<T, AdsError>>,
    {
        let permit = self.acquire(scope).await?;
        match operation.await {
            Ok(value) => {
                permit.record_outcome(true);
                Ok(value)
            }
            Err(err) if err.counts_toward_breaker() => {
                permit.record_outcome(false);
                tracing::warn!(error = %err, "single-attempt upstream call failed");
                Err(err)
            }
            Err(err) => {
                permit.release();
                Err(err)
            }
        }
    }

    fn settle(&self, admission: Admission, success: bool) {
        let mut state = self.lock();
        let now = Instant::now();
        if success {
            state.breaker.on_success(admission, now);
        } else {
            state.breaker.on_failure(admission, now);
        }
    }

    fn release_admission(&self, admission: Admission) {
        self.lock().breaker.on_release(admission);
    }
}

impl std::fmt::Debug for Resilience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resilience")
            .field("config", &self.config)
            .field("circuit_state", &self.circuit_state())
            .finish()
    }
}

/// Admission to make one upstream call.
///
/// Settle it with [`Permit::record_outcome`] or [`Permit::release`]. A permit
/// dropped unsettled (the call was cancelled) frees its breaker slot without
/// recording an outcome.
#[must_use = "a permit should be settled with record_outcome or release"]
pub struct Permit<'a> {
    resilience: &'a Resilience,
    admission: Option<Admission>,
}

impl Permit<'_> {
    /// Record whether the call succeeded.
    pub fn record_outcome(mut self, success: bool) {
        if let Some(admission) = self.admission.take() {
            self.resilience.settle(admission, success);
        }
    }

    /// Release without affecting breaker health.
    pub fn release(mut self) {
        if let Some(admission) = self.admission.take() {
            self.resilience.release_admission(admission);
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if let Some(admission) = self.admission.take() {
            self.resilience.release_admission(admission);
        }
    }
}
