//! Resilient upstream client wrapper.
//!
//! Provides a wrapper around any [`AdsApi`] or [`Warehouse`] implementation
//! that routes every call through a shared [`Resilience`] and bounds each
//! attempt with a timeout.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use ads_insight_client::upstream::AdsRestClient;
//! use ads_insight_client::rate_limit::{Resilience, ResilienceConfig, ResilientClient};
//!
//! let client = ResilientClient::new(
//!     AdsRestClient::new(),
//!     Resilience::shared(&ResilienceConfig::default()),
//! )
//! .with_timeout(Duration::from_secs(10));
//! ```

use std::sync::Arc;
use std::time::Duration;

use crate::error::AdsError;
use crate::rate_limit::Resilience;
use crate::types::Page;
use crate::upstream::{AdsApi, PageRequest};
use crate::warehouse::{QueryJob, QueryResult, TableSchema, Warehouse, WarehouseRoute};

/// Default bound on a single call attempt.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(15);

/// A resilient wrapper around any [`AdsApi`] or [`Warehouse`] implementation.
///
/// Retries happen inside the wrapper, so each attempt gets a fresh timeout
/// and a fresh permit from the limiter.
pub struct ResilientClient<C> {
    inner: C,
    resilience: Arc<Resilience>,
    call_timeout: Duration,
}

impl<C> ResilientClient<C> {
    /// Create a new resilient client wrapper.
    pub fn new(inner: C, resilience: Arc<Resilience>) -> Self {
        Self {
            inner,
            resilience,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Set the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Get a reference to the inner client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    /// The shared resilience state.
    pub fn resilience(&self) -> &Arc<Resilience> {
        &self.resilience
    }

    /// Get the per-attempt timeout.
    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }
}

impl<C: std::fmt::Debug> std::fmt::Debug for ResilientClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("inner", &self.inner)
            .field("resilience", &self.resilience)
            .field("call_timeout", &self.call_timeout)
            .finish()
    }
}

impl<C: Clone> Clone for ResilientClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            resilience: self.resilience.clone(),
            call_timeout: self.call_timeout,
        }
    }
}

impl<C: AdsApi> AdsApi for ResilientClient<C> {
    async fn fetch_page(
        &self,
        request: &PageRequest,
        cursor: Option<&str>,
    ) -> Result<Page, AdsError> {
        let inner = &self.inner;
        let call_timeout = self.call_timeout;

        self.resilience
            .call(&request.account_id, move || async move {
                match tokio::time::timeout(call_timeout, inner.fetch_page(request, cursor)).await {
                    Ok(result) => result,
                    Err(_) => {
                        tracing::warn!(
                            kind = %request.kind,
                            timeout_ms = call_timeout.as_millis() as u64,
                            "page fetch timed out"
                        );
                        Err(AdsError::Timeout)
                    }
                }
            })
            .await
    }
}

impl<C: Warehouse> Warehouse for ResilientClient<C> {
    /// Dry runs are retried like reads. A billed job gets a single attempt.
    async fn execute(&self, route: &WarehouseRoute, job: &QueryJob) -> Result<QueryResult, AdsError> {
        let inner = &self.inner;
        let call_timeout = self.call_timeout;

        if !job.dry_run {
            let attempt = async {
                tokio::time::timeout(call_timeout, inner.execute(route, job))
                    .await
                    .unwrap_or(Err(AdsError::Timeout))
            };
            return self.resilience.call_once(&route.project, attempt).await;
        }

        self.resilience
            .call(&route.project, move || async move {
                tokio::time::timeout(call_timeout, inner.execute(route, job))
                    .await
                    .unwrap_or(Err(AdsError::Timeout))
            })
            .await
    }

    async fn table_schema(
        &self,
        route: &WarehouseRoute,
        table: &str,
    ) -> Result<TableSchema, AdsError> {
        let inner = &self.inner;
        let call_timeout = self.call_timeout;

        self.resilience
            .call(&route.project, move || async move {
                tokio::time::timeout(call_timeout, inner.table_schema(route, table))
                    .await
                    .unwrap_or(Err(AdsError::Timeout))
            })
            .await
    }
}
