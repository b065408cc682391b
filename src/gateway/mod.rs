//! Orchestration façade.
//!
//! [`AdsGateway`] is the single entry point: it wires the resilient upstream
//! client, the paginated aggregator, the cache, the analyzers and the
//! warehouse query service together, and translates every failure into an
//! [`ErrorResponse`].
//!
//! One gateway is meant to live for the whole process. Its breaker and rate
//! limiter come from [`Resilience::shared`] unless one is injected, so state
//! persists across requests.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ads_insight_client::auth::EnvCredentials;
//! use ads_insight_client::config::GatewayConfig;
//! use ads_insight_client::gateway::{AdsGateway, AnalysisRequest};
//! use ads_insight_client::types::DateRange;
//! use time::macros::date;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::load("gateway.toml").await?;
//!     let gateway = AdsGateway::connect(config, Arc::new(EnvCredentials::from_env()?))?;
//!
//!     let range = DateRange::new(date!(2024 - 05 - 01), date!(2024 - 05 - 31))?;
//!     let summary = gateway
//!         .wasted_spend(&AnalysisRequest::new("1234567890", range))
//!         .await?;
//!     println!("{}", summary.narrative);
//!     Ok(())
//! }
//! ```

mod request;
mod response;

pub use request::{AnalysisRequest, FetchRequest, RequestState};
pub use response::ErrorResponse;

use std::future::Future;
use std::sync::Arc;

use futures_util::future::try_join_all;

use crate::analysis::{AnalysisSummary, AnalyzerKind};
use crate::auth::CredentialsProvider;
use crate::cache::{CacheBackend, CacheCategory, CacheKey, CacheLayer, MemoryCache};
use crate::config::{AnalysisConfig, GatewayConfig, UpstreamConfig};
use crate::error::AdsError;
use crate::rate_limit::{Resilience, ResilientClient};
use crate::types::{Dataset, Page, RecordKind};
use crate::upstream::{AdsApi, AdsRestClient, Aggregator, PageRequest, validate_id};
use crate::warehouse::{
    BudgetUsage, CostEstimate, QueryOutcome, QueryService, QueryValidation, TableSchema,
    Warehouse, WarehouseRestClient,
};
use request::RequestTracker;

/// Longest accepted page cursor.
const MAX_CURSOR_LEN: usize = 1024;

fn category(kind: RecordKind) -> CacheCategory {
    if kind.is_reference_data() {
        CacheCategory::Reference
    } else {
        CacheCategory::Performance
    }
}

/// Single entry point over the upstream API, the cache, the analyzers and
/// the warehouse.
///
/// `C` is the upstream client, `W` the warehouse client and `B` the cache
/// backend. All entry points take `&self` and may run concurrently.
pub struct AdsGateway<C, W, B> {
    client: ResilientClient<C>,
    queries: QueryService<ResilientClient<W>>,
    cache: CacheLayer<B>,
    resilience: Arc<Resilience>,
    upstream: UpstreamConfig,
    analysis: AnalysisConfig,
}

impl AdsGateway<(), (), MemoryCache> {
    /// Start building a gateway. Set the upstream client and the warehouse;
    /// the cache defaults to an in-process [`MemoryCache`].
    pub fn builder() -> AdsGatewayBuilder<(), (), MemoryCache> {
        AdsGatewayBuilder {
            client: (),
            warehouse: (),
            cache: MemoryCache::new(),
            config: GatewayConfig::default(),
            resilience: None,
        }
    }
}

impl AdsGateway<AdsRestClient, WarehouseRestClient, MemoryCache> {
    /// Build a gateway over the REST clients from configuration.
    pub fn connect(
        config: GatewayConfig,
        credentials: Arc<dyn CredentialsProvider>,
    ) -> Result<Self, AdsError> {
        let client = AdsRestClient::builder()
            .base_url(&config.upstream.base_url)
            .credentials(credentials.clone())
            .build();
        let warehouse = WarehouseRestClient::builder()
            .base_url(&config.warehouse.base_url)
            .credentials(credentials)
            .build();

        AdsGateway::builder()
            .client(client)
            .warehouse(warehouse)
            .config(config)
            .build()
    }
}

impl<C: AdsApi, W: Warehouse, B: CacheBackend> AdsGateway<C, W, B> {
    /// The shared breaker and rate limiter. Call [`Resilience::reset`] on it
    /// to isolate tests.
    pub fn resilience(&self) -> &Arc<Resilience> {
        &self.resilience
    }

    /// The cache layer.
    pub fn cache(&self) -> &CacheLayer<B> {
        &self.cache
    }

    /// Run one analyzer over the account's data for the window.
    ///
    /// Fetches every record kind the analyzer needs concurrently; any kind
    /// failing fails the whole request and no partial dataset is analyzed.
    pub async fn analyze(
        &self,
        kind: AnalyzerKind,
        request: &AnalysisRequest,
    ) -> Result<AnalysisSummary, ErrorResponse> {
        self.bounded("analyze", self.run_analysis(kind, request)).await
    }

    /// Keywords and search terms spending without adequate return.
    pub async fn wasted_spend(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisSummary, ErrorResponse> {
        self.analyze(AnalyzerKind::WastedSpend, request).await
    }

    /// Loose keywords dominated by a single query.
    pub async fn match_type_tightening(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisSummary, ErrorResponse> {
        self.analyze(AnalyzerKind::MatchTypeTightening, request).await
    }

    /// Negative keywords blocking active keywords.
    pub async fn negative_conflicts(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisSummary, ErrorResponse> {
        self.analyze(AnalyzerKind::NegativeConflicts, request).await
    }

    /// Locations far above or below account return on spend.
    pub async fn geo_adjustments(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisSummary, ErrorResponse> {
        self.analyze(AnalyzerKind::GeoAdjustment, request).await
    }

    /// Queries served by several channels at very different efficiency.
    pub async fn channel_overlap(
        &self,
        request: &AnalysisRequest,
    ) -> Result<AnalysisSummary, ErrorResponse> {
        self.analyze(AnalyzerKind::ChannelOverlap, request).await
    }

    /// Fetch one raw page. Callers iterate with the returned cursor.
    pub async fn fetch_page(
        &self,
        kind: RecordKind,
        request: &FetchRequest,
        cursor: Option<&str>,
    ) -> Result<Page, ErrorResponse> {
        self.bounded("fetch_page", async {
            let page_request = request.page_request(kind, self.upstream.page_size);
            page_request.validate()?;
            if let Some(cursor) = cursor {
                if cursor.is_empty() || cursor.len() > MAX_CURSOR_LEN {
                    return Err(AdsError::InvalidRequest("invalid cursor".to_string()));
                }
            }

            let key = CacheKey::derive("page", &(&page_request, cursor))?;
            self.cache
                .get_or_fetch(&key, category(kind), || {
                    self.client.fetch_page(&page_request, cursor)
                })
                .await
        })
        .await
    }

    /// One page of keywords.
    pub async fn fetch_keywords(
        &self,
        request: &FetchRequest,
        cursor: Option<&str>,
    ) -> Result<Page, ErrorResponse> {
        self.fetch_page(RecordKind::Keyword, request, cursor).await
    }

    /// One page of search terms.
    pub async fn fetch_search_terms(
        &self,
        request: &FetchRequest,
        cursor: Option<&str>,
    ) -> Result<Page, ErrorResponse> {
        self.fetch_page(RecordKind::SearchTerm, request, cursor).await
    }

    /// One page of negative keywords.
    pub async fn fetch_negative_keywords(
        &self,
        request: &FetchRequest,
        cursor: Option<&str>,
    ) -> Result<Page, ErrorResponse> {
        self.fetch_page(RecordKind::NegativeKeyword, request, cursor).await
    }

    /// One page of geographic segments.
    pub async fn fetch_geo_segments(
        &self,
        request: &FetchRequest,
        cursor: Option<&str>,
    ) -> Result<Page, ErrorResponse> {
        self.fetch_page(RecordKind::GeoSegment, request, cursor).await
    }

    /// Check a query against the denylist without sending it anywhere.
    pub fn validate_query(&self, query: &str) -> QueryValidation {
        self.queries.validate(query)
    }

    /// Dry-run a query and price it.
    pub async fn estimate_query_cost(
        &self,
        account_id: &str,
        query: &str,
    ) -> Result<CostEstimate, ErrorResponse> {
        self.bounded("estimate_query_cost", async {
            validate_id("account id", account_id)?;
            self.queries.estimate_cost(account_id, query).await
        })
        .await
    }

    /// Validate, price, budget-check and run a query.
    ///
    /// A query cancelled by the request timeout keeps its budget
    /// reservation.
    pub async fn run_query(
        &self,
        account_id: &str,
        query: &str,
        row_limit: Option<u32>,
    ) -> Result<QueryOutcome, ErrorResponse> {
        self.bounded("run_query", async {
            validate_id("account id", account_id)?;
            self.queries.run(account_id, query, row_limit).await
        })
        .await
    }

    /// Column name/type/mode triples for a table, cached as reference data.
    pub async fn table_schema(
        &self,
        account_id: &str,
        table: &str,
    ) -> Result<TableSchema, ErrorResponse> {
        self.bounded("table_schema", async {
            validate_id("account id", account_id)?;
            validate_id("table name", table)?;
            let key = CacheKey::derive("schema", &(account_id, table))?;
            self.cache
                .get_or_fetch(&key, CacheCategory::Reference, || {
                    self.queries.table_schema(account_id, table)
                })
                .await
        })
        .await
    }

    /// Rolling-window spend and call count of an account.
    pub fn budget_usage(&self, account_id: &str) -> Result<BudgetUsage, ErrorResponse> {
        validate_id("account id", account_id).map_err(|err| self.fail("budget_usage", err))?;
        Ok(self.queries.usage(account_id))
    }

    async fn run_analysis(
        &self,
        kind: AnalyzerKind,
        request: &AnalysisRequest,
    ) -> Result<AnalysisSummary, AdsError> {
        let mut tracker = RequestTracker::new(kind);

        let mut params = request.params.clone().unwrap_or_else(|| kind.default_params());
        params.max_recommendations = params
            .max_recommendations
            .min(self.analysis.max_recommendations);
        params.validate()?;

        let requests: Vec<PageRequest> = kind
            .required_kinds()
            .iter()
            .map(|record_kind| request.page_request(*record_kind, self.upstream.page_size))
            .collect();
        for page_request in &requests {
            page_request.validate()?;
        }

        tracker.advance(RequestState::CacheCheck)?;
        let summary_key = CacheKey::derive("summary", &(kind, &requests, &params))?;
        if let Some(summary) = self.cache.get::<AnalysisSummary>(&summary_key).await {
            tracker.advance(RequestState::Hit)?;
            tracker.advance(RequestState::Done)?;
            return Ok(summary);
        }
        tracker.advance(RequestState::Miss)?;

        tracker.advance(RequestState::Fetching)?;
        let parts = try_join_all(requests.iter().map(|r| self.dataset(r))).await?;
        let dataset = Dataset::merge(parts);
        tracker.advance(RequestState::Aggregated)?;

        tracker.advance(RequestState::Analyzing)?;
        let mut summary = kind.analyzer().analyze(&dataset, &params);
        self.bound_size(&mut summary)?;
        self.cache
            .set(&summary_key, &summary, CacheCategory::Performance)
            .await;
        tracker.advance(RequestState::Done)?;

        Ok(summary)
    }

    /// Complete dataset for one kind, from cache or every upstream page.
    async fn dataset(&self, request: &PageRequest) -> Result<Dataset, AdsError> {
        let key = CacheKey::derive("dataset", request)?;
        self.cache
            .get_or_fetch(&key, category(request.kind), || async {
                Aggregator::new(&self.client)
                    .aggregate_timeout(self.upstream.aggregate_timeout)
                    .max_pages(self.upstream.max_pages)
                    .collect(request)
                    .await
            })
            .await
    }

    /// Drop lowest-ranked recommendations until the serialized summary fits.
    fn bound_size(&self, summary: &mut AnalysisSummary) -> Result<(), AdsError> {
        let limit = self.analysis.max_summary_bytes;
        loop {
            let size = serde_json::to_vec(&*summary)?.len();
            if size <= limit {
                return Ok(());
            }
            tracing::warn!(
                size,
                limit,
                "summary over size bound, dropping lowest-ranked recommendation"
            );
            if !summary.drop_lowest() {
                return Ok(());
            }
        }
    }

    /// Apply the request timeout and translate failures.
    async fn bounded<T>(
        &self,
        operation: &'static str,
        work: impl Future<Output = Result<T, AdsError>>,
    ) -> Result<T, ErrorResponse> {
        let result = match tokio::time::timeout(self.upstream.request_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(AdsError::Timeout),
        };
        result.map_err(|err| self.fail(operation, err))
    }

    fn fail(&self, operation: &'static str, err: AdsError) -> ErrorResponse {
        match &err {
            AdsError::Json(_) | AdsError::Url(_) | AdsError::DataIntegrity(_) => {
                tracing::error!(operation, code = err.code(), error = %err, "request failed")
            }
            _ => tracing::warn!(operation, code = err.code(), error = %err, "request failed"),
        }
        ErrorResponse::from(&err)
    }
}

impl<C, W, B> std::fmt::Debug for AdsGateway<C, W, B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdsGateway")
            .field("resilience", &self.resilience)
            .field("upstream", &self.upstream)
            .field("analysis", &self.analysis)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AdsGateway`].
///
/// The client and warehouse setters change the builder's type; `build` is
/// only available once both are set.
pub struct AdsGatewayBuilder<C, W, B> {
    client: C,
    warehouse: W,
    cache: B,
    config: GatewayConfig,
    resilience: Option<Arc<Resilience>>,
}

impl<C, W, B> AdsGatewayBuilder<C, W, B> {
    /// Set the upstream data API client.
    pub fn client<C2: AdsApi>(self, client: C2) -> AdsGatewayBuilder<C2, W, B> {
        AdsGatewayBuilder {
            client,
            warehouse: self.warehouse,
            cache: self.cache,
            config: self.config,
            resilience: self.resilience,
        }
    }

    /// Set the warehouse client.
    pub fn warehouse<W2: Warehouse>(self, warehouse: W2) -> AdsGatewayBuilder<C, W2, B> {
        AdsGatewayBuilder {
            client: self.client,
            warehouse,
            cache: self.cache,
            config: self.config,
            resilience: self.resilience,
        }
    }

    /// Set the cache backend.
    pub fn cache<B2: CacheBackend>(self, cache: B2) -> AdsGatewayBuilder<C, W, B2> {
        AdsGatewayBuilder {
            client: self.client,
            warehouse: self.warehouse,
            cache,
            config: self.config,
            resilience: self.resilience,
        }
    }

    /// Set the configuration.
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a specific resilience instance instead of the process-wide one.
    pub fn resilience(mut self, resilience: Arc<Resilience>) -> Self {
        self.resilience = Some(resilience);
        self
    }
}

impl<C: AdsApi, W: Warehouse, B: CacheBackend> AdsGatewayBuilder<C, W, B> {
    /// Validate the configuration and build the gateway.
    pub fn build(self) -> Result<AdsGateway<C, W, B>, AdsError> {
        let config = self.config;
        config.validate()?;

        let resilience = self
            .resilience
            .unwrap_or_else(|| Resilience::shared(&config.resilience));
        let client = ResilientClient::new(self.client, resilience.clone())
            .with_timeout(config.upstream.page_timeout);
        let warehouse = ResilientClient::new(self.warehouse, resilience.clone())
            .with_timeout(config.upstream.request_timeout);

        Ok(AdsGateway {
            client,
            queries: QueryService::new(warehouse, config.warehouse),
            cache: CacheLayer::new(self.cache, config.cache),
            resilience,
            upstream: config.upstream,
            analysis: config.analysis,
        })
    }
}
