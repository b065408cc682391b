//! Warehouse client trait and REST implementation.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::CredentialsProvider;
use crate::error::AdsError;
use crate::transport::{build_http_client, default_user_agent, read_json};
use crate::types::serde_helpers::flexible_u64;
use crate::warehouse::{WAREHOUSE_BASE_URL, WarehouseRoute};

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Query submission body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryJob {
    /// Query text, already validated
    pub query: String,
    /// Row cap
    pub max_results: u32,
    /// Plan only; nothing is billed
    pub dry_run: bool,
    /// Dataset for unqualified table names
    pub default_dataset: String,
}

/// Query response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// Result rows; empty for dry runs
    #[serde(default)]
    pub rows: Vec<serde_json::Value>,
    /// Bytes scanned (or that would be scanned)
    #[serde(deserialize_with = "flexible_u64::deserialize", default)]
    pub total_bytes_processed: u64,
    /// Bytes billed
    #[serde(deserialize_with = "flexible_u64::deserialize", default)]
    pub total_bytes_billed: u64,
    /// Answered from the engine's result cache
    #[serde(default)]
    pub cache_hit: bool,
}

/// One column of a table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    /// Column name
    pub name: String,
    /// Column type
    #[serde(rename = "type")]
    pub field_type: String,
    /// NULLABLE, REQUIRED or REPEATED
    #[serde(default)]
    pub mode: Option<String>,
}

/// Column name/type/mode triples of one table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Columns in table order
    #[serde(default)]
    pub fields: Vec<SchemaField>,
}

#[derive(Debug, Deserialize)]
struct TableEnvelope {
    #[serde(default)]
    schema: TableSchema,
}

/// Operations against the analytical warehouse.
pub trait Warehouse: Send + Sync {
    /// Submit a query (or a dry run).
    fn execute(
        &self,
        route: &WarehouseRoute,
        job: &QueryJob,
    ) -> impl Future<Output = Result<QueryResult, AdsError>> + Send;

    /// Fetch a table's schema.
    fn table_schema(
        &self,
        route: &WarehouseRoute,
        table: &str,
    ) -> impl Future<Output = Result<TableSchema, AdsError>> + Send;
}

impl<T: Warehouse> Warehouse for Arc<T> {
    fn execute(
        &self,
        route: &WarehouseRoute,
        job: &QueryJob,
    ) -> impl Future<Output = Result<QueryResult, AdsError>> + Send {
        (**self).execute(route, job)
    }

    fn table_schema(
        &self,
        route: &WarehouseRoute,
        table: &str,
    ) -> impl Future<Output = Result<TableSchema, AdsError>> + Send {
        (**self).table_schema(route, table)
    }
}

/// The warehouse REST client.
#[derive(Clone)]
pub struct WarehouseRestClient {
    http_client: ClientWithMiddleware,
    base_url: String,
    credentials: Option<Arc<dyn CredentialsProvider>>,
}

impl WarehouseRestClient {
    /// Create a new client with default settings and no credentials.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new client builder.
    pub fn builder() -> WarehouseRestClientBuilder {
        WarehouseRestClientBuilder::new()
    }

    fn url(&self, segments: &[&str]) -> Result<Url, AdsError> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| AdsError::Config("warehouse base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn access_token(&self) -> Result<&str, AdsError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(AdsError::MissingCredentials)?;
        Ok(credentials.get_credentials().expose_access_token())
    }
}

impl Default for WarehouseRestClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for WarehouseRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseRestClient")
            .field("base_url", &self.base_url)
            .field("has_credentials", &self.credentials.is_some())
            .finish()
    }
}

impl Warehouse for WarehouseRestClient {
    async fn execute(&self, route: &WarehouseRoute, job: &QueryJob) -> Result<QueryResult, AdsError> {
        let token = self.access_token()?;
        let url = self.url(&["v1", "projects", &route.project, "queries"])?;
        let body = serde_json::to_string(job)?;

        let response = self
            .http_client
            .post(url)
            .bearer_auth(token)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let result: QueryResult = read_json(response).await?;

        tracing::debug!(
            dry_run = job.dry_run,
            bytes_processed = result.total_bytes_processed,
            cache_hit = result.cache_hit,
            rows = result.rows.len(),
            "warehouse query completed"
        );
        Ok(result)
    }

    async fn table_schema(&self, route: &WarehouseRoute, table: &str) -> Result<TableSchema, AdsError> {
        let token = self.access_token()?;
        let url = self.url(&[
            "v1",
            "projects",
            &route.project,
            "datasets",
            &route.dataset,
            "tables",
            table,
        ])?;

        let response = self.http_client.get(url).bearer_auth(token).send().await?;
        let envelope: TableEnvelope = read_json(response).await?;
        Ok(envelope.schema)
    }
}

/// Builder for [`WarehouseRestClient`].
pub struct WarehouseRestClientBuilder {
    base_url: String,
    credentials: Option<Arc<dyn CredentialsProvider>>,
    user_agent: Option<String>,
    timeout: Duration,
}

impl WarehouseRestClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            base_url: WAREHOUSE_BASE_URL.to_string(),
            credentials: None,
            user_agent: None,
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    /// Set the base URL (useful for testing with a mock server).
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the credentials provider.
    pub fn credentials(mut self, credentials: Arc<dyn CredentialsProvider>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Set a custom user agent.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the HTTP-level request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the client.
    pub fn build(self) -> WarehouseRestClient {
        let user_agent = self.user_agent.unwrap_or_else(default_user_agent);
        WarehouseRestClient {
            http_client: build_http_client(&user_agent, self.timeout),
            base_url: self.base_url,
            credentials: self.credentials,
        }
    }
}

impl Default for WarehouseRestClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
