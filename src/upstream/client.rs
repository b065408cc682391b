//! Upstream data API REST client implementation.

use std::sync::Arc;
use std::time::Duration;

use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::CredentialsProvider;
use crate::error::AdsError;
use crate::transport::{build_http_client, default_user_agent, read_json};
use crate::types::record::WireRecord;
use crate::types::serde_helpers::empty_string_as_none;
use crate::types::{Page, RecordKind};
use crate::upstream::endpoints::{
    ACCOUNTS, ADS_API_BASE_URL, API_VERSION, DEVELOPER_TOKEN_HEADER, LOGIN_CUSTOMER_ID_HEADER,
};
use crate::upstream::traits::AdsApi;
use crate::upstream::PageRequest;

/// Default HTTP-level timeout; the resilient wrapper applies its own per-page bound.
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// The upstream data API REST client.
///
/// Executes exactly one page fetch per call and normalizes the records.
/// Pagination, retries and rate limiting are layered on top.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use ads_insight_client::auth::StaticCredentials;
/// use ads_insight_client::types::{DateRange, RecordKind};
/// use ads_insight_client::upstream::{AdsApi, AdsRestClient, PageRequest};
/// use time::macros::date;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let client = AdsRestClient::builder()
///         .credentials(Arc::new(StaticCredentials::new("dev-token", "access-token")))
///         .build();
///
///     let range = DateRange::new(date!(2024 - 01 - 01), date!(2024 - 01 - 31))?;
///     let request = PageRequest::new("1234567890", RecordKind::Keyword, range);
///     let page = client.fetch_page(&request, None).await?;
///     println!("{} records, more: {}", page.records.len(), page.has_more);
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct AdsRestClient {
    http_client: ClientWithMiddleware,
    base_url: String,
    credentials: Option<Arc<dyn CredentialsProvider>>,
}

impl AdsRestClient {
    /// Create a new client with default settings and no credentials.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a new client builder.
    pub fn builder() -> AdsRestClientBuilder {
        AdsRestClientBuilder::new()
    }

    /// The configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build `{base}/v1/accounts/{account}/{resource}?...` for one page.
    fn page_url(&self, request: &PageRequest, cursor: Option<&str>) -> Result<Url, AdsError> {
        let mut url = Url::parse(&self.base_url)?;
        url.path_segments_mut()
            .map_err(|_| AdsError::Config("upstream base URL cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend([
                API_VERSION,
                ACCOUNTS,
                request.account_id.as_str(),
                request.kind.resource(),
            ]);

        let start_date = request.date_range.start.to_string();
        let end_date = request.date_range.end.to_string();
        let filter = request.filters.to_expression();
        let params = PageParams {
            start_date: &start_date,
            end_date: &end_date,
            page_size: request.page_size,
            page_token: cursor,
            filter: filter.as_deref(),
        };
        let query = serde_urlencoded::to_string(&params)
            .map_err(|e| AdsError::InvalidRequest(e.to_string()))?;
        url.set_query(Some(&query));
        Ok(url)
    }
}

impl Default for AdsRestClient {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AdsRestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdsRestClient")
            .field("base_url", &self.base_url)
            .field("has_credentials", &self.credentials.is_some())
            .finish()
    }
}

/// Builder for [`AdsRestClient`].
pub struct AdsRestClientBuilder {
    base_url: String,
    credentials: Option<Arc<dyn CredentialsProvider>>,
    user_agent: Option<String>,
    timeout: Duration,
}

impl AdsRestClientBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            base_url: ADS_API_BASE_URL.to_string(),
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
    pub fn build(self) -> AdsRestClient {
        let user_agent = self.user_agent.unwrap_or_else(default_user_agent);

        AdsRestClient {
            http_client: build_http_client(&user_agent, self.timeout),
            base_url: self.base_url,
            credentials: self.credentials,
        }
    }
}

impl Default for AdsRestClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Query string of one page request.
#[derive(Debug, Serialize)]
struct PageParams<'a> {
    start_date: &'a str,
    end_date: &'a str,
    page_size: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a str>,
}

/// Page body as it arrives on the wire.
#[derive(Debug, Deserialize)]
struct WirePage {
    #[serde(default)]
    records: Vec<WireRecord>,
    #[serde(deserialize_with = "empty_string_as_none::deserialize", default)]
    next_cursor: Option<String>,
    #[serde(default)]
    has_more: bool,
}

impl WirePage {
    fn normalize(self, kind: RecordKind) -> Page {
        Page {
            records: self
                .records
                .into_iter()
                .map(|record| record.normalize(kind))
                .collect(),
            next_cursor: self.next_cursor,
            has_more: self.has_more,
        }
    }
}

impl AdsApi for AdsRestClient {
    async fn fetch_page(
        &self,
        request: &PageRequest,
        cursor: Option<&str>,
    ) -> Result<Page, AdsError> {
        let credentials = self
            .credentials
            .as_ref()
            .ok_or(AdsError::MissingCredentials)?;
        let creds = credentials.get_credentials();

        let url = self.page_url(request, cursor)?;
        let mut builder = self
            .http_client
            .get(url)
            .bearer_auth(creds.expose_access_token())
            .header(DEVELOPER_TOKEN_HEADER, creds.expose_developer_token());
        if let Some(login) = &creds.login_customer_id {
            builder = builder.header(LOGIN_CUSTOMER_ID_HEADER, login);
        }

        let response = builder.send().await?;
        let page: WirePage = read_json(response).await?;
        let page = page.normalize(request.kind);

        tracing::debug!(
            kind = %request.kind,
            records = page.records.len(),
            has_more = page.has_more,
            "fetched page"
        );
        Ok(page)
    }
}
