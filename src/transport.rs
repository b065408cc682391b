//! HTTP plumbing shared by the data API and warehouse clients.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue, RETRY_AFTER, USER_AGENT};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_tracing::TracingMiddleware;

use crate::error::{AdsError, ApiError, ErrorEnvelope, UpstreamCode};

/// Longest body excerpt carried into an error message.
const BODY_EXCERPT: usize = 200;

/// Default user agent sent with every request.
pub(crate) fn default_user_agent() -> String {
    format!("ads-insight-client/{}", env!("CARGO_PKG_VERSION"))
}

/// Build the middleware-wrapped HTTP client.
///
/// No retry middleware: [`crate::rate_limit::Resilience`] owns retries.
pub(crate) fn build_http_client(user_agent: &str, timeout: Duration) -> ClientWithMiddleware {
    let mut headers = HeaderMap::new();
    let header_value = HeaderValue::from_str(user_agent)
        .unwrap_or_else(|_| HeaderValue::from_static("ads-insight-client"));
    headers.insert(USER_AGENT, header_value);

    let reqwest_client = reqwest::Client::builder()
        .default_headers(headers)
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());

    ClientBuilder::new(reqwest_client)
        .with(TracingMiddleware::default())
        .build()
}

/// Fallback classification when the error body cannot be parsed.
fn code_for_status(status: StatusCode) -> UpstreamCode {
    match status.as_u16() {
        400 => UpstreamCode::MalformedQuery,
        401 | 403 => UpstreamCode::AuthFailed,
        404 => UpstreamCode::NotFound,
        429 => UpstreamCode::RateLimited,
        500..=599 => UpstreamCode::Unavailable,
        _ => UpstreamCode::Unknown,
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(BODY_EXCERPT).collect()
}

/// Parse a JSON response, mapping non-success statuses onto the error taxonomy.
pub(crate) async fn read_json<T>(response: reqwest::Response) -> Result<T, AdsError>
where
    T: serde::de::DeserializeOwned,
{
    let status = response.status();
    let retry_after = response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs);
    let body = response.text().await?;

    if !status.is_success() {
        let api_error = serde_json::from_str::<ErrorEnvelope>(&body)
            .map(|envelope| envelope.error)
            .unwrap_or_else(|_| ApiError::new(code_for_status(status), excerpt(&body)));
        tracing::debug!(status = status.as_u16(), code = %api_error.code, "upstream returned error");
        return Err(api_error.into_error(status.as_u16(), retry_after));
    }

    serde_json::from_str(&body).map_err(|e| {
        AdsError::InvalidResponse(format!(
            "Failed to parse response: {}. Body: {}",
            e,
            excerpt(&body)
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_fallback_codes() {
        assert_eq!(code_for_status(StatusCode::UNAUTHORIZED), UpstreamCode::AuthFailed);
        assert_eq!(code_for_status(StatusCode::TOO_MANY_REQUESTS), UpstreamCode::RateLimited);
        assert_eq!(code_for_status(StatusCode::BAD_GATEWAY), UpstreamCode::Unavailable);
        assert_eq!(code_for_status(StatusCode::IM_A_TEAPOT), UpstreamCode::Unknown);
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let body = "x".repeat(1000);
        assert_eq!(excerpt(&body).len(), BODY_EXCERPT);
    }
}
