//! Error types for the ads insight client.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The main error type for all client, query and analysis operations.
#[derive(Error, Debug)]
pub enum AdsError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// HTTP request with middleware failed
    #[error("HTTP request failed: {0}")]
    HttpMiddleware(#[from] reqwest_middleware::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid response from the upstream
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Upstream failure that may succeed on a later attempt.
    #[error("Retryable upstream error: {error}")]
    RetryableUpstream {
        /// The upstream error body.
        error: ApiError,
        /// Minimum wait suggested by the upstream, if any.
        retry_after: Option<Duration>,
    },

    /// Upstream failure that will not succeed on retry (auth, malformed, not found).
    #[error("Fatal upstream error: {0}")]
    FatalUpstream(ApiError),

    /// Query rejected by the denylist; it was never executed.
    #[error("Query rejected: {}", rules.join(", "))]
    Validation {
        /// Names of the violated rules.
        rules: Vec<String>,
    },

    /// Estimated cost exceeds the remaining rolling-window budget.
    #[error("Budget exceeded: estimated {estimated} against remaining {remaining}")]
    BudgetExceeded {
        /// Estimated cost of the rejected query.
        estimated: Decimal,
        /// Remaining budget in the current window.
        remaining: Decimal,
    },

    /// Pagination anomaly (repeated cursor, missing cursor, runaway page count).
    #[error("Data integrity error: {0}")]
    DataIntegrity(String),

    /// The aggregate deadline passed before every page was fetched.
    #[error("Partial data: aggregate timeout after {pages} pages ({records} records)")]
    PartialData {
        /// Pages fetched before the deadline.
        pages: usize,
        /// Records fetched before the deadline.
        records: usize,
    },

    /// Cache backend failure. Logged and bypassed, never surfaced to callers.
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Circuit breaker is open; the call was rejected without reaching upstream.
    #[error("Circuit open, retry after {retry_after:?}")]
    CircuitOpen {
        /// Time until the breaker admits a trial request.
        retry_after: Duration,
    },

    /// Token bucket could not supply a permit within the configured wait bound.
    #[error("Backpressure: no capacity within wait bound, retry after {retry_after:?}")]
    Backpressure {
        /// Time until a permit is expected to become available.
        retry_after: Duration,
    },

    /// A single call or the whole request exceeded its timeout.
    #[error("Request timed out")]
    Timeout,

    /// Request struct failed boundary validation.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing required credentials
    #[error("Missing credentials: developer token and access token required")]
    MissingCredentials,

    /// Configuration is missing or inconsistent.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl AdsError {
    /// Whether the resilience wrapper may retry the failed call.
    pub fn is_retryable(&self) -> bool {
        match self {
            AdsError::RetryableUpstream { .. } | AdsError::Timeout => true,
            AdsError::Http(e) => e.is_timeout() || e.is_connect(),
            AdsError::HttpMiddleware(reqwest_middleware::Error::Reqwest(e)) => {
                e.is_timeout() || e.is_connect()
            }
            AdsError::HttpMiddleware(reqwest_middleware::Error::Middleware(_)) => true,
            _ => false,
        }
    }

    /// Whether the failure is evidence that the upstream is unhealthy.
    ///
    /// Only transient failures move the breaker; auth or malformed-request
    /// errors say nothing about upstream health.
    pub fn counts_toward_breaker(&self) -> bool {
        self.is_retryable()
    }

    /// Suggested minimum wait before retrying, if the upstream provided one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            AdsError::RetryableUpstream { retry_after, .. } => *retry_after,
            AdsError::CircuitOpen { retry_after } | AdsError::Backpressure { retry_after } => {
                Some(*retry_after)
            }
            _ => None,
        }
    }

    /// Stable machine-readable code for the external error shape.
    pub fn code(&self) -> &'static str {
        match self {
            AdsError::Http(_) | AdsError::HttpMiddleware(_) => "UPSTREAM_UNAVAILABLE",
            AdsError::Json(_) | AdsError::Url(_) => "INTERNAL",
            AdsError::InvalidResponse(_) => "UPSTREAM_ERROR",
            AdsError::RetryableUpstream { error, .. } => match error.code {
                UpstreamCode::RateLimited => "RATE_LIMITED",
                _ => "UPSTREAM_UNAVAILABLE",
            },
            AdsError::FatalUpstream(error) => match error.code {
                UpstreamCode::NotFound => "NOT_FOUND",
                UpstreamCode::AuthFailed => "AUTH_FAILED",
                UpstreamCode::MalformedQuery => "MALFORMED_QUERY",
                _ => "UPSTREAM_ERROR",
            },
            AdsError::Validation { .. } => "QUERY_REJECTED",
            AdsError::BudgetExceeded { .. } => "BUDGET_EXCEEDED",
            AdsError::DataIntegrity(_) => "DATA_INTEGRITY",
            AdsError::PartialData { .. } => "PARTIAL_DATA",
            AdsError::CacheUnavailable(_) => "INTERNAL",
            AdsError::CircuitOpen { .. } => "CIRCUIT_OPEN",
            AdsError::Backpressure { .. } => "BACKPRESSURE",
            AdsError::Timeout => "TIMEOUT",
            AdsError::InvalidRequest(_) => "INVALID_REQUEST",
            AdsError::MissingCredentials => "AUTH_FAILED",
            AdsError::Config(_) => "NOT_CONFIGURED",
        }
    }
}

/// Error codes reported by the upstream data API and the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UpstreamCode {
    /// Resource does not exist
    NotFound,
    /// Quota exhausted, retry later
    RateLimited,
    /// Credentials rejected
    AuthFailed,
    /// Request could not be parsed by the upstream
    MalformedQuery,
    /// Temporarily unavailable
    Unavailable,
    /// Upstream internal failure
    Internal,
    /// Anything not listed above
    #[serde(other)]
    Unknown,
}

impl UpstreamCode {
    /// Whether a request failing with this code may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UpstreamCode::RateLimited | UpstreamCode::Unavailable | UpstreamCode::Internal
        )
    }
}

impl std::fmt::Display for UpstreamCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UpstreamCode::NotFound => "NOT_FOUND",
            UpstreamCode::RateLimited => "RATE_LIMITED",
            UpstreamCode::AuthFailed => "AUTH_FAILED",
            UpstreamCode::MalformedQuery => "MALFORMED_QUERY",
            UpstreamCode::Unavailable => "UNAVAILABLE",
            UpstreamCode::Internal => "INTERNAL",
            UpstreamCode::Unknown => "UNKNOWN",
        };
        write!(f, "{}", s)
    }
}

/// Error body returned by the upstream services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// The error code.
    pub code: UpstreamCode,
    /// Human-readable error message
    #[serde(default)]
    pub message: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl ApiError {
    /// Create a new API error from code and message.
    pub fn new(code: UpstreamCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Classify the error into the retryable or fatal taxonomy.
    ///
    /// An HTTP 429 or 5xx status is retryable even when the body carries an
    /// unrecognized code.
    pub fn into_error(self, status: u16, retry_after: Option<Duration>) -> AdsError {
        if self.code.is_retryable() || status == 429 || (500..600).contains(&status) {
            AdsError::RetryableUpstream {
                error: self,
                retry_after,
            }
        } else {
            AdsError::FatalUpstream(self)
        }
    }
}

/// Wrapper for the `{"error": {...}}` envelope.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ApiError,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_display() {
        let error = ApiError::new(UpstreamCode::AuthFailed, "token expired");
        assert_eq!(error.to_string(), "AUTH_FAILED: token expired");
    }

    #[test]
    fn test_unknown_code_deserializes() {
        let json = r#"{"error":{"code":"QUOTA_DANCE","message":"?"}}"#;
        let envelope: ErrorEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(envelope.error.code, UpstreamCode::Unknown);
    }

    #[test]
    fn test_classification() {
        let rate = ApiError::new(UpstreamCode::RateLimited, "slow down").into_error(429, None);
        assert!(rate.is_retryable());
        assert!(rate.counts_toward_breaker());
        assert_eq!(rate.code(), "RATE_LIMITED");

        let auth = ApiError::new(UpstreamCode::AuthFailed, "nope").into_error(401, None);
        assert!(!auth.is_retryable());
        assert!(!auth.counts_toward_breaker());
        assert_eq!(auth.code(), "AUTH_FAILED");

        let unknown_5xx = ApiError::new(UpstreamCode::Unknown, "boom").into_error(503, None);
        assert!(unknown_5xx.is_retryable());
    }

    #[test]
    fn test_validation_display_lists_rules() {
        let err = AdsError::Validation {
            rules: vec!["drop".into(), "grant".into()],
        };
        assert_eq!(err.to_string(), "Query rejected: drop, grant");
    }
}
