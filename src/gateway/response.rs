//! External error shape.

use serde::{Deserialize, Serialize};

use crate::error::{AdsError, UpstreamCode};

/// Error returned by every gateway entry point.
///
/// Messages are fixed per code. They may carry rule names or money amounts
/// but never account identifiers, tokens or upstream bodies; the full error
/// is logged before translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code} ({status}): {message}")]
pub struct ErrorResponse {
    /// HTTP-style status
    pub status: u16,
    /// Stable machine code, see [`AdsError::code`]
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// Suggested wait before retrying, in whole seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl From<&AdsError> for ErrorResponse {
    fn from(err: &AdsError) -> Self {
        let (status, message) = match err {
            AdsError::Http(_) | AdsError::HttpMiddleware(_) => {
                (503, "The upstream service could not be reached.".to_string())
            }
            AdsError::Json(_) | AdsError::Url(_) | AdsError::CacheUnavailable(_) => {
                (500, "Internal error.".to_string())
            }
            AdsError::InvalidResponse(_) => {
                (502, "The upstream service returned an unreadable response.".to_string())
            }
            AdsError::RetryableUpstream { error, .. } => match error.code {
                UpstreamCode::RateLimited => {
                    (429, "The upstream rate limit was reached; retry later.".to_string())
                }
                _ => (503, "The upstream service is temporarily unavailable.".to_string()),
            },
            AdsError::FatalUpstream(error) => match error.code {
                UpstreamCode::NotFound => (404, "The requested resource was not found.".to_string()),
                UpstreamCode::AuthFailed => (401, "The upstream service rejected the credentials.".to_string()),
                UpstreamCode::MalformedQuery => {
                    (400, "The upstream service rejected the request as malformed.".to_string())
                }
                _ => (502, "The upstream service returned an error.".to_string()),
            },
            AdsError::Validation { rules } => (
                400,
                format!("Query rejected by rules: {}.", rules.join(", ")),
            ),
            AdsError::BudgetExceeded {
                estimated,
                remaining,
            } => (
                402,
                format!(
                    "Estimated cost {:.2} exceeds the remaining budget of {:.2}.",
                    estimated, remaining
                ),
            ),
            AdsError::DataIntegrity(_) => (
                502,
                "Upstream pagination was inconsistent; the dataset was discarded.".to_string(),
            ),
            AdsError::PartialData { .. } => (
                504,
                "Not every page arrived before the deadline; the partial dataset was discarded."
                    .to_string(),
            ),
            AdsError::CircuitOpen { .. } => (
                503,
                "The upstream service is failing; calls are paused.".to_string(),
            ),
            AdsError::Backpressure { .. } => {
                (429, "Too many requests in flight; retry later.".to_string())
            }
            AdsError::Timeout => (504, "The request timed out.".to_string()),
            AdsError::InvalidRequest(detail) => (400, format!("Invalid request: {}.", detail)),
            AdsError::MissingCredentials => (401, "Credentials are not configured.".to_string()),
            AdsError::Config(_) => (
                404,
                "The account is not configured for this operation.".to_string(),
            ),
        };

        Self {
            status,
            code: err.code().to_string(),
            message,
            retry_after_secs: err
                .retry_after()
                .map(|d| d.as_secs() + u64::from(d.subsec_nanos() > 0)),
        }
    }
}

impl From<AdsError> for ErrorResponse {
    fn from(err: AdsError) -> Self {
        Self::from(&err)
    }
}
