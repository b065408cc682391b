//! Upstream data API endpoint constants.

/// Base URL for the upstream data API.
pub const ADS_API_BASE_URL: &str = "https://ads-data.example.com";

/// API version path segment.
pub const API_VERSION: &str = "v1";

/// Collection under which per-account resources live.
pub const ACCOUNTS: &str = "accounts";

/// Header carrying the developer token.
pub const DEVELOPER_TOKEN_HEADER: &str = "developer-token";

/// Header carrying the manager account acting on behalf of the client account.
pub const LOGIN_CUSTOMER_ID_HEADER: &str = "login-customer-id";
