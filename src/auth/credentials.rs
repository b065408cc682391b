//! Credential management for the advertising data API.

use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;

use crate::error::AdsError;

/// Environment variable holding the developer token.
pub const DEVELOPER_TOKEN_VAR: &str = "ADS_DEVELOPER_TOKEN";
/// Environment variable holding the OAuth access token.
pub const ACCESS_TOKEN_VAR: &str = "ADS_ACCESS_TOKEN";
/// Environment variable holding the optional manager account id.
pub const LOGIN_CUSTOMER_ID_VAR: &str = "ADS_LOGIN_CUSTOMER_ID";

/// API credentials: a developer token plus an access token.
#[derive(Clone)]
pub struct Credentials {
    developer_token: SecretString,
    access_token: SecretString,
    /// Manager account used to access client accounts, if any
    pub login_customer_id: Option<String>,
}

impl Credentials {
    /// Create new credentials from a developer token and access token.
    pub fn new(developer_token: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            developer_token: SecretString::from(developer_token.into()),
            access_token: SecretString::from(access_token.into()),
            login_customer_id: None,
        }
    }

    /// Attach a manager account id.
    pub fn with_login_customer_id(mut self, id: impl Into<String>) -> Self {
        self.login_customer_id = Some(id.into());
        self
    }

    /// Developer token in clear text, for the `developer-token` header only.
    pub fn expose_developer_token(&self) -> &str {
        self.developer_token.expose_secret()
    }

    /// Access token in clear text, for the bearer header only.
    pub fn expose_access_token(&self) -> &str {
        self.access_token.expose_secret()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("developer_token", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .field("login_customer_id", &self.login_customer_id)
            .finish()
    }
}

/// Source of the tokens attached to every upstream and warehouse call.
///
/// The REST clients hold an `Arc<dyn CredentialsProvider>`; a provider backed
/// by a secrets manager or a token refresher plugs in here.
pub trait CredentialsProvider: Send + Sync {
    /// Current credentials.
    fn get_credentials(&self) -> &Credentials;
}

impl<T: CredentialsProvider + ?Sized> CredentialsProvider for Arc<T> {
    fn get_credentials(&self) -> &Credentials {
        (**self).get_credentials()
    }
}

/// Fixed credentials, typically from configuration or tests.
#[derive(Clone, Debug)]
pub struct StaticCredentials {
    credentials: Credentials,
}

impl StaticCredentials {
    /// Credentials without a manager account.
    pub fn new(developer_token: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            credentials: Credentials::new(developer_token, access_token),
        }
    }

    /// Wrap existing credentials.
    pub fn from_credentials(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

impl CredentialsProvider for StaticCredentials {
    fn get_credentials(&self) -> &Credentials {
        &self.credentials
    }
}

/// Credentials read once from the process environment.
///
/// Reads `ADS_DEVELOPER_TOKEN`, `ADS_ACCESS_TOKEN` and optionally
/// `ADS_LOGIN_CUSTOMER_ID`.
#[derive(Debug)]
pub struct EnvCredentials {
    credentials: Credentials,
}

impl EnvCredentials {
    /// Create credentials from the default environment variables.
    pub fn from_env() -> Result<Self, AdsError> {
        Self::try_from_env().ok_or(AdsError::MissingCredentials)
    }

    /// Try to create credentials from the default environment variables.
    ///
    /// Returns `None` if either token variable is not set.
    pub fn try_from_env() -> Option<Self> {
        Self::try_from_env_vars(DEVELOPER_TOKEN_VAR, ACCESS_TOKEN_VAR, LOGIN_CUSTOMER_ID_VAR)
    }

    /// Same as [`EnvCredentials::try_from_env`] with custom variable names.
    /// An empty manager account variable counts as unset.
    pub fn try_from_env_vars(
        developer_token_var: &str,
        access_token_var: &str,
        login_customer_id_var: &str,
    ) -> Option<Self> {
        let developer_token = std::env::var(developer_token_var).ok()?;
        let access_token = std::env::var(access_token_var).ok()?;
        let mut credentials = Credentials::new(developer_token, access_token);
        credentials.login_customer_id = std::env::var(login_customer_id_var)
            .ok()
            .filter(|id| !id.is_empty());

        Some(Self { credentials })
    }
}

impl CredentialsProvider for EnvCredentials {
    fn get_credentials(&self) -> &Credentials {
        &self.credentials
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_debug_redacted() {
        let creds = Credentials::new("dev_token", "super_secret").with_login_customer_id("123");
        let debug_str = format!("{:?}", creds);
        assert!(!debug_str.contains("dev_token"));
        assert!(!debug_str.contains("super_secret"));
        assert!(debug_str.contains("[REDACTED]"));
        assert!(debug_str.contains("123"));
    }

    #[test]
    fn test_static_credentials() {
        let provider = StaticCredentials::new("dev", "access");
        let creds = provider.get_credentials();
        assert_eq!(creds.expose_developer_token(), "dev");
        assert_eq!(creds.expose_access_token(), "access");
        assert!(creds.login_customer_id.is_none());
    }

    #[test]
    fn test_missing_env_vars() {
        assert!(
            EnvCredentials::try_from_env_vars(
                "ADS_TEST_UNSET_DEV_TOKEN",
                "ADS_TEST_UNSET_ACCESS_TOKEN",
                "ADS_TEST_UNSET_LOGIN"
            )
            .is_none()
        );
    }
}
