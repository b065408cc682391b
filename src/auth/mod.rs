//! Authentication for the advertising data API.
//!
//! This module provides credential management with secure secret storage.
//! Tokens are attached as request headers by the REST client; nothing here
//! performs I/O.

mod credentials;

pub use credentials::{
    ACCESS_TOKEN_VAR, Credentials, CredentialsProvider, DEVELOPER_TOKEN_VAR, EnvCredentials,
    LOGIN_CUSTOMER_ID_VAR, StaticCredentials,
};
