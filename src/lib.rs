//! # Ads Insight Client
//!
//! An async Rust gateway between a rate-limited, paginated advertising data
//! API, a metered SQL warehouse and a consumer that can only take bounded
//! responses.
//!
//! ## Features
//!
//! - Complete datasets pulled across every upstream page, with a
//!   repeated-cursor guard and explicit partial-data errors
//! - Shared circuit breaker, token bucket and bounded exponential backoff
//! - TTL cache by data category, with cache failures bypassed
//! - Ad-hoc queries validated against a denylist, priced by dry run and
//!   held to a rolling per-account budget
//! - Five deterministic analyzers returning size-bounded summaries
//! - Financial precision with `rust_decimal`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ads_insight_client::auth::StaticCredentials;
//! use ads_insight_client::config::GatewayConfig;
//! use ads_insight_client::gateway::{AdsGateway, AnalysisRequest};
//! use ads_insight_client::types::DateRange;
//! use time::macros::date;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let credentials = Arc::new(StaticCredentials::new("dev-token", "access-token"));
//!     let gateway = AdsGateway::connect(GatewayConfig::default(), credentials)?;
//!
//!     let range = DateRange::new(date!(2024 - 05 - 01), date!(2024 - 05 - 31))?;
//!     let summary = gateway
//!         .negative_conflicts(&AnalysisRequest::new("1234567890", range))
//!         .await?;
//!     for rec in &summary.recommendations {
//!         println!("{:?} {}: {}", rec.action, rec.subject, rec.estimated_impact);
//!     }
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod rate_limit;
mod transport;
pub mod types;
pub mod upstream;
pub mod warehouse;

// Re-export commonly used types at crate root
pub use analysis::{AnalysisSummary, AnalyzerKind, AnalyzerParams, Recommendation};
pub use config::GatewayConfig;
pub use error::AdsError;
pub use gateway::{AdsGateway, AnalysisRequest, ErrorResponse, FetchRequest};
pub use types::{DateRange, Dataset, Page, Record, RecordKind};

/// Result type alias using AdsError
pub type Result<T> = std::result::Result<T, AdsError>;
