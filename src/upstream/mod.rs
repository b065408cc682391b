//! Upstream advertising data API.
//!
//! # Trait-based API
//!
//! The [`AdsApi`] trait abstracts a single page fetch, enabling:
//! - Fake implementations for testing
//! - Decorator pattern (see [`crate::rate_limit::ResilientClient`])
//! - Alternative transports
//!
//! The [`Aggregator`] drives any [`AdsApi`] across every page of one logical
//! request.
//!
//! ```rust,ignore
//! use ads_insight_client::upstream::{AdsApi, Aggregator, PageRequest};
//!
//! async fn count<C: AdsApi>(client: &C, request: &PageRequest) -> ads_insight_client::Result<usize> {
//!     let dataset = Aggregator::new(client).collect(request).await?;
//!     Ok(dataset.len())
//! }
//! ```

mod aggregator;
mod client;
mod endpoints;
mod request;
mod traits;

pub use aggregator::{Aggregator, DEFAULT_AGGREGATE_TIMEOUT, DEFAULT_MAX_PAGES, page_stream};
pub use client::{AdsRestClient, AdsRestClientBuilder};
pub use endpoints::*;
pub use request::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, PageRequest, RequestFilters};
pub(crate) use request::validate_id;
pub use traits::AdsApi;
