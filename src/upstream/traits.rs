//! Trait definition for the upstream data API client.

use std::future::Future;
use std::sync::Arc;

use crate::error::AdsError;
use crate::types::Page;
use crate::upstream::PageRequest;

/// One page fetch against the upstream data API.
///
/// Implementations normalize wire records into [`crate::types::Record`] and
/// classify failures into the retryable/fatal taxonomy. They do not retry,
/// rate limit or paginate; those concerns live in the decorators and the
/// aggregator.
pub trait AdsApi: Send + Sync {
    /// Fetch one page. `cursor` is `None` for the first page.
    fn fetch_page(
        &self,
        request: &PageRequest,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<Page, AdsError>> + Send;
}

impl<T: AdsApi> AdsApi for Arc<T> {
    fn fetch_page(
        &self,
        request: &PageRequest,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<Page, AdsError>> + Send {
        (**self).fetch_page(request, cursor)
    }
}

impl<T: AdsApi> AdsApi for &T {
    fn fetch_page(
        &self,
        request: &PageRequest,
        cursor: Option<&str>,
    ) -> impl Future<Output = Result<Page, AdsError>> + Send {
        (**self).fetch_page(request, cursor)
    }
}
