//! Paginated aggregation.
//!
//! [`page_stream`] yields the pages of one logical request lazily and
//! enforces pagination integrity; [`Aggregator::collect`] drains it into a
//! frozen [`Dataset`] under an aggregate deadline.
//!
//! A partial dataset is never returned: any failure, including the deadline,
//! discards everything fetched so far.

use std::collections::HashSet;
use std::time::Duration;

use futures_util::{Stream, TryStreamExt, stream};
use tokio::time::Instant;

use crate::error::AdsError;
use crate::types::{Dataset, DatasetBuilder, Page};
use crate::upstream::{AdsApi, PageRequest};

/// Default wall-clock bound on fetching every page of one request.
pub const DEFAULT_AGGREGATE_TIMEOUT: Duration = Duration::from_secs(60);

/// Default bound on pages per logical request.
pub const DEFAULT_MAX_PAGES: usize = 10_000;

/// Where the stream stands between pages.
enum Position {
    First,
    After(String),
    Done,
}

struct StreamState {
    position: Position,
    seen: HashSet<String>,
    pages: usize,
}

/// Stream every page of `request`, following continuation cursors.
///
/// Ends after the first page with `has_more == false`, even when that page
/// is full. Fails with [`AdsError::DataIntegrity`] when a cursor repeats,
/// when `has_more` is set without a cursor, or when more than `max_pages`
/// pages would be fetched.
pub fn page_stream<'a, C>(
    client: &'a C,
    request: &'a PageRequest,
    max_pages: usize,
) -> impl Stream<Item = Result<Page, AdsError>> + Send + 'a
where
    C: AdsApi,
{
    let initial = StreamState {
        position: Position::First,
        seen: HashSet::new(),
        pages: 0,
    };

    stream::try_unfold(initial, move |mut state| async move {
        let cursor = match &state.position {
            Position::Done => return Ok(None),
            Position::First => None,
            Position::After(cursor) => Some(cursor.clone()),
        };

        if state.pages >= max_pages {
            return Err(AdsError::DataIntegrity(format!(
                "more than {} pages for one request",
                max_pages
            )));
        }

        let page = client.fetch_page(request, cursor.as_deref()).await?;
        state.pages += 1;

        state.position = if page.has_more {
            let next = page
                .next_cursor
                .clone()
                .filter(|c| !c.is_empty())
                .ok_or_else(|| {
                    AdsError::DataIntegrity(format!(
                        "page {} reports more data without a cursor",
                        state.pages
                    ))
                })?;
            if !state.seen.insert(next.clone()) {
                tracing::error!(page = state.pages, "upstream repeated a pagination cursor");
                return Err(AdsError::DataIntegrity(format!(
                    "cursor repeated after page {}",
                    state.pages
                )));
            }
            Position::After(next)
        } else {
            Position::Done
        };

        Ok(Some((page, state)))
    })
}

/// Drives an [`AdsApi`] across every page of one logical request.
#[derive(Debug)]
pub struct Aggregator<'a, C> {
    client: &'a C,
    aggregate_timeout: Duration,
    max_pages: usize,
}

impl<'a, C: AdsApi> Aggregator<'a, C> {
    /// Create an aggregator with default bounds.
    pub fn new(client: &'a C) -> Self {
        Self {
            client,
            aggregate_timeout: DEFAULT_AGGREGATE_TIMEOUT,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Set the aggregate deadline.
    pub fn aggregate_timeout(mut self, timeout: Duration) -> Self {
        self.aggregate_timeout = timeout;
        self
    }

    /// Set the page bound.
    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Fetch every page and freeze the result.
    ///
    /// # Errors
    ///
    /// - [`AdsError::InvalidRequest`] if the request fails validation
    /// - [`AdsError::DataIntegrity`] on a pagination anomaly
    /// - [`AdsError::PartialData`] if the aggregate deadline passes
    /// - any upstream error, unchanged
    pub async fn collect(&self, request: &PageRequest) -> Result<Dataset, AdsError> {
        request.validate()?;

        let deadline = Instant::now() + self.aggregate_timeout;
        let mut pages = std::pin::pin!(page_stream(self.client, request, self.max_pages));
        let mut builder = DatasetBuilder::new();

        loop {
            match tokio::time::timeout_at(deadline, pages.try_next()).await {
                Ok(Ok(Some(page))) => builder.push_page(page),
                Ok(Ok(None)) => break,
                Ok(Err(err)) => {
                    tracing::warn!(
                        kind = %request.kind,
                        pages = builder.pages(),
                        error = %err,
                        "aggregation aborted"
                    );
                    return Err(err);
                }
                Err(_) => {
                    tracing::warn!(
                        kind = %request.kind,
                        pages = builder.pages(),
                        records = builder.len(),
                        "aggregate timeout, discarding partial dataset"
                    );
                    return Err(AdsError::PartialData {
                        pages: builder.pages(),
                        records: builder.len(),
                    });
                }
            }
        }

        tracing::info!(
            kind = %request.kind,
            pages = builder.pages(),
            records = builder.len(),
            "aggregated dataset"
        );
        Ok(builder.freeze())
    }
}
