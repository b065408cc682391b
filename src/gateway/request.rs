//! Gateway request types and the per-request state machine.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::analysis::{AnalyzerKind, AnalyzerParams};
use crate::error::AdsError;
use crate::types::{DateRange, RecordKind};
use crate::upstream::{PageRequest, RequestFilters};

/// Input of one analysis call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// Upstream account identifier
    pub account_id: String,
    /// Reporting window
    pub date_range: DateRange,
    /// Optional upstream filters
    #[serde(default)]
    pub filters: RequestFilters,
    /// Analyzer parameters; the analyzer's defaults when absent
    #[serde(default)]
    pub params: Option<AnalyzerParams>,
}

impl AnalysisRequest {
    /// Create an unfiltered request with default parameters.
    pub fn new(account_id: impl Into<String>, date_range: DateRange) -> Self {
        Self {
            account_id: account_id.into(),
            date_range,
            filters: RequestFilters::default(),
            params: None,
        }
    }

    /// Set the filters.
    pub fn with_filters(mut self, filters: RequestFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Override the analyzer parameters.
    pub fn with_params(mut self, params: AnalyzerParams) -> Self {
        self.params = Some(params);
        self
    }

    pub(crate) fn page_request(&self, kind: RecordKind, page_size: u32) -> PageRequest {
        page_request(&self.account_id, kind, self.date_range, &self.filters, page_size)
    }
}

/// Input of one raw page fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    /// Upstream account identifier
    pub account_id: String,
    /// Reporting window
    pub date_range: DateRange,
    /// Optional upstream filters
    #[serde(default)]
    pub filters: RequestFilters,
    /// Records per page; the configured size when absent
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl FetchRequest {
    /// Create an unfiltered request.
    pub fn new(account_id: impl Into<String>, date_range: DateRange) -> Self {
        Self {
            account_id: account_id.into(),
            date_range,
            filters: RequestFilters::default(),
            page_size: None,
        }
    }

    /// Set the filters.
    pub fn with_filters(mut self, filters: RequestFilters) -> Self {
        self.filters = filters;
        self
    }

    /// Set the page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub(crate) fn page_request(&self, kind: RecordKind, default_page_size: u32) -> PageRequest {
        page_request(
            &self.account_id,
            kind,
            self.date_range,
            &self.filters,
            self.page_size.unwrap_or(default_page_size),
        )
    }
}

fn page_request(
    account_id: &str,
    kind: RecordKind,
    date_range: DateRange,
    filters: &RequestFilters,
    page_size: u32,
) -> PageRequest {
    // Exclusion lists carry no metrics.
    let filters = if kind.is_reference_data() {
        RequestFilters {
            min_impressions: None,
            ..filters.clone()
        }
    } else {
        filters.clone()
    };
    PageRequest::new(account_id, kind, date_range)
        .with_filters(filters)
        .with_page_size(page_size)
}

/// Where an analysis request is in its lifecycle.
///
/// ```text
/// Received -> CacheCheck -> Hit -> Done
///                        -> Miss -> Fetching -> Aggregated -> Analyzing -> Done
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestState {
    /// Accepted, not yet validated
    Received,
    /// Looking up the summary cache
    CacheCheck,
    /// Summary served from cache
    Hit,
    /// Summary not cached
    Miss,
    /// Pulling pages from the upstream
    Fetching,
    /// Every required kind is complete
    Aggregated,
    /// Analyzer running
    Analyzing,
    /// Summary returned
    Done,
}

impl RequestState {
    /// Whether `next` directly follows this state.
    pub fn can_advance_to(self, next: RequestState) -> bool {
        use RequestState::*;
        matches!(
            (self, next),
            (Received, CacheCheck)
                | (CacheCheck, Hit)
                | (CacheCheck, Miss)
                | (Hit, Done)
                | (Miss, Fetching)
                | (Fetching, Aggregated)
                | (Aggregated, Analyzing)
                | (Analyzing, Done)
        )
    }
}

/// Follows one analysis request through its states and logs every
/// transition.
#[derive(Debug)]
pub(crate) struct RequestTracker {
    analyzer: AnalyzerKind,
    state: RequestState,
    started: Instant,
}

impl RequestTracker {
    pub(crate) fn new(analyzer: AnalyzerKind) -> Self {
        Self {
            analyzer,
            state: RequestState::Received,
            started: Instant::now(),
        }
    }

    pub(crate) fn advance(&mut self, next: RequestState) -> Result<(), AdsError> {
        if !self.state.can_advance_to(next) {
            tracing::error!(
                analyzer = %self.analyzer,
                from = ?self.state,
                to = ?next,
                "invalid request state transition"
            );
            return Err(AdsError::InvalidRequest(format!(
                "invalid state transition {:?} -> {:?}",
                self.state, next
            )));
        }
        tracing::debug!(analyzer = %self.analyzer, from = ?self.state, to = ?next, "request state");
        self.state = next;
        if next == RequestState::Done {
            tracing::info!(
                analyzer = %self.analyzer,
                elapsed_ms = self.started.elapsed().as_millis() as u64,
                "analysis request done"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn test_state_machine_paths() {
        use RequestState::*;
        let miss_path = [Received, CacheCheck, Miss, Fetching, Aggregated, Analyzing, Done];
        for pair in miss_path.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]), "{:?} -> {:?}", pair[0], pair[1]);
        }
        assert!(CacheCheck.can_advance_to(Hit));
        assert!(Hit.can_advance_to(Done));

        assert!(!Received.can_advance_to(Fetching));
        assert!(!Hit.can_advance_to(Fetching));
        assert!(!Done.can_advance_to(Received));
    }

    #[test]
    fn test_tracker_rejects_skips() {
        let mut tracker = RequestTracker::new(AnalyzerKind::WastedSpend);
        assert!(tracker.advance(RequestState::CacheCheck).is_ok());
        assert!(tracker.advance(RequestState::Analyzing).is_err());
        assert_eq!(tracker.state, RequestState::CacheCheck);
    }

    #[test]
    fn test_reference_kinds_drop_metric_filters() {
        let range = DateRange::new(date!(2024 - 01 - 01), date!(2024 - 01 - 31)).unwrap();
        let request = AnalysisRequest::new("123", range).with_filters(RequestFilters {
            campaign_ids: vec!["9".into()],
            min_impressions: Some(100),
            ..RequestFilters::default()
        });

        let keywords = request.page_request(RecordKind::Keyword, 500);
        assert_eq!(keywords.filters.min_impressions, Some(100));

        let negatives = request.page_request(RecordKind::NegativeKeyword, 500);
        assert_eq!(negatives.filters.min_impressions, None);
        assert_eq!(negatives.filters.campaign_ids, vec!["9"]);
    }

    #[test]
    fn test_fetch_request_page_size() {
        let range = DateRange::new(date!(2024 - 01 - 01), date!(2024 - 01 - 31)).unwrap();
        let request = FetchRequest::new("123", range);
        assert_eq!(request.page_request(RecordKind::GeoSegment, 500).page_size, 500);
        let request = request.with_page_size(50);
        assert_eq!(request.page_request(RecordKind::GeoSegment, 500).page_size, 50);
    }
}
