//! Page request and filter types.

use serde::{Deserialize, Serialize};

use crate::error::AdsError;
use crate::types::{DateRange, RecordKind, RecordStatus};

/// Records per page requested from the upstream.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Largest page size the upstream accepts.
pub const MAX_PAGE_SIZE: u32 = 500;

/// Filter field names used in the upstream expression language.
mod fields {
    pub const CAMPAIGN_ID: &str = "campaign.id";
    pub const AD_GROUP_ID: &str = "ad_group.id";
    pub const STATUS: &str = "status";
    pub const IMPRESSIONS: &str = "metrics.impressions";
}

/// Validate an upstream identifier: non-empty ASCII alphanumerics, `-` or `_`.
pub(crate) fn validate_id(field: &str, value: &str) -> Result<(), AdsError> {
    let valid = !value.is_empty()
        && value.len() <= 64
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(AdsError::InvalidRequest(format!("invalid {}", field)))
    }
}

/// Closed set of result-affecting filters for one logical request.
///
/// Values are canonicalized (sorted, de-duplicated) by [`RequestFilters::canonical`]
/// so two requests naming the same filters produce the same cache key.
///
/// # Example
///
/// ```rust
/// use ads_insight_client::upstream::RequestFilters;
///
/// let single = RequestFilters {
///     campaign_ids: vec!["123".into()],
///     ..Default::default()
/// };
/// assert_eq!(single.to_expression().as_deref(), Some("campaign.id = '123'"));
///
/// let multi = RequestFilters {
///     campaign_ids: vec!["2".into(), "1".into()],
///     min_impressions: Some(100),
///     ..Default::default()
/// }
/// .canonical();
/// assert_eq!(
///     multi.to_expression().as_deref(),
///     Some("(campaign.id = '1' OR campaign.id = '2') AND metrics.impressions >= 100")
/// );
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestFilters {
    /// Restrict to these campaigns
    pub campaign_ids: Vec<String>,
    /// Restrict to these ad groups
    pub ad_group_ids: Vec<String>,
    /// Restrict to these serving statuses
    pub statuses: Vec<RecordStatus>,
    /// Impression floor applied upstream
    pub min_impressions: Option<u64>,
}

impl RequestFilters {
    /// Whether no filter is set.
    pub fn is_empty(&self) -> bool {
        self.campaign_ids.is_empty()
            && self.ad_group_ids.is_empty()
            && self.statuses.is_empty()
            && self.min_impressions.is_none()
    }

    /// Check every identifier at the boundary.
    pub fn validate(&self) -> Result<(), AdsError> {
        for id in &self.campaign_ids {
            validate_id("campaign id", id)?;
        }
        for id in &self.ad_group_ids {
            validate_id("ad group id", id)?;
        }
        Ok(())
    }

    /// Sorted, de-duplicated copy.
    pub fn canonical(mut self) -> Self {
        self.campaign_ids.sort();
        self.campaign_ids.dedup();
        self.ad_group_ids.sort();
        self.ad_group_ids.dedup();
        self.statuses.sort();
        self.statuses.dedup();
        self
    }

    /// Render the upstream filter expression, or `None` when unfiltered.
    ///
    /// A single value renders as a bare equality; only multiple values are
    /// wrapped in a parenthesized disjunction.
    pub fn to_expression(&self) -> Option<String> {
        let statuses: Vec<&str> = self.statuses.iter().map(RecordStatus::as_str).collect();

        let clauses: Vec<String> = [
            disjunction(fields::CAMPAIGN_ID, &self.campaign_ids),
            disjunction(fields::AD_GROUP_ID, &self.ad_group_ids),
            disjunction(fields::STATUS, &statuses),
            self.min_impressions
                .map(|floor| format!("{} >= {}", fields::IMPRESSIONS, floor)),
        ]
        .into_iter()
        .flatten()
        .collect();

        if clauses.is_empty() {
            None
        } else {
            Some(clauses.join(" AND "))
        }
    }
}

fn disjunction<S: AsRef<str>>(field: &str, values: &[S]) -> Option<String> {
    match values {
        [] => None,
        [single] => Some(format!("{} = '{}'", field, single.as_ref())),
        many => {
            let terms: Vec<String> = many
                .iter()
                .map(|v| format!("{} = '{}'", field, v.as_ref()))
                .collect();
            Some(format!("({})", terms.join(" OR ")))
        }
    }
}

/// One logical fetch: an account, a record kind, a window and filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRequest {
    /// Upstream account identifier
    pub account_id: String,
    /// Resource to fetch
    pub kind: RecordKind,
    /// Reporting window
    pub date_range: DateRange,
    /// Result-affecting filters
    #[serde(default)]
    pub filters: RequestFilters,
    /// Records per page
    pub page_size: u32,
}

impl PageRequest {
    /// Create an unfiltered request with the default page size.
    pub fn new(account_id: impl Into<String>, kind: RecordKind, date_range: DateRange) -> Self {
        Self {
            account_id: account_id.into(),
            kind,
            date_range,
            filters: RequestFilters::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Set the filters (canonicalized).
    pub fn with_filters(mut self, filters: RequestFilters) -> Self {
        self.filters = filters.canonical();
        self
    }

    /// Set the page size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Validate once at the boundary.
    pub fn validate(&self) -> Result<(), AdsError> {
        validate_id("account id", &self.account_id)?;
        self.date_range.validate()?;
        self.filters.validate()?;
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(AdsError::InvalidRequest(format!(
                "page size must be between 1 and {}",
                MAX_PAGE_SIZE
            )));
        }
        Ok(())
    }
}
