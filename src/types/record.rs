//! Normalized upstream records.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::serde_helpers::{empty_string_as_none, flexible_decimal, flexible_u64, micros};

/// Kind of upstream unit a record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A targeted keyword
    Keyword,
    /// A user query that triggered an ad
    SearchTerm,
    /// An exclusion rule
    NegativeKeyword,
    /// A geographic performance segment
    GeoSegment,
}

impl RecordKind {
    /// All record kinds in canonical order.
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Keyword,
        RecordKind::SearchTerm,
        RecordKind::NegativeKeyword,
        RecordKind::GeoSegment,
    ];

    /// Path segment of the upstream resource for this kind.
    pub fn resource(&self) -> &'static str {
        match self {
            RecordKind::Keyword => "keywords",
            RecordKind::SearchTerm => "search_terms",
            RecordKind::NegativeKeyword => "negative_keywords",
            RecordKind::GeoSegment => "geo_segments",
        }
    }

    /// Whether records of this kind are near-static reference data.
    pub fn is_reference_data(&self) -> bool {
        matches!(self, RecordKind::NegativeKeyword)
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.resource())
    }
}

/// Match mode of a keyword or exclusion rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchType {
    /// Exact match
    Exact,
    /// Phrase match
    Phrase,
    /// Broad match
    Broad,
}

impl MatchType {
    /// Whether this mode admits queries other than the rule text itself.
    pub fn is_loose(&self) -> bool {
        !matches!(self, MatchType::Exact)
    }
}

/// Campaign channel type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelType {
    /// Search network campaign
    Search,
    /// Automated cross-inventory campaign
    PerformanceMax,
    /// Product listing campaign
    Shopping,
    /// Display network campaign
    Display,
    /// Any other campaign type
    #[serde(other)]
    Other,
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChannelType::Search => "Search",
            ChannelType::PerformanceMax => "Performance Max",
            ChannelType::Shopping => "Shopping",
            ChannelType::Display => "Display",
            ChannelType::Other => "Other",
        };
        write!(f, "{}", s)
    }
}

/// Serving status of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    /// Serving
    Enabled,
    /// Paused by the advertiser
    Paused,
    /// Removed
    Removed,
}

impl RecordStatus {
    /// Upstream spelling used in filter expressions.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Enabled => "ENABLED",
            RecordStatus::Paused => "PAUSED",
            RecordStatus::Removed => "REMOVED",
        }
    }
}

/// Numeric measures of a record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metrics {
    /// Impressions served
    pub impressions: u64,
    /// Clicks received
    pub clicks: u64,
    /// Spend in account currency
    pub cost: Decimal,
    /// Conversions (may be fractional under data-driven attribution)
    pub conversions: Decimal,
    /// Value of the conversions in account currency
    pub conversion_value: Decimal,
}

impl Metrics {
    /// Accumulate another set of measures into this one.
    pub fn add(&mut self, other: &Metrics) {
        self.impressions += other.impressions;
        self.clicks += other.clicks;
        self.cost += other.cost;
        self.conversions += other.conversions;
        self.conversion_value += other.conversion_value;
    }

    /// Cost per conversion, `None` without conversions.
    pub fn cost_per_conversion(&self) -> Option<Decimal> {
        if self.conversions.is_zero() {
            None
        } else {
            Some(self.cost / self.conversions)
        }
    }

    /// Conversion value per unit of cost, `None` without spend.
    pub fn return_on_spend(&self) -> Option<Decimal> {
        if self.cost.is_zero() {
            None
        } else {
            Some(self.conversion_value / self.cost)
        }
    }
}

/// A normalized upstream unit. Immutable once fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Stable upstream identity
    pub id: String,
    /// What this record describes
    pub kind: RecordKind,
    /// Keyword text, query text, exclusion text or location name
    pub text: String,
    /// Match mode (for search terms: the triggering keyword's mode)
    pub match_type: Option<MatchType>,
    /// Serving status
    pub status: Option<RecordStatus>,
    /// Owning campaign
    pub campaign_id: String,
    /// Owning campaign's channel
    pub campaign_type: ChannelType,
    /// Owning ad group, if scoped below campaign level
    pub ad_group_id: Option<String>,
    /// Triggering keyword for search terms
    pub keyword_id: Option<String>,
    /// Location for geo segments
    pub location: Option<String>,
    /// Numeric measures
    pub metrics: Metrics,
}

impl Record {
    /// Whether this record is actively serving (unknown status counts as active).
    pub fn is_active(&self) -> bool {
        !matches!(
            self.status,
            Some(RecordStatus::Paused) | Some(RecordStatus::Removed)
        )
    }
}

/// Record as it arrives on the wire, before normalization.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireRecord {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub match_type: Option<MatchType>,
    #[serde(default)]
    pub status: Option<RecordStatus>,
    #[serde(default)]
    pub campaign_id: String,
    #[serde(default = "default_channel")]
    pub campaign_type: ChannelType,
    #[serde(deserialize_with = "empty_string_as_none::deserialize", default)]
    pub ad_group_id: Option<String>,
    #[serde(deserialize_with = "empty_string_as_none::deserialize", default)]
    pub keyword_id: Option<String>,
    #[serde(deserialize_with = "empty_string_as_none::deserialize", default)]
    pub location: Option<String>,
    #[serde(default)]
    pub metrics: WireMetrics,
}

fn default_channel() -> ChannelType {
    ChannelType::Other
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct WireMetrics {
    #[serde(deserialize_with = "flexible_u64::deserialize", default)]
    pub impressions: u64,
    #[serde(deserialize_with = "flexible_u64::deserialize", default)]
    pub clicks: u64,
    #[serde(deserialize_with = "micros::deserialize", default)]
    pub cost_micros: Decimal,
    #[serde(deserialize_with = "flexible_decimal::deserialize", default)]
    pub conversions: Decimal,
    #[serde(deserialize_with = "flexible_decimal::deserialize", default)]
    pub conversion_value: Decimal,
}

impl WireRecord {
    /// Normalize into the internal model.
    pub(crate) fn normalize(self, kind: RecordKind) -> Record {
        let location = match kind {
            RecordKind::GeoSegment => self.location.or_else(|| Some(self.text.clone())),
            _ => self.location,
        };
        Record {
            id: self.id,
            kind,
            text: self.text.trim().to_string(),
            match_type: self.match_type,
            status: self.status,
            campaign_id: self.campaign_id,
            campaign_type: self.campaign_type,
            ad_group_id: self.ad_group_id,
            keyword_id: self.keyword_id,
            location,
            metrics: Metrics {
                impressions: self.metrics.impressions,
                clicks: self.metrics.clicks,
                cost: self.metrics.cost_micros,
                conversions: self.metrics.conversions,
                conversion_value: self.metrics.conversion_value,
            },
        }
    }
}
