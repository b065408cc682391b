//! Deterministic analyzers over a frozen [`Dataset`].
//!
//! Every analyzer is a pure function from a dataset and parameters to a
//! bounded [`AnalysisSummary`]: same input, same output, no clock and no
//! randomness. Analyzers are selected by [`AnalyzerKind`] through one lookup
//! table that also names the record kinds each one needs and its default
//! parameters.
//!
//! | Kind | Needs | Flags |
//! |------|-------|-------|
//! | [`AnalyzerKind::WastedSpend`] | keywords | spend with no conversions, or cost per conversion far above the account |
//! | [`AnalyzerKind::MatchTypeTightening`] | keywords, search terms | one query capturing most of a loose keyword's clicks |
//! | [`AnalyzerKind::NegativeConflicts`] | keywords, negatives | an exclusion whose text is inside an active keyword |
//! | [`AnalyzerKind::GeoAdjustment`] | geo segments | locations far above or below account return on spend |
//! | [`AnalyzerKind::ChannelOverlap`] | search terms | the same query served by several channels at very different cost per conversion |
//!
//! # Example
//!
//! ```rust
//! use ads_insight_client::analysis::AnalyzerKind;
//! use ads_insight_client::types::Dataset;
//!
//! let kind = AnalyzerKind::WastedSpend;
//! let summary = kind.analyzer().analyze(&Dataset::empty(), &kind.default_params());
//! assert!(summary.recommendations.is_empty());
//! ```

mod channel_overlap;
mod geo;
mod match_type;
mod negative_conflicts;
mod stats;
mod summary;
#[cfg(test)]
mod testing;
mod wasted_spend;

pub use channel_overlap::ChannelOverlapAnalyzer;
pub use geo::GeoAdjustmentAnalyzer;
pub use match_type::MatchTypeAnalyzer;
pub use negative_conflicts::NegativeConflictAnalyzer;
pub use summary::{
    ActionCategory, AnalysisSummary, MAX_RECORD_REFS, PlanPhase, PlanStep, Recommendation,
};
pub use wasted_spend::WastedSpendAnalyzer;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AdsError;
use crate::types::{Dataset, RecordKind};

/// Hard upper bound on recommendations in one summary.
pub const MAX_RECOMMENDATIONS: usize = 10;

/// Lowest accepted impact discount.
pub const MIN_CONFIDENCE: Decimal = Decimal::from_parts(5, 0, 0, false, 1);

/// Highest accepted impact discount. An estimate never claims the whole gap.
pub const MAX_CONFIDENCE: Decimal = Decimal::from_parts(8, 0, 0, false, 1);

/// One analysis algorithm.
pub trait Analyzer: Send + Sync {
    /// Which kind this analyzer implements.
    fn kind(&self) -> AnalyzerKind;

    /// Analyze a frozen dataset. Never fails: empty or below-floor input
    /// yields an explanatory summary with no recommendations.
    fn analyze(&self, dataset: &Dataset, params: &AnalyzerParams) -> AnalysisSummary;
}

/// Closed set of analyzers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyzerKind {
    /// Spend without return
    WastedSpend,
    /// Loose keywords dominated by one query
    MatchTypeTightening,
    /// Exclusions blocking active keywords
    NegativeConflicts,
    /// Location bid adjustments
    GeoAdjustment,
    /// Campaign types competing for the same query
    ChannelOverlap,
}

struct RegistryEntry {
    kind: AnalyzerKind,
    analyzer: &'static dyn Analyzer,
    requires: &'static [RecordKind],
}

static REGISTRY: [RegistryEntry; 5] = [
    RegistryEntry {
        kind: AnalyzerKind::WastedSpend,
        analyzer: &WastedSpendAnalyzer,
        requires: &[RecordKind::Keyword],
    },
    RegistryEntry {
        kind: AnalyzerKind::MatchTypeTightening,
        analyzer: &MatchTypeAnalyzer,
        requires: &[RecordKind::Keyword, RecordKind::SearchTerm],
    },
    RegistryEntry {
        kind: AnalyzerKind::NegativeConflicts,
        analyzer: &NegativeConflictAnalyzer,
        requires: &[RecordKind::Keyword, RecordKind::NegativeKeyword],
    },
    RegistryEntry {
        kind: AnalyzerKind::GeoAdjustment,
        analyzer: &GeoAdjustmentAnalyzer,
        requires: &[RecordKind::GeoSegment],
    },
    RegistryEntry {
        kind: AnalyzerKind::ChannelOverlap,
        analyzer: &ChannelOverlapAnalyzer,
        requires: &[RecordKind::SearchTerm],
    },
];

impl AnalyzerKind {
    /// All analyzer kinds.
    pub const ALL: [AnalyzerKind; 5] = [
        AnalyzerKind::WastedSpend,
        AnalyzerKind::MatchTypeTightening,
        AnalyzerKind::NegativeConflicts,
        AnalyzerKind::GeoAdjustment,
        AnalyzerKind::ChannelOverlap,
    ];

    fn entry(&self) -> &'static RegistryEntry {
        // The registry lists kinds in declaration order.
        &REGISTRY[*self as usize]
    }

    /// The analyzer implementing this kind.
    pub fn analyzer(&self) -> &'static dyn Analyzer {
        self.entry().analyzer
    }

    /// Record kinds the analyzer needs fetched.
    pub fn required_kinds(&self) -> &'static [RecordKind] {
        self.entry().requires
    }

    /// Default parameters tuned for this analyzer.
    pub fn default_params(&self) -> AnalyzerParams {
        let base = AnalyzerParams::default();
        match self {
            AnalyzerKind::WastedSpend => base,
            AnalyzerKind::MatchTypeTightening => AnalyzerParams {
                confidence: Decimal::new(5, 1),
                ..base
            },
            AnalyzerKind::NegativeConflicts => AnalyzerParams {
                min_impressions: 0,
                min_clicks: 0,
                min_spend: Decimal::ZERO,
                confidence: Decimal::new(6, 1),
                ..base
            },
            AnalyzerKind::GeoAdjustment => AnalyzerParams {
                min_clicks: 20,
                efficiency_band: Decimal::new(3, 1),
                confidence: Decimal::new(5, 1),
                ..base
            },
            AnalyzerKind::ChannelOverlap => AnalyzerParams {
                efficiency_band: Decimal::new(3, 1),
                confidence: Decimal::new(5, 1),
                ..base
            },
        }
    }

    /// Stable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyzerKind::WastedSpend => "wasted_spend",
            AnalyzerKind::MatchTypeTightening => "match_type_tightening",
            AnalyzerKind::NegativeConflicts => "negative_conflicts",
            AnalyzerKind::GeoAdjustment => "geo_adjustment",
            AnalyzerKind::ChannelOverlap => "channel_overlap",
        }
    }
}

impl std::fmt::Display for AnalyzerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds shared by every analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerParams {
    /// Impression floor per entity
    pub min_impressions: u64,
    /// Click floor per entity
    pub min_clicks: u64,
    /// Spend floor before an entity can be flagged
    pub min_spend: Decimal,
    /// Relative distance from the account average that counts as "far" (0.5 = 50%)
    pub efficiency_band: Decimal,
    /// Share of an entity's clicks that makes one variant dominant
    pub majority_share: Decimal,
    /// Fraction of the naive gap claimed as impact, between 0.5 and 0.8
    pub confidence: Decimal,
    /// Recommendations kept in the summary
    pub max_recommendations: usize,
}

impl Default for AnalyzerParams {
    fn default() -> Self {
        Self {
            min_impressions: 100,
            min_clicks: 10,
            min_spend: Decimal::new(50, 0),
            efficiency_band: Decimal::new(5, 1),
            majority_share: Decimal::new(6, 1),
            confidence: Decimal::new(7, 1),
            max_recommendations: MAX_RECOMMENDATIONS,
        }
    }
}

impl AnalyzerParams {
    /// Check ranges once at the boundary.
    pub fn validate(&self) -> Result<(), AdsError> {
        let invalid = |msg: &str| Err(AdsError::InvalidRequest(msg.to_string()));

        if self.confidence < MIN_CONFIDENCE || self.confidence > MAX_CONFIDENCE {
            return invalid("confidence must be between 0.5 and 0.8");
        }
        if self.majority_share <= Decimal::new(5, 1) || self.majority_share > Decimal::ONE {
            return invalid("majority share must be in (0.5, 1]");
        }
        if self.efficiency_band <= Decimal::ZERO {
            return invalid("efficiency band must be positive");
        }
        if self.min_spend < Decimal::ZERO {
            return invalid("minimum spend must not be negative");
        }
        if self.max_recommendations == 0 || self.max_recommendations > MAX_RECOMMENDATIONS {
            return invalid("max recommendations must be between 1 and 10");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_matches_kinds() {
        for kind in AnalyzerKind::ALL {
            assert_eq!(kind.analyzer().kind(), kind);
            assert!(!kind.required_kinds().is_empty());
            assert!(kind.default_params().validate().is_ok());
        }
    }

    #[test]
    fn test_params_validation() {
        let ok = AnalyzerParams::default();
        assert!(ok.validate().is_ok());

        for bad in [
            AnalyzerParams { confidence: Decimal::ZERO, ..ok.clone() },
            AnalyzerParams { confidence: Decimal::new(11, 1), ..ok.clone() },
            AnalyzerParams { confidence: Decimal::ONE, ..ok.clone() },
            AnalyzerParams { confidence: Decimal::new(81, 2), ..ok.clone() },
            AnalyzerParams { confidence: Decimal::new(49, 2), ..ok.clone() },
            AnalyzerParams { majority_share: Decimal::new(5, 1), ..ok.clone() },
            AnalyzerParams { efficiency_band: Decimal::ZERO, ..ok.clone() },
            AnalyzerParams { max_recommendations: 11, ..ok.clone() },
            AnalyzerParams { max_recommendations: 0, ..ok.clone() },
        ] {
            assert!(matches!(bad.validate(), Err(AdsError::InvalidRequest(_))));
        }
    }

    #[test]
    fn test_confidence_bounds_are_inclusive() {
        for confidence in [MIN_CONFIDENCE, MAX_CONFIDENCE] {
            let params = AnalyzerParams { confidence, ..AnalyzerParams::default() };
            assert!(params.validate().is_ok());
        }
        assert_eq!(MIN_CONFIDENCE, Decimal::new(5, 1));
        assert_eq!(MAX_CONFIDENCE, Decimal::new(8, 1));
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&AnalyzerKind::GeoAdjustment).unwrap();
        assert_eq!(json, "\"geo_adjustment\"");
        assert_eq!(AnalyzerKind::GeoAdjustment.to_string(), "geo_adjustment");
    }

    #[test]
    fn test_every_analyzer_handles_empty_dataset() {
        for kind in AnalyzerKind::ALL {
            let summary = kind.analyzer().analyze(&Dataset::empty(), &kind.default_params());
            assert_eq!(summary.analyzer, kind);
            assert_eq!(summary.records_analyzed, 0);
            assert!(summary.recommendations.is_empty());
            assert!(!summary.narrative.is_empty());
        }
    }
}
