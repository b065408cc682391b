//! Location bid adjustments.

use rust_decimal::Decimal;

use crate::analysis::stats::{discount, group_by, passes_floor, totals};
use crate::analysis::summary::SummaryBuilder;
use crate::analysis::{
    ActionCategory, AnalysisSummary, Analyzer, AnalyzerKind, AnalyzerParams, Recommendation,
};
use crate::types::{Dataset, Record, RecordKind};

/// Compares each location's return on spend against the account and flags
/// locations outside `account * (1 ± efficiency_band)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GeoAdjustmentAnalyzer;

impl Analyzer for GeoAdjustmentAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::GeoAdjustment
    }

    fn analyze(&self, dataset: &Dataset, params: &AnalyzerParams) -> AnalysisSummary {
        let segments: Vec<&Record> = dataset
            .of_kind(RecordKind::GeoSegment)
            .filter(|r| r.is_active())
            .collect();
        let account = totals(segments.iter().copied());

        let locations = group_by(segments.iter().copied(), |r| r.location.clone());
        let eligible: Vec<_> = locations
            .iter()
            .filter(|(_, group)| {
                passes_floor(&group.metrics, params) && group.metrics.cost >= params.min_spend
            })
            .collect();
        let records_eligible: usize = eligible.iter().map(|(_, g)| g.records.len()).sum();

        let mut builder =
            SummaryBuilder::new(self.kind(), dataset.len()).eligible(records_eligible);
        if records_eligible == 0 {
            return builder.finish(params, "");
        }
        let Some(account_roas) = account.return_on_spend().filter(|r| !r.is_zero()) else {
            return builder.explain(
                "No conversion value was recorded for the account in this window, so return on spend cannot be compared across locations.",
            );
        };

        let upper = account_roas * (Decimal::ONE + params.efficiency_band);
        let lower = account_roas * (Decimal::ONE - params.efficiency_band);

        for (location, group) in eligible {
            let Some(roas) = group.metrics.return_on_spend() else {
                continue;
            };
            let expected = account_roas * group.metrics.cost;
            let (action, gap) = if roas > upper {
                (ActionCategory::IncreaseBid, group.metrics.conversion_value - expected)
            } else if roas < lower {
                (ActionCategory::DecreaseBid, expected - group.metrics.conversion_value)
            } else {
                continue;
            };
            let impact = discount(gap, params);
            if impact <= Decimal::ZERO {
                continue;
            }

            let rationale = format!(
                "Return on spend is {:.2} against an account average of {:.2} on {:.2} of spend.",
                roas, account_roas, group.metrics.cost
            );
            builder.push(Recommendation::new(
                location,
                action,
                impact,
                group.metrics.cost,
                &rationale,
                group.ids(),
            ));
        }

        builder.finish(params, "return on spend far from the account average")
    }
}
