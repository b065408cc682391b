//! Spend that returns nothing, or far less than the account average.

use rust_decimal::Decimal;

use crate::analysis::stats::{discount, passes_floor, totals};
use crate::analysis::summary::SummaryBuilder;
use crate::analysis::{
    ActionCategory, AnalysisSummary, Analyzer, AnalyzerKind, AnalyzerParams, Recommendation,
};
use crate::types::{Dataset, Record, RecordKind};

/// Flags keywords and search terms that spend without converting, or whose
/// cost per conversion sits above the account average by more than the
/// efficiency band.
///
/// Keywords are paused; search terms get a negative, since a query cannot
/// be paused.
#[derive(Debug, Clone, Copy, Default)]
pub struct WastedSpendAnalyzer;

impl Analyzer for WastedSpendAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::WastedSpend
    }

    fn analyze(&self, dataset: &Dataset, params: &AnalyzerParams) -> AnalysisSummary {
        let active: Vec<&Record> = dataset
            .records()
            .iter()
            .filter(|r| matches!(r.kind, RecordKind::Keyword | RecordKind::SearchTerm))
            .filter(|r| r.is_active())
            .collect();
        let account_cpa = totals(active.iter().copied()).cost_per_conversion();

        let eligible: Vec<&Record> = active
            .into_iter()
            .filter(|r| passes_floor(&r.metrics, params))
            .collect();

        let mut builder = SummaryBuilder::new(self.kind(), dataset.len()).eligible(eligible.len());
        for record in eligible {
            if let Some(recommendation) = evaluate(record, account_cpa, params) {
                builder.push(recommendation);
            }
        }
        builder.finish(params, "spend without adequate return")
    }
}

fn evaluate(
    record: &Record,
    account_cpa: Option<Decimal>,
    params: &AnalyzerParams,
) -> Option<Recommendation> {
    let metrics = &record.metrics;
    if metrics.cost.is_zero() || metrics.cost < params.min_spend {
        return None;
    }

    if metrics.conversions.is_zero() {
        let action = match record.kind {
            RecordKind::SearchTerm => ActionCategory::AddNegative,
            _ => ActionCategory::Pause,
        };
        let rationale = format!(
            "Spent {:.2} on {} clicks in the window with no conversions.",
            metrics.cost, metrics.clicks
        );
        return Some(Recommendation::new(
            &record.text,
            action,
            discount(metrics.cost, params),
            metrics.cost,
            &rationale,
            [record.id.clone()],
        ));
    }

    let cpa = metrics.cost_per_conversion()?;
    let account_cpa = account_cpa?;
    if cpa <= account_cpa * (Decimal::ONE + params.efficiency_band) {
        return None;
    }

    // Spend beyond what the same conversions cost at the account average.
    let excess = metrics.cost - metrics.conversions * account_cpa;
    let rationale = format!(
        "Cost per conversion is {:.2} against an account average of {:.2} across {} conversions.",
        cpa, account_cpa, metrics.conversions
    );
    Some(Recommendation::new(
        &record.text,
        ActionCategory::DecreaseBid,
        discount(excess, params),
        metrics.cost,
        &rationale,
        [record.id.clone()],
    ))
}
