//! Exclusions that block active targeting.

use rust_decimal::Decimal;

use crate::analysis::stats::{discount, normalize_text, passes_floor, totals};
use crate::analysis::summary::SummaryBuilder;
use crate::analysis::{
    ActionCategory, AnalysisSummary, Analyzer, AnalyzerKind, AnalyzerParams, Recommendation,
};
use crate::types::{Dataset, Record, RecordKind};

/// Flags negative keywords whose normalized text appears inside an active
/// keyword of the same campaign (and ad group, when the negative is scoped
/// to one). A negative with no campaign applies account-wide.
///
/// Impact is the conversion value the blocked keywords produced, or their
/// spend when no value is tracked.
#[derive(Debug, Clone, Copy, Default)]
pub struct NegativeConflictAnalyzer;

impl Analyzer for NegativeConflictAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::NegativeConflicts
    }

    fn analyze(&self, dataset: &Dataset, params: &AnalyzerParams) -> AnalysisSummary {
        let keywords: Vec<(&Record, String)> = dataset
            .of_kind(RecordKind::Keyword)
            .filter(|r| r.is_active() && passes_floor(&r.metrics, params))
            .map(|r| (r, normalize_text(&r.text)))
            .collect();

        let mut builder =
            SummaryBuilder::new(self.kind(), dataset.len()).eligible(keywords.len());

        for negative in dataset.of_kind(RecordKind::NegativeKeyword) {
            if !negative.is_active() {
                continue;
            }
            let needle = normalize_text(&negative.text);
            if needle.is_empty() {
                continue;
            }

            let blocked: Vec<&Record> = keywords
                .iter()
                .filter(|(keyword, text)| in_scope(negative, keyword) && text.contains(&needle))
                .map(|(keyword, _)| *keyword)
                .collect();
            if blocked.is_empty() {
                continue;
            }

            let metrics = totals(blocked.iter().copied());
            let at_stake = if metrics.conversion_value > Decimal::ZERO {
                metrics.conversion_value
            } else {
                metrics.cost
            };
            let rationale = format!(
                "Negative \"{}\" matches {} active keyword(s) such as \"{}\", which drove {} conversions worth {:.2}.",
                negative.text,
                blocked.len(),
                blocked[0].text,
                metrics.conversions,
                metrics.conversion_value
            );

            let ids = std::iter::once(negative.id.clone()).chain(blocked.iter().map(|k| k.id.clone()));
            builder.push(Recommendation::new(
                &negative.text,
                ActionCategory::RemoveNegative,
                discount(at_stake, params),
                metrics.cost,
                &rationale,
                ids,
            ));
        }

        builder.finish(params, "an exclusion blocking an active keyword")
    }
}

fn in_scope(negative: &Record, keyword: &Record) -> bool {
    if !negative.campaign_id.is_empty() && negative.campaign_id != keyword.campaign_id {
        return false;
    }
    match &negative.ad_group_id {
        Some(ad_group) => keyword.ad_group_id.as_ref() == Some(ad_group),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testing::{keyword, negative};
    use crate::types::ChannelType;

    fn params() -> AnalyzerParams {
        AnalyzerKind::NegativeConflicts.default_params()
    }

    #[test]
    fn test_flags_substring_conflict() {
        let dataset: Dataset = vec![
            keyword("k1", "[Free Shipping Shoes]").metrics(100, 10, 30, 3, 200).build(),
            keyword("k2", "running shoes").metrics(100, 10, 30, 3, 200).build(),
            negative("n1", "\"free shipping\"").ad_group(None).build(),
        ]
        .into_iter()
        .collect();

        let summary = NegativeConflictAnalyzer.analyze(&dataset, &params());

        assert_eq!(summary.records_eligible, 2);
        assert_eq!(summary.recommendations.len(), 1);
        let rec = &summary.recommendations[0];
        assert_eq!(rec.action, ActionCategory::RemoveNegative);
        assert_eq!(rec.record_ids, vec!["k1", "n1"]);
        // 200 * 0.6
        assert_eq!(rec.estimated_impact, Decimal::from(120));
    }

    #[test]
    fn test_scope_limits_conflicts() {
        let dataset: Dataset = vec![
            keyword("k1", "cheap flights").campaign("c2", ChannelType::Search).build(),
            keyword("k2", "cheap hotels").ad_group(Some("ag2")).build(),
            negative("n1", "cheap").build(),
        ]
        .into_iter()
        .collect();

        // n1 sits in campaign c1, ad group ag1; neither keyword shares both.
        let summary = NegativeConflictAnalyzer.analyze(&dataset, &params());
        assert!(summary.recommendations.is_empty());

        let account_wide: Dataset = vec![
            keyword("k1", "cheap flights").campaign("c2", ChannelType::Search).build(),
            negative("n1", "cheap").campaign("", ChannelType::Search).ad_group(None).build(),
        ]
        .into_iter()
        .collect();
        let summary = NegativeConflictAnalyzer.analyze(&account_wide, &params());
        assert_eq!(summary.recommendations.len(), 1);
        // No conversion value tracked, impact falls back to spend (zero here).
        assert_eq!(summary.recommendations[0].estimated_impact, Decimal::ZERO);
    }

    #[test]
    fn test_no_negatives() {
        let dataset: Dataset = vec![keyword("k1", "shoes").build()].into_iter().collect();
        let summary = NegativeConflictAnalyzer.analyze(&dataset, &params());
        assert!(summary.recommendations.is_empty());
        assert_eq!(summary.records_eligible, 1);
    }
}
