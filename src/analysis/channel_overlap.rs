//! Campaign types competing for the same query.

use rust_decimal::Decimal;

use crate::analysis::stats::{Group, discount, group_by, normalize_text, passes_floor};
use crate::analysis::summary::SummaryBuilder;
use crate::analysis::{
    ActionCategory, AnalysisSummary, Analyzer, AnalyzerKind, AnalyzerParams, Recommendation,
};
use crate::types::{ChannelType, Dataset, RecordKind};

/// Finds queries served by more than one channel and flags the channels
/// paying materially more per conversion than the best one.
///
/// Impact is the spend above what the flagged channel's conversions would
/// have cost at the best channel's rate.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChannelOverlapAnalyzer;

impl Analyzer for ChannelOverlapAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::ChannelOverlap
    }

    fn analyze(&self, dataset: &Dataset, params: &AnalyzerParams) -> AnalysisSummary {
        let queries = group_by(
            dataset
                .of_kind(RecordKind::SearchTerm)
                .filter(|r| r.is_active()),
            |r| Some(normalize_text(&r.text)).filter(|q| !q.is_empty()),
        );

        let mut eligible = 0;
        let mut findings = Vec::new();
        for (query, group) in &queries {
            let channels: Vec<(ChannelType, Group<'_>)> =
                group_by(group.records.iter().copied(), |r| Some(r.campaign_type))
                    .into_iter()
                    .filter(|(_, g)| passes_floor(&g.metrics, params))
                    .collect();
            if channels.len() < 2 {
                continue;
            }
            eligible += channels.iter().map(|(_, g)| g.records.len()).sum::<usize>();

            // Lowest cost per conversion wins; ties go to the first channel.
            let Some((best, best_cpa)) = channels
                .iter()
                .filter_map(|(channel, g)| g.metrics.cost_per_conversion().map(|cpa| (*channel, cpa)))
                .min_by(|a, b| a.1.cmp(&b.1))
            else {
                continue;
            };
            let ceiling = best_cpa * (Decimal::ONE + params.efficiency_band);

            for (channel, g) in &channels {
                if *channel == best || g.metrics.cost < params.min_spend {
                    continue;
                }
                let cpa = g.metrics.cost_per_conversion();
                if cpa.is_some_and(|cpa| cpa < ceiling) {
                    continue;
                }
                let excess = g.metrics.cost - g.metrics.conversions * best_cpa;
                let impact = discount(excess, params);
                if impact <= Decimal::ZERO {
                    continue;
                }

                let paying = match cpa {
                    Some(cpa) => format!("{:.2} per conversion", cpa),
                    None => format!("{:.2} with no conversions", g.metrics.cost),
                };
                let rationale = format!(
                    "{} pays {} for this query while {} pays {:.2} per conversion.",
                    channel, paying, best, best_cpa
                );
                findings.push(Recommendation::new(
                    &format!("\"{}\" on {}", query, channel),
                    ActionCategory::ConsolidateChannel,
                    impact,
                    g.metrics.cost,
                    &rationale,
                    g.ids(),
                ));
            }
        }

        let mut builder = SummaryBuilder::new(self.kind(), dataset.len()).eligible(eligible);
        for finding in findings {
            builder.push(finding);
        }
        builder.finish(params, "a channel paying far more for a shared query")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testing::search_term;

    fn params() -> AnalyzerParams {
        AnalyzerKind::ChannelOverlap.default_params()
    }

    #[test]
    fn test_flags_less_efficient_channel() {
        let dataset: Dataset = vec![
            search_term("s1", "Trail Shoes")
                .metrics(1000, 40, 100, 10, 500)
                .build(),
            search_term("s2", "trail shoes")
                .campaign("c2", ChannelType::PerformanceMax)
                .metrics(1000, 40, 200, 5, 250)
                .build(),
        ]
        .into_iter()
        .collect();

        let summary = ChannelOverlapAnalyzer.analyze(&dataset, &params());

        assert_eq!(summary.records_eligible, 2);
        assert_eq!(summary.recommendations.len(), 1);
        let rec = &summary.recommendations[0];
        assert_eq!(rec.subject, "\"trail shoes\" on Performance Max");
        assert_eq!(rec.action, ActionCategory::ConsolidateChannel);
        // (200 - 5 * 10) * 0.5
        assert_eq!(rec.estimated_impact, Decimal::from(75));
        assert_eq!(rec.record_ids, vec!["s2"]);
    }

    #[test]
    fn test_zero_conversion_channel_flagged() {
        let dataset: Dataset = vec![
            search_term("s1", "boots").metrics(1000, 40, 100, 10, 500).build(),
            search_term("s2", "boots")
                .campaign("c3", ChannelType::Shopping)
                .metrics(1000, 40, 80, 0, 0)
                .build(),
        ]
        .into_iter()
        .collect();

        let summary = ChannelOverlapAnalyzer.analyze(&dataset, &params());
        assert_eq!(summary.recommendations.len(), 1);
        assert_eq!(summary.recommendations[0].estimated_impact, Decimal::from(40));
        assert!(summary.recommendations[0].rationale.contains("no conversions"));
    }

    #[test]
    fn test_similar_efficiency_not_flagged() {
        let dataset: Dataset = vec![
            search_term("s1", "boots").metrics(1000, 40, 100, 10, 500).build(),
            search_term("s2", "boots")
                .campaign("c2", ChannelType::PerformanceMax)
                .metrics(1000, 40, 110, 10, 500)
                .build(),
        ]
        .into_iter()
        .collect();

        let summary = ChannelOverlapAnalyzer.analyze(&dataset, &params());
        assert!(summary.recommendations.is_empty());
        assert_eq!(summary.records_eligible, 2);
    }

    #[test]
    fn test_single_channel_queries_ignored() {
        let dataset: Dataset = vec![
            search_term("s1", "boots").metrics(1000, 40, 100, 0, 0).build(),
            search_term("s2", "shoes").metrics(1000, 40, 100, 0, 0).build(),
        ]
        .into_iter()
        .collect();

        let summary = ChannelOverlapAnalyzer.analyze(&dataset, &params());
        assert_eq!(summary.records_eligible, 0);
    }
}
