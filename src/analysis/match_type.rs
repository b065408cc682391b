//! Loose keywords whose traffic is dominated by one query.

use std::collections::HashMap;

use rust_decimal::Decimal;

use crate::analysis::stats::{discount, group_by, passes_floor};
use crate::analysis::summary::SummaryBuilder;
use crate::analysis::{
    ActionCategory, AnalysisSummary, Analyzer, AnalyzerKind, AnalyzerParams, Recommendation,
};
use crate::types::{Dataset, Record, RecordKind};

/// Groups search terms under their triggering phrase or broad keyword and
/// flags keywords where a single query captures at least the majority share
/// of clicks. Impact is the spend on the other, non-converting queries.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchTypeAnalyzer;

impl Analyzer for MatchTypeAnalyzer {
    fn kind(&self) -> AnalyzerKind {
        AnalyzerKind::MatchTypeTightening
    }

    fn analyze(&self, dataset: &Dataset, params: &AnalyzerParams) -> AnalysisSummary {
        let keywords: HashMap<&str, &Record> = dataset
            .of_kind(RecordKind::Keyword)
            .map(|r| (r.id.as_str(), r))
            .collect();

        // The triggering keyword's match type wins over the term's own field.
        let loose_terms = dataset.of_kind(RecordKind::SearchTerm).filter(|term| {
            let keyword = term.keyword_id.as_deref().and_then(|id| keywords.get(id));
            if keyword.is_some_and(|k| !k.is_active()) {
                return false;
            }
            keyword
                .and_then(|k| k.match_type)
                .or(term.match_type)
                .is_some_and(|m| m.is_loose())
        });

        let groups = group_by(loose_terms, |term| term.keyword_id.clone());

        let mut eligible = 0;
        let mut findings = Vec::new();
        for (keyword_id, group) in &groups {
            if group.records.len() < 2 || !passes_floor(&group.metrics, params) {
                continue;
            }
            eligible += group.records.len();
            if group.metrics.clicks == 0 {
                continue;
            }

            let Some(top) = group
                .records
                .iter()
                .copied()
                .max_by(|a, b| {
                    a.metrics
                        .clicks
                        .cmp(&b.metrics.clicks)
                        .then_with(|| b.id.cmp(&a.id))
                })
            else {
                continue;
            };

            let share = Decimal::from(top.metrics.clicks) / Decimal::from(group.metrics.clicks);
            if share < params.majority_share {
                continue;
            }

            let stray: Vec<&Record> = group
                .records
                .iter()
                .copied()
                .filter(|r| r.id != top.id && r.metrics.conversions.is_zero())
                .collect();
            let wasted: Decimal = stray.iter().map(|r| r.metrics.cost).sum();
            let impact = discount(wasted, params);
            if impact <= Decimal::ZERO {
                continue;
            }

            let keyword = keywords.get(keyword_id.as_str());
            let subject = keyword.map_or(keyword_id.as_str(), |k| k.text.as_str());
            let rationale = format!(
                "{}% of clicks came from \"{}\"; {} other non-converting queries spent {:.2}.",
                (share * Decimal::ONE_HUNDRED).round_dp(0),
                top.text,
                stray.len(),
                wasted
            );

            let mut ids = vec![top.id.clone()];
            ids.extend(keyword.map(|k| k.id.clone()));
            ids.extend(stray.iter().map(|r| r.id.clone()));

            findings.push(Recommendation::new(
                subject,
                ActionCategory::TightenMatchType,
                impact,
                group.metrics.cost,
                &rationale,
                ids,
            ));
        }

        let mut builder = SummaryBuilder::new(self.kind(), dataset.len()).eligible(eligible);
        for finding in findings {
            builder.push(finding);
        }
        builder.finish(params, "one query dominating a loose keyword")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::testing::{keyword, search_term};
    use crate::types::{MatchType, RecordStatus};

    fn params() -> AnalyzerParams {
        AnalyzerKind::MatchTypeTightening.default_params()
    }

    #[test]
    fn test_flags_dominant_query() {
        let dataset: Dataset = vec![
            keyword("k1", "running shoes").build(),
            search_term("s1", "running shoes men")
                .keyword_id("k1")
                .metrics(800, 70, 140, 7, 700)
                .build(),
            search_term("s2", "running shoes repair")
                .keyword_id("k1")
                .metrics(200, 20, 40, 0, 0)
                .build(),
            search_term("s3", "shoes")
                .keyword_id("k1")
                .metrics(100, 10, 20, 1, 30)
                .build(),
        ]
        .into_iter()
        .collect();

        let summary = MatchTypeAnalyzer.analyze(&dataset, &params());

        assert_eq!(summary.records_eligible, 3);
        assert_eq!(summary.recommendations.len(), 1);
        let rec = &summary.recommendations[0];
        assert_eq!(rec.subject, "running shoes");
        assert_eq!(rec.action, ActionCategory::TightenMatchType);
        // Only s2 is stray: 40 * 0.5
        assert_eq!(rec.estimated_impact, Decimal::from(20));
        assert_eq!(rec.record_ids, vec!["k1", "s1", "s2"]);
        assert!(rec.rationale.starts_with("70%"));
    }

    #[test]
    fn test_spread_traffic_not_flagged() {
        let dataset: Dataset = vec![
            keyword("k1", "shoes").build(),
            search_term("s1", "a").keyword_id("k1").metrics(500, 50, 50, 1, 10).build(),
            search_term("s2", "b").keyword_id("k1").metrics(500, 50, 50, 1, 10).build(),
        ]
        .into_iter()
        .collect();

        let summary = MatchTypeAnalyzer.analyze(&dataset, &params());
        assert!(summary.recommendations.is_empty());
        assert_eq!(summary.records_eligible, 2);
    }

    #[test]
    fn test_exact_and_paused_keywords_skipped() {
        let dataset: Dataset = vec![
            keyword("k1", "exact").match_type(MatchType::Exact).build(),
            keyword("k2", "paused").status(RecordStatus::Paused).build(),
            search_term("s1", "a").keyword_id("k1").metrics(900, 90, 50, 0, 0).build(),
            search_term("s2", "b").keyword_id("k1").metrics(100, 10, 50, 0, 0).build(),
            search_term("s3", "a").keyword_id("k2").metrics(900, 90, 50, 0, 0).build(),
            search_term("s4", "b").keyword_id("k2").metrics(100, 10, 50, 0, 0).build(),
        ]
        .into_iter()
        .collect();

        let summary = MatchTypeAnalyzer.analyze(&dataset, &params());
        assert_eq!(summary.records_eligible, 0);
        assert!(summary.recommendations.is_empty());
    }

    #[test]
    fn test_dominant_query_without_waste_is_skipped() {
        let dataset: Dataset = vec![
            keyword("k1", "running shoes").build(),
            search_term("s1", "running shoes men")
                .keyword_id("k1")
                .metrics(900, 90, 140, 7, 700)
                .build(),
            search_term("s2", "running shoes women")
                .keyword_id("k1")
                .metrics(100, 10, 20, 1, 90)
                .build(),
        ]
        .into_iter()
        .collect();

        let summary = MatchTypeAnalyzer.analyze(&dataset, &params());
        assert_eq!(summary.records_eligible, 2);
        assert!(summary.recommendations.is_empty());
    }

    #[test]
    fn test_unknown_keyword_uses_term_match_type() {
        let dataset: Dataset = vec![
            search_term("s1", "a")
                .keyword_id("k9")
                .match_type(MatchType::Phrase)
                .metrics(900, 90, 50, 2, 10)
                .build(),
            search_term("s2", "b")
                .keyword_id("k9")
                .match_type(MatchType::Phrase)
                .metrics(100, 10, 50, 0, 0)
                .build(),
        ]
        .into_iter()
        .collect();

        let summary = MatchTypeAnalyzer.analyze(&dataset, &params());
        assert_eq!(summary.recommendations.len(), 1);
        assert_eq!(summary.recommendations[0].subject, "k9");
    }
}
