//! Aggregation helpers shared by the analyzers.

use std::collections::BTreeMap;

use rust_decimal::Decimal;

use crate::analysis::{AnalyzerParams, MAX_CONFIDENCE, MIN_CONFIDENCE};
use crate::types::{Metrics, Record};

/// Whether a record carries enough volume to draw conclusions from.
pub(crate) fn passes_floor(metrics: &Metrics, params: &AnalyzerParams) -> bool {
    metrics.impressions >= params.min_impressions && metrics.clicks >= params.min_clicks
}

/// Summed metrics over `records`.
pub(crate) fn totals<'a>(records: impl IntoIterator<Item = &'a Record>) -> Metrics {
    let mut sum = Metrics::default();
    for record in records {
        sum.add(&record.metrics);
    }
    sum
}

/// Records sharing one grouping key.
#[derive(Debug)]
pub(crate) struct Group<'a> {
    pub records: Vec<&'a Record>,
    pub metrics: Metrics,
}

impl<'a> Group<'a> {
    pub(crate) fn ids(&self) -> impl Iterator<Item = String> + '_ {
        self.records.iter().map(|r| r.id.clone())
    }
}

/// Group records by `key`, skipping records without one. Ordered by key so
/// iteration is deterministic.
pub(crate) fn group_by<'a, K, I, F>(records: I, key: F) -> BTreeMap<K, Group<'a>>
where
    K: Ord,
    I: IntoIterator<Item = &'a Record>,
    F: Fn(&Record) -> Option<K>,
{
    let mut groups: BTreeMap<K, Group<'a>> = BTreeMap::new();
    for record in records {
        let Some(k) = key(record) else { continue };
        let group = groups.entry(k).or_insert_with(|| Group {
            records: Vec::new(),
            metrics: Metrics::default(),
        });
        group.metrics.add(&record.metrics);
        group.records.push(record);
    }
    groups
}

/// Claim only the confident share of a naive gap.
///
/// Unvalidated params are clamped, so the claim stays below the full gap.
pub(crate) fn discount(amount: Decimal, params: &AnalyzerParams) -> Decimal {
    let confidence = params.confidence.clamp(MIN_CONFIDENCE, MAX_CONFIDENCE);
    (amount * confidence).round_dp(2)
}

/// Lowercase, strip match-type punctuation (`"..."`, `[...]`, `+`) and
/// collapse whitespace.
pub(crate) fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| matches!(c, '"' | '[' | ']' | '+'))
                .to_lowercase()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChannelType, RecordKind};

    #[test]
    fn test_discount_never_claims_full_gap() {
        let full = AnalyzerParams {
            confidence: Decimal::ONE,
            ..AnalyzerParams::default()
        };
        assert_eq!(discount(Decimal::new(120, 0), &full), Decimal::new(96, 0));

        let default = AnalyzerParams::default();
        assert_eq!(discount(Decimal::new(120, 0), &default), Decimal::new(84, 0));
    }

    fn record(id: &str, campaign: &str, cost: i64) -> Record {
        Record {
            id: id.to_string(),
            kind: RecordKind::Keyword,
            text: id.to_string(),
            match_type: None,
            status: None,
            campaign_id: campaign.to_string(),
            campaign_type: ChannelType::Search,
            ad_group_id: None,
            keyword_id: None,
            location: None,
            metrics: Metrics {
                impressions: 10,
                clicks: 1,
                cost: Decimal::from(cost),
                ..Metrics::default()
            },
        }
    }

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  [Running  Shoes] "), "running shoes");
        assert_eq!(normalize_text("\"Free\" +Shipping"), "free shipping");
        assert_eq!(normalize_text("++"), "");
    }

    #[test]
    fn test_group_by_sums_and_orders() {
        let records = vec![record("a", "2", 5), record("b", "1", 3), record("c", "2", 7)];
        let groups = group_by(&records, |r| Some(r.campaign_id.clone()));

        let keys: Vec<&String> = groups.keys().collect();
        assert_eq!(keys, vec!["1", "2"]);
        assert_eq!(groups["2"].metrics.cost, Decimal::from(12));
        assert_eq!(groups["2"].ids().collect::<Vec<_>>(), vec!["a", "c"]);
        assert_eq!(totals(&records).cost, Decimal::from(15));
    }

    #[test]
    fn test_floor_and_discount() {
        let params = AnalyzerParams::default();
        let mut metrics = Metrics {
            impressions: 100,
            clicks: 10,
            ..Metrics::default()
        };
        assert!(passes_floor(&metrics, &params));
        metrics.impressions = 99;
        assert!(!passes_floor(&metrics, &params));

        assert_eq!(discount(Decimal::from(100), &params), Decimal::from(70));
    }
}
