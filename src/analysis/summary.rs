//! Bounded analyzer output.
//!
//! Every text field has a fixed character budget and the recommendation list
//! is capped, so a summary's serialized size does not grow with the dataset.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::analysis::{AnalyzerKind, AnalyzerParams, MAX_RECOMMENDATIONS};

/// Maximum characters in a recommendation subject.
pub const MAX_SUBJECT_CHARS: usize = 80;
/// Maximum characters in a recommendation rationale.
pub const MAX_RATIONALE_CHARS: usize = 240;
/// Maximum characters in the summary narrative.
pub const MAX_NARRATIVE_CHARS: usize = 600;
/// Maximum characters in one plan step.
pub const MAX_STEP_CHARS: usize = 160;
/// Record ids kept per recommendation.
pub const MAX_RECORD_REFS: usize = 5;
const MAX_RECORD_ID_CHARS: usize = 64;
/// Recommendations promoted to the immediate phase of the plan.
const IMMEDIATE_STEPS: usize = 3;

/// What the recommendation asks the advertiser to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionCategory {
    /// Pause the entity
    Pause,
    /// Exclude the query with a negative keyword
    AddNegative,
    /// Move a loose keyword to a tighter match type
    TightenMatchType,
    /// Drop an exclusion that blocks active targeting
    RemoveNegative,
    /// Raise bids
    IncreaseBid,
    /// Lower bids
    DecreaseBid,
    /// Let one channel own the query
    ConsolidateChannel,
}

impl ActionCategory {
    fn verb(&self) -> &'static str {
        match self {
            ActionCategory::Pause => "Pause",
            ActionCategory::AddNegative => "Add a negative for",
            ActionCategory::TightenMatchType => "Tighten the match type of",
            ActionCategory::RemoveNegative => "Remove the negative",
            ActionCategory::IncreaseBid => "Raise bids for",
            ActionCategory::DecreaseBid => "Lower bids for",
            ActionCategory::ConsolidateChannel => "Consolidate",
        }
    }
}

/// One ranked, actionable finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    /// Entity the action applies to
    pub subject: String,
    /// Action to take
    pub action: ActionCategory,
    /// Estimated monetary impact, already discounted by confidence
    pub estimated_impact: Decimal,
    /// Spend attributed to the subject in the window
    pub spend: Decimal,
    /// Short justification with the numbers behind it
    pub rationale: String,
    /// Up to [`MAX_RECORD_REFS`] ids of the records behind this finding
    pub record_ids: Vec<String>,
    /// Total number of records behind this finding
    pub record_count: usize,
}

impl Recommendation {
    /// Build a recommendation, clamping every field to its budget.
    ///
    /// Record ids are sorted and de-duplicated before the first
    /// [`MAX_RECORD_REFS`] are kept.
    pub fn new(
        subject: &str,
        action: ActionCategory,
        estimated_impact: Decimal,
        spend: Decimal,
        rationale: &str,
        record_ids: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut ids: Vec<String> = record_ids.into_iter().collect();
        ids.sort();
        ids.dedup();
        let record_count = ids.len();
        ids.truncate(MAX_RECORD_REFS);

        Self {
            subject: truncate(subject, MAX_SUBJECT_CHARS),
            action,
            estimated_impact: estimated_impact.max(Decimal::ZERO).round_dp(2),
            spend: spend.round_dp(2),
            rationale: truncate(rationale, MAX_RATIONALE_CHARS),
            record_ids: ids
                .iter()
                .map(|id| truncate(id, MAX_RECORD_ID_CHARS))
                .collect(),
            record_count,
        }
    }

    /// Ranking order: impact desc, spend desc, then subject and ids ascending.
    fn rank(&self, other: &Self) -> Ordering {
        other
            .estimated_impact
            .cmp(&self.estimated_impact)
            .then_with(|| other.spend.cmp(&self.spend))
            .then_with(|| self.subject.cmp(&other.subject))
            .then_with(|| self.record_ids.cmp(&other.record_ids))
    }
}

/// Phase of the implementation plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanPhase {
    /// Act now
    Immediate,
    /// Watch the effect of the immediate changes
    Monitor,
    /// Address the remaining findings later
    Backlog,
}

/// One ordered step of the implementation plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    /// Phase
    pub phase: PlanPhase,
    /// What to do
    pub description: String,
}

impl PlanStep {
    fn new(phase: PlanPhase, description: String) -> Self {
        Self {
            phase,
            description: truncate(&description, MAX_STEP_CHARS),
        }
    }
}

/// Bounded result of one analyzer run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Analyzer that produced the summary
    pub analyzer: AnalyzerKind,
    /// One-paragraph explanation
    pub narrative: String,
    /// Records in the dataset handed to the analyzer
    pub records_analyzed: usize,
    /// Records that passed the volume floor and entity filters
    pub records_eligible: usize,
    /// Findings before the top-N cut
    pub flagged: usize,
    /// Sum of estimated impact over every finding, not only the top N
    pub total_estimated_impact: Decimal,
    /// Top findings in ranking order
    pub recommendations: Vec<Recommendation>,
    /// Ordered implementation plan
    pub plan: Vec<PlanStep>,
}

impl AnalysisSummary {
    /// Drop the lowest-ranked recommendation. Returns `false` when none is left.
    pub fn drop_lowest(&mut self) -> bool {
        if self.recommendations.pop().is_none() {
            return false;
        }
        self.plan.retain(|step| step.phase != PlanPhase::Immediate);
        let immediate = immediate_steps(&self.recommendations);
        self.plan.splice(0..0, immediate);
        true
    }
}

/// Collects findings and turns them into a ranked, bounded summary.
#[derive(Debug)]
pub(crate) struct SummaryBuilder {
    analyzer: AnalyzerKind,
    records_analyzed: usize,
    records_eligible: usize,
    findings: Vec<Recommendation>,
}

impl SummaryBuilder {
    pub(crate) fn new(analyzer: AnalyzerKind, records_analyzed: usize) -> Self {
        Self {
            analyzer,
            records_analyzed,
            records_eligible: 0,
            findings: Vec::new(),
        }
    }

    pub(crate) fn eligible(mut self, records_eligible: usize) -> Self {
        self.records_eligible = records_eligible;
        self
    }

    pub(crate) fn push(&mut self, recommendation: Recommendation) {
        self.findings.push(recommendation);
    }

    /// A summary with no findings and a custom explanation.
    pub(crate) fn explain(self, reason: &str) -> AnalysisSummary {
        AnalysisSummary {
            analyzer: self.analyzer,
            narrative: truncate(reason, MAX_NARRATIVE_CHARS),
            records_analyzed: self.records_analyzed,
            records_eligible: self.records_eligible,
            flagged: 0,
            total_estimated_impact: Decimal::ZERO,
            recommendations: Vec::new(),
            plan: Vec::new(),
        }
    }

    /// Rank, cut and narrate. `finding` describes what a flagged entity
    /// shows, e.g. "spend without conversions".
    pub(crate) fn finish(mut self, params: &AnalyzerParams, finding: &str) -> AnalysisSummary {
        if self.records_analyzed == 0 {
            return self.explain(
                "No records were returned for the selected account and window, so there is nothing to recommend.",
            );
        }
        if self.records_eligible == 0 {
            let reason = format!(
                "None of the {} records met the minimum volume floor ({} impressions, {} clicks), so no conclusions were drawn.",
                self.records_analyzed, params.min_impressions, params.min_clicks
            );
            return self.explain(&reason);
        }
        if self.findings.is_empty() {
            let reason = format!(
                "{} of {} records met the volume floor and none showed {}. No changes are recommended.",
                self.records_eligible, self.records_analyzed, finding
            );
            return self.explain(&reason);
        }

        self.findings.sort_by(Recommendation::rank);
        let flagged = self.findings.len();
        let total: Decimal = self.findings.iter().map(|r| r.estimated_impact).sum();

        let mut recommendations = self.findings;
        recommendations.truncate(params.max_recommendations.clamp(1, MAX_RECOMMENDATIONS));

        let top = &recommendations[0];
        let narrative = format!(
            "Analyzed {} records, {} above the volume floor. {} {} showed {}, with an estimated impact of {:.2}. The largest is {} at {:.2}. Showing the top {}.",
            self.records_analyzed,
            self.records_eligible,
            flagged,
            if flagged == 1 { "entity" } else { "entities" },
            finding,
            total,
            top.subject,
            top.estimated_impact,
            recommendations.len()
        );

        let mut plan = immediate_steps(&recommendations);
        plan.push(PlanStep::new(
            PlanPhase::Monitor,
            "Monitor the changed entities for two weeks and re-run this analysis to confirm the effect."
                .to_string(),
        ));
        let remaining = flagged.saturating_sub(IMMEDIATE_STEPS.min(recommendations.len()));
        if remaining > 0 {
            plan.push(PlanStep::new(
                PlanPhase::Backlog,
                format!(
                    "Review the remaining {} flagged entities in descending order of impact.",
                    remaining
                ),
            ));
        }

        AnalysisSummary {
            analyzer: self.analyzer,
            narrative: truncate(&narrative, MAX_NARRATIVE_CHARS),
            records_analyzed: self.records_analyzed,
            records_eligible: self.records_eligible,
            flagged,
            total_estimated_impact: total,
            recommendations,
            plan,
        }
    }
}

fn immediate_steps(recommendations: &[Recommendation]) -> Vec<PlanStep> {
    recommendations
        .iter()
        .take(IMMEDIATE_STEPS)
        .map(|r| {
            PlanStep::new(
                PlanPhase::Immediate,
                format!(
                    "{} {} (estimated impact {:.2}).",
                    r.action.verb(),
                    r.subject,
                    r.estimated_impact
                ),
            )
        })
        .collect()
}

/// Cut `text` to at most `max` characters, marking the cut with an ellipsis.
pub(crate) fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(subject: &str, impact: i64, spend: i64) -> Recommendation {
        Recommendation::new(
            subject,
            ActionCategory::Pause,
            Decimal::from(impact),
            Decimal::from(spend),
            "because",
            vec![subject.to_string()],
        )
    }

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 4), "abc…");
        assert_eq!(truncate("ééééé", 3).chars().count(), 3);
    }

    #[test]
    fn test_recommendation_clamps_fields() {
        let ids = (0..9).rev().map(|i| format!("id-{}", i));
        let r = Recommendation::new(
            &"s".repeat(200),
            ActionCategory::Pause,
            Decimal::new(-5, 0),
            Decimal::new(123456, 3),
            &"r".repeat(500),
            ids,
        );
        assert_eq!(r.subject.chars().count(), MAX_SUBJECT_CHARS);
        assert_eq!(r.rationale.chars().count(), MAX_RATIONALE_CHARS);
        assert_eq!(r.estimated_impact, Decimal::ZERO);
        assert_eq!(r.spend, Decimal::new(12346, 2));
        assert_eq!(r.record_count, 9);
        assert_eq!(r.record_ids, vec!["id-0", "id-1", "id-2", "id-3", "id-4"]);
    }

    #[test]
    fn test_ranking_is_deterministic() {
        let params = AnalyzerParams::default();
        let mut builder = SummaryBuilder::new(AnalyzerKind::WastedSpend, 10).eligible(10);
        builder.push(rec("b", 10, 5));
        builder.push(rec("a", 10, 5));
        builder.push(rec("c", 10, 9));
        builder.push(rec("d", 50, 1));
        let summary = builder.finish(&params, "waste");

        let order: Vec<&str> = summary
            .recommendations
            .iter()
            .map(|r| r.subject.as_str())
            .collect();
        assert_eq!(order, vec!["d", "c", "a", "b"]);
        assert_eq!(summary.total_estimated_impact, Decimal::from(80));
    }

    #[test]
    fn test_top_n_and_plan_phases() {
        let params = AnalyzerParams {
            max_recommendations: 4,
            ..AnalyzerParams::default()
        };
        let mut builder = SummaryBuilder::new(AnalyzerKind::WastedSpend, 100).eligible(50);
        for i in 0..12 {
            builder.push(rec(&format!("kw {:02}", i), 100 - i, 10));
        }
        let summary = builder.finish(&params, "waste");

        assert_eq!(summary.flagged, 12);
        assert_eq!(summary.recommendations.len(), 4);
        let phases: Vec<PlanPhase> = summary.plan.iter().map(|s| s.phase).collect();
        assert_eq!(
            phases,
            vec![
                PlanPhase::Immediate,
                PlanPhase::Immediate,
                PlanPhase::Immediate,
                PlanPhase::Monitor,
                PlanPhase::Backlog
            ]
        );
        assert!(summary.plan[4].description.contains("remaining 9"));
        assert!(summary.narrative.contains("12 entities"));
    }

    #[test]
    fn test_explanatory_empty_summaries() {
        let params = AnalyzerParams::default();
        let empty = SummaryBuilder::new(AnalyzerKind::GeoAdjustment, 0).finish(&params, "x");
        assert!(empty.narrative.starts_with("No records"));

        let below = SummaryBuilder::new(AnalyzerKind::GeoAdjustment, 7).finish(&params, "x");
        assert!(below.narrative.contains("None of the 7 records"));

        let clean = SummaryBuilder::new(AnalyzerKind::GeoAdjustment, 7)
            .eligible(3)
            .finish(&params, "outlying efficiency");
        assert!(clean.narrative.contains("none showed outlying efficiency"));
        assert!(clean.plan.is_empty());
    }

    #[test]
    fn test_drop_lowest_rebuilds_immediate_steps() {
        let params = AnalyzerParams::default();
        let mut builder = SummaryBuilder::new(AnalyzerKind::WastedSpend, 10).eligible(10);
        builder.push(rec("a", 3, 1));
        builder.push(rec("b", 2, 1));
        let mut summary = builder.finish(&params, "waste");

        assert!(summary.drop_lowest());
        assert_eq!(summary.recommendations.len(), 1);
        let immediate = summary
            .plan
            .iter()
            .filter(|s| s.phase == PlanPhase::Immediate)
            .count();
        assert_eq!(immediate, 1);
        assert_eq!(summary.plan[0].phase, PlanPhase::Immediate);
        assert!(summary.drop_lowest());
        assert!(!summary.drop_lowest());
    }
}
