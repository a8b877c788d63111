//! Deterministic aggregation of verdicts into a [`MatchReport`].

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{FailurePolicy, ScoreWeights};
use crate::document::Requirement;
use crate::error::{RatingError, Result};
use crate::judgment::{MatchLevel, Verdict};

/// The result of judging one requirement, paired with the requirement.
#[derive(Debug)]
pub struct JudgmentOutcome {
    /// The requirement that was judged.
    pub requirement: Requirement,
    /// The verdict, or the error that prevented one.
    pub result: Result<Verdict>,
}

impl JudgmentOutcome {
    /// A successful judgment.
    pub fn judged(requirement: Requirement, verdict: Verdict) -> Self {
        Self { requirement, result: Ok(verdict) }
    }

    /// A failed judgment.
    pub fn failed(requirement: Requirement, error: RatingError) -> Self {
        Self { requirement, result: Err(error) }
    }
}

/// Headline counts and gaps, computed without the model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportSummary {
    /// Number of `STRONG` verdicts.
    pub strong: usize,
    /// Number of `PARTIAL` verdicts.
    pub partial: usize,
    /// Number of `NONE` verdicts.
    pub none: usize,
    /// Number of requirements that could not be judged.
    pub unknown: usize,
    /// Texts of the requirements judged `NONE`, in requirement order.
    pub gaps: Vec<String>,
    /// One-line rendering of the above.
    pub text: String,
}

/// The final, atomic output of one rating request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatchReport {
    overall_score: u8,
    requirements: Vec<Requirement>,
    verdicts: Vec<Verdict>,
    summary: ReportSummary,
}

impl MatchReport {
    /// Overall score in `0..=100`.
    pub fn overall_score(&self) -> u8 {
        self.overall_score
    }

    /// The requirements judged, in the order given.
    pub fn requirements(&self) -> &[Requirement] {
        &self.requirements
    }

    /// The text of the requirement with the given id.
    pub fn requirement_text(&self, requirement_id: &str) -> Option<&str> {
        self.requirements.iter().find(|r| r.id == requirement_id).map(|r| r.text.as_str())
    }

    /// One verdict per requirement, in requirement order.
    pub fn verdicts(&self) -> &[Verdict] {
        &self.verdicts
    }

    /// The deterministic summary.
    pub fn summary(&self) -> &ReportSummary {
        &self.summary
    }
}

/// Combines per-requirement verdicts into a [`MatchReport`].
///
/// Pure: no model calls, no I/O. The score is
/// `round(100 * Σ weight(level) / scored)`, where `scored` counts every
/// requirement that has a verdict.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreAggregator {
    weights: ScoreWeights,
    policy: FailurePolicy,
}

impl ScoreAggregator {
    /// Create an aggregator with the given weights and failure policy.
    pub fn new(weights: ScoreWeights, policy: FailurePolicy) -> Self {
        Self { weights, policy }
    }

    /// Aggregate outcomes given in requirement order.
    ///
    /// # Errors
    ///
    /// - [`RatingError::NoRequirements`] if `outcomes` is empty.
    /// - The first failed outcome's error under [`FailurePolicy::FailReport`],
    ///   or under [`FailurePolicy::MarkUnknown`] when every outcome failed.
    pub fn aggregate(&self, outcomes: Vec<JudgmentOutcome>) -> Result<MatchReport> {
        if outcomes.is_empty() {
            return Err(RatingError::NoRequirements);
        }
        let total = outcomes.len();

        let mut requirements = Vec::with_capacity(total);
        let mut verdicts = Vec::with_capacity(total);
        let mut gaps = Vec::new();
        let mut first_error = None;
        let (mut strong, mut partial, mut none, mut unknown) = (0, 0, 0, 0);

        for JudgmentOutcome { requirement, result } in outcomes {
            let verdict = match result {
                Ok(verdict) => verdict,
                Err(error) => match self.policy {
                    FailurePolicy::FailReport => return Err(error),
                    FailurePolicy::MarkUnknown => {
                        warn!(requirement.id = %requirement.id, error = %error, "marking requirement unknown");
                        let verdict = Verdict {
                            requirement_id: requirement.id.clone(),
                            match_level: MatchLevel::Unknown,
                            rationale: error.to_string(),
                            cited_chunk_ids: Vec::new(),
                        };
                        first_error.get_or_insert(error);
                        verdict
                    }
                },
            };

            match verdict.match_level {
                MatchLevel::Strong => strong += 1,
                MatchLevel::Partial => partial += 1,
                MatchLevel::None => {
                    none += 1;
                    gaps.push(requirement.text.clone());
                }
                MatchLevel::Unknown => unknown += 1,
            }
            requirements.push(requirement);
            verdicts.push(verdict);
        }

        let scored = strong + partial + none;
        if scored == 0 {
            return Err(first_error.unwrap_or(RatingError::NoRequirements));
        }

        let weighted = strong as f64 * self.weights.strong
            + partial as f64 * self.weights.partial
            + none as f64 * self.weights.none;
        let overall_score = (100.0 * weighted / scored as f64).round().clamp(0.0, 100.0) as u8;

        let text = summary_text(strong, partial, none, unknown, total, &gaps);
        info!(overall_score, strong, partial, none, unknown, "report aggregated");

        Ok(MatchReport {
            overall_score,
            requirements,
            verdicts,
            summary: ReportSummary { strong, partial, none, unknown, gaps, text },
        })
    }
}

fn summary_text(
    strong: usize,
    partial: usize,
    none: usize,
    unknown: usize,
    total: usize,
    gaps: &[String],
) -> String {
    let mut text = format!("{strong} strong, {partial} partial, {none} none");
    if unknown > 0 {
        text.push_str(&format!(", {unknown} unknown"));
    }
    text.push_str(&format!(" of {total} requirements."));
    if !gaps.is_empty() {
        text.push_str(&format!(" Gaps: {}", gaps.join("; ")));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcomes(levels: &[(&str, MatchLevel)]) -> Vec<JudgmentOutcome> {
        levels
            .iter()
            .enumerate()
            .map(|(i, (text, level))| {
                let requirement = Requirement { id: format!("req_{}", i + 1), text: text.to_string() };
                let verdict = Verdict {
                    requirement_id: requirement.id.clone(),
                    match_level: *level,
                    rationale: String::new(),
                    cited_chunk_ids: Vec::new(),
                };
                JudgmentOutcome::judged(requirement, verdict)
            })
            .collect()
    }

    fn failure(id: &str) -> RatingError {
        RatingError::ModelUnavailable {
            requirement_id: id.into(),
            evidence_ids: vec!["chunk_0".into()],
            message: "connection refused".into(),
        }
    }

    #[test]
    fn backend_leadership_mandarin_scores_67() {
        let report = ScoreAggregator::default()
            .aggregate(outcomes(&[
                ("3+ years backend experience", MatchLevel::Strong),
                ("team leadership experience", MatchLevel::Strong),
                ("fluent in Mandarin", MatchLevel::None),
            ]))
            .unwrap();

        assert_eq!(report.overall_score(), 67);
        assert_eq!(report.verdicts().len(), 3);
        assert_eq!(report.summary().gaps, vec!["fluent in Mandarin"]);
        assert_eq!(
            report.summary().text,
            "2 strong, 0 partial, 1 none of 3 requirements. Gaps: fluent in Mandarin"
        );
    }

    #[test]
    fn partial_counts_half() {
        let report = ScoreAggregator::default()
            .aggregate(outcomes(&[("a", MatchLevel::Partial), ("b", MatchLevel::None)]))
            .unwrap();
        assert_eq!(report.overall_score(), 25);
    }

    #[test]
    fn score_rounds_to_nearest_with_halves_up() {
        let weights = ScoreWeights { strong: 1.0, partial: 0.125, none: 0.0 };
        let report = ScoreAggregator::new(weights, FailurePolicy::FailReport)
            .aggregate(outcomes(&[
                ("a", MatchLevel::Partial),
                ("b", MatchLevel::None),
                ("c", MatchLevel::None),
                ("d", MatchLevel::None),
            ]))
            .unwrap();
        // 100 * 0.125 / 4 = 3.125
        assert_eq!(report.overall_score(), 3);

        let report = ScoreAggregator::default()
            .aggregate(outcomes(&[
                ("a", MatchLevel::Partial),
                ("b", MatchLevel::None),
                ("c", MatchLevel::None),
                ("d", MatchLevel::None),
            ]))
            .unwrap();
        // 100 * 0.5 / 4 = 12.5
        assert_eq!(report.overall_score(), 13);
    }

    #[test]
    fn no_requirements_is_an_error_not_zero() {
        let err = ScoreAggregator::default().aggregate(Vec::new()).unwrap_err();
        assert!(matches!(err, RatingError::NoRequirements));
    }

    #[test]
    fn fail_report_policy_surfaces_first_failure() {
        let mut all = outcomes(&[("a", MatchLevel::Strong)]);
        all.push(JudgmentOutcome::failed(
            Requirement { id: "req_2".into(), text: "b".into() },
            failure("req_2"),
        ));
        all.push(JudgmentOutcome::failed(
            Requirement { id: "req_3".into(), text: "c".into() },
            failure("req_3"),
        ));

        let err = ScoreAggregator::default().aggregate(all).unwrap_err();
        assert_eq!(err.requirement_id(), Some("req_2"));
    }

    #[test]
    fn mark_unknown_policy_keeps_order_and_excludes_unknown_from_score() {
        let mut all = outcomes(&[("a", MatchLevel::Strong), ("b", MatchLevel::None)]);
        all.insert(
            1,
            JudgmentOutcome::failed(
                Requirement { id: "req_x".into(), text: "x".into() },
                failure("req_x"),
            ),
        );

        let report = ScoreAggregator::new(ScoreWeights::default(), FailurePolicy::MarkUnknown)
            .aggregate(all)
            .unwrap();

        let levels: Vec<_> = report.verdicts().iter().map(|v| v.match_level).collect();
        assert_eq!(levels, vec![MatchLevel::Strong, MatchLevel::Unknown, MatchLevel::None]);
        assert_eq!(report.verdicts()[1].requirement_id, "req_x");
        assert!(report.verdicts()[1].rationale.contains("connection refused"));
        assert_eq!(report.overall_score(), 50);
        assert_eq!(report.summary().unknown, 1);
        assert_eq!(report.summary().gaps, vec!["b"]);
        assert!(report.summary().text.starts_with("1 strong, 0 partial, 1 none, 1 unknown of 3"));
    }

    #[test]
    fn mark_unknown_policy_fails_when_nothing_was_judged() {
        let all = vec![JudgmentOutcome::failed(
            Requirement { id: "req_1".into(), text: "a".into() },
            failure("req_1"),
        )];
        let err = ScoreAggregator::new(ScoreWeights::default(), FailurePolicy::MarkUnknown)
            .aggregate(all)
            .unwrap_err();
        assert!(matches!(err, RatingError::ModelUnavailable { .. }));
    }

    #[test]
    fn report_carries_requirement_texts_by_id() {
        let report = ScoreAggregator::default()
            .aggregate(outcomes(&[
                ("3+ years backend experience", MatchLevel::Strong),
                ("fluent in Mandarin", MatchLevel::None),
            ]))
            .unwrap();

        assert_eq!(report.requirements().len(), report.verdicts().len());
        assert_eq!(report.requirement_text("req_2"), Some("fluent in Mandarin"));
        assert_eq!(report.requirement_text("req_9"), None);
    }

    #[test]
    fn report_serializes_levels_in_upper_case() {
        let report = ScoreAggregator::default()
            .aggregate(outcomes(&[("a", MatchLevel::Partial)]))
            .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["overall_score"], 50);
        assert_eq!(json["requirements"][0]["id"], "req_1");
        assert_eq!(json["requirements"][0]["text"], "a");
        assert_eq!(json["verdicts"][0]["match_level"], "PARTIAL");
        assert_eq!(json["summary"]["partial"], 1);
    }
}
