use std::collections::HashSet;

use crate::db::models::PostulationScoreRule;
use crate::services::errors::{EngineError, FieldErrorsBuilder};
use crate::services::scoring::ScoreSummary;

/// A minimum score on one sub-test, or on the total when `subtest_id` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScoreRuleDraft {
    pub(crate) subtest_id: Option<String>,
    pub(crate) min_score: f64,
}

impl From<PostulationScoreRule> for ScoreRuleDraft {
    fn from(rule: PostulationScoreRule) -> Self {
        Self { subtest_id: rule.subtest_id, min_score: rule.min_score }
    }
}

/// Each rule targets a sub-test of the same exam (or the total) at most once.
pub(crate) fn validate_rules(
    rules: &[ScoreRuleDraft],
    exam_subtests: &HashSet<String>,
) -> Result<(), EngineError> {
    let mut errors = FieldErrorsBuilder::default();
    let mut targets = HashSet::new();

    for (index, rule) in rules.iter().enumerate() {
        if !rule.min_score.is_finite() || rule.min_score < 0.0 {
            errors.push(format!("rules[{index}].min_score"), "Minimum score must be zero or more");
        }
        if let Some(subtest_id) = &rule.subtest_id {
            if !exam_subtests.contains(subtest_id) {
                errors.push(
                    format!("rules[{index}].subtest_id"),
                    "Sub-test does not belong to this exam",
                );
            }
        }
        if !targets.insert(rule.subtest_id.as_deref()) {
            errors.push(format!("rules[{index}]"), "Only one rule per sub-test is allowed");
        }
    }

    errors.finish()
}

/// Points earned on the questions assigned to `subtest_id`.
fn subtest_score(summary: &ScoreSummary, subtest_id: &str) -> f64 {
    summary
        .breakdown
        .iter()
        .filter(|outcome| outcome.subtest_id.as_deref() == Some(subtest_id))
        .map(|outcome| outcome.earned)
        .sum()
}

/// Every rule must hold; a postulation with no rules only needs the exam threshold.
pub(crate) fn meets_rules(summary: &ScoreSummary, rules: &[ScoreRuleDraft]) -> bool {
    rules.iter().all(|rule| {
        let achieved = match &rule.subtest_id {
            Some(subtest_id) => subtest_score(summary, subtest_id),
            None => summary.score,
        };
        achieved + 1e-9 >= rule.min_score
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::scoring::QuestionOutcome;

    fn outcome(question_id: &str, subtest_id: Option<&str>, earned: f64) -> QuestionOutcome {
        QuestionOutcome {
            question_id: question_id.to_string(),
            subtest_id: subtest_id.map(str::to_string),
            weight: 10.0,
            earned,
            answered: true,
            correct: earned > 0.0,
            selected_option_ids: Vec::new(),
            correct_option_ids: Vec::new(),
        }
    }

    fn summary(breakdown: Vec<QuestionOutcome>) -> ScoreSummary {
        let score = breakdown.iter().map(|outcome| outcome.earned).sum();
        ScoreSummary {
            score,
            max_score: breakdown.len() as f64 * 10.0,
            passed: true,
            correct_count: 0,
            answered_count: breakdown.len() as i32,
            question_count: breakdown.len() as i32,
            breakdown,
        }
    }

    fn rule(subtest_id: Option<&str>, min_score: f64) -> ScoreRuleDraft {
        ScoreRuleDraft { subtest_id: subtest_id.map(str::to_string), min_score }
    }

    #[test]
    fn subtest_rules_count_only_their_questions() {
        let summary = summary(vec![
            outcome("q1", Some("math"), 10.0),
            outcome("q2", Some("math"), 0.0),
            outcome("q3", Some("verbal"), 10.0),
            outcome("q4", None, 10.0),
        ]);

        assert!(meets_rules(&summary, &[rule(Some("math"), 10.0)]));
        assert!(!meets_rules(&summary, &[rule(Some("math"), 15.0)]));
        assert!(meets_rules(&summary, &[rule(None, 30.0), rule(Some("verbal"), 10.0)]));
        assert!(!meets_rules(&summary, &[rule(None, 30.0), rule(Some("verbal"), 11.0)]));
        assert!(meets_rules(&summary, &[]));
    }

    #[test]
    fn rules_must_target_known_subtests_once() {
        let subtests: HashSet<String> = ["math".to_string()].into_iter().collect();

        assert!(validate_rules(&[rule(Some("math"), 5.0), rule(None, 10.0)], &subtests).is_ok());
        assert!(matches!(
            validate_rules(&[rule(Some("history"), 5.0)], &subtests),
            Err(EngineError::Validation { .. })
        ));
        assert!(matches!(
            validate_rules(&[rule(None, 5.0), rule(None, 8.0)], &subtests),
            Err(EngineError::Validation { .. })
        ));
        assert!(matches!(
            validate_rules(&[rule(Some("math"), -1.0)], &subtests),
            Err(EngineError::Validation { .. })
        ));
    }
}
