use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::services::errors::EngineError;

/// A committed question with everything needed to grade it.
#[derive(Debug, Clone)]
pub(crate) struct ScoringQuestion {
    pub(crate) question_id: String,
    pub(crate) subtest_id: Option<String>,
    pub(crate) weight: f64,
    pub(crate) option_ids: BTreeSet<String>,
    pub(crate) correct_option_ids: BTreeSet<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct QuestionOutcome {
    pub(crate) question_id: String,
    #[serde(default)]
    pub(crate) subtest_id: Option<String>,
    pub(crate) weight: f64,
    pub(crate) earned: f64,
    pub(crate) answered: bool,
    pub(crate) correct: bool,
    pub(crate) selected_option_ids: Vec<String>,
    pub(crate) correct_option_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ScoreSummary {
    pub(crate) score: f64,
    pub(crate) max_score: f64,
    pub(crate) passed: bool,
    pub(crate) correct_count: i32,
    pub(crate) answered_count: i32,
    pub(crate) question_count: i32,
    pub(crate) breakdown: Vec<QuestionOutcome>,
}

/// Scores are kept at two decimals, the precision results are reported with.
fn round_score(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// All-or-nothing per question: the selection must equal the correct set exactly.
/// Unanswered questions earn zero. Inconsistent data fails the whole call rather than
/// defaulting to zero.
pub(crate) fn score_attempt(
    questions: &[ScoringQuestion],
    answers: &HashMap<String, Vec<String>>,
    pass_threshold: f64,
) -> Result<ScoreSummary, EngineError> {
    if questions.is_empty() {
        return Err(EngineError::ScoringFailed("exam has no committed questions".into()));
    }

    for question_id in answers.keys() {
        if !questions.iter().any(|question| &question.question_id == question_id) {
            return Err(EngineError::ScoringFailed(format!(
                "answer references question {question_id} outside the committed set"
            )));
        }
    }

    let mut breakdown = Vec::with_capacity(questions.len());
    let mut score = 0.0;
    let mut max_score = 0.0;

    for question in questions {
        if question.correct_option_ids.is_empty() {
            return Err(EngineError::ScoringFailed(format!(
                "question {} has no correct option",
                question.question_id
            )));
        }

        let selected: BTreeSet<String> = answers
            .get(&question.question_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();

        if let Some(unknown) = selected.iter().find(|id| !question.option_ids.contains(*id)) {
            return Err(EngineError::ScoringFailed(format!(
                "option {unknown} no longer belongs to question {}",
                question.question_id
            )));
        }

        let answered = !selected.is_empty();
        let correct = answered && selected == question.correct_option_ids;
        let earned = if correct { question.weight } else { 0.0 };

        score += earned;
        max_score += question.weight;
        breakdown.push(QuestionOutcome {
            question_id: question.question_id.clone(),
            subtest_id: question.subtest_id.clone(),
            weight: question.weight,
            earned,
            answered,
            correct,
            selected_option_ids: selected.into_iter().collect(),
            correct_option_ids: question.correct_option_ids.iter().cloned().collect(),
        });
    }

    let score = round_score(score);
    Ok(ScoreSummary {
        score,
        max_score: round_score(max_score),
        passed: score >= pass_threshold,
        correct_count: breakdown.iter().filter(|outcome| outcome.correct).count() as i32,
        answered_count: breakdown.iter().filter(|outcome| outcome.answered).count() as i32,
        question_count: breakdown.len() as i32,
        breakdown,
    })
}
