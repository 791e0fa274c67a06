use std::collections::HashSet;

use crate::db::types::QuestionKind;
use crate::services::errors::{EngineError, FieldErrorsBuilder};

pub(crate) const MIN_OPTIONS_PER_QUESTION: usize = 2;

#[derive(Debug, Clone)]
pub(crate) struct OptionDraft {
    pub(crate) label: String,
    pub(crate) is_correct: bool,
}

pub(crate) fn validate_options(
    kind: QuestionKind,
    options: &[OptionDraft],
    max_options: usize,
) -> Result<(), EngineError> {
    let mut errors = FieldErrorsBuilder::default();

    if options.len() < MIN_OPTIONS_PER_QUESTION || options.len() > max_options {
        errors.push(
            "options",
            format!(
                "A question needs between {MIN_OPTIONS_PER_QUESTION} and {max_options} options"
            ),
        );
    }

    let mut labels = HashSet::with_capacity(options.len());
    for (index, option) in options.iter().enumerate() {
        let label = option.label.trim();
        if label.is_empty() {
            errors.push(format!("options.{index}.label"), "Option text is required");
        } else if !labels.insert(label.to_lowercase()) {
            errors.push(format!("options.{index}.label"), "Option text must be unique");
        }
    }

    let correct = options.iter().filter(|option| option.is_correct).count();
    match kind {
        QuestionKind::Single if correct != 1 => {
            errors.push("options", "Single-choice questions need exactly one correct option");
        }
        QuestionKind::Multiple if correct == 0 => {
            errors.push("options", "At least one option must be correct");
        }
        _ => {}
    }

    errors.finish()
}

/// Questions in attempt-locked exams are frozen for editing.
pub(crate) fn check_question_edit(locked_exam_refs: i64) -> Result<(), EngineError> {
    if locked_exam_refs > 0 {
        return Err(EngineError::ExamLocked(
            "Question is used by an exam that already has attempts".into(),
        ));
    }
    Ok(())
}

pub(crate) fn check_question_delete(exam_refs: i64) -> Result<(), EngineError> {
    if exam_refs > 0 {
        return Err(EngineError::HasDependents(format!(
            "Question is used by {exam_refs} exam(s)"
        )));
    }
    Ok(())
}

/// Sorted, de-duplicated selection restricted to the question's own options.
/// An empty selection clears the answer.
pub(crate) fn normalize_selection(
    kind: QuestionKind,
    selected: &[String],
    option_ids: &HashSet<String>,
) -> Result<Vec<String>, EngineError> {
    let mut normalized: Vec<String> = selected.to_vec();
    normalized.sort();
    normalized.dedup();

    if let Some(unknown) = normalized.iter().find(|id| !option_ids.contains(*id)) {
        return Err(EngineError::validation(
            "selected_option_ids",
            format!("Option {unknown} does not belong to this question"),
        ));
    }
    if kind == QuestionKind::Single && normalized.len() > 1 {
        return Err(EngineError::validation(
            "selected_option_ids",
            "Single-choice questions accept one option",
        ));
    }

    Ok(normalized)
}
