use std::collections::BTreeMap;

use thiserror::Error;

/// Field name to human-readable messages, rendered as the `errors` map of a response.
pub(crate) type FieldErrors = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Error)]
pub(crate) enum EngineError {
    #[error("{message}")]
    Validation { message: String, fields: FieldErrors },
    #[error("{0}")]
    ExamLocked(String),
    #[error("Exam has no committed questions")]
    AssemblyIncomplete,
    #[error(
        "Category {category_id} has {available} questions available, {requested} requested"
    )]
    InsufficientQuestions { category_id: String, requested: i64, available: i64 },
    #[error("{0}")]
    InvalidWindow(String),
    #[error("{0}")]
    ExamNotAvailable(String),
    #[error("An attempt for this exam is already in progress")]
    AttemptAlreadyInProgress,
    #[error("Maximum number of attempts ({0}) reached")]
    AttemptLimitReached(i32),
    #[error("Attempt is already {0}")]
    AttemptClosed(&'static str),
    #[error("Attempt deadline has passed; the attempt was submitted with the recorded answers")]
    TimeExpired,
    #[error("{0}")]
    HasDependents(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Scoring failed: {0}")]
    ScoringFailed(String),
}

impl EngineError {
    pub(crate) fn validation(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut fields = FieldErrors::new();
        fields.insert(field.to_string(), vec![message.clone()]);
        Self::Validation { message, fields }
    }

    pub(crate) fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::ExamLocked(_) => "EXAM_LOCKED",
            Self::AssemblyIncomplete => "ASSEMBLY_INCOMPLETE",
            Self::InsufficientQuestions { .. } => "INSUFFICIENT_QUESTIONS",
            Self::InvalidWindow(_) => "INVALID_WINDOW",
            Self::ExamNotAvailable(_) => "EXAM_NOT_AVAILABLE",
            Self::AttemptAlreadyInProgress => "ATTEMPT_ALREADY_IN_PROGRESS",
            Self::AttemptLimitReached(_) => "ATTEMPT_LIMIT_REACHED",
            Self::AttemptClosed(_) => "ATTEMPT_CLOSED",
            Self::TimeExpired => "TIME_EXPIRED",
            Self::HasDependents(_) => "HAS_DEPENDENTS",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::NotFound(_) => "NOT_FOUND",
            Self::ScoringFailed(_) => "SCORING_FAILED",
        }
    }
}

/// Accumulates field errors so a request reports every problem at once.
#[derive(Debug, Default)]
pub(crate) struct FieldErrorsBuilder {
    fields: FieldErrors,
}

impl FieldErrorsBuilder {
    pub(crate) fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.entry(field.into()).or_default().push(message.into());
    }

    pub(crate) fn finish(self) -> Result<(), EngineError> {
        if self.fields.is_empty() {
            return Ok(());
        }
        Err(EngineError::Validation {
            message: "The given data was invalid".to_string(),
            fields: self.fields,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_messages_per_field() {
        let mut errors = FieldErrorsBuilder::default();
        errors.push("options", "too few");
        errors.push("options", "no correct option");
        errors.push("statement", "required");

        let Err(EngineError::Validation { fields, .. }) = errors.finish() else {
            panic!("expected validation error");
        };
        assert_eq!(fields["options"].len(), 2);
        assert_eq!(fields["statement"], vec!["required".to_string()]);
    }

    #[test]
    fn empty_builder_passes() {
        assert!(FieldErrorsBuilder::default().finish().is_ok());
    }

    #[test]
    fn codes_are_stable() {
        assert_eq!(EngineError::ExamLocked("x".into()).code(), "EXAM_LOCKED");
        assert_eq!(EngineError::TimeExpired.code(), "TIME_EXPIRED");
        assert_eq!(EngineError::validation("title", "required").code(), "VALIDATION_ERROR");
    }
}
