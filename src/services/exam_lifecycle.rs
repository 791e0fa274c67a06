use time::{Duration, PrimitiveDateTime};

use crate::db::types::ExamState;
use crate::services::errors::EngineError;

/// Classes of exam edits, from least to most invasive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExamChange {
    /// Title, description, access type, participants.
    Metadata,
    /// Duration, validity window, pass threshold, max attempts, sub-tests.
    Structure,
    /// Committed questions, weights, random rules, selection mode.
    QuestionSet,
    /// Postulation tracks and their score rules.
    Postulations,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct LockPolicy {
    pub(crate) allow_metadata_edits_with_attempts: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubcomponentDeletion {
    Delete,
    /// Draft sub-component with dependents: detach them, then delete.
    CascadeDetach,
}

/// An exam is attempt-locked once any attempt row references it, whatever the
/// attempt's state. The lock never lifts.
pub(crate) fn check_mutation(
    state: ExamState,
    has_attempts: bool,
    change: ExamChange,
    policy: LockPolicy,
) -> Result<(), EngineError> {
    if state == ExamState::Finalized {
        return Err(EngineError::ExamLocked("Finalized exams can no longer be edited".into()));
    }

    match change {
        ExamChange::Metadata => {
            if has_attempts && !policy.allow_metadata_edits_with_attempts {
                return Err(EngineError::ExamLocked(
                    "Exam details are locked once attempts exist".into(),
                ));
            }
        }
        ExamChange::Structure => {
            if has_attempts {
                return Err(EngineError::ExamLocked(
                    "Exam structure is locked once attempts exist".into(),
                ));
            }
        }
        ExamChange::QuestionSet => {
            if has_attempts {
                return Err(EngineError::ExamLocked(
                    "Question set is locked once attempts exist".into(),
                ));
            }
            if state != ExamState::Draft {
                return Err(EngineError::ExamLocked(
                    "Question set can only change while the exam is a draft".into(),
                ));
            }
        }
        ExamChange::Postulations => {
            if has_attempts {
                return Err(EngineError::ExamLocked(
                    "Postulations are locked once attempts exist".into(),
                ));
            }
            if state != ExamState::Draft {
                return Err(EngineError::ExamLocked(
                    "Postulations can only change while the exam is a draft".into(),
                ));
            }
        }
    }

    Ok(())
}

/// Start must not come after end; an open bound is unbounded. Span limit applies
/// only when both bounds are present.
pub(crate) fn validate_window(
    starts_at: Option<PrimitiveDateTime>,
    ends_at: Option<PrimitiveDateTime>,
    max_validity_days: i64,
) -> Result<(), EngineError> {
    let (Some(start), Some(end)) = (starts_at, ends_at) else {
        return Ok(());
    };

    if start > end {
        return Err(EngineError::InvalidWindow("Exam start must not be after its end".into()));
    }
    if end - start > Duration::days(max_validity_days) {
        return Err(EngineError::InvalidWindow(format!(
            "Exam window may not exceed {max_validity_days} days"
        )));
    }

    Ok(())
}

pub(crate) fn check_publish(
    state: ExamState,
    committed_questions: i64,
    starts_at: Option<PrimitiveDateTime>,
    ends_at: Option<PrimitiveDateTime>,
    max_validity_days: i64,
    now: PrimitiveDateTime,
) -> Result<(), EngineError> {
    if state != ExamState::Draft {
        return Err(EngineError::InvalidState("Only draft exams can be published".into()));
    }
    if committed_questions <= 0 {
        return Err(EngineError::AssemblyIncomplete);
    }

    validate_window(starts_at, ends_at, max_validity_days)?;
    if matches!(ends_at, Some(end) if end <= now) {
        return Err(EngineError::InvalidWindow("Exam window has already closed".into()));
    }

    Ok(())
}

pub(crate) fn check_finalize(state: ExamState) -> Result<(), EngineError> {
    match state {
        ExamState::Published => Ok(()),
        ExamState::Draft => {
            Err(EngineError::InvalidState("Draft exams must be published before finalizing".into()))
        }
        ExamState::Finalized => Err(EngineError::InvalidState("Exam is already finalized".into())),
    }
}

/// Deleting an exam with attempts destroys results, so it needs an explicit force on a
/// finalized exam.
pub(crate) fn check_delete_exam(
    state: ExamState,
    has_attempts: bool,
    force: bool,
) -> Result<(), EngineError> {
    if !has_attempts {
        return Ok(());
    }
    if force && state == ExamState::Finalized {
        return Ok(());
    }

    Err(EngineError::HasDependents(
        "Exam has attempts; finalize it and pass force_delete to remove it".into(),
    ))
}

/// Rule for sub-tests, committed questions and other parts hanging off an exam.
pub(crate) fn can_delete_subcomponent(
    state: ExamState,
    has_attempts: bool,
    dependents: i64,
) -> Result<SubcomponentDeletion, EngineError> {
    if state == ExamState::Finalized {
        return Err(EngineError::ExamLocked("Finalized exams can no longer be edited".into()));
    }
    if has_attempts {
        return Err(EngineError::ExamLocked(
            "Exam structure is locked once attempts exist".into(),
        ));
    }

    match (state, dependents > 0) {
        (ExamState::Draft, false) => Ok(SubcomponentDeletion::Delete),
        (ExamState::Draft, true) => Ok(SubcomponentDeletion::CascadeDetach),
        (_, true) => Err(EngineError::HasDependents(format!(
            "{dependents} question(s) are still assigned; unassign them first"
        ))),
        (_, false) => Err(EngineError::ExamLocked(
            "Parts of a published exam can only be removed while it is a draft".into(),
        )),
    }
}

/// A postulation goes only while the exam is an attempt-free draft, and never while
/// score rules still hang off it.
pub(crate) fn can_delete_postulation(
    state: ExamState,
    has_attempts: bool,
    score_rules: i64,
) -> Result<(), EngineError> {
    can_delete_subcomponent(state, has_attempts, 0)?;
    if score_rules > 0 {
        return Err(EngineError::HasDependents(format!(
            "Postulation has {score_rules} score rule(s); clear them first"
        )));
    }
    Ok(())
}

/// Published and `now` inside the window; open bounds are unbounded.
pub(crate) fn is_open_for_attempts(
    state: ExamState,
    starts_at: Option<PrimitiveDateTime>,
    ends_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> bool {
    state == ExamState::Published
        && starts_at.map_or(true, |start| start <= now)
        && ends_at.map_or(true, |end| now <= end)
}

pub(crate) fn check_open_for_attempts(
    state: ExamState,
    starts_at: Option<PrimitiveDateTime>,
    ends_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> Result<(), EngineError> {
    if state != ExamState::Published {
        return Err(EngineError::ExamNotAvailable("Exam is not published".into()));
    }
    if !is_open_for_attempts(state, starts_at, ends_at, now) {
        return Err(EngineError::ExamNotAvailable("Exam is outside its validity window".into()));
    }
    Ok(())
}

/// Worker policy: published exams whose window closed are finalized automatically.
pub(crate) fn should_auto_finalize(
    state: ExamState,
    ends_at: Option<PrimitiveDateTime>,
    now: PrimitiveDateTime,
) -> bool {
    state == ExamState::Published && matches!(ends_at, Some(end) if end < now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const OPEN: LockPolicy = LockPolicy { allow_metadata_edits_with_attempts: true };
    const STRICT: LockPolicy = LockPolicy { allow_metadata_edits_with_attempts: false };

    #[test]
    fn structural_changes_are_locked_once_attempts_exist() {
        for state in [ExamState::Draft, ExamState::Published] {
            for change in
                [ExamChange::Structure, ExamChange::QuestionSet, ExamChange::Postulations]
            {
                for policy in [OPEN, STRICT] {
                    let result = check_mutation(state, true, change, policy);
                    assert!(
                        matches!(result, Err(EngineError::ExamLocked(_))),
                        "{state:?} {change:?} should be locked"
                    );
                }
            }
        }
    }

    #[test]
    fn metadata_edits_follow_policy_when_attempts_exist() {
        assert!(check_mutation(ExamState::Published, true, ExamChange::Metadata, OPEN).is_ok());
        assert!(matches!(
            check_mutation(ExamState::Published, true, ExamChange::Metadata, STRICT),
            Err(EngineError::ExamLocked(_))
        ));
        assert!(check_mutation(ExamState::Published, false, ExamChange::Metadata, STRICT).is_ok());
    }

    #[test]
    fn finalized_exam_refuses_every_change() {
        for change in [
            ExamChange::Metadata,
            ExamChange::Structure,
            ExamChange::QuestionSet,
            ExamChange::Postulations,
        ] {
            assert!(matches!(
                check_mutation(ExamState::Finalized, false, change, OPEN),
                Err(EngineError::ExamLocked(_))
            ));
        }
    }

    #[test]
    fn question_set_only_changes_in_draft() {
        assert!(check_mutation(ExamState::Draft, false, ExamChange::QuestionSet, OPEN).is_ok());
        assert!(matches!(
            check_mutation(ExamState::Published, false, ExamChange::QuestionSet, OPEN),
            Err(EngineError::ExamLocked(_))
        ));
        assert!(check_mutation(ExamState::Published, false, ExamChange::Structure, OPEN).is_ok());
    }

    #[test]
    fn window_rules() {
        let start = datetime!(2025-03-01 09:00);
        let end = datetime!(2025-03-01 12:00);

        assert!(validate_window(Some(start), Some(end), 730).is_ok());
        assert!(validate_window(Some(start), Some(start), 730).is_ok());
        assert!(validate_window(None, None, 730).is_ok());
        assert!(validate_window(Some(start), None, 730).is_ok());
        assert!(validate_window(None, Some(end), 730).is_ok());
        assert!(matches!(
            validate_window(Some(end), Some(start), 730),
            Err(EngineError::InvalidWindow(_))
        ));
        assert!(matches!(
            validate_window(Some(start), Some(datetime!(2027-03-02 09:00)), 730),
            Err(EngineError::InvalidWindow(_))
        ));
    }

    #[test]
    fn publish_preconditions() {
        let now = datetime!(2025-03-01 08:00);
        let end = Some(datetime!(2025-03-02 08:00));

        assert!(check_publish(ExamState::Draft, 3, None, end, 730, now).is_ok());
        assert!(check_publish(ExamState::Draft, 3, None, None, 730, now).is_ok());
        assert_eq!(
            check_publish(ExamState::Draft, 0, None, end, 730, now),
            Err(EngineError::AssemblyIncomplete)
        );
        assert!(matches!(
            check_publish(ExamState::Published, 3, None, end, 730, now),
            Err(EngineError::InvalidState(_))
        ));
        assert!(matches!(
            check_publish(ExamState::Draft, 3, end, Some(datetime!(2025-03-01 10:00)), 730, now),
            Err(EngineError::InvalidWindow(_))
        ));
        assert!(matches!(
            check_publish(ExamState::Draft, 3, None, Some(datetime!(2025-02-28 10:00)), 730, now),
            Err(EngineError::InvalidWindow(_))
        ));
    }

    #[test]
    fn finalize_is_one_directional() {
        assert!(check_finalize(ExamState::Published).is_ok());
        assert!(matches!(check_finalize(ExamState::Draft), Err(EngineError::InvalidState(_))));
        assert!(matches!(check_finalize(ExamState::Finalized), Err(EngineError::InvalidState(_))));
    }

    #[test]
    fn subcomponent_deletion_rules() {
        assert_eq!(
            can_delete_subcomponent(ExamState::Draft, false, 0),
            Ok(SubcomponentDeletion::Delete)
        );
        assert_eq!(
            can_delete_subcomponent(ExamState::Draft, false, 4),
            Ok(SubcomponentDeletion::CascadeDetach)
        );
        assert!(matches!(
            can_delete_subcomponent(ExamState::Published, false, 4),
            Err(EngineError::HasDependents(_))
        ));
        assert!(matches!(
            can_delete_subcomponent(ExamState::Published, false, 0),
            Err(EngineError::ExamLocked(_))
        ));
        assert!(matches!(
            can_delete_subcomponent(ExamState::Draft, true, 0),
            Err(EngineError::ExamLocked(_))
        ));
        assert!(matches!(
            can_delete_subcomponent(ExamState::Finalized, false, 0),
            Err(EngineError::ExamLocked(_))
        ));
    }

    #[test]
    fn postulations_change_only_in_an_attempt_free_draft() {
        assert!(check_mutation(ExamState::Draft, false, ExamChange::Postulations, OPEN).is_ok());
        assert!(matches!(
            check_mutation(ExamState::Published, false, ExamChange::Postulations, OPEN),
            Err(EngineError::ExamLocked(_))
        ));

        assert!(can_delete_postulation(ExamState::Draft, false, 0).is_ok());
        assert!(matches!(
            can_delete_postulation(ExamState::Draft, false, 2),
            Err(EngineError::HasDependents(_))
        ));
        for (state, has_attempts) in [
            (ExamState::Draft, true),
            (ExamState::Published, false),
            (ExamState::Finalized, false),
        ] {
            assert!(matches!(
                can_delete_postulation(state, has_attempts, 0),
                Err(EngineError::ExamLocked(_))
            ));
        }
    }

    #[test]
    fn exam_delete_requires_force_when_attempts_exist() {
        assert!(check_delete_exam(ExamState::Draft, false, false).is_ok());
        assert!(matches!(
            check_delete_exam(ExamState::Published, true, true),
            Err(EngineError::HasDependents(_))
        ));
        assert!(matches!(
            check_delete_exam(ExamState::Finalized, true, false),
            Err(EngineError::HasDependents(_))
        ));
        assert!(check_delete_exam(ExamState::Finalized, true, true).is_ok());
    }

    #[test]
    fn availability_treats_open_bounds_as_unbounded() {
        let now = datetime!(2025-03-01 10:00);
        assert!(is_open_for_attempts(ExamState::Published, None, None, now));
        assert!(is_open_for_attempts(
            ExamState::Published,
            Some(datetime!(2025-03-01 10:00)),
            Some(datetime!(2025-03-01 10:00)),
            now
        ));
        assert!(!is_open_for_attempts(
            ExamState::Published,
            Some(datetime!(2025-03-01 10:01)),
            None,
            now
        ));
        assert!(!is_open_for_attempts(ExamState::Draft, None, None, now));
        assert!(matches!(
            check_open_for_attempts(ExamState::Finalized, None, None, now),
            Err(EngineError::ExamNotAvailable(_))
        ));
    }

    #[test]
    fn auto_finalize_needs_a_closed_window() {
        let now = datetime!(2025-03-01 10:00);
        assert!(should_auto_finalize(ExamState::Published, Some(datetime!(2025-03-01 09:59)), now));
        assert!(!should_auto_finalize(ExamState::Published, None, now));
        assert!(!should_auto_finalize(ExamState::Draft, Some(datetime!(2025-02-01 00:00)), now));
    }
}
