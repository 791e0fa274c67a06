use time::{Duration, PrimitiveDateTime};

/// Deadline is the earlier of `start + duration` and the exam's validity end.
pub(crate) fn compute_deadline(
    started_at: PrimitiveDateTime,
    duration_minutes: i32,
    window_end: Option<PrimitiveDateTime>,
) -> PrimitiveDateTime {
    let duration_deadline = started_at + Duration::minutes(i64::from(duration_minutes));
    match window_end {
        Some(end) if end < duration_deadline => end,
        _ => duration_deadline,
    }
}

pub(crate) fn is_expired(deadline: PrimitiveDateTime, now: PrimitiveDateTime) -> bool {
    now > deadline
}

pub(crate) fn remaining_seconds(deadline: PrimitiveDateTime, now: PrimitiveDateTime) -> i64 {
    (deadline - now).whole_seconds().max(0)
}

/// Completion is stamped no later than the deadline, so late submits never earn extra time.
pub(crate) fn completion_time(
    now: PrimitiveDateTime,
    deadline: PrimitiveDateTime,
) -> PrimitiveDateTime {
    if now < deadline {
        now
    } else {
        deadline
    }
}

pub(crate) fn time_used_seconds(
    started_at: PrimitiveDateTime,
    completed_at: PrimitiveDateTime,
) -> i64 {
    (completed_at - started_at).whole_seconds().max(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn validity_end_wins_over_duration() {
        let start = datetime!(2025-03-01 10:00);
        let deadline = compute_deadline(start, 30, Some(datetime!(2025-03-01 10:10)));
        assert_eq!(deadline, datetime!(2025-03-01 10:10));

        assert!(!is_expired(deadline, datetime!(2025-03-01 10:10)));
        assert!(is_expired(deadline, datetime!(2025-03-01 10:10:01)));
    }

    #[test]
    fn duration_wins_when_window_is_later_or_open() {
        let start = datetime!(2025-03-01 10:00);
        assert_eq!(
            compute_deadline(start, 30, Some(datetime!(2025-03-02 00:00))),
            datetime!(2025-03-01 10:30)
        );
        assert_eq!(compute_deadline(start, 90, None), datetime!(2025-03-01 11:30));
    }

    #[test]
    fn remaining_time_never_goes_negative() {
        let deadline = datetime!(2025-03-01 10:30);
        assert_eq!(remaining_seconds(deadline, datetime!(2025-03-01 10:29)), 60);
        assert_eq!(remaining_seconds(deadline, datetime!(2025-03-01 11:00)), 0);
    }

    #[test]
    fn completion_is_capped_at_deadline() {
        let deadline = datetime!(2025-03-01 10:30);
        let early = datetime!(2025-03-01 10:05);
        assert_eq!(completion_time(early, deadline), early);
        assert_eq!(completion_time(datetime!(2025-03-01 12:00), deadline), deadline);
        assert_eq!(time_used_seconds(datetime!(2025-03-01 10:00), deadline), 1800);
    }
}
