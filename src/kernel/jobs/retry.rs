//! Retry Policy Engine (§4.3): a pure function from (attempts, max_attempts,
//! error) to the next job state. No I/O, no database — easy to test in
//! isolation from the dispatcher that calls it.

use chrono::{DateTime, Duration, Utc};

/// The outcome the dispatcher should persist after a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Requeue with exponential backoff; `attempts` has already been
    /// incremented by the claim that preceded this failure.
    Requeue {
        run_after: DateTime<Utc>,
        error: String,
    },
    /// Retry budget exhausted (or the job type was unknown): dead-letter.
    DeadLetter { error: String },
}

/// Decide the next state for a failed job, given the attempt count already
/// recorded at claim time and the configured retry budget.
///
/// Backoff is `2^attempts` minutes, uncapped, counted from `now`.
pub fn decide(attempts: i32, max_attempts: i32, error: impl Into<String>, now: DateTime<Utc>) -> RetryOutcome {
    let error = error.into();
    if attempts < max_attempts {
        let backoff_minutes = 2i64.saturating_pow(attempts.max(0) as u32);
        RetryOutcome::Requeue {
            run_after: now + Duration::minutes(backoff_minutes),
            error,
        }
    } else {
        RetryOutcome::DeadLetter { error }
    }
}

/// Unknown job types are a permanent failure regardless of remaining
/// attempts (§4.2 step 2, §4.3 edge case).
pub fn decide_unknown_job_type(error: impl Into<String>) -> RetryOutcome {
    RetryOutcome::DeadLetter {
        error: error.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn epoch() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn requeues_with_doubling_backoff_while_attempts_remain() {
        let now = epoch();
        match decide(1, 3, "e1", now) {
            RetryOutcome::Requeue { run_after, error } => {
                assert_eq!(run_after, now + Duration::minutes(2));
                assert_eq!(error, "e1");
            }
            other => panic!("expected requeue, got {other:?}"),
        }
        match decide(2, 3, "e2", now) {
            RetryOutcome::Requeue { run_after, .. } => {
                assert_eq!(run_after, now + Duration::minutes(4));
            }
            other => panic!("expected requeue, got {other:?}"),
        }
    }

    #[test]
    fn dead_letters_once_attempts_reach_max() {
        let now = epoch();
        match decide(3, 3, "e3", now) {
            RetryOutcome::DeadLetter { error } => assert_eq!(error, "e3"),
            other => panic!("expected dead-letter, got {other:?}"),
        }
    }

    #[test]
    fn unknown_job_type_always_dead_letters() {
        match decide_unknown_job_type("ERR_UNKNOWN_JOB_TYPE: foo") {
            RetryOutcome::DeadLetter { error } => assert!(error.contains("foo")),
            other => panic!("expected dead-letter, got {other:?}"),
        }
    }

    #[test]
    fn scenario_three_retry_then_dead_letter() {
        // §8 scenario 3: max_attempts=3, failures "e1","e2","e3".
        let now = epoch();
        let after_1 = decide(1, 3, "e1", now);
        let after_2 = decide(2, 3, "e2", now);
        let after_3 = decide(3, 3, "e3", now);
        assert_eq!(
            after_1,
            RetryOutcome::Requeue {
                run_after: now + Duration::minutes(2),
                error: "e1".to_string()
            }
        );
        assert_eq!(
            after_2,
            RetryOutcome::Requeue {
                run_after: now + Duration::minutes(4),
                error: "e2".to_string()
            }
        );
        assert_eq!(
            after_3,
            RetryOutcome::DeadLetter {
                error: "e3".to_string()
            }
        );
    }
}
