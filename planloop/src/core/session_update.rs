//! Loop-owned session transitions.
//!
//! These functions are the only writers of session state. They are pure (the
//! caller passes the clock reading) and leave persistence to the caller.

use chrono::{DateTime, Utc};

use crate::session::{ExecutionResult, ExecutionSession, ExecutionStatus, TaskExecution};

/// What happened to a task after an attempt settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// The attempt succeeded; the task is completed.
    Completed,
    /// The attempt failed and the task stays eligible for another attempt.
    Retry { failures: u32, max_retries: u32 },
    /// The attempt failed and retries are exhausted. The task is recorded as
    /// both failed and completed so dependents are not blocked forever.
    Exhausted { failures: u32 },
}

/// Open a new attempt for `task_id` and mark it current.
///
/// Returns the attempt number (prior records for the task + 1).
pub fn begin_attempt(session: &mut ExecutionSession, task_id: &str, now: DateTime<Utc>) -> u32 {
    let attempt_number = session.attempts_for(task_id).count() as u32 + 1;
    session.task_history.push(TaskExecution {
        task_id: task_id.to_string(),
        status: ExecutionStatus::InProgress,
        started_at: now,
        completed_at: None,
        duration_ms: None,
        attempt_number,
        error: None,
        result: None,
    });
    session.current_task_id = Some(task_id.to_string());
    session.last_activity = now;
    attempt_number
}

/// Settle the open attempt for `task_id` as completed.
pub fn complete_attempt(
    session: &mut ExecutionSession,
    task_id: &str,
    now: DateTime<Utc>,
    result: ExecutionResult,
) -> Result<Disposition, String> {
    let record = open_attempt(session, task_id)?;
    settle(record, ExecutionStatus::Completed, now);
    record.result = Some(result);

    session.failed.remove(task_id);
    session.skipped.remove(task_id);
    session.completed.insert(task_id.to_string());
    clear_current(session, task_id, now);
    Ok(Disposition::Completed)
}

/// Settle the open attempt for `task_id` as failed and apply the retry limit.
///
/// Failures are counted from the history, so the limit survives restarts.
pub fn fail_attempt(
    session: &mut ExecutionSession,
    task_id: &str,
    now: DateTime<Utc>,
    error: String,
    result: Option<ExecutionResult>,
    max_retries: u32,
) -> Result<Disposition, String> {
    let record = open_attempt(session, task_id)?;
    settle(record, ExecutionStatus::Failed, now);
    record.error = Some(error);
    record.result = result;

    let failures = session.failed_attempts(task_id);
    let disposition = if failures >= max_retries {
        session.failed.insert(task_id.to_string());
        session.completed.insert(task_id.to_string());
        Disposition::Exhausted { failures }
    } else {
        Disposition::Retry {
            failures,
            max_retries,
        }
    };
    clear_current(session, task_id, now);
    Ok(disposition)
}

/// Mark `task_id` as skipped; it then satisfies dependents like a completed task.
pub fn skip_task(session: &mut ExecutionSession, task_id: &str, now: DateTime<Utc>) {
    session.completed.remove(task_id);
    session.failed.remove(task_id);
    session.skipped.insert(task_id.to_string());
    clear_current(session, task_id, now);
}

fn open_attempt<'a>(
    session: &'a mut ExecutionSession,
    task_id: &str,
) -> Result<&'a mut TaskExecution, String> {
    session
        .task_history
        .iter_mut()
        .rev()
        .find(|record| record.task_id == task_id && record.status == ExecutionStatus::InProgress)
        .ok_or_else(|| format!("no open attempt for '{task_id}'"))
}

fn settle(record: &mut TaskExecution, status: ExecutionStatus, now: DateTime<Utc>) {
    record.status = status;
    record.completed_at = Some(now);
    record.duration_ms = Some((now - record.started_at).num_milliseconds().max(0) as u64);
}

fn clear_current(session: &mut ExecutionSession, task_id: &str, now: DateTime<Utc>) {
    if session.current_task_id.as_deref() == Some(task_id) {
        session.current_task_id = None;
    }
    session.last_activity = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{at, empty_session};

    #[test]
    fn begin_attempt_appends_in_progress_record() {
        let mut session = empty_session();
        assert_eq!(begin_attempt(&mut session, "task-001", at(0)), 1);
        assert_eq!(session.current_task_id.as_deref(), Some("task-001"));
        assert_eq!(session.task_history.len(), 1);
        assert_eq!(session.task_history[0].status, ExecutionStatus::InProgress);
    }

    #[test]
    fn completing_records_duration_and_clears_current() {
        let mut session = empty_session();
        begin_attempt(&mut session, "task-001", at(0));
        let disposition =
            complete_attempt(&mut session, "task-001", at(1500), ExecutionResult::default())
                .expect("complete");

        assert_eq!(disposition, Disposition::Completed);
        assert!(session.completed.contains("task-001"));
        assert_eq!(session.current_task_id, None);
        let record = &session.task_history[0];
        assert_eq!(record.status, ExecutionStatus::Completed);
        assert_eq!(record.duration_ms, Some(1500));
        assert_eq!(record.error, None);
        assert_eq!(session.last_activity, at(1500));
    }

    #[test]
    fn failures_below_limit_leave_task_eligible() {
        let mut session = empty_session();
        begin_attempt(&mut session, "task-001", at(0));
        let disposition =
            fail_attempt(&mut session, "task-001", at(10), "boom".to_string(), None, 3)
                .expect("fail");

        assert_eq!(
            disposition,
            Disposition::Retry {
                failures: 1,
                max_retries: 3
            }
        );
        assert!(session.failed.is_empty());
        assert!(session.completed.is_empty());
        assert_eq!(session.task_history[0].error.as_deref(), Some("boom"));
    }

    #[test]
    fn exhausted_retries_land_in_both_sets() {
        let mut session = empty_session();
        let mut last = None;
        for attempt in 1..=3u32 {
            let number = begin_attempt(&mut session, "task-001", at(attempt as i64 * 100));
            assert_eq!(number, attempt);
            last = Some(
                fail_attempt(
                    &mut session,
                    "task-001",
                    at(attempt as i64 * 100 + 50),
                    format!("failure {attempt}"),
                    None,
                    3,
                )
                .expect("fail"),
            );
        }

        assert_eq!(last, Some(Disposition::Exhausted { failures: 3 }));
        assert_eq!(session.failed_attempts("task-001"), 3);
        assert!(session.failed.contains("task-001"));
        assert!(session.completed.contains("task-001"));
        assert_eq!(session.last_error("task-001"), Some("failure 3"));
    }

    #[test]
    fn last_error_outlives_the_task_id_it_was_looked_up_with() {
        let mut session = empty_session();
        for (task, message) in [("task-001", "first"), ("task-002", "other task"), ("task-001", "second")] {
            begin_attempt(&mut session, task, at(0));
            fail_attempt(&mut session, task, at(1), message.to_string(), None, 5).expect("fail");
        }
        begin_attempt(&mut session, "task-001", at(2));

        let error = {
            let id = String::from("task-001");
            session.last_error(&id)
        };
        assert_eq!(error, Some("second"));
        assert_eq!(session.last_error("task-003"), None);
    }

    #[test]
    fn success_after_failure_moves_task_out_of_failed() {
        let mut session = empty_session();
        session.failed.insert("task-001".to_string());
        begin_attempt(&mut session, "task-001", at(0));
        complete_attempt(&mut session, "task-001", at(1), ExecutionResult::default())
            .expect("complete");
        assert!(!session.failed.contains("task-001"));
        assert!(session.completed.contains("task-001"));
    }

    #[test]
    fn interrupted_attempt_counts_toward_attempt_number() {
        let mut session = empty_session();
        begin_attempt(&mut session, "task-001", at(0));
        // crash: the record stays in_progress
        assert_eq!(begin_attempt(&mut session, "task-001", at(5)), 2);
        complete_attempt(&mut session, "task-001", at(9), ExecutionResult::default())
            .expect("complete");
        assert_eq!(session.task_history[0].status, ExecutionStatus::InProgress);
        assert_eq!(session.task_history[1].status, ExecutionStatus::Completed);
    }

    #[test]
    fn settling_without_open_attempt_is_an_error() {
        let mut session = empty_session();
        let err = complete_attempt(&mut session, "task-001", at(0), ExecutionResult::default())
            .unwrap_err();
        assert!(err.contains("no open attempt"));
    }

    #[test]
    fn skip_moves_task_to_skipped() {
        let mut session = empty_session();
        session.failed.insert("task-002".to_string());
        skip_task(&mut session, "task-002", at(3));
        assert!(session.skipped.contains("task-002"));
        assert!(!session.failed.contains("task-002"));
    }
}
