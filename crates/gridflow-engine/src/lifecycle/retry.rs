//! Retry protocol.
//!
//! Retry ids are derived, not generated: attempt `n` of task `abc` is
//! `abc###n`. Every component that decides a task needs a retry computes the
//! same successor id independently, the store's first-writer-wins `create`
//! picks the single winner, and losers fall through to the same
//! post-creation steps. The queue push is deliberately not deduplicated, so
//! N concurrent callers yield one successor row and between 1 and N
//! announcements.

use tracing::{debug, instrument, warn};

use gridflow_core::TaskId;

use crate::error::{Error, Result};
use crate::store::UpdateOutcome;
use crate::task::{TaskOutput, TaskStatus};

use super::TaskLifecycle;

/// What a retry request resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    /// A successor attempt exists (created by this caller or a concurrent
    /// one) and was announced.
    Retried(TaskId),
    /// The retry budget ran out; the task was marked `Error` instead.
    Exhausted,
}

impl TaskLifecycle {
    /// Requests a retry of a failed or abandoned execution attempt.
    ///
    /// Checks the budget first: a task already at its last permitted attempt
    /// is moved to `Error` carrying `reason`, never silently dropped.
    /// Otherwise the deterministic successor row is created `Submitted` with
    /// an empty remaining set (the predecessor already waited), output
    /// ownership moves to the successor, the predecessor is marked
    /// `Retried`, and the successor is pushed subject to the session gate.
    ///
    /// Only a `Processing` attempt can be retried. A predecessor already
    /// `Retried` converges on the existing successor, and one already
    /// `Error` after its last attempt reports `Exhausted` again; any other
    /// status (a completed task in particular) is a precondition failure,
    /// never a silent re-execution.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] for an unknown task,
    /// [`Error::PreconditionFailed`] when the task's status does not permit
    /// a retry, and storage or queue errors unchanged.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn retry_task(&self, task_id: &TaskId, reason: &str) -> Result<RetryOutcome> {
        let task = self.get_task(task_id).await?;

        match task.status {
            TaskStatus::Processing => {}
            TaskStatus::Retried => {
                let successor_id = task.task_id.retried(task.task_id.retry_index() + 1);
                if self.tasks.get(&successor_id).await?.is_some() {
                    debug!(task_id = %task_id, successor = %successor_id, "already retried, converging");
                    return Ok(RetryOutcome::Retried(successor_id));
                }
                return Err(Error::precondition(format!(
                    "task {task_id} is marked retried but its successor row is missing"
                )));
            }
            TaskStatus::Error if task.retries_exhausted() => {
                return Ok(RetryOutcome::Exhausted);
            }
            status => {
                return Err(Error::precondition(format!(
                    "cannot retry task {task_id} in status {status}"
                )));
            }
        }

        if task.retries_exhausted() {
            let outcome = self
                .tasks
                .finish(
                    task_id,
                    &[TaskStatus::Processing],
                    TaskStatus::Error,
                    TaskOutput::error(reason),
                )
                .await?;
            if outcome.is_applied() {
                self.metrics.record_retries_exhausted();
                self.metrics.record_task_transition(
                    task.status.as_label(),
                    TaskStatus::Error.as_label(),
                );
                warn!(
                    task_id = %task_id,
                    attempts = task.task_id.retry_index() + 1,
                    reason,
                    "retry budget exhausted",
                );
            }
            return Ok(RetryOutcome::Exhausted);
        }

        let successor = task.retry_successor();
        let successor_id = successor.task_id.clone();
        let attempt = successor_id.retry_index();

        // First writer wins; a loser proceeds with the winner's row.
        if self.tasks.create(successor).await? {
            self.metrics.record_retry(attempt);
            debug!(task_id = %task_id, successor = %successor_id, attempt, reason, "created retry successor");
        } else {
            debug!(task_id = %task_id, successor = %successor_id, "retry successor already exists");
        }

        let moved = self
            .results
            .transfer_ownership(&task.session_id, task_id, &successor_id)
            .await?;
        if moved > 0 {
            debug!(task_id = %task_id, successor = %successor_id, moved, "transferred output ownership");
        }

        match self
            .tasks
            .finish(
                task_id,
                &[TaskStatus::Processing],
                TaskStatus::Retried,
                TaskOutput::error(reason),
            )
            .await?
        {
            UpdateOutcome::Applied => {
                self.metrics.record_task_transition(
                    TaskStatus::Processing.as_label(),
                    TaskStatus::Retried.as_label(),
                );
            }
            UpdateOutcome::Mismatch { actual } => {
                debug!(task_id = %task_id, status = %actual, "predecessor already moved on");
            }
            UpdateOutcome::NotFound => {}
        }

        let successor_row = self.get_task(&successor_id).await?;
        self.push_if_running(&successor_row).await?;
        Ok(RetryOutcome::Retried(successor_id))
    }
}
