//! Crash recovery.
//!
//! A compute agent can die at any instruction while holding a `Processing`
//! task. Recovery never sees the agent's memory; it reconstructs how far the
//! attempt got purely from persisted rows and classifies the attempt against
//! an explicit commit boundary. At or above the boundary the attempt's side
//! effects are honored and the task completes; below it the partial work is
//! rolled back and the task is retried through the normal protocol, so a
//! recovery crash mid-rollback just re-runs.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use gridflow_core::{ResultId, TaskId};

use crate::error::Result;
use crate::result::ResultStatus;
use crate::store::UpdateOutcome;
use crate::task::{TaskData, TaskOutput, TaskStatus};

use super::{RetryOutcome, TaskLifecycle};

/// What the recovery check concluded for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryStatus {
    /// The attempt had crossed the commit boundary; the task is now
    /// `Completed` and its side effects stand.
    Completed,
    /// The attempt was rolled back and a retry successor exists.
    Retried(TaskId),
    /// The attempt was rolled back but the retry budget ran out; the task is
    /// now `Error`.
    Failed,
    /// Nothing to do: the task is no longer `Processing`, or its acquisition
    /// is too recent to declare the owner dead.
    Skipped,
}

impl RecoveryStatus {
    /// Metric label for the outcome.
    #[must_use]
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Retried(_) => "retried",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Predicate deciding when a crashed attempt's sub-task work counts as
/// committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitBoundary {
    /// Committed once every sub-task left `Creating`.
    SubtasksFinalized,
    /// Committed once every sub-task left `Creating` and every expected
    /// output is completed or delegated away from the crashed task. The
    /// stricter default.
    OwnershipTransferred,
}

/// Tuning for [`TaskLifecycle::recover_crashed_task`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryOptions {
    /// Sub-task commit boundary predicate.
    pub boundary: CommitBoundary,
    /// Acquisitions younger than this are skipped, the owner may be alive.
    #[serde(with = "humantime_serde")]
    pub grace_period: Duration,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        Self {
            boundary: CommitBoundary::OwnershipTransferred,
            grace_period: Duration::from_secs(60),
        }
    }
}

impl TaskLifecycle {
    /// Checks a task whose owner is suspected dead and repairs its state.
    ///
    /// Re-reads the row rather than trusting the caller's snapshot, probes
    /// the persisted side effects of the attempt, and either completes the
    /// task (boundary crossed), retries it after rolling partial work back
    /// (boundary not crossed), or skips (already handled, or acquisition too
    /// recent). Re-firing the check for the same crash converges: the
    /// follow-up invocation finds the task `Retried`, `Completed`, or
    /// `Error` and skips.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::TaskNotFound`] for an unknown task and
    /// storage or queue errors unchanged.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn recover_crashed_task(&self, task_id: &TaskId) -> Result<RecoveryStatus> {
        let task = self.get_task(task_id).await?;

        if task.status != TaskStatus::Processing {
            debug!(task_id = %task_id, status = %task.status, "not processing, nothing to recover");
            self.metrics.record_recovery(RecoveryStatus::Skipped.as_label());
            return Ok(RecoveryStatus::Skipped);
        }
        if let Some(acquired) = task.acquisition_date {
            let age = (Utc::now() - acquired).to_std().unwrap_or_default();
            if age < self.recovery.grace_period {
                debug!(task_id = %task_id, ?age, "acquisition within grace period, skipping");
                self.metrics.record_recovery(RecoveryStatus::Skipped.as_label());
                return Ok(RecoveryStatus::Skipped);
            }
        }

        let outputs = self.results.get_many(&task.expected_output_keys).await?;
        let children = self
            .tasks
            .find_created_by(&task.session_id, task_id)
            .await?;

        let status = if self.attempt_committed(&task, &outputs, &children) {
            let completed: BTreeSet<ResultId> = outputs
                .iter()
                .filter(|r| r.status == ResultStatus::Completed)
                .map(|r| r.result_id)
                .collect();
            self.honor_committed_attempt(&task, &completed).await?
        } else {
            self.roll_back_and_retry(&task, &children).await?
        };
        self.metrics.record_recovery(status.as_label());
        Ok(status)
    }

    /// Decides whether the crashed attempt's persisted effects cross the
    /// commit boundary.
    fn attempt_committed(
        &self,
        task: &TaskData,
        outputs: &[crate::result::ResultData],
        children: &[TaskData],
    ) -> bool {
        let all_outputs_completed = !task.expected_output_keys.is_empty()
            && outputs.len() == task.expected_output_keys.len()
            && outputs.iter().all(|r| r.status == ResultStatus::Completed);

        if children.is_empty() {
            // A task with no declared outputs never counts as committed.
            return all_outputs_completed;
        }

        let children_finalized = children.iter().all(|c| c.status != TaskStatus::Creating);
        match self.recovery.boundary {
            CommitBoundary::SubtasksFinalized => children_finalized,
            CommitBoundary::OwnershipTransferred => {
                children_finalized
                    && outputs.len() == task.expected_output_keys.len()
                    && outputs.iter().all(|r| {
                        r.status == ResultStatus::Completed || r.owner_task_id != task.task_id
                    })
            }
        }
    }

    /// The attempt finished its side effects; record the success it never
    /// got to report and wake the consumers the dead agent never notified.
    async fn honor_committed_attempt(
        &self,
        task: &TaskData,
        completed: &BTreeSet<ResultId>,
    ) -> Result<RecoveryStatus> {
        match self
            .tasks
            .finish(
                &task.task_id,
                &[TaskStatus::Processing],
                TaskStatus::Completed,
                TaskOutput::Success,
            )
            .await?
        {
            UpdateOutcome::Applied => {
                info!(task_id = %task.task_id, "crashed attempt had committed, completed task");
                self.metrics.record_task_transition(
                    TaskStatus::Processing.as_label(),
                    TaskStatus::Completed.as_label(),
                );
                if !completed.is_empty() {
                    let promoted = self
                        .resolve_dependencies(&task.session_id, completed)
                        .await?;
                    if !promoted.is_empty() {
                        debug!(
                            task_id = %task.task_id,
                            promoted = promoted.len(),
                            "resolved consumers of the recovered outputs",
                        );
                    }
                }
                Ok(RecoveryStatus::Completed)
            }
            UpdateOutcome::Mismatch { actual } => {
                debug!(task_id = %task.task_id, status = %actual, "another recovery finished first");
                Ok(RecoveryStatus::Skipped)
            }
            UpdateOutcome::NotFound => Ok(RecoveryStatus::Skipped),
        }
    }

    /// Rolls the attempt's partial work back, then retries the task.
    async fn roll_back_and_retry(
        &self,
        task: &TaskData,
        children: &[TaskData],
    ) -> Result<RecoveryStatus> {
        for child in children {
            match child.status {
                TaskStatus::Creating | TaskStatus::Pending | TaskStatus::Submitted => {
                    // No agent touched it yet: the retry will re-submit it.
                    if self.tasks.delete(&child.task_id).await? {
                        // Outputs the parent delegated down were created by
                        // the parent and stay Created for the retry
                        // successor; only results the child's own creation
                        // declared are abandoned.
                        let declared = self
                            .results
                            .find_created_by(&task.session_id, child.task_id.as_str())
                            .await?;
                        let own_outputs: Vec<_> =
                            declared.iter().map(|r| r.result_id).collect();
                        let aborted = self.results.abort_if_incomplete(&own_outputs).await?;
                        self.results
                            .transfer_ownership(&task.session_id, &child.task_id, &task.task_id)
                            .await?;
                        debug!(
                            child = %child.task_id,
                            aborted,
                            "rolled back unacquired sub-task",
                        );
                    }
                }
                status => {
                    warn!(child = %child.task_id, status = %status, "leaving acquired sub-task in place");
                }
            }
        }

        match self
            .retry_task(&task.task_id, "owner crashed before the attempt committed")
            .await?
        {
            RetryOutcome::Retried(successor) => Ok(RecoveryStatus::Retried(successor)),
            RetryOutcome::Exhausted => Ok(RecoveryStatus::Failed),
        }
    }
}
