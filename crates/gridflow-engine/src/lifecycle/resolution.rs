//! Dependency resolution.
//!
//! When results complete, each pending task waiting on them has its
//! remaining-dependency set shrunk through one atomic store operation.
//! Whichever resolver empties the set of a `Pending` task observes the
//! promotion and owns the queue push; concurrent resolvers over disjoint or
//! overlapping result sets therefore produce exactly one promotion and at
//! least one push.

use std::collections::BTreeSet;

use tracing::{debug, instrument, trace};

use gridflow_core::{ResultId, SessionId, TaskId};

use crate::error::{Error, Result};
use crate::store::{ResolveOutcome, UpdateOutcome};
use crate::task::{TaskOutput, TaskStatus};

use super::TaskLifecycle;

impl TaskLifecycle {
    /// Discharges the given completed results from every waiting task.
    ///
    /// Returns the ids of the tasks this call promoted to `Submitted`. Tasks
    /// a concurrent resolver promoted first are skipped without error, and a
    /// promoted task's push is withheld while its session is paused.
    ///
    /// # Errors
    ///
    /// Returns storage or queue errors unchanged.
    #[instrument(skip(self, completed), fields(session_id = %session_id, results = completed.len()))]
    pub async fn resolve_dependencies(
        &self,
        session_id: &SessionId,
        completed: &BTreeSet<ResultId>,
    ) -> Result<Vec<TaskId>> {
        let dependents = self.tasks.find_dependents(session_id, completed).await?;
        let mut promoted = Vec::new();

        for task_id in dependents {
            match self.tasks.discharge_dependencies(&task_id, completed).await? {
                ResolveOutcome::Submitted => {
                    self.metrics.record_task_transition(
                        TaskStatus::Pending.as_label(),
                        TaskStatus::Submitted.as_label(),
                    );
                    self.metrics.record_dependency_discharges(completed.len());
                    let task = self.get_task(&task_id).await?;
                    self.push_if_running(&task).await?;
                    promoted.push(task_id);
                }
                ResolveOutcome::Remaining { remaining } => {
                    self.metrics.record_dependency_discharges(completed.len());
                    trace!(task_id = %task_id, remaining, "dependencies remain");
                }
                ResolveOutcome::NotEligible { status } => {
                    trace!(task_id = %task_id, status = %status, "already past dependency wait");
                }
                ResolveOutcome::NotFound => {
                    trace!(task_id = %task_id, "dependent task deleted meanwhile");
                }
            }
        }
        Ok(promoted)
    }

    /// Records a successful execution reported by a compute agent.
    ///
    /// Verifies that every expected output was completed, moves the task
    /// `Processing` to `Completed` with a success output, then resolves the
    /// tasks waiting on those outputs. Returns the promoted task ids.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] for an unknown task,
    /// [`Error::PreconditionFailed`] when an expected output is still
    /// incomplete or the task is not `Processing`, and storage or queue
    /// errors unchanged.
    #[instrument(skip(self), fields(task_id = %task_id))]
    pub async fn complete_task(&self, task_id: &TaskId) -> Result<Vec<TaskId>> {
        let task = self.get_task(task_id).await?;

        let outputs = self.results.get_many(&task.expected_output_keys).await?;
        let incomplete = task.expected_output_keys.len()
            - outputs.iter().filter(|r| r.status.is_consumable()).count();
        if incomplete > 0 {
            return Err(Error::precondition(format!(
                "task {task_id} reported done with {incomplete} incomplete output(s)"
            )));
        }

        match self
            .tasks
            .finish(
                task_id,
                &[TaskStatus::Processing],
                TaskStatus::Completed,
                TaskOutput::Success,
            )
            .await?
        {
            UpdateOutcome::Applied => {
                self.metrics.record_task_transition(
                    TaskStatus::Processing.as_label(),
                    TaskStatus::Completed.as_label(),
                );
            }
            UpdateOutcome::Mismatch { actual } => {
                return Err(Error::precondition(format!(
                    "task {task_id} is {actual}, not processing"
                )));
            }
            UpdateOutcome::NotFound => {
                return Err(Error::TaskNotFound {
                    task_id: task_id.clone(),
                });
            }
        }

        let completed: BTreeSet<ResultId> = task.expected_output_keys.iter().copied().collect();
        if completed.is_empty() {
            debug!(task_id = %task_id, "task completed with no declared outputs");
            return Ok(Vec::new());
        }
        self.resolve_dependencies(&task.session_id, &completed).await
    }
}
