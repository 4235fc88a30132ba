//! Two-phase task creation.
//!
//! Phase 1 ([`TaskLifecycle::create_tasks`]) persists task rows in
//! `Creating` together with the `Created` result rows they declare. Phase 2
//! ([`TaskLifecycle::finalize_task_creation`]) computes each task's initial
//! dependency state and performs the first submission through a single
//! conditional status update. Both phases are safely repeatable, so a client
//! that crashes between them re-runs the whole submission.

use std::collections::BTreeSet;

use tracing::{debug, instrument, warn};

use gridflow_core::{ResultId, SessionId, TaskId};

use crate::error::{Error, Result};
use crate::result::ResultData;
use crate::session::SessionStatus;
use crate::store::FinalizeOutcome;
use crate::task::{TaskCreationRequest, TaskData, TaskStatus};

use super::TaskLifecycle;

impl TaskLifecycle {
    /// Phase 1: persists the batch as `Creating` rows.
    ///
    /// Inserts one task row per request with the remaining-dependency set
    /// seeded to the full declared set, plus a `Created` result row for every
    /// expected output key that does not exist yet. Rows already present are
    /// left untouched, so re-running the call after a client crash is safe.
    ///
    /// `submitted_by` is the parent task when a running task submits
    /// sub-tasks; `None` attributes the batch to the session itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for an unknown session,
    /// [`Error::PreconditionFailed`] when the session is cancelled or
    /// closed, and storage errors unchanged.
    #[instrument(skip(self, requests), fields(session_id = %session_id, count = requests.len()))]
    pub async fn create_tasks(
        &self,
        session_id: &SessionId,
        submitted_by: Option<&TaskId>,
        requests: &[TaskCreationRequest],
    ) -> Result<()> {
        let session = self.get_session(session_id).await?;
        if matches!(
            session.status,
            SessionStatus::Cancelled | SessionStatus::Closed
        ) {
            return Err(Error::precondition(format!(
                "session {session_id} is {} and accepts no new tasks",
                session.status
            )));
        }

        let created_by = submitted_by.map_or_else(|| session_id.to_string(), ToString::to_string);
        let parent_task_ids: Vec<TaskId> = submitted_by.cloned().into_iter().collect();

        for request in requests {
            let task = TaskData::from_request(
                request,
                *session_id,
                created_by.clone(),
                parent_task_ids.clone(),
                &session.default_task_options,
            );
            if !self.tasks.create(task).await? {
                debug!(task_id = %request.task_id, "task row already exists, skipping insert");
            }

            for key in &request.expected_output_keys {
                let row = ResultData::declared(
                    *key,
                    *session_id,
                    key.to_string(),
                    request.task_id.clone(),
                );
                if !self.results.create(row).await? {
                    debug!(result_id = %key, "result row already exists, skipping insert");
                }
            }
        }
        Ok(())
    }

    /// Phase 2: finalizes the batch and performs first submission.
    ///
    /// Per request, already-completed dependencies are discharged first, then
    /// a single conditional update moves the row out of `Creating`: to
    /// `Submitted` (and onto the queue, subject to the session gate) when the
    /// remaining set is empty, to `Pending` otherwise. A row that some
    /// earlier invocation already finalized reports `AlreadyFinalized` and is
    /// left alone, so a duplicate finalize never produces a second push.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] when a request names a row that was
    /// never created, and storage or queue errors unchanged.
    #[instrument(skip(self, requests), fields(session_id = %session_id, count = requests.len()))]
    pub async fn finalize_task_creation(
        &self,
        session_id: &SessionId,
        requests: &[TaskCreationRequest],
    ) -> Result<()> {
        for request in requests {
            if !request.data_dependencies.is_empty() {
                let ids: Vec<ResultId> = request.data_dependencies.iter().copied().collect();
                let rows = self.results.get_many(&ids).await?;
                let completed: BTreeSet<ResultId> = rows
                    .iter()
                    .filter(|r| r.status.is_consumable())
                    .map(|r| r.result_id)
                    .collect();
                if !completed.is_empty() {
                    // While the row is still Creating this only shrinks the
                    // set; promotion stays the finalize call's decision.
                    self.tasks
                        .discharge_dependencies(&request.task_id, &completed)
                        .await?;
                    self.metrics.record_dependency_discharges(completed.len());
                }
            }

            match self.tasks.finalize_status(&request.task_id).await? {
                FinalizeOutcome::Submitted => {
                    self.metrics.record_task_transition(
                        TaskStatus::Creating.as_label(),
                        TaskStatus::Submitted.as_label(),
                    );
                    let task = self.get_task(&request.task_id).await?;
                    if let Ok(elapsed) = (chrono::Utc::now() - task.created_at).to_std() {
                        self.metrics.observe_submission_duration(elapsed);
                    }
                    self.push_if_running(&task).await?;
                }
                FinalizeOutcome::Pending { remaining } => {
                    self.metrics.record_task_transition(
                        TaskStatus::Creating.as_label(),
                        TaskStatus::Pending.as_label(),
                    );
                    debug!(task_id = %request.task_id, remaining, "task waiting on dependencies");
                }
                FinalizeOutcome::AlreadyFinalized { status } => {
                    debug!(task_id = %request.task_id, status = %status, "already finalized, no-op");
                }
                FinalizeOutcome::NotFound => {
                    return Err(Error::TaskNotFound {
                        task_id: request.task_id.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Deletes tasks whose creation was never finalized.
    ///
    /// Rows still `Creating` are removed and the results their own creation
    /// declared are aborted unless something completed them. Expected output
    /// keys that pre-existed the batch (a parent's delegated outputs) were
    /// created by someone else and are left alone. Finalized rows are never
    /// touched. Returns how many rows were deleted.
    ///
    /// # Errors
    ///
    /// Returns storage errors unchanged.
    #[instrument(skip(self, task_ids), fields(session_id = %session_id, count = task_ids.len()))]
    pub async fn delete_tasks(
        &self,
        session_id: &SessionId,
        task_ids: &[TaskId],
    ) -> Result<usize> {
        let mut deleted = 0;
        for task_id in task_ids {
            let Some(task) = self.tasks.get(task_id).await? else {
                continue;
            };
            if task.session_id != *session_id || task.status != TaskStatus::Creating {
                warn!(task_id = %task_id, status = %task.status, "refusing to delete finalized task");
                continue;
            }
            if self.tasks.delete(task_id).await? {
                let declared = self
                    .results
                    .find_created_by(session_id, task_id.as_str())
                    .await?;
                let own_outputs: Vec<_> = declared.iter().map(|r| r.result_id).collect();
                let aborted = self.results.abort_if_incomplete(&own_outputs).await?;
                debug!(task_id = %task_id, aborted, "deleted unfinalized task");
                deleted += 1;
            }
        }
        Ok(deleted)
    }
}
