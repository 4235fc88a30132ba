//! Session lifecycle and the push gate.
//!
//! Pausing a session withholds queue pushes without blocking status
//! transitions, so tasks keep becoming `Submitted` while paused and resume
//! replays every `Submitted` task exactly once from storage. The replay is
//! driven by status alone, which also makes resume the repair path for
//! pushes lost to a queue outage.

use tracing::{debug, info, instrument, warn};

use gridflow_core::{SessionId, TaskId};

use crate::error::{Error, Result};
use crate::queue::PushMessage;
use crate::session::{SessionData, SessionStatus};
use crate::store::UpdateOutcome;
use crate::task::{TaskOptions, TaskStatus};

use super::TaskLifecycle;

impl TaskLifecycle {
    /// Creates a session in `Running` status.
    ///
    /// # Errors
    ///
    /// Returns storage errors unchanged.
    #[instrument(skip(self, default_task_options))]
    pub async fn create_session(
        &self,
        partition_ids: Vec<String>,
        default_task_options: TaskOptions,
    ) -> Result<SessionId> {
        let session = SessionData::new(partition_ids, default_task_options);
        let session_id = session.session_id;
        if !self.sessions.create(session).await? {
            return Err(Error::storage("generated session id collided"));
        }
        info!(session_id = %session_id, "created session");
        Ok(session_id)
    }

    /// Pauses a running session.
    ///
    /// Pausing a paused session is a no-op. While paused, every would-be
    /// queue push in finalize, resolve, and retry is withheld; the status
    /// transitions themselves still happen.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for an unknown session and
    /// [`Error::PreconditionFailed`] when the session is cancelled or
    /// closed.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn pause_session(&self, session_id: &SessionId) -> Result<()> {
        match self
            .sessions
            .cas_status(session_id, &[SessionStatus::Running], SessionStatus::Paused)
            .await?
        {
            UpdateOutcome::Applied => {
                info!(session_id = %session_id, "paused session");
                self.metrics.adjust_paused_sessions(1.0);
                Ok(())
            }
            UpdateOutcome::Mismatch {
                actual: SessionStatus::Paused,
            } => Ok(()),
            UpdateOutcome::Mismatch { actual } => Err(Error::precondition(format!(
                "cannot pause session {session_id} in status {actual}"
            ))),
            UpdateOutcome::NotFound => Err(Error::SessionNotFound {
                session_id: *session_id,
            }),
        }
    }

    /// Resumes a paused session and replays withheld work.
    ///
    /// Abandoned in-flight execution is rewound first (`Processing` rows
    /// with no live owner go back to `Submitted` with ownership cleared),
    /// then every `Submitted` task of the session is pushed exactly once.
    /// A session already `Running` is replayed anyway, so a resume that
    /// crashed between the status flip and the replay can be re-run.
    /// Returns the number of tasks pushed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for an unknown session,
    /// [`Error::PreconditionFailed`] when the session is cancelled or
    /// closed, and storage or queue errors unchanged.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn resume_session(&self, session_id: &SessionId) -> Result<usize> {
        match self
            .sessions
            .cas_status(session_id, &[SessionStatus::Paused], SessionStatus::Running)
            .await?
        {
            UpdateOutcome::Applied => {
                self.metrics.adjust_paused_sessions(-1.0);
            }
            UpdateOutcome::Mismatch {
                actual: SessionStatus::Running,
            } => {
                debug!(session_id = %session_id, "session already running, replaying anyway");
            }
            UpdateOutcome::Mismatch { actual } => {
                return Err(Error::precondition(format!(
                    "cannot resume session {session_id} in status {actual}"
                )));
            }
            UpdateOutcome::NotFound => {
                return Err(Error::SessionNotFound {
                    session_id: *session_id,
                });
            }
        }

        let rewound = self.tasks.release_abandoned(session_id).await?;
        if !rewound.is_empty() {
            warn!(
                session_id = %session_id,
                count = rewound.len(),
                "rewound abandoned processing tasks",
            );
        }

        let submitted = self
            .tasks
            .list_by_status(session_id, TaskStatus::Submitted)
            .await?;
        let messages: Vec<PushMessage> = submitted
            .iter()
            .map(|t| {
                PushMessage::new(
                    t.task_id.clone(),
                    t.session_id,
                    t.options.partition_id.clone(),
                    t.options.priority,
                )
            })
            .collect();
        let pushed = messages.len();
        self.queue.push_batch(messages).await?;
        self.metrics.record_pushes(self.queue.queue_name(), pushed);
        info!(session_id = %session_id, pushed, "resumed session");
        Ok(pushed)
    }

    /// Cancels a session and sweeps its live tasks to `Cancelled`.
    ///
    /// Cancelling an already cancelled session is a no-op. Returns the
    /// number of tasks this call cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for an unknown session,
    /// [`Error::PreconditionFailed`] for a closed session, and storage
    /// errors unchanged.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn cancel_session(&self, session_id: &SessionId) -> Result<usize> {
        match self
            .sessions
            .cas_status(
                session_id,
                &[SessionStatus::Running, SessionStatus::Paused],
                SessionStatus::Cancelled,
            )
            .await?
        {
            UpdateOutcome::Applied | UpdateOutcome::Mismatch {
                actual: SessionStatus::Cancelled,
            } => {}
            UpdateOutcome::Mismatch { actual } => {
                return Err(Error::precondition(format!(
                    "cannot cancel session {session_id} in status {actual}"
                )));
            }
            UpdateOutcome::NotFound => {
                return Err(Error::SessionNotFound {
                    session_id: *session_id,
                });
            }
        }

        let mut cancelled = 0;
        for status in [
            TaskStatus::Creating,
            TaskStatus::Pending,
            TaskStatus::Submitted,
            TaskStatus::Processing,
        ] {
            for task in self.tasks.list_by_status(session_id, status).await? {
                let marked = self
                    .tasks
                    .cas_status(&task.task_id, &[status], TaskStatus::Cancelling)
                    .await?;
                if marked.is_applied()
                    && self
                        .tasks
                        .cas_status(
                            &task.task_id,
                            &[TaskStatus::Cancelling],
                            TaskStatus::Cancelled,
                        )
                        .await?
                        .is_applied()
                {
                    cancelled += 1;
                }
            }
        }
        info!(session_id = %session_id, cancelled, "cancelled session");
        Ok(cancelled)
    }

    /// Closes a session, rejecting further submissions.
    ///
    /// Closing a closed session is a no-op. Tasks already in flight are
    /// left to finish.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SessionNotFound`] for an unknown session,
    /// [`Error::PreconditionFailed`] for a cancelled session, and storage
    /// errors unchanged.
    #[instrument(skip(self), fields(session_id = %session_id))]
    pub async fn close_session(&self, session_id: &SessionId) -> Result<()> {
        match self
            .sessions
            .cas_status(
                session_id,
                &[SessionStatus::Running, SessionStatus::Paused],
                SessionStatus::Closed,
            )
            .await?
        {
            UpdateOutcome::Applied
            | UpdateOutcome::Mismatch {
                actual: SessionStatus::Closed,
            } => Ok(()),
            UpdateOutcome::Mismatch { actual } => Err(Error::precondition(format!(
                "cannot close session {session_id} in status {actual}"
            ))),
            UpdateOutcome::NotFound => Err(Error::SessionNotFound {
                session_id: *session_id,
            }),
        }
    }

    /// Worker-side acquisition of an announced task.
    ///
    /// Returns `true` when this worker won the task, `false` when the
    /// message was a duplicate or another worker got there first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TaskNotFound`] for an unknown task and storage
    /// errors unchanged.
    #[instrument(skip(self), fields(task_id = %task_id, pod_id))]
    pub async fn acquire_task(
        &self,
        task_id: &TaskId,
        pod_id: &str,
        pod_name: &str,
    ) -> Result<bool> {
        match self.tasks.acquire(task_id, pod_id, pod_name).await? {
            UpdateOutcome::Applied => {
                self.metrics.record_task_transition(
                    TaskStatus::Submitted.as_label(),
                    TaskStatus::Processing.as_label(),
                );
                Ok(true)
            }
            UpdateOutcome::Mismatch { actual } => {
                debug!(task_id = %task_id, status = %actual, "acquisition lost");
                Ok(false)
            }
            UpdateOutcome::NotFound => Err(Error::TaskNotFound {
                task_id: task_id.clone(),
            }),
        }
    }
}
