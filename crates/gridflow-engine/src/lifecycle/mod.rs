//! Task lifecycle protocols.
//!
//! [`TaskLifecycle`] is the service that drives every status machine in this
//! crate against the storage and queue ports. Each protocol lives in its own
//! file as a separate impl block:
//!
//! - [`creation`]: two-phase task creation (`Creating` rows, idempotent
//!   finalize, first submission)
//! - [`resolution`]: dependency discharge and promotion of pending tasks
//! - [`retry`]: deterministic retry successors with convergent concurrent
//!   callers
//! - [`recovery`]: crash recovery from persisted-state probes against a
//!   commit boundary
//! - [`session_gate`]: session pause/resume and the push gate
//!
//! Every cross-task invariant is enforced by a storage-level conditional
//! update. The lifecycle never holds an in-process lock across an await
//! point, so any of these futures can be dropped at an await and re-invoked
//! later without corrupting state.

use std::sync::Arc;

use tracing::debug;

use gridflow_core::{SessionId, TaskId};

use crate::error::{Error, Result};
use crate::metrics::EngineMetrics;
use crate::queue::{PushMessage, PushQueue};
use crate::session::SessionData;
use crate::store::{ResultStore, SessionStore, TaskStore};
use crate::task::TaskData;

pub mod creation;
pub mod recovery;
pub mod resolution;
pub mod retry;
pub mod session_gate;

pub use recovery::{CommitBoundary, RecoveryOptions, RecoveryStatus};
pub use retry::RetryOutcome;

/// Drives task, result, and session state machines against the ports.
///
/// Cheap to clone; all fields are shared handles.
#[derive(Clone)]
pub struct TaskLifecycle {
    tasks: Arc<dyn TaskStore>,
    results: Arc<dyn ResultStore>,
    sessions: Arc<dyn SessionStore>,
    queue: Arc<dyn PushQueue>,
    recovery: RecoveryOptions,
    metrics: EngineMetrics,
}

impl std::fmt::Debug for TaskLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskLifecycle")
            .field("queue", &self.queue.queue_name())
            .field("recovery", &self.recovery)
            .finish_non_exhaustive()
    }
}

impl TaskLifecycle {
    /// Creates a lifecycle service with default recovery options.
    #[must_use]
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        results: Arc<dyn ResultStore>,
        sessions: Arc<dyn SessionStore>,
        queue: Arc<dyn PushQueue>,
    ) -> Self {
        Self {
            tasks,
            results,
            sessions,
            queue,
            recovery: RecoveryOptions::default(),
            metrics: EngineMetrics::new(),
        }
    }

    /// Overrides the crash recovery options.
    #[must_use]
    pub fn with_recovery_options(mut self, recovery: RecoveryOptions) -> Self {
        self.recovery = recovery;
        self
    }

    /// Fetches a task row, surfacing a typed error when it is missing.
    pub(crate) async fn get_task(&self, task_id: &TaskId) -> Result<TaskData> {
        self.tasks
            .get(task_id)
            .await?
            .ok_or_else(|| Error::TaskNotFound {
                task_id: task_id.clone(),
            })
    }

    /// Fetches a session row, surfacing a typed error when it is missing.
    pub(crate) async fn get_session(&self, session_id: &SessionId) -> Result<SessionData> {
        self.sessions
            .get(session_id)
            .await?
            .ok_or(Error::SessionNotFound {
                session_id: *session_id,
            })
    }

    /// Announces a ready task on the queue unless its session withholds
    /// pushes.
    ///
    /// The `Submitted` status transition always precedes this call; a paused
    /// session only suppresses the announcement, and `resume_session` replays
    /// it later from the status alone.
    pub(crate) async fn push_if_running(&self, task: &TaskData) -> Result<()> {
        let session = self.get_session(&task.session_id).await?;
        if session.is_push_withheld() || session.status.is_terminal() {
            debug!(
                task_id = %task.task_id,
                session_id = %task.session_id,
                session_status = %session.status,
                "withholding queue push",
            );
            return Ok(());
        }

        self.queue
            .push(PushMessage::new(
                task.task_id.clone(),
                task.session_id,
                task.options.partition_id.clone(),
                task.options.priority,
            ))
            .await?;
        self.metrics.record_pushes(self.queue.queue_name(), 1);
        Ok(())
    }
}
