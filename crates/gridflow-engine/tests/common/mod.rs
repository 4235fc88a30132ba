//! Shared fixtures for the lifecycle integration suites.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use gridflow_core::{ResultId, SessionId, TaskId};
use gridflow_engine::error::Result;
use gridflow_engine::lifecycle::{CommitBoundary, RecoveryOptions, TaskLifecycle};
use gridflow_engine::queue::memory::InMemoryPushQueue;
use gridflow_engine::store::memory::{
    InMemoryResultStore, InMemorySessionStore, InMemoryTaskStore,
};
use gridflow_engine::store::{ResultStore, TaskStore};
use gridflow_engine::task::{TaskCreationRequest, TaskData, TaskOptions, TaskStatus};

/// A lifecycle service over in-memory adapters, with the adapters kept
/// around for direct inspection.
pub struct Harness {
    pub lifecycle: TaskLifecycle,
    pub tasks: Arc<InMemoryTaskStore>,
    pub results: Arc<InMemoryResultStore>,
    pub sessions: Arc<InMemorySessionStore>,
    pub queue: Arc<InMemoryPushQueue>,
}

impl Harness {
    /// Builds a harness with a zero grace period so recovery tests never
    /// have to wait.
    pub fn new() -> Self {
        Self::with_boundary(CommitBoundary::OwnershipTransferred)
    }

    pub fn with_boundary(boundary: CommitBoundary) -> Self {
        let tasks = Arc::new(InMemoryTaskStore::new());
        let results = Arc::new(InMemoryResultStore::new());
        let sessions = Arc::new(InMemorySessionStore::new());
        let queue = Arc::new(InMemoryPushQueue::new());
        let lifecycle = TaskLifecycle::new(
            tasks.clone(),
            results.clone(),
            sessions.clone(),
            queue.clone(),
        )
        .with_recovery_options(RecoveryOptions {
            boundary,
            grace_period: Duration::ZERO,
        });
        Self {
            lifecycle,
            tasks,
            results,
            sessions,
            queue,
        }
    }

    pub async fn running_session(&self) -> Result<SessionId> {
        self.lifecycle
            .create_session(vec!["default".into()], TaskOptions::default())
            .await
    }

    /// Creates and finalizes one dependency-free task with a single declared
    /// output. The task ends up `Submitted` and pushed.
    pub async fn submitted_task(&self, session_id: &SessionId) -> Result<(TaskId, ResultId)> {
        let task_id = TaskId::generate();
        let output = ResultId::generate();
        let request = TaskCreationRequest::new(task_id.clone(), ResultId::generate())
            .with_expected_output_keys(vec![output]);
        self.lifecycle
            .create_tasks(session_id, None, std::slice::from_ref(&request))
            .await?;
        self.lifecycle
            .finalize_task_creation(session_id, &[request])
            .await?;
        Ok((task_id, output))
    }

    /// Like [`Harness::submitted_task`], then acquired by a worker pod so
    /// the task sits in `Processing`.
    pub async fn processing_task(&self, session_id: &SessionId) -> Result<(TaskId, ResultId)> {
        let (task_id, output) = self.submitted_task(session_id).await?;
        assert!(
            self.lifecycle
                .acquire_task(&task_id, "pod-0", "compute-pod-0")
                .await?
        );
        Ok((task_id, output))
    }

    pub async fn task(&self, task_id: &TaskId) -> Result<TaskData> {
        Ok(self
            .tasks
            .get(task_id)
            .await?
            .unwrap_or_else(|| panic!("task {task_id} missing")))
    }

    pub async fn task_status(&self, task_id: &TaskId) -> Result<TaskStatus> {
        Ok(self.task(task_id).await?.status)
    }

    /// Marks a result completed on behalf of a task, bypassing the worker.
    pub async fn complete_result(&self, result_id: &ResultId, by: &TaskId) -> Result<()> {
        assert!(
            self.results
                .complete(result_id, by, 16, Some(format!("blob-{result_id}")))
                .await?
                .is_applied(),
            "result {result_id} was not completable"
        );
        Ok(())
    }
}
