//! In-memory store implementations for testing.
//!
//! This module provides [`InMemoryTaskStore`], [`InMemoryResultStore`], and
//! [`InMemorySessionStore`], simple in-memory implementations of the storage
//! ports suitable for testing and development.
//!
//! ## Limitations
//!
//! - **NOT suitable for production**: No durability, no cross-process
//!   coordination
//! - **Single-process only**: State is not shared across process boundaries
//! - **No persistence**: All state is lost when the process exits

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use chrono::Utc;

use gridflow_core::{ResultId, SessionId, TaskId};

use super::{FinalizeOutcome, ResolveOutcome, ResultStore, SessionStore, TaskStore, UpdateOutcome};
use crate::error::{Error, Result};
use crate::result::{ResultData, ResultStatus};
use crate::session::{SessionData, SessionStatus};
use crate::task::{TaskData, TaskOutput, TaskStatus};

/// Converts a lock poison error to a storage error.
fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::storage("lock poisoned")
}

/// In-memory task store for testing.
///
/// Provides a thread-safe implementation of the [`TaskStore`] port using
/// `RwLock` for synchronization. Every conditional update holds the write
/// lock for its whole read-check-write cycle, which is what gives the CAS
/// primitives their atomicity here.
#[derive(Debug, Default)]
pub struct InMemoryTaskStore {
    tasks: RwLock<HashMap<TaskId, TaskData>>,
}

impl InMemoryTaskStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of task rows currently stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn task_count(&self) -> Result<usize> {
        let count = {
            let tasks = self.tasks.read().map_err(poison_err)?;
            tasks.len()
        };
        Ok(count)
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn create(&self, task: TaskData) -> Result<bool> {
        let mut tasks = self.tasks.write().map_err(poison_err)?;
        if tasks.contains_key(&task.task_id) {
            return Ok(false);
        }
        tasks.insert(task.task_id.clone(), task);
        Ok(true)
    }

    async fn get(&self, task_id: &TaskId) -> Result<Option<TaskData>> {
        let result = {
            let tasks = self.tasks.read().map_err(poison_err)?;
            tasks.get(task_id).cloned()
        };
        Ok(result)
    }

    async fn delete(&self, task_id: &TaskId) -> Result<bool> {
        let mut tasks = self.tasks.write().map_err(poison_err)?;
        Ok(tasks.remove(task_id).is_some())
    }

    async fn cas_status(
        &self,
        task_id: &TaskId,
        expected: &[TaskStatus],
        target: TaskStatus,
    ) -> Result<UpdateOutcome<TaskStatus>> {
        let mut tasks = self.tasks.write().map_err(poison_err)?;

        let Some(task) = tasks.get_mut(task_id) else {
            return Ok(UpdateOutcome::NotFound);
        };

        if !expected.contains(&task.status) {
            return Ok(UpdateOutcome::Mismatch {
                actual: task.status,
            });
        }

        task.transition_to(target)?;
        if target != TaskStatus::Processing {
            task.clear_ownership();
        }
        Ok(UpdateOutcome::Applied)
    }

    async fn finalize_status(&self, task_id: &TaskId) -> Result<FinalizeOutcome> {
        let mut tasks = self.tasks.write().map_err(poison_err)?;

        let Some(task) = tasks.get_mut(task_id) else {
            return Ok(FinalizeOutcome::NotFound);
        };

        if task.status != TaskStatus::Creating {
            return Ok(FinalizeOutcome::AlreadyFinalized {
                status: task.status,
            });
        }

        if task.remaining_data_dependencies.is_empty() {
            task.transition_to(TaskStatus::Submitted)?;
            Ok(FinalizeOutcome::Submitted)
        } else {
            task.transition_to(TaskStatus::Pending)?;
            Ok(FinalizeOutcome::Pending {
                remaining: task.remaining_data_dependencies.len(),
            })
        }
    }

    async fn discharge_dependencies(
        &self,
        task_id: &TaskId,
        completed: &BTreeSet<ResultId>,
    ) -> Result<ResolveOutcome> {
        let mut tasks = self.tasks.write().map_err(poison_err)?;

        let Some(task) = tasks.get_mut(task_id) else {
            return Ok(ResolveOutcome::NotFound);
        };

        match task.status {
            TaskStatus::Creating | TaskStatus::Pending => {
                for id in completed {
                    task.remaining_data_dependencies.remove(id);
                }
                if task.status == TaskStatus::Pending && task.remaining_data_dependencies.is_empty()
                {
                    task.transition_to(TaskStatus::Submitted)?;
                    Ok(ResolveOutcome::Submitted)
                } else {
                    Ok(ResolveOutcome::Remaining {
                        remaining: task.remaining_data_dependencies.len(),
                    })
                }
            }
            status => Ok(ResolveOutcome::NotEligible { status }),
        }
    }

    async fn finish(
        &self,
        task_id: &TaskId,
        expected: &[TaskStatus],
        target: TaskStatus,
        output: TaskOutput,
    ) -> Result<UpdateOutcome<TaskStatus>> {
        let mut tasks = self.tasks.write().map_err(poison_err)?;

        let Some(task) = tasks.get_mut(task_id) else {
            return Ok(UpdateOutcome::NotFound);
        };

        if !expected.contains(&task.status) {
            return Ok(UpdateOutcome::Mismatch {
                actual: task.status,
            });
        }

        task.transition_to(target)?;
        task.output = Some(output);
        task.clear_ownership();
        Ok(UpdateOutcome::Applied)
    }

    async fn acquire(
        &self,
        task_id: &TaskId,
        pod_id: &str,
        pod_name: &str,
    ) -> Result<UpdateOutcome<TaskStatus>> {
        let mut tasks = self.tasks.write().map_err(poison_err)?;

        let Some(task) = tasks.get_mut(task_id) else {
            return Ok(UpdateOutcome::NotFound);
        };

        if task.status != TaskStatus::Submitted {
            return Ok(UpdateOutcome::Mismatch {
                actual: task.status,
            });
        }

        task.transition_to(TaskStatus::Processing)?;
        let now = Utc::now();
        task.owner_pod_id = Some(pod_id.to_string());
        task.owner_pod_name = Some(pod_name.to_string());
        task.acquisition_date = Some(now);
        task.reception_date = Some(now);
        Ok(UpdateOutcome::Applied)
    }

    async fn release_abandoned(&self, session_id: &SessionId) -> Result<Vec<TaskId>> {
        let mut tasks = self.tasks.write().map_err(poison_err)?;

        let mut released = Vec::new();
        for task in tasks.values_mut() {
            if task.session_id == *session_id && task.status == TaskStatus::Processing {
                task.transition_to(TaskStatus::Submitted)?;
                task.clear_ownership();
                released.push(task.task_id.clone());
            }
        }
        Ok(released)
    }

    async fn find_dependents(
        &self,
        session_id: &SessionId,
        result_ids: &BTreeSet<ResultId>,
    ) -> Result<Vec<TaskId>> {
        let result = {
            let tasks = self.tasks.read().map_err(poison_err)?;
            tasks
                .values()
                .filter(|t| {
                    t.session_id == *session_id
                        && matches!(t.status, TaskStatus::Creating | TaskStatus::Pending)
                        && !t.remaining_data_dependencies.is_disjoint(result_ids)
                })
                .map(|t| t.task_id.clone())
                .collect()
        };
        Ok(result)
    }

    async fn find_created_by(
        &self,
        session_id: &SessionId,
        creator: &TaskId,
    ) -> Result<Vec<TaskData>> {
        let creator = creator.to_string();
        let result = {
            let tasks = self.tasks.read().map_err(poison_err)?;
            tasks
                .values()
                .filter(|t| t.session_id == *session_id && t.created_by == creator)
                .cloned()
                .collect()
        };
        Ok(result)
    }

    async fn list_by_status(
        &self,
        session_id: &SessionId,
        status: TaskStatus,
    ) -> Result<Vec<TaskData>> {
        let result = {
            let tasks = self.tasks.read().map_err(poison_err)?;
            tasks
                .values()
                .filter(|t| t.session_id == *session_id && t.status == status)
                .cloned()
                .collect()
        };
        Ok(result)
    }
}

/// In-memory result store for testing.
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    results: RwLock<HashMap<ResultId, ResultData>>,
}

impl InMemoryResultStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn create(&self, result: ResultData) -> Result<bool> {
        let mut results = self.results.write().map_err(poison_err)?;
        if results.contains_key(&result.result_id) {
            return Ok(false);
        }
        results.insert(result.result_id, result);
        Ok(true)
    }

    async fn get(&self, result_id: &ResultId) -> Result<Option<ResultData>> {
        let found = {
            let results = self.results.read().map_err(poison_err)?;
            results.get(result_id).cloned()
        };
        Ok(found)
    }

    async fn get_many(&self, result_ids: &[ResultId]) -> Result<Vec<ResultData>> {
        let found = {
            let results = self.results.read().map_err(poison_err)?;
            result_ids
                .iter()
                .filter_map(|id| results.get(id).cloned())
                .collect()
        };
        Ok(found)
    }

    async fn complete(
        &self,
        result_id: &ResultId,
        completed_by: &TaskId,
        size: i64,
        opaque_id: Option<String>,
    ) -> Result<UpdateOutcome<ResultStatus>> {
        let mut results = self.results.write().map_err(poison_err)?;

        let Some(result) = results.get_mut(result_id) else {
            return Ok(UpdateOutcome::NotFound);
        };

        if result.status != ResultStatus::Created {
            return Ok(UpdateOutcome::Mismatch {
                actual: result.status,
            });
        }

        result.status = ResultStatus::Completed;
        result.completed_by = Some(completed_by.clone());
        result.size = size;
        result.opaque_id = opaque_id;
        result.completed_at = Some(Utc::now());
        Ok(UpdateOutcome::Applied)
    }

    async fn abort_if_incomplete(&self, result_ids: &[ResultId]) -> Result<usize> {
        let mut results = self.results.write().map_err(poison_err)?;

        let mut aborted = 0;
        for id in result_ids {
            if let Some(result) = results.get_mut(id) {
                if result.status == ResultStatus::Created {
                    result.status = ResultStatus::Aborted;
                    aborted += 1;
                }
            }
        }
        Ok(aborted)
    }

    async fn transfer_ownership(
        &self,
        session_id: &SessionId,
        from: &TaskId,
        to: &TaskId,
    ) -> Result<usize> {
        let mut results = self.results.write().map_err(poison_err)?;

        let mut moved = 0;
        for result in results.values_mut() {
            if result.session_id == *session_id && result.owner_task_id == *from {
                result.owner_task_id = to.clone();
                moved += 1;
            }
        }
        Ok(moved)
    }

    async fn find_created_by(
        &self,
        session_id: &SessionId,
        creator: &str,
    ) -> Result<Vec<ResultData>> {
        let found = {
            let results = self.results.read().map_err(poison_err)?;
            results
                .values()
                .filter(|r| r.session_id == *session_id && r.created_by == creator)
                .cloned()
                .collect()
        };
        Ok(found)
    }

    async fn find_owned_by(
        &self,
        session_id: &SessionId,
        owner: &TaskId,
    ) -> Result<Vec<ResultData>> {
        let found = {
            let results = self.results.read().map_err(poison_err)?;
            results
                .values()
                .filter(|r| r.session_id == *session_id && r.owner_task_id == *owner)
                .cloned()
                .collect()
        };
        Ok(found)
    }
}

/// In-memory session store for testing.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionData>>,
}

impl InMemorySessionStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self, session: SessionData) -> Result<bool> {
        let mut sessions = self.sessions.write().map_err(poison_err)?;
        if sessions.contains_key(&session.session_id) {
            return Ok(false);
        }
        sessions.insert(session.session_id, session);
        Ok(true)
    }

    async fn get(&self, session_id: &SessionId) -> Result<Option<SessionData>> {
        let found = {
            let sessions = self.sessions.read().map_err(poison_err)?;
            sessions.get(session_id).cloned()
        };
        Ok(found)
    }

    async fn cas_status(
        &self,
        session_id: &SessionId,
        expected: &[SessionStatus],
        target: SessionStatus,
    ) -> Result<UpdateOutcome<SessionStatus>> {
        let mut sessions = self.sessions.write().map_err(poison_err)?;

        let Some(session) = sessions.get_mut(session_id) else {
            return Ok(UpdateOutcome::NotFound);
        };

        if !expected.contains(&session.status) {
            return Ok(UpdateOutcome::Mismatch {
                actual: session.status,
            });
        }

        if !session.status.can_transition_to(target) {
            return Err(Error::InvalidStateTransition {
                from: session.status.to_string(),
                to: target.to_string(),
                reason: "illegal session transition".to_string(),
            });
        }

        session.status = target;
        Ok(UpdateOutcome::Applied)
    }
}
