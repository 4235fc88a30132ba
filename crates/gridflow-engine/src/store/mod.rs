//! Pluggable storage ports for orchestration state.
//!
//! The task, result, and session stores are the only shared mutable state in
//! the system. Workers and API handlers run in separate processes, so every
//! cross-task invariant is expressed through the conditional-update
//! primitives defined here, never through in-process locks.
//!
//! ## Design Principles
//!
//! - **CAS semantics**: Status transitions are compare-and-swap against the
//!   current status (or status plus remaining-set emptiness), applied as a
//!   single atomic storage operation
//! - **Narrow primitives**: Every lifecycle protocol is built from the same
//!   small vocabulary of conditional updates returning explicit outcomes
//! - **Testability**: In-memory implementations for testing; any database
//!   with per-row conditional updates can back a production implementation

pub mod memory;

use std::collections::BTreeSet;

use async_trait::async_trait;

use gridflow_core::{ResultId, SessionId, TaskId};

use crate::error::Result;
use crate::result::{ResultData, ResultStatus};
use crate::session::{SessionData, SessionStatus};
use crate::task::{TaskData, TaskOutput, TaskStatus};

/// Result of a compare-and-swap operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome<S> {
    /// The conditional update was applied.
    Applied,
    /// The row's current state didn't match any expected value.
    Mismatch {
        /// The actual state that was found.
        actual: S,
    },
    /// The row does not exist.
    NotFound,
}

impl<S> UpdateOutcome<S> {
    /// Returns true if the update was applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }

    /// Returns true if the row was not found.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Outcome of the atomic finalize primitive.
///
/// Finalize moves a `Creating` task to exactly one of `Submitted` (empty
/// remaining set) or `Pending` (non-empty) in a single conditional update.
/// A task already past `Creating` is reported, not re-evaluated: that is
/// what makes a second finalize call a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalizeOutcome {
    /// The task had no unresolved dependencies and is now `Submitted`.
    Submitted,
    /// The task is now `Pending` with this many unresolved dependencies.
    Pending {
        /// Size of the remaining-dependency set after finalize.
        remaining: usize,
    },
    /// The task was already finalized; nothing changed.
    AlreadyFinalized {
        /// The status that was found.
        status: TaskStatus,
    },
    /// The task does not exist.
    NotFound,
}

/// Outcome of the atomic dependency-discharge primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The removal emptied the set of a `Pending` task; it is now `Submitted`.
    Submitted,
    /// Dependencies were removed; this many remain.
    Remaining {
        /// Size of the remaining-dependency set after removal.
        remaining: usize,
    },
    /// The task is past `Pending`; the discharge was a no-op.
    NotEligible {
        /// The status that was found.
        status: TaskStatus,
    },
    /// The task does not exist.
    NotFound,
}

/// Storage port for task rows.
///
/// ## CAS Semantics
///
/// `cas_status`, `finalize_status`, and `discharge_dependencies` are the
/// core primitives for distributed correctness: each applies its whole
/// effect, or none of it, against the row's current state. Concurrent
/// callers racing on the same task observe exactly one winner.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Inserts a task row.
    ///
    /// Returns `false` without touching the row if the id already exists.
    /// This first-writer-wins behaviour is what retry convergence and
    /// repeatable phase-1 creation are built on.
    async fn create(&self, task: TaskData) -> Result<bool>;

    /// Gets a task by id.
    async fn get(&self, task_id: &TaskId) -> Result<Option<TaskData>>;

    /// Deletes a task row. Returns `false` if it did not exist.
    ///
    /// Callers only delete rows still in `Creating` (abandoned creation
    /// batches and crash-recovery rollback of unfinalized children), plus
    /// rolled-back children that never reached a worker.
    async fn delete(&self, task_id: &TaskId) -> Result<bool>;

    /// Atomically transitions status if the current status is one of
    /// `expected`.
    ///
    /// Leaving `Processing` clears ownership fields as part of the same
    /// update.
    ///
    /// # Errors
    ///
    /// Returns an error if the matched transition is illegal in the status
    /// machine.
    async fn cas_status(
        &self,
        task_id: &TaskId,
        expected: &[TaskStatus],
        target: TaskStatus,
    ) -> Result<UpdateOutcome<TaskStatus>>;

    /// Atomically finalizes a `Creating` task.
    ///
    /// If the remaining-dependency set is empty the task becomes
    /// `Submitted`, otherwise `Pending`. Any other current status yields
    /// `AlreadyFinalized` and leaves the row untouched.
    async fn finalize_status(&self, task_id: &TaskId) -> Result<FinalizeOutcome>;

    /// Atomically removes `completed` ids from the remaining-dependency set.
    ///
    /// Legal while the task is `Creating` or `Pending`; the shrink is
    /// monotonic and idempotent. When the removal empties the set of a
    /// `Pending` task, the same update promotes it to `Submitted` — the
    /// caller that observes `Submitted` owns the queue push.
    async fn discharge_dependencies(
        &self,
        task_id: &TaskId,
        completed: &BTreeSet<ResultId>,
    ) -> Result<ResolveOutcome>;

    /// Atomically moves the task to a terminal status with an output,
    /// guarded on `expected`.
    async fn finish(
        &self,
        task_id: &TaskId,
        expected: &[TaskStatus],
        target: TaskStatus,
        output: TaskOutput,
    ) -> Result<UpdateOutcome<TaskStatus>>;

    /// Acquires a `Submitted` task for a worker pod.
    ///
    /// Sets ownership fields and acquisition/reception dates as part of the
    /// `Submitted -> Processing` update.
    async fn acquire(
        &self,
        task_id: &TaskId,
        pod_id: &str,
        pod_name: &str,
    ) -> Result<UpdateOutcome<TaskStatus>>;

    /// Rewinds every `Processing` task of the session to `Submitted`,
    /// clearing ownership. Returns the affected task ids.
    ///
    /// Used by session resume to abandon acquisitions that were in flight
    /// across the pause.
    async fn release_abandoned(&self, session_id: &SessionId) -> Result<Vec<TaskId>>;

    /// Finds unfinalized or pending tasks whose remaining-dependency set
    /// intersects `result_ids`.
    async fn find_dependents(
        &self,
        session_id: &SessionId,
        result_ids: &BTreeSet<ResultId>,
    ) -> Result<Vec<TaskId>>;

    /// Finds tasks created by the given task (its direct children).
    async fn find_created_by(
        &self,
        session_id: &SessionId,
        creator: &TaskId,
    ) -> Result<Vec<TaskData>>;

    /// Lists all tasks of a session in the given status.
    async fn list_by_status(
        &self,
        session_id: &SessionId,
        status: TaskStatus,
    ) -> Result<Vec<TaskData>>;
}

/// Storage port for result rows.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Inserts a result row.
    ///
    /// Returns `false` without touching the row if the id already exists.
    async fn create(&self, result: ResultData) -> Result<bool>;

    /// Gets a result by id.
    async fn get(&self, result_id: &ResultId) -> Result<Option<ResultData>>;

    /// Gets the rows that exist among `result_ids` (missing ids are simply
    /// absent from the returned vector).
    async fn get_many(&self, result_ids: &[ResultId]) -> Result<Vec<ResultData>>;

    /// Atomically completes a `Created` result with its payload metadata.
    async fn complete(
        &self,
        result_id: &ResultId,
        completed_by: &TaskId,
        size: i64,
        opaque_id: Option<String>,
    ) -> Result<UpdateOutcome<ResultStatus>>;

    /// Marks every still-`Created` result among `result_ids` as `Aborted`.
    ///
    /// Completed results are never touched. Returns the number aborted.
    async fn abort_if_incomplete(&self, result_ids: &[ResultId]) -> Result<usize>;

    /// Moves ownership of every result owned by `from` to `to`.
    ///
    /// Returns the number of rows updated. Used when a retry successor
    /// reclaims its predecessor's declared outputs.
    async fn transfer_ownership(
        &self,
        session_id: &SessionId,
        from: &TaskId,
        to: &TaskId,
    ) -> Result<usize>;

    /// Finds results declared by the given creator (task or session id).
    async fn find_created_by(
        &self,
        session_id: &SessionId,
        creator: &str,
    ) -> Result<Vec<ResultData>>;

    /// Finds results currently owned by the given task.
    async fn find_owned_by(
        &self,
        session_id: &SessionId,
        owner: &TaskId,
    ) -> Result<Vec<ResultData>>;
}

/// Storage port for session rows.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts a session row. Returns `false` if the id already exists.
    async fn create(&self, session: SessionData) -> Result<bool>;

    /// Gets a session by id.
    async fn get(&self, session_id: &SessionId) -> Result<Option<SessionData>>;

    /// Atomically transitions session status if the current status is one
    /// of `expected`.
    async fn cas_status(
        &self,
        session_id: &SessionId,
        expected: &[SessionStatus],
        target: SessionStatus,
    ) -> Result<UpdateOutcome<SessionStatus>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_outcome_predicates() {
        let applied: UpdateOutcome<TaskStatus> = UpdateOutcome::Applied;
        assert!(applied.is_applied());
        assert!(!applied.is_not_found());

        let mismatch = UpdateOutcome::Mismatch {
            actual: TaskStatus::Pending,
        };
        assert!(!mismatch.is_applied());

        let missing: UpdateOutcome<TaskStatus> = UpdateOutcome::NotFound;
        assert!(missing.is_not_found());
    }
}
