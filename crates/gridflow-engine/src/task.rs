//! Task state and lifecycle data model.
//!
//! This module provides:
//! - `TaskStatus`: The state machine for one execution attempt
//! - `TaskData`: The persisted task row
//! - `TaskOptions`: Priority, partition, and retry budget configuration
//! - `TaskOutput`: Terminal success/error payload
//! - `TaskCreationRequest`: The ephemeral input to two-phase creation

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gridflow_core::{ResultId, SessionId, TaskId};

use crate::error::{Error, Result};

/// Default retry budget for a task.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default maximum execution duration (1 hour).
const DEFAULT_MAX_DURATION_SECS: u64 = 3600;

/// Task status state machine.
///
/// Statuses follow a directed graph:
/// ```text
/// ┌──────────┐ finalize  ┌─────────┐ deps resolved ┌───────────┐ acquired ┌────────────┐
/// │ CREATING │──────────►│ PENDING │──────────────►│ SUBMITTED │─────────►│ PROCESSING │
/// └──────────┘           └─────────┘               └───────────┘          └────────────┘
///      │ finalize, no deps                               ▲                      │
///      └───────────────────────────────────────────────┘ │          ┌──────────┼──────────┐
///                                        resume rewinds ─┘          ▼          ▼          ▼
///                                                             ┌───────────┐ ┌───────┐ ┌─────────┐
///                                                             │ COMPLETED │ │ ERROR │ │ RETRIED │
///                                                             └───────────┘ └───────┘ └─────────┘
/// ```
/// Cancellation can interrupt any non-terminal status via `Cancelling`.
/// The `Processing -> Submitted` edge exists only for the session resume
/// gate, which treats an in-flight acquisition abandoned across a pause as
/// never having happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Phase-1 row exists; dependency state not yet finalized.
    Creating,
    /// Finalized, blocked on unresolved data dependencies.
    Pending,
    /// All dependencies resolved; eligible for (and pushed to) the queue.
    Submitted,
    /// Acquired by a worker pod; ownership fields are set.
    Processing,
    /// Finished successfully.
    Completed,
    /// Finished unsuccessfully with retries exhausted (or not retried).
    Error,
    /// Superseded by a retry successor.
    Retried,
    /// Cancellation requested.
    Cancelling,
    /// Cancellation applied.
    Cancelled,
}

impl TaskStatus {
    /// Returns true if this is a terminal status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Error | Self::Retried | Self::Cancelled
        )
    }

    /// Returns true if the task has been finalized (left `Creating`).
    #[must_use]
    pub const fn is_finalized(&self) -> bool {
        !matches!(self, Self::Creating)
    }

    /// Returns true if the transition from self to target is valid.
    #[must_use]
    pub fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::Creating => matches!(target, Self::Pending | Self::Submitted | Self::Cancelling),
            Self::Pending => matches!(target, Self::Submitted | Self::Cancelling),
            Self::Submitted => matches!(target, Self::Processing | Self::Cancelling),
            Self::Processing => matches!(
                target,
                Self::Completed | Self::Error | Self::Retried | Self::Submitted | Self::Cancelling
            ),
            Self::Cancelling => matches!(target, Self::Cancelled),
            Self::Completed | Self::Error | Self::Retried | Self::Cancelled => false,
        }
    }

    /// Returns all valid target statuses from the current status.
    #[must_use]
    pub fn valid_transitions(&self) -> Vec<Self> {
        match self {
            Self::Creating => vec![Self::Pending, Self::Submitted, Self::Cancelling],
            Self::Pending => vec![Self::Submitted, Self::Cancelling],
            Self::Submitted => vec![Self::Processing, Self::Cancelling],
            Self::Processing => vec![
                Self::Completed,
                Self::Error,
                Self::Retried,
                Self::Submitted,
                Self::Cancelling,
            ],
            Self::Cancelling => vec![Self::Cancelled],
            Self::Completed | Self::Error | Self::Retried | Self::Cancelled => vec![],
        }
    }

    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Pending => "pending",
            Self::Submitted => "submitted",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Retried => "retried",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
        }
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::Creating
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Creating => write!(f, "CREATING"),
            Self::Pending => write!(f, "PENDING"),
            Self::Submitted => write!(f, "SUBMITTED"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Error => write!(f, "ERROR"),
            Self::Retried => write!(f, "RETRIED"),
            Self::Cancelling => write!(f, "CANCELLING"),
            Self::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Execution options attached to a task (defaulted from its session).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOptions {
    /// Execution priority (lower = higher priority).
    #[serde(default)]
    pub priority: i32,
    /// Partition the task is routed to.
    pub partition_id: String,
    /// Maximum number of retries before the task ends in `Error`.
    #[serde(default)]
    pub max_retries: u32,
    /// Maximum execution duration.
    #[serde(with = "humantime_serde", default = "default_max_duration")]
    pub max_duration: Duration,
}

fn default_max_duration() -> Duration {
    Duration::from_secs(DEFAULT_MAX_DURATION_SECS)
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            partition_id: "default".to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
            max_duration: default_max_duration(),
        }
    }
}

impl TaskOptions {
    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the partition.
    #[must_use]
    pub fn with_partition(mut self, partition_id: impl Into<String>) -> Self {
        self.partition_id = partition_id.into();
        self
    }

    /// Sets the retry budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }
}

/// Terminal output of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum TaskOutput {
    /// The task finished successfully.
    Success,
    /// The task finished unsuccessfully.
    Error {
        /// Human-readable failure reason.
        reason: String,
    },
}

impl TaskOutput {
    /// Creates an error output with the given reason.
    #[must_use]
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }
}

/// Request submitted to the two-phase creation API.
///
/// Ephemeral: becomes a `TaskData` row only after phase 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreationRequest {
    /// Identifier the task will carry.
    pub task_id: TaskId,
    /// Result holding the task's payload.
    pub payload_id: ResultId,
    /// Options override (session defaults apply when absent).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<TaskOptions>,
    /// Results this task is responsible for producing.
    #[serde(default)]
    pub expected_output_keys: Vec<ResultId>,
    /// Results this task requires as `Completed` before it may run.
    #[serde(default)]
    pub data_dependencies: BTreeSet<ResultId>,
}

impl TaskCreationRequest {
    /// Creates a new request with no outputs or dependencies.
    #[must_use]
    pub fn new(task_id: TaskId, payload_id: ResultId) -> Self {
        Self {
            task_id,
            payload_id,
            options: None,
            expected_output_keys: Vec::new(),
            data_dependencies: BTreeSet::new(),
        }
    }

    /// Sets the task options.
    #[must_use]
    pub fn with_options(mut self, options: TaskOptions) -> Self {
        self.options = Some(options);
        self
    }

    /// Sets the expected output keys.
    #[must_use]
    pub fn with_expected_output_keys(mut self, keys: Vec<ResultId>) -> Self {
        self.expected_output_keys = keys;
        self
    }

    /// Sets the data dependencies.
    #[must_use]
    pub fn with_data_dependencies(mut self, deps: impl IntoIterator<Item = ResultId>) -> Self {
        self.data_dependencies = deps.into_iter().collect();
        self
    }
}

/// Persisted task row: one per execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskData {
    /// Unique identifier of this attempt.
    pub task_id: TaskId,
    /// Session this task belongs to.
    pub session_id: SessionId,
    /// Parent task id or session id that submitted this task.
    pub created_by: String,
    /// Result holding the task's payload.
    pub payload_id: ResultId,
    /// Lineage: ancestor task ids (immutable).
    #[serde(default)]
    pub parent_task_ids: Vec<TaskId>,
    /// Full set of result ids the task requires (immutable).
    #[serde(default)]
    pub data_dependencies: BTreeSet<ResultId>,
    /// Subset of `data_dependencies` still unresolved; empty means ready.
    #[serde(default)]
    pub remaining_data_dependencies: BTreeSet<ResultId>,
    /// Results this task is responsible for producing.
    #[serde(default)]
    pub expected_output_keys: Vec<ResultId>,
    /// Predecessor attempts this task retries.
    #[serde(default)]
    pub retry_of_ids: Vec<TaskId>,
    /// Current status.
    pub status: TaskStatus,
    /// Execution options.
    pub options: TaskOptions,
    /// Terminal output, set on completion or failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<TaskOutput>,
    /// Pod that owns the task while `Processing`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_pod_id: Option<String>,
    /// Owning pod's name while `Processing`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_pod_name: Option<String>,
    /// When the owning pod acquired the task.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquisition_date: Option<DateTime<Utc>>,
    /// When the owning pod received the payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reception_date: Option<DateTime<Utc>>,
    /// When this row was created.
    pub created_at: DateTime<Utc>,
    /// When this attempt reached a terminal status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl TaskData {
    /// Builds the phase-1 (`Creating`) row for a creation request.
    ///
    /// The remaining-dependency set starts as the full dependency set;
    /// finalize and resolvers only ever shrink it.
    #[must_use]
    pub fn from_request(
        request: &TaskCreationRequest,
        session_id: SessionId,
        created_by: impl Into<String>,
        parent_task_ids: Vec<TaskId>,
        default_options: &TaskOptions,
    ) -> Self {
        Self {
            task_id: request.task_id.clone(),
            session_id,
            created_by: created_by.into(),
            payload_id: request.payload_id,
            parent_task_ids,
            data_dependencies: request.data_dependencies.clone(),
            remaining_data_dependencies: request.data_dependencies.clone(),
            expected_output_keys: request.expected_output_keys.clone(),
            retry_of_ids: Vec::new(),
            status: TaskStatus::Creating,
            options: request
                .options
                .clone()
                .unwrap_or_else(|| default_options.clone()),
            output: None,
            owner_pod_id: None,
            owner_pod_name: None,
            acquisition_date: None,
            reception_date: None,
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Builds the successor row for a retry of this task.
    ///
    /// The successor is born `Submitted`: its predecessor already had every
    /// dependency resolved when it was first pushed, so the remaining set is
    /// empty by construction.
    #[must_use]
    pub fn retry_successor(&self) -> Self {
        let successor_id = self.task_id.retried(self.task_id.retry_index() + 1);
        let mut retry_of_ids = self.retry_of_ids.clone();
        retry_of_ids.push(self.task_id.clone());

        Self {
            task_id: successor_id,
            session_id: self.session_id,
            created_by: self.created_by.clone(),
            payload_id: self.payload_id,
            parent_task_ids: self.parent_task_ids.clone(),
            data_dependencies: self.data_dependencies.clone(),
            remaining_data_dependencies: BTreeSet::new(),
            expected_output_keys: self.expected_output_keys.clone(),
            retry_of_ids,
            status: TaskStatus::Submitted,
            options: self.options.clone(),
            output: None,
            owner_pod_id: None,
            owner_pod_name: None,
            acquisition_date: None,
            reception_date: None,
            created_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Returns true if the retry budget is exhausted.
    #[must_use]
    pub fn retries_exhausted(&self) -> bool {
        self.task_id.retry_index() >= self.options.max_retries
    }

    /// Clears worker ownership fields.
    pub fn clear_ownership(&mut self) {
        self.owner_pod_id = None;
        self.owner_pod_name = None;
        self.acquisition_date = None;
        self.reception_date = None;
    }

    /// Transitions to a new status, validating against the state machine.
    ///
    /// # Errors
    ///
    /// Returns an error if the transition is invalid.
    pub fn transition_to(&mut self, target: TaskStatus) -> Result<()> {
        if !self.status.can_transition_to(target) {
            return Err(Error::InvalidStateTransition {
                from: self.status.to_string(),
                to: target.to_string(),
                reason: format!(
                    "valid transitions from {}: {:?}",
                    self.status,
                    self.status.valid_transitions()
                ),
            });
        }

        if target.is_terminal() {
            self.ended_at = Some(Utc::now());
        }
        self.status = target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creating_task() -> TaskData {
        let request = TaskCreationRequest::new(TaskId::generate(), ResultId::generate());
        TaskData::from_request(
            &request,
            SessionId::generate(),
            "session",
            vec![],
            &TaskOptions::default(),
        )
    }

    #[test]
    fn status_happy_path() {
        let status = TaskStatus::Creating;
        assert!(status.can_transition_to(TaskStatus::Pending));
        assert!(status.can_transition_to(TaskStatus::Submitted));
        assert!(!status.can_transition_to(TaskStatus::Processing));

        let status = TaskStatus::Pending;
        assert!(status.can_transition_to(TaskStatus::Submitted));
        assert!(!status.can_transition_to(TaskStatus::Completed));

        let status = TaskStatus::Submitted;
        assert!(status.can_transition_to(TaskStatus::Processing));

        let status = TaskStatus::Processing;
        assert!(status.can_transition_to(TaskStatus::Completed));
        assert!(status.can_transition_to(TaskStatus::Error));
        assert!(status.can_transition_to(TaskStatus::Retried));
    }

    #[test]
    fn status_terminal_states_are_closed() {
        for terminal in [
            TaskStatus::Completed,
            TaskStatus::Error,
            TaskStatus::Retried,
            TaskStatus::Cancelled,
        ] {
            assert!(terminal.is_terminal());
            assert!(terminal.valid_transitions().is_empty());
            assert!(!terminal.can_transition_to(TaskStatus::Pending));
        }
    }

    #[test]
    fn status_never_moves_backward_to_pending() {
        // Monotonicity along the documented machine: nothing re-enters
        // Creating or Pending.
        for status in [
            TaskStatus::Submitted,
            TaskStatus::Processing,
            TaskStatus::Completed,
        ] {
            assert!(!status.can_transition_to(TaskStatus::Creating));
            assert!(!status.can_transition_to(TaskStatus::Pending));
        }
    }

    #[test]
    fn resume_rewind_edge_is_legal() {
        assert!(TaskStatus::Processing.can_transition_to(TaskStatus::Submitted));
        assert!(!TaskStatus::Submitted.can_transition_to(TaskStatus::Pending));
    }

    #[test]
    fn from_request_seeds_remaining_with_full_dependency_set() {
        let deps: BTreeSet<ResultId> = [ResultId::generate(), ResultId::generate()].into();
        let request = TaskCreationRequest::new(TaskId::generate(), ResultId::generate())
            .with_data_dependencies(deps.clone());
        let task = TaskData::from_request(
            &request,
            SessionId::generate(),
            "session",
            vec![],
            &TaskOptions::default(),
        );

        assert_eq!(task.status, TaskStatus::Creating);
        assert_eq!(task.remaining_data_dependencies, deps);
        assert_eq!(task.data_dependencies, deps);
    }

    #[test]
    fn retry_successor_is_deterministic_and_submitted() {
        let mut task = creating_task();
        task.status = TaskStatus::Processing;

        let successor = task.retry_successor();
        assert_eq!(
            successor.task_id,
            task.task_id.retried(1),
            "successor id must be derived, not random"
        );
        assert_eq!(successor.status, TaskStatus::Submitted);
        assert!(successor.remaining_data_dependencies.is_empty());
        assert_eq!(successor.retry_of_ids, vec![task.task_id.clone()]);

        // Retrying the successor derives attempt 2 from the same root.
        let third = successor.retry_successor();
        assert_eq!(third.task_id, task.task_id.retried(2));
        assert_eq!(
            third.retry_of_ids,
            vec![task.task_id.clone(), successor.task_id]
        );
    }

    #[test]
    fn retries_exhausted_uses_retry_index() {
        let mut task = creating_task();
        task.options.max_retries = 2;
        assert!(!task.retries_exhausted());

        task.task_id = task.task_id.retried(2);
        assert!(task.retries_exhausted());
    }

    #[test]
    fn transition_to_rejects_invalid_and_sets_ended_at() {
        let mut task = creating_task();
        assert!(task.transition_to(TaskStatus::Completed).is_err());

        task.transition_to(TaskStatus::Pending).unwrap();
        task.transition_to(TaskStatus::Submitted).unwrap();
        task.transition_to(TaskStatus::Processing).unwrap();
        assert!(task.ended_at.is_none());

        task.transition_to(TaskStatus::Completed).unwrap();
        assert!(task.ended_at.is_some());
    }

    #[test]
    fn task_data_serde_roundtrip() {
        let task = creating_task();
        let json = serde_json::to_string(&task).unwrap();
        let parsed: TaskData = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.task_id, task.task_id);
        assert_eq!(parsed.status, TaskStatus::Creating);
    }
}
