//! Result data model.
//!
//! A result is a named artifact produced by one task and consumed by its
//! dependents. Results are created alongside their owning task's creation
//! request and are only consumable once `Completed`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gridflow_core::{ResultId, SessionId, TaskId};

/// Result status machine.
///
/// `Created -> Completed` when the owning task produces the payload;
/// `Created -> Aborted` when the owning task's creation batch is discarded
/// or rolled back. Both end states are closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    /// Declared; payload not yet produced.
    Created,
    /// Payload produced; consumable by dependents.
    Completed,
    /// Discarded before completion.
    Aborted,
}

impl ResultStatus {
    /// Returns true if dependents may consume the result.
    #[must_use]
    pub const fn is_consumable(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Returns true if the transition from self to target is valid.
    #[must_use]
    pub const fn can_transition_to(&self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Created, Self::Completed | Self::Aborted)
        )
    }

    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
        }
    }
}

impl Default for ResultStatus {
    fn default() -> Self {
        Self::Created
    }
}

impl std::fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "CREATED"),
            Self::Completed => write!(f, "COMPLETED"),
            Self::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Persisted result row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultData {
    /// Unique identifier.
    pub result_id: ResultId,
    /// Session this result belongs to.
    pub session_id: SessionId,
    /// Human-readable name.
    pub name: String,
    /// Task id (or session id) that declared the result.
    pub created_by: String,
    /// Task currently responsible for producing the result.
    ///
    /// Ownership moves to a retry successor when the owner is retried.
    pub owner_task_id: TaskId,
    /// Task that actually completed the result, once `Completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_by: Option<TaskId>,
    /// Current status.
    pub status: ResultStatus,
    /// Payload size in bytes.
    #[serde(default)]
    pub size: i64,
    /// Opaque reference into object storage.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opaque_id: Option<String>,
    /// Inline payload for small values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    /// When this row was created.
    pub created_at: DateTime<Utc>,
    /// When the result was completed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ResultData {
    /// Builds a `Created` row declared by (and owned by) the given task.
    #[must_use]
    pub fn declared(
        result_id: ResultId,
        session_id: SessionId,
        name: impl Into<String>,
        owner_task_id: TaskId,
    ) -> Self {
        Self {
            result_id,
            session_id,
            name: name.into(),
            created_by: owner_task_id.to_string(),
            owner_task_id,
            completed_by: None,
            status: ResultStatus::Created,
            size: 0,
            opaque_id: None,
            data: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_is_not_consumable() {
        assert!(!ResultStatus::Created.is_consumable());
        assert!(ResultStatus::Completed.is_consumable());
        assert!(!ResultStatus::Aborted.is_consumable());
    }

    #[test]
    fn status_transitions() {
        assert!(ResultStatus::Created.can_transition_to(ResultStatus::Completed));
        assert!(ResultStatus::Created.can_transition_to(ResultStatus::Aborted));
        assert!(!ResultStatus::Completed.can_transition_to(ResultStatus::Aborted));
        assert!(!ResultStatus::Aborted.can_transition_to(ResultStatus::Completed));
    }

    #[test]
    fn declared_row_attributes_owner() {
        let owner = TaskId::generate();
        let row = ResultData::declared(
            ResultId::generate(),
            SessionId::generate(),
            "output-0",
            owner.clone(),
        );
        assert_eq!(row.status, ResultStatus::Created);
        assert_eq!(row.owner_task_id, owner);
        assert_eq!(row.created_by, owner.to_string());
        assert!(row.completed_by.is_none());
    }
}
