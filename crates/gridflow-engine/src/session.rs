//! Session data model.
//!
//! A session groups tasks sharing default options and a pause/cancel scope.
//! Its status is the gate consulted before every queue push: while `Paused`,
//! `Submitted` transitions still happen but the corresponding pushes are
//! withheld until resume.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gridflow_core::SessionId;

use crate::task::TaskOptions;

/// Session status machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    /// Accepting submissions; pushes flow to the queue.
    Running,
    /// Pushes withheld; submissions still accepted.
    Paused,
    /// Cancelled; tasks are swept to `Cancelled`.
    Cancelled,
    /// Closed to further submissions.
    Closed,
}

impl SessionStatus {
    /// Returns true if this is a terminal status.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Closed)
    }

    /// Returns true if the transition from self to target is valid.
    #[must_use]
    pub const fn can_transition_to(&self, target: Self) -> bool {
        match self {
            Self::Running => matches!(target, Self::Paused | Self::Cancelled | Self::Closed),
            Self::Paused => matches!(target, Self::Running | Self::Cancelled | Self::Closed),
            Self::Cancelled | Self::Closed => false,
        }
    }

    /// Returns a lowercase label suitable for metrics and logs.
    #[must_use]
    pub const fn as_label(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Closed => "closed",
        }
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Running
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "RUNNING"),
            Self::Paused => write!(f, "PAUSED"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Persisted session row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    /// Unique identifier.
    pub session_id: SessionId,
    /// Current status.
    pub status: SessionStatus,
    /// Partitions tasks of this session may be routed to.
    #[serde(default)]
    pub partition_ids: Vec<String>,
    /// Options applied to tasks that do not override them.
    pub default_task_options: TaskOptions,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    /// Creates a new `Running` session.
    #[must_use]
    pub fn new(partition_ids: Vec<String>, default_task_options: TaskOptions) -> Self {
        Self {
            session_id: SessionId::generate(),
            status: SessionStatus::Running,
            partition_ids,
            default_task_options,
            created_at: Utc::now(),
        }
    }

    /// Returns true if queue pushes for this session are withheld.
    #[must_use]
    pub const fn is_push_withheld(&self) -> bool {
        matches!(self.status, SessionStatus::Paused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pause_resume_cycle_is_legal() {
        assert!(SessionStatus::Running.can_transition_to(SessionStatus::Paused));
        assert!(SessionStatus::Paused.can_transition_to(SessionStatus::Running));
    }

    #[test]
    fn terminal_statuses_are_closed() {
        assert!(!SessionStatus::Cancelled.can_transition_to(SessionStatus::Running));
        assert!(!SessionStatus::Closed.can_transition_to(SessionStatus::Paused));
    }

    #[test]
    fn push_withheld_only_while_paused() {
        let mut session = SessionData::new(vec!["default".into()], TaskOptions::default());
        assert!(!session.is_push_withheld());

        session.status = SessionStatus::Paused;
        assert!(session.is_push_withheld());
    }
}
