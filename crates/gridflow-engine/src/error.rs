//! Error types for the orchestration domain.

use gridflow_core::{ResultId, SessionId, TaskId};

/// The result type used throughout gridflow-engine.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in orchestration operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A task was not found.
    #[error("task not found: {task_id}")]
    TaskNotFound {
        /// The task ID that was not found.
        task_id: TaskId,
    },

    /// A result was not found.
    #[error("result not found: {result_id}")]
    ResultNotFound {
        /// The result ID that was not found.
        result_id: ResultId,
    },

    /// A session was not found.
    #[error("session not found: {session_id}")]
    SessionNotFound {
        /// The session ID that was not found.
        session_id: SessionId,
    },

    /// An invalid state transition was attempted.
    #[error("invalid state transition: {from} -> {to} ({reason})")]
    InvalidStateTransition {
        /// The current state.
        from: String,
        /// The attempted target state.
        to: String,
        /// The reason the transition is invalid.
        reason: String,
    },

    /// A precondition for the operation was not met.
    #[error("precondition failed: {message}")]
    PreconditionFailed {
        /// Description of the failed precondition.
        message: String,
    },

    /// A storage operation failed.
    #[error("storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A queue push failed.
    #[error("queue error: {message}")]
    Queue {
        /// Description of the queue failure.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A serialization error occurred.
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of the serialization failure.
        message: String,
    },

    /// An error from gridflow-core.
    #[error("core error: {0}")]
    Core(#[from] gridflow_core::Error),
}

impl Error {
    /// Creates a new storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new storage error with a source.
    #[must_use]
    pub fn storage_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Storage {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Creates a new queue error.
    #[must_use]
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a new precondition-failed error.
    #[must_use]
    pub fn precondition(message: impl Into<String>) -> Self {
        Self::PreconditionFailed {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as StdError;

    #[test]
    fn task_not_found_display() {
        let err = Error::TaskNotFound {
            task_id: TaskId::generate(),
        };
        assert!(err.to_string().contains("task not found"));
    }

    #[test]
    fn state_transition_error_display() {
        let err = Error::InvalidStateTransition {
            from: "COMPLETED".into(),
            to: "PENDING".into(),
            reason: "terminal states are closed".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("COMPLETED"));
        assert!(msg.contains("PENDING"));
        assert!(msg.contains("terminal states"));
    }

    #[test]
    fn storage_error_with_source() {
        let source = std::io::Error::new(std::io::ErrorKind::Other, "connection reset");
        let err = Error::storage_with_source("failed to update task row", source);
        assert!(err.to_string().contains("storage error"));
        assert!(StdError::source(&err).is_some());
    }
}
