//! Strongly-typed identifiers for gridflow entities.
//!
//! All identifiers are:
//! - **Strongly typed**: Prevents mixing up different ID types at compile time
//! - **Globally unique**: No coordination required for generation
//!
//! Session and result IDs are ULID-backed and lexicographically sortable by
//! creation time. Task IDs are string-backed because their format is part of
//! the retry protocol: the successor of a retried task carries a
//! deterministic `{root}###{attempt}` suffix so that concurrent retries of
//! the same task converge on the same successor identifier.
//!
//! # Example
//!
//! ```rust
//! use gridflow_core::id::{SessionId, TaskId};
//!
//! let session = SessionId::generate();
//! let task = TaskId::generate();
//!
//! let first_retry = task.retried(1);
//! let second_retry = first_retry.retried(2);
//! assert_eq!(second_retry.root(), task.as_str());
//! assert_eq!(second_retry.retry_index(), 2);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

use crate::error::{Error, Result};

/// Separator between a task ID's root and its retry index.
const RETRY_SEPARATOR: &str = "###";

/// A unique identifier for a session.
///
/// Sessions are the logical grouping of tasks sharing default options and a
/// pause/cancel scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Ulid);

impl SessionId {
    /// Generates a new unique session ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Creates a session ID from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Returns the creation timestamp encoded in the ID.
    #[must_use]
    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        let ms = self.0.timestamp_ms();
        chrono::DateTime::from_timestamp_millis(i64::try_from(ms).unwrap_or_default())
            .unwrap_or_else(chrono::Utc::now)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SessionId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| Error::InvalidId {
                message: format!("invalid session ID '{s}': {e}"),
            })
    }
}

/// A unique identifier for a result.
///
/// Results are the named data artifacts produced by tasks and consumed by
/// their dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultId(Ulid);

impl ResultId {
    /// Generates a new unique result ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new())
    }

    /// Creates a result ID from a raw ULID.
    #[must_use]
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// Returns the underlying ULID.
    #[must_use]
    pub const fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Returns the creation timestamp encoded in the ID.
    #[must_use]
    pub fn created_at(&self) -> chrono::DateTime<chrono::Utc> {
        let ms = self.0.timestamp_ms();
        chrono::DateTime::from_timestamp_millis(i64::try_from(ms).unwrap_or_default())
            .unwrap_or_else(chrono::Utc::now)
    }
}

impl fmt::Display for ResultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResultId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Ulid::from_string(s)
            .map(Self)
            .map_err(|e| Error::InvalidId {
                message: format!("invalid result ID '{s}': {e}"),
            })
    }
}

/// A unique identifier for one execution attempt of a task.
///
/// An original task gets a generated (ULID-string) identifier. A retry
/// derives its identifier from the original as `{root}###{attempt}` with a
/// 1-based attempt index. The derivation is a pure function of the
/// predecessor ID, which is what lets concurrent retries of the same crashed
/// task converge on a single successor row instead of creating duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Generates a new unique task ID.
    #[must_use]
    pub fn generate() -> Self {
        Self(Ulid::new().to_string())
    }

    /// Returns the ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the root ID with any retry suffix stripped.
    ///
    /// For an original task this is the full ID.
    #[must_use]
    pub fn root(&self) -> &str {
        self.0
            .split_once(RETRY_SEPARATOR)
            .map_or(self.0.as_str(), |(root, _)| root)
    }

    /// Returns the retry index encoded in the ID (0 for an original task).
    #[must_use]
    pub fn retry_index(&self) -> u32 {
        self.0
            .split_once(RETRY_SEPARATOR)
            .and_then(|(_, n)| n.parse().ok())
            .unwrap_or(0)
    }

    /// Derives the deterministic successor ID for the given 1-based attempt.
    ///
    /// The derivation always starts from the root, so retrying a retry does
    /// not stack suffixes: `abc###1` retried as attempt 2 yields `abc###2`.
    #[must_use]
    pub fn retried(&self, attempt: u32) -> Self {
        Self(format!("{}{RETRY_SEPARATOR}{attempt}", self.root()))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TaskId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(Error::InvalidId {
                message: "task ID must not be empty".into(),
            });
        }
        if let Some((root, suffix)) = s.split_once(RETRY_SEPARATOR) {
            if root.is_empty() || suffix.parse::<u32>().is_err() {
                return Err(Error::InvalidId {
                    message: format!("invalid task ID '{s}': malformed retry suffix"),
                });
            }
        }
        Ok(Self(s.to_string()))
    }
}

impl From<TaskId> for String {
    fn from(id: TaskId) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_roundtrip() {
        let id = SessionId::generate();
        let s = id.to_string();
        let parsed: SessionId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn result_id_roundtrip() {
        let id = ResultId::generate();
        let s = id.to_string();
        let parsed: ResultId = s.parse().unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn session_id_rejects_garbage() {
        let result: Result<SessionId> = "not-a-ulid!".parse();
        assert!(result.is_err());
    }

    #[test]
    fn task_id_retry_derivation_is_deterministic() {
        let id = TaskId::generate();
        assert_eq!(id.retried(1), id.retried(1));
        assert_ne!(id.retried(1), id.retried(2));
    }

    #[test]
    fn task_id_retry_does_not_stack_suffixes() {
        let id: TaskId = "abc".parse().unwrap();
        let first = id.retried(1);
        assert_eq!(first.as_str(), "abc###1");
        let second = first.retried(2);
        assert_eq!(second.as_str(), "abc###2");
        assert_eq!(second.root(), "abc");
    }

    #[test]
    fn task_id_retry_index() {
        let id: TaskId = "abc".parse().unwrap();
        assert_eq!(id.retry_index(), 0);
        assert_eq!(id.retried(3).retry_index(), 3);
    }

    #[test]
    fn task_id_rejects_malformed_suffix() {
        let result: Result<TaskId> = "abc###x".parse();
        assert!(result.is_err());

        let result: Result<TaskId> = "".parse();
        assert!(result.is_err());
    }

    #[test]
    fn task_id_serde_is_transparent() {
        let id: TaskId = "abc###2".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"abc###2\"");
    }
}
