//! In-memory push queue for testing.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use ulid::Ulid;

use gridflow_core::TaskId;

use super::{PushMessage, PushQueue};
use crate::error::{Error, Result};

fn poison_err<T>(_: PoisonError<T>) -> Error {
    Error::queue("lock poisoned")
}

/// A pushed message together with its transport-level id.
#[derive(Debug, Clone)]
pub struct QueuedEntry {
    /// Transport message id.
    pub message_id: Ulid,
    /// The announced task.
    pub message: PushMessage,
}

/// In-memory push queue for testing.
///
/// Records every pushed message in order without consuming anything, so
/// tests can assert on exactly what was announced and how many times.
#[derive(Debug, Default)]
pub struct InMemoryPushQueue {
    entries: RwLock<Vec<QueuedEntry>>,
}

impl InMemoryPushQueue {
    /// Creates a new empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the task ids of all pushed messages, in push order.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn pushed_task_ids(&self) -> Result<Vec<TaskId>> {
        let ids = {
            let entries = self.entries.read().map_err(poison_err)?;
            entries.iter().map(|e| e.message.task_id.clone()).collect()
        };
        Ok(ids)
    }

    /// Returns how many messages were pushed for one task.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn push_count_for(&self, task_id: &TaskId) -> Result<usize> {
        let count = {
            let entries = self.entries.read().map_err(poison_err)?;
            entries
                .iter()
                .filter(|e| e.message.task_id == *task_id)
                .count()
        };
        Ok(count)
    }

    /// Returns the total number of pushed messages.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> Result<usize> {
        let len = {
            let entries = self.entries.read().map_err(poison_err)?;
            entries.len()
        };
        Ok(len)
    }

    /// Returns `true` if nothing was pushed yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

#[async_trait]
impl PushQueue for InMemoryPushQueue {
    async fn push(&self, message: PushMessage) -> Result<()> {
        let mut entries = self.entries.write().map_err(poison_err)?;
        entries.push(QueuedEntry {
            message_id: Ulid::new(),
            message,
        });
        Ok(())
    }

    fn queue_name(&self) -> &str {
        "memory"
    }
}
