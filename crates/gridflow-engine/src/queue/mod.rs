//! Push queue port.
//!
//! Ready tasks are announced to compute agents through a push queue. The
//! engine only ever enqueues; consumption happens on the agent side and is
//! out of scope here. Delivery is at-least-once: the same task may be
//! announced several times (convergent retries, resume replays), and agents
//! deduplicate by acquiring the task with a status check before working on
//! it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gridflow_core::{SessionId, TaskId};

use crate::error::Result;

pub mod memory;

pub use memory::InMemoryPushQueue;

/// A queue message announcing one ready task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushMessage {
    /// Task to run.
    pub task_id: TaskId,
    /// Session the task belongs to.
    pub session_id: SessionId,
    /// Partition whose agents should pick the task up.
    pub partition_id: String,
    /// Scheduling priority, higher runs earlier.
    pub priority: i32,
    /// When the engine enqueued the message.
    pub enqueued_at: DateTime<Utc>,
}

impl PushMessage {
    /// Builds a message for a ready task.
    #[must_use]
    pub fn new(
        task_id: TaskId,
        session_id: SessionId,
        partition_id: impl Into<String>,
        priority: i32,
    ) -> Self {
        Self {
            task_id,
            session_id,
            partition_id: partition_id.into(),
            priority,
            enqueued_at: Utc::now(),
        }
    }
}

/// Abstraction over the transport that announces ready tasks.
#[async_trait]
pub trait PushQueue: Send + Sync {
    /// Enqueues one message.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying transport rejects the message.
    async fn push(&self, message: PushMessage) -> Result<()>;

    /// Enqueues a batch of messages.
    ///
    /// The default implementation pushes one by one; transports with a
    /// native batch call should override it.
    ///
    /// # Errors
    ///
    /// Returns an error on the first message the transport rejects.
    async fn push_batch(&self, messages: Vec<PushMessage>) -> Result<()> {
        for message in messages {
            self.push(message).await?;
        }
        Ok(())
    }

    /// Human-readable queue name, used in logs and metric labels.
    fn queue_name(&self) -> &str;
}
