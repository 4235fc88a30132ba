//! # gridflow-engine
//!
//! The task submission, dependency-resolution, and crash-recovery state
//! machine at the heart of the gridflow orchestrator.
//!
//! This crate implements the orchestration domain, providing:
//!
//! - **Data Model**: Persisted task, result, and session entities with closed
//!   status machines
//! - **Two-Phase Creation**: A `Creating` phase plus an idempotent `Finalize`
//!   phase that computes initial dependency state and performs first submission
//! - **Dependency Resolution**: Atomic shrinkage of each pending task's
//!   remaining-dependency set, promoting tasks to the queue once empty
//! - **Retry Protocol**: Deterministic successor derivation so concurrent
//!   retries converge on a single successor row
//! - **Crash Recovery**: Persisted-state probes that classify a crashed
//!   task's progress against an explicit commit boundary
//! - **Session Gate**: A pause/resume switch that withholds queue pushes and
//!   replays them on resume
//!
//! ## Guarantees
//!
//! - **At-least-once delivery**: A promoted task is pushed at least once;
//!   consumers must tolerate duplicates by checking current status
//! - **No double execution of committed work**: Once a task's side effects
//!   cross the commit boundary, recovery honors them instead of retrying
//! - **CAS-only transitions**: Every cross-task invariant is a storage-level
//!   conditional update, never an in-process lock
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use gridflow_engine::error::Result;
//! use gridflow_engine::lifecycle::TaskLifecycle;
//! use gridflow_engine::queue::memory::InMemoryPushQueue;
//! use gridflow_engine::store::memory::{
//!     InMemoryResultStore, InMemorySessionStore, InMemoryTaskStore,
//! };
//! use gridflow_engine::task::{TaskCreationRequest, TaskOptions};
//! use gridflow_core::{ResultId, TaskId};
//!
//! # async fn demo() -> Result<()> {
//! let lifecycle = TaskLifecycle::new(
//!     Arc::new(InMemoryTaskStore::new()),
//!     Arc::new(InMemoryResultStore::new()),
//!     Arc::new(InMemorySessionStore::new()),
//!     Arc::new(InMemoryPushQueue::new()),
//! );
//!
//! let session_id = lifecycle
//!     .create_session(vec!["default".into()], TaskOptions::default())
//!     .await?;
//!
//! let request = TaskCreationRequest::new(TaskId::generate(), ResultId::generate())
//!     .with_expected_output_keys(vec![ResultId::generate()]);
//!
//! lifecycle.create_tasks(&session_id, None, &[request.clone()]).await?;
//! lifecycle.finalize_task_creation(&session_id, &[request]).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod queue;
pub mod result;
pub mod session;
pub mod store;
pub mod task;
