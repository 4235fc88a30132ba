//! # gridflow-core
//!
//! Core abstractions shared across the gridflow orchestrator:
//!
//! - **Identifiers**: Strongly-typed IDs for sessions, tasks, and results
//! - **Error Types**: Shared error definitions and result types
//! - **Observability**: Structured logging initialization and span helpers
//!
//! ## Crate Boundary
//!
//! `gridflow-core` is the only crate allowed to define shared primitives.
//! The orchestration engine and any storage or queue adapters depend on the
//! contracts defined here rather than on each other.
//!
//! ## Example
//!
//! ```rust
//! use gridflow_core::{SessionId, TaskId};
//!
//! let session = SessionId::generate();
//! let task = TaskId::generate();
//! let retry = task.retried(1);
//! assert_eq!(retry.root(), task.root());
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod id;
pub mod observability;

pub use error::{Error, Result};
pub use id::{ResultId, SessionId, TaskId};
