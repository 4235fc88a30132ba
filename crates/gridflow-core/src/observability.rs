//! Observability infrastructure for gridflow.
//!
//! Structured logging with consistent spans. This module provides
//! initialization helpers and span constructors used across the
//! orchestrator components.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Call once at application startup. Safe to call multiple times;
/// subsequent calls are no-ops.
///
/// # Environment Variables
///
/// - `RUST_LOG`: Controls log levels (e.g., `info`, `gridflow_engine=debug`)
///
/// # Example
///
/// ```rust
/// use gridflow_core::observability::{init_logging, LogFormat};
///
/// init_logging(LogFormat::Pretty);
/// ```
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for lifecycle operations with standard fields.
///
/// # Example
///
/// ```rust
/// use gridflow_core::observability::lifecycle_span;
///
/// let span = lifecycle_span("finalize_task_creation", "01J0000000000000000000TEST");
/// let _guard = span.enter();
/// // ... run the lifecycle operation
/// ```
#[must_use]
pub fn lifecycle_span(operation: &str, session: &str) -> Span {
    tracing::info_span!(
        "lifecycle",
        op = operation,
        session = session,
    )
}
