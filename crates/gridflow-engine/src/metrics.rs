//! Observability metrics for the task engine.
//!
//! This module provides Prometheus-compatible metrics for monitoring
//! task lifecycle throughput. Metrics are designed to support:
//!
//! - **Alerting**: SLO-based alerts on submission latency and retry rates
//! - **Dashboards**: Real-time visibility into session and queue health
//! - **Debugging**: Correlating metrics with traces for root cause analysis
//!
//! ## Metrics Exported
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `gridflow_tasks_total` | Counter | `from_state`, `to_state` | Total task state transitions |
//! | `gridflow_task_submission_duration_seconds` | Histogram | - | Creation-to-finalize latency |
//! | `gridflow_pushes_total` | Counter | `queue` | Messages pushed to the ready queue |
//! | `gridflow_retries_total` | Counter | `attempt` | Retry successors created |
//! | `gridflow_retries_exhausted_total` | Counter | - | Tasks errored after their last retry |
//! | `gridflow_recoveries_total` | Counter | `status` | Crash recovery checks by outcome |
//! | `gridflow_dependency_discharges_total` | Counter | - | Dependency set removals applied |
//! | `gridflow_paused_sessions` | Gauge | - | Sessions currently holding pushes back |
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gridflow_engine::metrics::EngineMetrics;
//!
//! let metrics = EngineMetrics::new();
//!
//! // Record a task state transition
//! metrics.record_task_transition("SUBMITTED", "PROCESSING");
//!
//! // Record a retry with its attempt number
//! metrics.record_retry(2);
//! ```
//!
//! ## Integration
//!
//! Metrics are exposed via the `metrics` crate facade. To export to Prometheus:
//!
//! ```rust,ignore
//! use metrics_exporter_prometheus::PrometheusBuilder;
//!
//! PrometheusBuilder::new()
//!     .with_http_listener(([0, 0, 0, 0], 9090))
//!     .install()
//!     .expect("failed to install Prometheus recorder");
//! ```

use std::time::Duration;

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    /// Counter: Total task state transitions.
    pub const TASKS_TOTAL: &str = "gridflow_tasks_total";
    /// Histogram: Creation-to-finalize latency in seconds.
    pub const TASK_SUBMISSION_DURATION_SECONDS: &str =
        "gridflow_task_submission_duration_seconds";
    /// Counter: Messages pushed to the ready queue.
    pub const PUSHES_TOTAL: &str = "gridflow_pushes_total";
    /// Counter: Retry successors created.
    pub const RETRIES_TOTAL: &str = "gridflow_retries_total";
    /// Counter: Tasks errored after their last retry.
    pub const RETRIES_EXHAUSTED_TOTAL: &str = "gridflow_retries_exhausted_total";
    /// Counter: Crash recovery checks by outcome.
    pub const RECOVERIES_TOTAL: &str = "gridflow_recoveries_total";
    /// Counter: Dependency set removals applied.
    pub const DEPENDENCY_DISCHARGES_TOTAL: &str = "gridflow_dependency_discharges_total";
    /// Gauge: Sessions currently holding pushes back.
    pub const PAUSED_SESSIONS: &str = "gridflow_paused_sessions";
}

/// Label keys used across metrics.
pub mod labels {
    /// Previous task status (for transitions).
    pub const FROM_STATE: &str = "from_state";
    /// Target task status (for transitions).
    pub const TO_STATE: &str = "to_state";
    /// Queue name for push metrics.
    pub const QUEUE: &str = "queue";
    /// Recovery outcome (completed, retried, failed, skipped).
    pub const STATUS: &str = "status";
    /// Retry attempt number.
    pub const ATTEMPT: &str = "attempt";
}

/// High-level interface for recording engine metrics.
///
/// This struct provides ergonomic methods for recording metrics
/// with proper labeling. It's designed to be cheap to clone
/// and share across tasks.
#[derive(Debug, Clone, Default)]
pub struct EngineMetrics {
    /// Optional prefix for metric names (for multi-tenant deployments).
    _prefix: Option<String>,
}

impl EngineMetrics {
    /// Creates a new metrics recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a task state transition.
    ///
    /// Increments the `gridflow_tasks_total` counter with transition labels.
    pub fn record_task_transition(&self, from_state: &str, to_state: &str) {
        counter!(
            names::TASKS_TOTAL,
            labels::FROM_STATE => from_state.to_string(),
            labels::TO_STATE => to_state.to_string(),
        )
        .increment(1);
    }

    /// Records creation-to-finalize latency.
    pub fn observe_submission_duration(&self, duration: Duration) {
        histogram!(names::TASK_SUBMISSION_DURATION_SECONDS).record(duration.as_secs_f64());
    }

    /// Records messages pushed to the ready queue.
    #[allow(clippy::cast_possible_truncation)] // Counter increments are small
    pub fn record_pushes(&self, queue: &str, count: usize) {
        counter!(
            names::PUSHES_TOTAL,
            labels::QUEUE => queue.to_string(),
        )
        .increment(count as u64);
    }

    /// Records a retry successor creation.
    ///
    /// Increments the `gridflow_retries_total` counter.
    pub fn record_retry(&self, attempt: u32) {
        counter!(
            names::RETRIES_TOTAL,
            labels::ATTEMPT => attempt.to_string(),
        )
        .increment(1);
    }

    /// Records a task whose retry budget ran out.
    pub fn record_retries_exhausted(&self) {
        counter!(names::RETRIES_EXHAUSTED_TOTAL).increment(1);
    }

    /// Records a crash recovery check by outcome.
    pub fn record_recovery(&self, status: &str) {
        counter!(
            names::RECOVERIES_TOTAL,
            labels::STATUS => status.to_string(),
        )
        .increment(1);
    }

    /// Records dependency set removals applied by a resolver.
    #[allow(clippy::cast_possible_truncation)] // Counter increments are small
    pub fn record_dependency_discharges(&self, count: usize) {
        counter!(names::DEPENDENCY_DISCHARGES_TOTAL).increment(count as u64);
    }

    /// Adjusts the paused-sessions gauge.
    pub fn adjust_paused_sessions(&self, delta: f64) {
        gauge!(names::PAUSED_SESSIONS).increment(delta);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_metrics_can_record_transitions() {
        let metrics = EngineMetrics::new();

        // These calls should not panic even without a metrics recorder installed
        metrics.record_task_transition("SUBMITTED", "PROCESSING");
        metrics.record_task_transition("PROCESSING", "COMPLETED");
    }

    #[test]
    fn engine_metrics_can_record_counters_and_gauges() {
        let metrics = EngineMetrics::new();

        metrics.record_pushes("memory", 3);
        metrics.record_retry(1);
        metrics.record_retries_exhausted();
        metrics.record_recovery("retried");
        metrics.record_dependency_discharges(2);
        metrics.adjust_paused_sessions(1.0);
        metrics.observe_submission_duration(Duration::from_millis(100));
    }
}
