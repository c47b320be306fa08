//! Lifecycle events and the observer contract.
//!
//! Every observable moment of an execution is materialized as a
//! self-contained [`ExecutionEvent`] record and fanned out to registered
//! [`ExecutionObserver`]s through [`safe_notify`], which isolates the engine
//! from observer panics.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                   Event Pipeline                      │
//! ├──────────────────────────────────────────────────────┤
//! │                                                       │
//! │  Scheduler task ──build──▶ ExecutionEvent             │
//! │                               │                       │
//! │                         safe_notify                   │
//! │                       (panic isolation)               │
//! │                     ┌─────────┴─────────┐             │
//! │                     ▼                   ▼             │
//! │              TracingObserver      custom observers    │
//! │                                                       │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Delivery is synchronous on the emitting task; observers must be fast and
//! non-blocking. Heavy sinks (HTTP callbacks, WebSocket broadcast) must
//! queue internally.

use crate::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

// ============================================================================
// EventKind — the event vocabulary
// ============================================================================

/// Kind tag carried by every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum EventKind {
    #[serde(rename = "execution.started")]
    ExecutionStarted,
    #[serde(rename = "execution.completed")]
    ExecutionCompleted,
    #[serde(rename = "execution.failed")]
    ExecutionFailed,
    /// Advisory warning (e.g. total-memory limit exceeded).
    #[serde(rename = "execution.warning")]
    ExecutionWarning,
    #[serde(rename = "wave.started")]
    WaveStarted,
    #[serde(rename = "wave.completed")]
    WaveCompleted,
    #[serde(rename = "node.started")]
    NodeStarted,
    #[serde(rename = "node.completed")]
    NodeCompleted,
    #[serde(rename = "node.failed")]
    NodeFailed,
    #[serde(rename = "node.skipped")]
    NodeSkipped,
    #[serde(rename = "node.retrying")]
    NodeRetrying,
    #[serde(rename = "variable.set")]
    VariableSet,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ExecutionStarted => "execution.started",
            Self::ExecutionCompleted => "execution.completed",
            Self::ExecutionFailed => "execution.failed",
            Self::ExecutionWarning => "execution.warning",
            Self::WaveStarted => "wave.started",
            Self::WaveCompleted => "wave.completed",
            Self::NodeStarted => "node.started",
            Self::NodeCompleted => "node.completed",
            Self::NodeFailed => "node.failed",
            Self::NodeSkipped => "node.skipped",
            Self::NodeRetrying => "node.retrying",
            Self::VariableSet => "variable.set",
        }
    }
}

// ============================================================================
// ExecutionEvent — the self-contained event record
// ============================================================================

/// One lifecycle event.
///
/// Always carries kind, execution id, workflow id and a UTC timestamp;
/// everything else is event-appropriate optional payload. Events own their
/// data — no shared mutable references pass through the observer boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionEvent {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub execution_id: String,
    pub workflow_id: String,
    pub timestamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wave_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wave_node_count: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attempt: Option<u32>,
    /// Skip or retry reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_key: Option<String>,
    /// Wave/execution completion status ("completed", "completed_with_errors").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl ExecutionEvent {
    pub fn new(
        kind: EventKind,
        execution_id: impl Into<String>,
        workflow_id: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            execution_id: execution_id.into(),
            workflow_id: workflow_id.into(),
            timestamp: Utc::now(),
            wave_index: None,
            wave_node_count: None,
            node_id: None,
            node_name: None,
            node_type: None,
            duration_ms: None,
            attempt: None,
            reason: None,
            error: None,
            output: None,
            output_size: None,
            variable_key: None,
            status: None,
        }
    }

    pub fn with_wave(mut self, index: usize, node_count: usize) -> Self {
        self.wave_index = Some(index);
        self.wave_node_count = Some(node_count);
        self
    }

    pub fn with_node(
        mut self,
        node_id: impl Into<String>,
        node_name: impl Into<String>,
        node_type: impl Into<String>,
    ) -> Self {
        self.node_id = Some(node_id.into());
        self.node_name = Some(node_name.into());
        self.node_type = Some(node_type.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_error(mut self, error: impl std::fmt::Display) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn with_output(mut self, output: Value) -> Self {
        self.output_size = Some(output.estimated_size());
        self.output = Some(output);
        self
    }

    pub fn with_variable_key(mut self, key: impl Into<String>) -> Self {
        self.variable_key = Some(key.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

// ============================================================================
// ExecutionObserver — the observer contract
// ============================================================================

/// External sink for lifecycle events.
///
/// One method per lifecycle point, every one defaulted to a no-op so
/// implementations subscribe only to what they need. Observers must be
/// thread-safe; a panicking observer is isolated by [`safe_notify`] and
/// never fails the execution.
#[allow(unused_variables)]
pub trait ExecutionObserver: Send + Sync {
    fn on_execution_started(&self, event: &ExecutionEvent) {}
    fn on_execution_completed(&self, event: &ExecutionEvent) {}
    fn on_execution_failed(&self, event: &ExecutionEvent) {}
    fn on_wave_started(&self, event: &ExecutionEvent) {}
    fn on_wave_completed(&self, event: &ExecutionEvent) {}
    fn on_node_started(&self, event: &ExecutionEvent) {}
    fn on_node_completed(&self, event: &ExecutionEvent) {}
    fn on_node_failed(&self, event: &ExecutionEvent) {}
    fn on_node_skipped(&self, event: &ExecutionEvent) {}
    fn on_node_retrying(&self, event: &ExecutionEvent) {}
    fn on_variable_set(&self, event: &ExecutionEvent) {}
    fn on_warning(&self, event: &ExecutionEvent) {}
}

/// Deliver one event to every observer, dispatching on the event kind and
/// swallowing observer panics.
pub fn safe_notify(observers: &[Arc<dyn ExecutionObserver>], event: &ExecutionEvent) {
    for observer in observers {
        let outcome = catch_unwind(AssertUnwindSafe(|| match event.kind {
            EventKind::ExecutionStarted => observer.on_execution_started(event),
            EventKind::ExecutionCompleted => observer.on_execution_completed(event),
            EventKind::ExecutionFailed => observer.on_execution_failed(event),
            EventKind::ExecutionWarning => observer.on_warning(event),
            EventKind::WaveStarted => observer.on_wave_started(event),
            EventKind::WaveCompleted => observer.on_wave_completed(event),
            EventKind::NodeStarted => observer.on_node_started(event),
            EventKind::NodeCompleted => observer.on_node_completed(event),
            EventKind::NodeFailed => observer.on_node_failed(event),
            EventKind::NodeSkipped => observer.on_node_skipped(event),
            EventKind::NodeRetrying => observer.on_node_retrying(event),
            EventKind::VariableSet => observer.on_variable_set(event),
        }));
        if outcome.is_err() {
            error!(
                event_kind = event.kind.as_str(),
                "observer panicked during notification"
            );
        }
    }
}

// ============================================================================
// TracingObserver — bundled logging sink
// ============================================================================

/// Observer that forwards events to `tracing` at level-appropriate targets.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl ExecutionObserver for TracingObserver {
    fn on_execution_started(&self, event: &ExecutionEvent) {
        info!(
            execution_id = %event.execution_id,
            workflow_id = %event.workflow_id,
            "execution started"
        );
    }

    fn on_execution_completed(&self, event: &ExecutionEvent) {
        info!(
            execution_id = %event.execution_id,
            duration_ms = event.duration_ms,
            "execution completed"
        );
    }

    fn on_execution_failed(&self, event: &ExecutionEvent) {
        error!(
            execution_id = %event.execution_id,
            error = event.error.as_deref(),
            duration_ms = event.duration_ms,
            "execution failed"
        );
    }

    fn on_wave_started(&self, event: &ExecutionEvent) {
        debug!(
            wave = event.wave_index,
            nodes = event.wave_node_count,
            "wave started"
        );
    }

    fn on_wave_completed(&self, event: &ExecutionEvent) {
        debug!(
            wave = event.wave_index,
            duration_ms = event.duration_ms,
            status = event.status.as_deref(),
            "wave completed"
        );
    }

    fn on_node_started(&self, event: &ExecutionEvent) {
        debug!(node_id = event.node_id.as_deref(), "node started");
    }

    fn on_node_completed(&self, event: &ExecutionEvent) {
        debug!(
            node_id = event.node_id.as_deref(),
            duration_ms = event.duration_ms,
            output_size = event.output_size,
            "node completed"
        );
    }

    fn on_node_failed(&self, event: &ExecutionEvent) {
        warn!(
            node_id = event.node_id.as_deref(),
            error = event.error.as_deref(),
            duration_ms = event.duration_ms,
            "node failed"
        );
    }

    fn on_node_skipped(&self, event: &ExecutionEvent) {
        debug!(
            node_id = event.node_id.as_deref(),
            reason = event.reason.as_deref(),
            "node skipped"
        );
    }

    fn on_node_retrying(&self, event: &ExecutionEvent) {
        warn!(
            node_id = event.node_id.as_deref(),
            attempt = event.attempt,
            reason = event.reason.as_deref(),
            "node retrying"
        );
    }

    fn on_variable_set(&self, event: &ExecutionEvent) {
        debug!(key = event.variable_key.as_deref(), "variable set");
    }

    fn on_warning(&self, event: &ExecutionEvent) {
        warn!(reason = event.reason.as_deref(), "execution warning");
    }
}

// ============================================================================
// Tests
// ============================================================================
