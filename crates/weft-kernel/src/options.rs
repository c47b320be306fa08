//! Execution options.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Caller-supplied knobs for one execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionOptions {
    /// Upper bound on concurrently running nodes within a wave.
    /// Zero or negative means "wave size" (no throttling).
    #[serde(default)]
    pub max_parallelism: i32,
    /// Retry policy applied around each node execution. `None` means no
    /// retry.
    #[serde(default)]
    pub retry_policy: Option<RetryPolicy>,
    /// Default per-node timeout. Zero means none. A node's own
    /// `timeout_ms` takes precedence.
    #[serde(default, with = "duration_ms")]
    pub node_timeout: Duration,
    /// Per-node output size limit in bytes of JSON encoding. Zero means
    /// unlimited.
    #[serde(default)]
    pub max_output_size: usize,
    /// Advisory limit on the accumulated output size across all nodes.
    /// Exceeding it emits a warning event; it never fails the execution.
    /// Zero means unlimited.
    #[serde(default)]
    pub max_total_memory: usize,
    /// Collect node failures into an aggregated error instead of aborting
    /// the remaining waves on the first failure.
    #[serde(default)]
    pub continue_on_error: bool,
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_parallelism(mut self, max: i32) -> Self {
        self.max_parallelism = max;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    pub fn with_max_output_size(mut self, bytes: usize) -> Self {
        self.max_output_size = bytes;
        self
    }

    pub fn with_max_total_memory(mut self, bytes: usize) -> Self {
        self.max_total_memory = bytes;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let ms = u64::deserialize(d)?;
        Ok(Duration::from_millis(ms))
    }
}
