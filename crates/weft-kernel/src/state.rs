//! Execution state.
//!
//! [`ExecutionState`] is the concurrency-safe, in-memory accounting for one
//! in-flight execution: one record per node plus the process-wide variable
//! context. It is created per execution, owned by the scheduler that created
//! it, and shared with node tasks through guarded operations.
//!
//! Every operation is self-contained: reads take a shared guard, writes an
//! exclusive one, and no guard is ever held across an `.await`.

use crate::context::VariableContext;
use crate::value::Value;
use crate::workflow::Workflow;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle state of a single node within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl NodeStatus {
    /// Terminal states are never left once entered.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            NodeStatus::Completed | NodeStatus::Failed | NodeStatus::Skipped
        )
    }
}

/// Overall phase of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionPhase {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// Per-node accounting, one per node per execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecutionRecord {
    pub status: NodeStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Snapshot of the resolved input bindings.
    pub input: Option<Value>,
    /// Original (pre-resolution) configuration.
    pub config: Option<Value>,
    /// Configuration after template resolution.
    pub resolved_config: Option<Value>,
    pub output: Option<Value>,
    pub error: Option<String>,
}

impl NodeExecutionRecord {
    fn new() -> Self {
        Self {
            status: NodeStatus::Pending,
            started_at: None,
            ended_at: None,
            input: None,
            config: None,
            resolved_config: None,
            output: None,
            error: None,
        }
    }

    /// Wall-clock duration in milliseconds, when both timestamps are set.
    pub fn duration_ms(&self) -> Option<u64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => {
                Some((end - start).num_milliseconds().max(0) as u64)
            }
            _ => None,
        }
    }
}

struct StateInner {
    phase: ExecutionPhase,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    records: HashMap<String, NodeExecutionRecord>,
    variables: VariableContext,
}

/// Shared execution accounting.
pub struct ExecutionState {
    pub execution_id: String,
    pub workflow_id: String,
    inner: RwLock<StateInner>,
}

impl ExecutionState {
    /// Create state for one execution of `workflow`, seeding a `Pending`
    /// record per node and the workflow's declared variables.
    pub fn new(workflow: &Workflow) -> Self {
        Self::with_variables(workflow, VariableContext::new())
    }

    /// Like [`ExecutionState::new`] but with caller-supplied initial
    /// variables. Workflow-declared variables are merged into the workflow
    /// scope without overriding supplied entries.
    pub fn with_variables(workflow: &Workflow, mut variables: VariableContext) -> Self {
        for (key, value) in &workflow.variables {
            variables
                .workflow_vars
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        let records = workflow
            .nodes
            .iter()
            .map(|n| (n.id.clone(), NodeExecutionRecord::new()))
            .collect();

        Self {
            execution_id: Uuid::new_v4().to_string(),
            workflow_id: workflow.id.clone(),
            inner: RwLock::new(StateInner {
                phase: ExecutionPhase::Pending,
                started_at: None,
                ended_at: None,
                records,
                variables,
            }),
        }
    }

    // -- execution-level accounting -----------------------------------------

    pub fn phase(&self) -> ExecutionPhase {
        self.inner.read().phase
    }

    pub fn set_phase(&self, phase: ExecutionPhase) {
        self.inner.write().phase = phase;
    }

    pub fn mark_started(&self) {
        let mut inner = self.inner.write();
        if inner.started_at.is_none() {
            inner.started_at = Some(Utc::now());
        }
        inner.phase = ExecutionPhase::Running;
    }

    pub fn mark_ended(&self, phase: ExecutionPhase) {
        let mut inner = self.inner.write();
        if inner.ended_at.is_none() {
            inner.ended_at = Some(Utc::now());
        }
        inner.phase = phase;
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().ended_at
    }

    // -- node records -------------------------------------------------------

    /// Apply a status transition. Transitions are monotonic: once a record
    /// is terminal it never changes again. Returns whether the transition
    /// was applied.
    pub fn set_node_status(&self, node_id: &str, status: NodeStatus) -> bool {
        let mut inner = self.inner.write();
        match inner.records.get_mut(node_id) {
            Some(record) if !record.status.is_terminal() => {
                record.status = status;
                true
            }
            _ => false,
        }
    }

    /// Set the node's start timestamp. Set-once.
    pub fn set_node_started_at(&self, node_id: &str, at: DateTime<Utc>) -> bool {
        let mut inner = self.inner.write();
        match inner.records.get_mut(node_id) {
            Some(record) if record.started_at.is_none() => {
                record.started_at = Some(at);
                true
            }
            _ => false,
        }
    }

    /// Set the node's end timestamp. Set-once.
    pub fn set_node_ended_at(&self, node_id: &str, at: DateTime<Utc>) -> bool {
        let mut inner = self.inner.write();
        match inner.records.get_mut(node_id) {
            Some(record) if record.ended_at.is_none() => {
                record.ended_at = Some(at);
                true
            }
            _ => false,
        }
    }

    pub fn set_node_input(&self, node_id: &str, input: Value) -> bool {
        self.set_once(node_id, |r| &mut r.input, input)
    }

    pub fn set_node_config(&self, node_id: &str, config: Value) -> bool {
        self.set_once(node_id, |r| &mut r.config, config)
    }

    pub fn set_node_resolved_config(&self, node_id: &str, config: Value) -> bool {
        self.set_once(node_id, |r| &mut r.resolved_config, config)
    }

    pub fn set_node_output(&self, node_id: &str, output: Value) -> bool {
        self.set_once(node_id, |r| &mut r.output, output)
    }

    pub fn set_node_error(&self, node_id: &str, error: impl Into<String>) -> bool {
        let mut inner = self.inner.write();
        match inner.records.get_mut(node_id) {
            Some(record) if record.error.is_none() => {
                record.error = Some(error.into());
                true
            }
            _ => false,
        }
    }

    fn set_once(
        &self,
        node_id: &str,
        field: impl FnOnce(&mut NodeExecutionRecord) -> &mut Option<Value>,
        value: Value,
    ) -> bool {
        let mut inner = self.inner.write();
        match inner.records.get_mut(node_id) {
            Some(record) => {
                let slot = field(record);
                if slot.is_none() {
                    *slot = Some(value);
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    pub fn node_status(&self, node_id: &str) -> Option<NodeStatus> {
        self.inner.read().records.get(node_id).map(|r| r.status)
    }

    pub fn node_output(&self, node_id: &str) -> Option<Value> {
        self.inner
            .read()
            .records
            .get(node_id)
            .and_then(|r| r.output.clone())
    }

    pub fn node_record(&self, node_id: &str) -> Option<NodeExecutionRecord> {
        self.inner.read().records.get(node_id).cloned()
    }

    /// Count of records currently in the given status.
    pub fn count_in_status(&self, status: NodeStatus) -> usize {
        self.inner
            .read()
            .records
            .values()
            .filter(|r| r.status == status)
            .count()
    }

    // -- variables ----------------------------------------------------------

    /// Publish a completed node's output into the variable map used for
    /// subsequent template resolution.
    pub fn publish_output(&self, key: impl Into<String>, value: Value) {
        self.inner
            .write()
            .variables
            .execution_vars
            .insert(key.into(), value);
    }

    /// Snapshot of the current variable context.
    pub fn variables_snapshot(&self) -> VariableContext {
        self.inner.read().variables.clone()
    }

    /// Approximate total byte size of accumulated node outputs, estimated by
    /// JSON-encoded length.
    pub fn total_memory_usage(&self) -> usize {
        self.inner
            .read()
            .records
            .values()
            .filter_map(|r| r.output.as_ref())
            .map(Value::estimated_size)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::Node;

    fn two_node_workflow() -> Workflow {
        Workflow::new("wf", "Test")
            .with_node(Node::new("a", "A", "transform"))
            .with_node(Node::new("b", "B", "transform"))
            .connect("a", "b")
            .with_variable("region", "eu")
    }

    #[test]
    fn seeds_pending_records_and_workflow_vars() {
        let state = ExecutionState::new(&two_node_workflow());
        assert_eq!(state.node_status("a"), Some(NodeStatus::Pending));
        assert_eq!(state.node_status("b"), Some(NodeStatus::Pending));
        assert_eq!(state.phase(), ExecutionPhase::Pending);
        let vars = state.variables_snapshot();
        assert_eq!(
            vars.workflow_vars.get("region").and_then(|v| v.as_str()),
            Some("eu")
        );
    }

    #[test]
    fn status_transitions_are_monotonic() {
        let state = ExecutionState::new(&two_node_workflow());

        assert!(state.set_node_status("a", NodeStatus::Running));
        assert!(state.set_node_status("a", NodeStatus::Completed));
        // Terminal — nothing moves it.
        assert!(!state.set_node_status("a", NodeStatus::Failed));
        assert!(!state.set_node_status("a", NodeStatus::Running));
        assert_eq!(state.node_status("a"), Some(NodeStatus::Completed));
    }

    #[test]
    fn unknown_node_is_rejected() {
        let state = ExecutionState::new(&two_node_workflow());
        assert!(!state.set_node_status("ghost", NodeStatus::Running));
        assert!(state.node_status("ghost").is_none());
    }

    #[test]
    fn field_setters_are_set_once() {
        let state = ExecutionState::new(&two_node_workflow());

        assert!(state.set_node_output("a", Value::from("first")));
        assert!(!state.set_node_output("a", Value::from("second")));
        assert_eq!(
            state.node_output("a").and_then(|v| v.as_str().map(String::from)),
            Some("first".to_string())
        );

        let now = Utc::now();
        assert!(state.set_node_started_at("a", now));
        assert!(!state.set_node_started_at("a", now));
        assert!(state.set_node_error("a", "boom"));
        assert!(!state.set_node_error("a", "boom again"));
    }

    #[test]
    fn publish_output_lands_in_execution_vars() {
        let state = ExecutionState::new(&two_node_workflow());
        state.publish_output("A_output", Value::from("A"));
        let vars = state.variables_snapshot();
        assert_eq!(
            vars.execution_vars.get("A_output").and_then(|v| v.as_str()),
            Some("A")
        );
    }

    #[test]
    fn memory_usage_sums_output_json_lengths() {
        let state = ExecutionState::new(&two_node_workflow());
        assert_eq!(state.total_memory_usage(), 0);
        state.set_node_output("a", Value::from("abcd")); // "abcd" -> 6 bytes
        state.set_node_output("b", Value::Int(12)); // 12 -> 2 bytes
        assert_eq!(state.total_memory_usage(), 8);
    }

    #[test]
    fn with_variables_does_not_override_supplied_entries() {
        let supplied = VariableContext::new().with_workflow_var("region", "us");
        let state = ExecutionState::with_variables(&two_node_workflow(), supplied);
        let vars = state.variables_snapshot();
        assert_eq!(
            vars.workflow_vars.get("region").and_then(|v| v.as_str()),
            Some("us")
        );
    }
}
