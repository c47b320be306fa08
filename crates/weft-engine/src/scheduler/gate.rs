//! Incoming-edge gate.
//!
//! Decides whether a node runs or is skipped based on its incoming edges.
//! Semantics are OR across edges: the node runs iff at least one edge
//! passes every check — source completed, condition (if any) true, source
//! handle (if applicable) matched. A node with no incoming edges is an
//! entry and always runs.

use crate::expr::ConditionEvaluator;
use tracing::debug;
use weft_kernel::{Edge, ExecutionState, NodeStatus, Value, Workflow};

/// Outcome of the gate check.
#[derive(Debug, PartialEq, Eq)]
pub enum GateDecision {
    Run,
    /// Skip, with the concatenated per-edge diagnostics.
    Skip(String),
}

/// Evaluate the gate for `node_id` against its incoming edges.
///
/// An expression error on an edge condition marks that edge as not passing;
/// the node is skipped only when no edge passes.
pub fn evaluate_gate(
    node_id: &str,
    incoming: &[Edge],
    workflow: &Workflow,
    state: &ExecutionState,
    evaluator: &ConditionEvaluator,
) -> GateDecision {
    if incoming.is_empty() {
        return GateDecision::Run;
    }

    let mut diagnostics = Vec::with_capacity(incoming.len());

    for edge in incoming {
        match check_edge(edge, workflow, state, evaluator) {
            Ok(()) => return GateDecision::Run,
            Err(reason) => {
                debug!(node_id, from = %edge.from, %reason, "incoming edge did not pass");
                diagnostics.push(format!("edge {} -> {}: {}", edge.from, edge.to, reason));
            }
        }
    }

    GateDecision::Skip(diagnostics.join("; "))
}

/// Run all checks for one edge. `Ok(())` means the edge passes.
fn check_edge(
    edge: &Edge,
    workflow: &Workflow,
    state: &ExecutionState,
    evaluator: &ConditionEvaluator,
) -> Result<(), String> {
    // (a) the source must have completed.
    match state.node_status(&edge.from) {
        Some(NodeStatus::Completed) => {}
        Some(status) => {
            return Err(format!("source not completed (status {status:?})"));
        }
        None => return Err("source has no execution record".to_string()),
    }

    let output = state.node_output(&edge.from).unwrap_or(Value::Null);

    // (b) the condition, when present, must evaluate to true.
    if let Some(condition) = edge.condition.as_deref().filter(|c| !c.is_empty()) {
        match evaluator.eval_bool(condition, &output, &edge.from) {
            Ok(true) => {}
            Ok(false) => {
                return Err(format!("condition '{condition}' evaluated to false"));
            }
            Err(err) => {
                return Err(format!("condition '{condition}' failed: {err}"));
            }
        }
    }

    // (c) a source handle on a conditional source must match the output.
    if let Some(handle) = edge.source_handle.as_deref().filter(|h| !h.is_empty())
        && workflow
            .node(&edge.from)
            .is_some_and(|n| n.node_type == "conditional")
        && !source_handle_passes(handle, &output)
    {
        return Err(format!("source handle '{handle}' did not match output"));
    }

    Ok(())
}

/// Match a handle against a conditional node's output.
///
/// Boolean outputs (or mappings carrying a boolean `result`) route to the
/// `"true"`/`"false"` handles; any other output shape and any unknown
/// handle pass by default.
fn source_handle_passes(handle: &str, output: &Value) -> bool {
    let branch = match output {
        Value::Bool(b) => Some(*b),
        Value::Map(map) => map.get("result").and_then(Value::as_bool),
        _ => None,
    };

    match (handle, branch) {
        ("true", Some(b)) => b,
        ("false", Some(b)) => !b,
        _ => true,
    }
}
