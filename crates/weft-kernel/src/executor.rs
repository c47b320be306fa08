//! Node executor contract.
//!
//! The kernel defines only the dispatch interface; concrete executors
//! (HTTP calls, LLM completions, transforms, script runners) live outside
//! the engine and are registered by node type tag.

use crate::context::VariableContext;
use crate::error::EngineResult;
use crate::options::ExecutionOptions;
use crate::value::Value;
use crate::workflow::Node;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Everything an executor sees about the node it is about to run.
///
/// The scheduler resolves the node's configuration through the template
/// engine before dispatch; executors receive both the original and the
/// resolved form.
#[derive(Debug, Clone)]
pub struct NodeExecutionContext {
    /// The node definition being executed.
    pub node: Node,
    /// Original (pre-resolution) configuration.
    pub config: Value,
    /// Configuration after template resolution.
    pub resolved_config: Value,
    /// Variable context whose `input_vars` holds the parent-derived
    /// bindings for this node.
    pub variables: VariableContext,
    /// Execution-wide options, for executors that need to consult them.
    pub options: ExecutionOptions,
    /// Ambient cancellation scope for this node.
    pub cancel: CancellationToken,
}

impl NodeExecutionContext {
    /// The node's input bindings as a mapping value.
    pub fn input_value(&self) -> Value {
        Value::Map(self.variables.input_vars.clone())
    }

    /// Input bindings by key.
    pub fn inputs(&self) -> &HashMap<String, Value> {
        &self.variables.input_vars
    }
}

/// What an executor hands back on success.
#[derive(Debug, Clone)]
pub struct NodeExecutionResult {
    /// Snapshot of the inputs the node consumed.
    pub input: Value,
    /// Original configuration.
    pub config: Value,
    /// Resolved configuration.
    pub resolved_config: Value,
    /// The node's output value.
    pub output: Value,
}

impl NodeExecutionResult {
    /// Build a result echoing the context's input and config forms.
    pub fn from_output(ctx: &NodeExecutionContext, output: Value) -> Self {
        Self {
            input: ctx.input_value(),
            config: ctx.config.clone(),
            resolved_config: ctx.resolved_config.clone(),
            output,
        }
    }
}

/// A node executor, registered by node type tag.
///
/// # Example
///
/// ```rust,ignore
/// struct EchoExecutor;
///
/// #[async_trait]
/// impl NodeExecutor for EchoExecutor {
///     async fn execute(&self, ctx: &NodeExecutionContext) -> EngineResult<NodeExecutionResult> {
///         let output = Value::from(ctx.node.name.clone());
///         Ok(NodeExecutionResult::from_output(ctx, output))
///     }
/// }
/// ```
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(&self, ctx: &NodeExecutionContext) -> EngineResult<NodeExecutionResult>;
}
