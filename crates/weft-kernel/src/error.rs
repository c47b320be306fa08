//! Error taxonomy for the workflow engine.
//!
//! Two enums cover the whole engine surface:
//!
//! - [`TemplateError`] — failures local to template resolution (syntax,
//!   lookup, path traversal).
//! - [`EngineError`] — everything the scheduler can propagate to a caller:
//!   graph validation, node execution, cancellation, retry exhaustion and
//!   the aggregated form produced in continue-on-error mode.

use thiserror::Error;

/// Result alias used across the engine crates.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors produced while resolving `{{scope.path}}` references.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateError {
    /// Malformed reference or unknown scope.
    #[error("invalid template: {0}")]
    InvalidTemplate(String),
    /// A reference did not resolve to any value.
    #[error("variable not found: {0}")]
    VariableNotFound(String),
    /// The dotted path could not be parsed or traversed.
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// A `[N]` index was not a valid non-negative integer.
    #[error("invalid array index: {0}")]
    ArrayIndexInvalid(String),
    /// A `[N]` index fell outside the sequence bounds.
    #[error("array index {index} out of bounds (len {len})")]
    ArrayOutOfBounds { index: usize, len: usize },
    /// Traversal hit a value shape that cannot be descended into.
    #[error("unsupported traversal type: {0}")]
    TypeNotSupported(String),
}

/// Per-node failures collected in continue-on-error mode.
///
/// Keeps `(node id, error text)` pairs so the caller can attribute each
/// failure without re-walking the execution state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregatedError {
    errors: Vec<(String, String)>,
}

impl AggregatedError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node_id: impl Into<String>, error: impl Into<String>) {
        self.errors.push((node_id.into(), error.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// The collected `(node id, error text)` pairs, in completion order.
    pub fn errors(&self) -> &[(String, String)] {
        &self.errors
    }
}

impl std::fmt::Display for AggregatedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} node(s) failed: ", self.errors.len())?;
        for (i, (node_id, error)) in self.errors.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{node_id}: {error}")?;
        }
        Ok(())
    }
}

/// Top-level engine error.
#[derive(Debug, Clone, Error)]
#[non_exhaustive]
pub enum EngineError {
    // -- graph errors -------------------------------------------------------
    /// Two nodes share the same identifier.
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),
    /// An edge references a node that does not exist.
    #[error("edge {from} -> {to} references missing {side} node")]
    DanglingEdge {
        from: String,
        to: String,
        side: &'static str,
    },
    /// The graph contains at least one directed cycle.
    #[error("cycle detected in workflow graph")]
    CycleDetected,

    // -- template / expression errors ---------------------------------------
    #[error(transparent)]
    Template(#[from] TemplateError),
    /// An edge condition failed to compile or evaluate.
    #[error("expression error: {0}")]
    Expression(String),

    // -- node errors --------------------------------------------------------
    /// No executor is registered for the node's type tag.
    #[error("no executor registered for node type '{0}'")]
    UnknownNodeType(String),
    /// An executor-returned failure, attributed to its node.
    #[error("node '{node_id}' failed: {message}")]
    Node { node_id: String, message: String },
    /// A node's output exceeded the configured per-node size limit.
    #[error("node '{node_id}' output size exceeds limit ({size} > {limit} bytes)")]
    OutputSizeExceeded {
        node_id: String,
        size: usize,
        limit: usize,
    },
    /// A per-node or execution-wide deadline elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// The ambient cancellation scope was cancelled.
    #[error("execution cancelled")]
    Cancelled,
    /// A retried operation failed on every attempt.
    #[error("all retry attempts failed after {attempts} attempt(s): {last}")]
    RetriesExhausted { attempts: u32, last: String },

    // -- aggregation --------------------------------------------------------
    /// Bundle of per-node failures (continue-on-error mode).
    #[error("{0}")]
    Aggregated(AggregatedError),
}

impl EngineError {
    /// Cancellation and deadline errors are never retried and always
    /// propagate unchanged.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }

    /// Attribute an arbitrary message to a node.
    pub fn node(node_id: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Node {
            node_id: node_id.into(),
            message: message.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregated_error_display() {
        let mut agg = AggregatedError::new();
        agg.push("a", "boom");
        agg.push("b", "bang");
        let err = EngineError::Aggregated(agg);
        let text = err.to_string();
        assert!(text.contains("2 node(s) failed"));
        assert!(text.contains("a: boom"));
        assert!(text.contains("b: bang"));
    }

    #[test]
    fn retries_exhausted_mentions_all_attempts_failed() {
        let err = EngineError::RetriesExhausted {
            attempts: 3,
            last: "connection reset".into(),
        };
        assert!(err.to_string().contains("all retry attempts failed"));
    }

    #[test]
    fn cancellation_classification() {
        assert!(EngineError::Cancelled.is_cancellation());
        assert!(EngineError::DeadlineExceeded.is_cancellation());
        assert!(!EngineError::CycleDetected.is_cancellation());
        assert!(!EngineError::node("n", "x").is_cancellation());
    }

    #[test]
    fn template_error_converts() {
        let err: EngineError = TemplateError::VariableNotFound("env.missing".into()).into();
        assert!(matches!(
            err,
            EngineError::Template(TemplateError::VariableNotFound(_))
        ));
    }
}
