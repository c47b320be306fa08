//! Weft Kernel
//!
//! Data model, contracts and policies for the Weft workflow engine. This
//! crate defines the universal [`value::Value`], the workflow graph
//! description, the per-execution state store, the lifecycle event and
//! observer contracts, the retry policy and the error taxonomy. The engine
//! crate (`weft-engine`) implements template resolution, condition
//! evaluation and DAG scheduling on top of these types.

pub mod context;
pub mod error;
pub mod event;
pub mod executor;
pub mod options;
pub mod retry;
pub mod state;
pub mod value;
pub mod workflow;

// Re-export public API
pub use context::{Scope, VariableContext};
pub use error::{AggregatedError, EngineError, EngineResult, TemplateError};
pub use event::{EventKind, ExecutionEvent, ExecutionObserver, TracingObserver, safe_notify};
pub use executor::{NodeExecutionContext, NodeExecutionResult, NodeExecutor};
pub use options::ExecutionOptions;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use state::{ExecutionPhase, ExecutionState, NodeExecutionRecord, NodeStatus};
pub use value::Value;
pub use workflow::{Edge, EdgeKind, Node, Workflow};
