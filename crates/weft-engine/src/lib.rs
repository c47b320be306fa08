//! Weft Engine
//!
//! Implementation layer of the Weft workflow engine: the `{{scope.path}}`
//! template resolver, the sandboxed condition evaluator with its compiled-
//! expression LRU, the executor registry, and the wave-based DAG scheduler.
//! The data model and contracts live in `weft-kernel`.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use weft_engine::{ExecutorRegistry, Scheduler};
//! use weft_kernel::{ExecutionOptions, ExecutionState};
//!
//! let registry = Arc::new(ExecutorRegistry::new());
//! registry.register("transform", Arc::new(MyTransform));
//!
//! let scheduler = Scheduler::new(registry);
//! let state = Arc::new(ExecutionState::new(&workflow));
//! scheduler
//!     .execute(&workflow, state, &ExecutionOptions::default(), CancellationToken::new())
//!     .await?;
//! ```

pub mod expr;
pub mod registry;
pub mod scheduler;
pub mod template;

// Re-export public API
pub use expr::{ConditionEvaluator, ExpressionCache};
pub use registry::ExecutorRegistry;
pub use scheduler::Scheduler;
pub use scheduler::gate::{GateDecision, evaluate_gate};
pub use scheduler::graph::ExecutionGraph;
pub use template::{TemplateEngine, TemplateOptions};
