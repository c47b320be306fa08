//! Node executor registry.
//!
//! Maps node type tags (`transform`, `http`, `llm`, …) to executor
//! implementations. The set of tags is open: anything registered here is
//! dispatchable.

use dashmap::DashMap;
use std::sync::Arc;
use tracing::debug;
use weft_kernel::executor::NodeExecutor;

/// Concurrent dispatch table keyed by node type tag.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: DashMap<String, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the executor for a node type.
    pub fn register(&self, node_type: impl Into<String>, executor: Arc<dyn NodeExecutor>) {
        let node_type = node_type.into();
        debug!(node_type = %node_type, "registering node executor");
        self.executors.insert(node_type, executor);
    }

    /// Look up the executor for a node type.
    pub fn get(&self, node_type: &str) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(node_type).map(|e| e.value().clone())
    }

    pub fn contains(&self, node_type: &str) -> bool {
        self.executors.contains_key(node_type)
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use weft_kernel::executor::{NodeExecutionContext, NodeExecutionResult};
    use weft_kernel::{EngineResult, Value};

    struct NoopExecutor;

    #[async_trait]
    impl NodeExecutor for NoopExecutor {
        async fn execute(
            &self,
            ctx: &NodeExecutionContext,
        ) -> EngineResult<NodeExecutionResult> {
            Ok(NodeExecutionResult::from_output(ctx, Value::Null))
        }
    }

    #[test]
    fn register_and_lookup() {
        let registry = ExecutorRegistry::new();
        assert!(registry.is_empty());

        registry.register("transform", Arc::new(NoopExecutor));
        assert!(registry.contains("transform"));
        assert!(registry.get("transform").is_some());
        assert!(registry.get("http").is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn register_replaces_existing() {
        let registry = ExecutorRegistry::new();
        registry.register("transform", Arc::new(NoopExecutor));
        registry.register("transform", Arc::new(NoopExecutor));
        assert_eq!(registry.len(), 1);
    }
}
