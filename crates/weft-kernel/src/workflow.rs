//! Workflow graph description.
//!
//! A [`Workflow`] is an immutable bag of [`Node`]s and [`Edge`]s plus
//! declared variables and opaque metadata. It is externally owned and
//! read-only for the duration of one execution; the scheduler derives its
//! own indices from it.

use crate::error::{EngineError, EngineResult};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Edge variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Plain dependency edge.
    #[default]
    Direct,
    /// Edge guarded by a boolean expression and/or a source handle.
    Conditional,
    /// Fan-out edge from a splitting node.
    Parallel,
    /// Fan-in edge into an aggregating node.
    Join,
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    /// Source node id.
    pub from: String,
    /// Target node id.
    pub to: String,
    /// Edge variant.
    #[serde(default)]
    pub kind: EdgeKind,
    /// Optional boolean expression evaluated against the source output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Branch handle, honored when the source node has type `conditional`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    /// Extra node ids whose outputs become visible to the target's inputs.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub include_outputs_from: Vec<String>,
}

impl Edge {
    pub fn direct(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind: EdgeKind::Direct,
            condition: None,
            source_handle: None,
            include_outputs_from: Vec::new(),
        }
    }

    pub fn conditional(
        from: impl Into<String>,
        to: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            kind: EdgeKind::Conditional,
            condition: Some(condition.into()),
            source_handle: None,
            include_outputs_from: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: EdgeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_source_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    pub fn with_include_outputs_from(
        mut self,
        node_ids: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.include_outputs_from = node_ids.into_iter().map(Into::into).collect();
        self
    }
}

/// A single computation node.
///
/// The `node_type` tag is an open set (`start`, `end`, `transform`, `http`,
/// `llm`, `conditional`, `aggregator`, `script`, …) dispatched through the
/// executor registry; the scheduler itself only gives `conditional` sources
/// special treatment in the edge gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Identifier, unique within the workflow.
    pub id: String,
    /// Human-readable name, used for the published output key.
    pub name: String,
    /// Type tag dispatched through the executor registry.
    #[serde(rename = "type")]
    pub node_type: String,
    /// Configuration tree, resolved by the template engine before execution.
    #[serde(default)]
    pub config: Value,
    /// Launch-order tiebreak within a wave (higher first).
    #[serde(default)]
    pub priority: i32,
    /// Per-node timeout in milliseconds. Overrides the execution-wide
    /// node timeout when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl Node {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        node_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            node_type: node_type.into(),
            config: Value::Null,
            priority: 0,
            timeout_ms: None,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// The key this node's output is published under: the `output_key`
    /// string in the original config when present and non-empty, otherwise
    /// `{name}_output`.
    pub fn output_key(&self) -> String {
        if let Some(key) = self.config.get("output_key").and_then(|v| v.as_str())
            && !key.is_empty()
        {
            return key.to_string();
        }
        format!("{}_output", self.name)
    }
}

/// An immutable workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Initial workflow-scope variables.
    #[serde(default)]
    pub variables: HashMap<String, Value>,
    /// Opaque metadata, not interpreted by the engine.
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl Workflow {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
            variables: HashMap::new(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.edges.push(edge);
        self
    }

    /// Add a direct edge.
    pub fn connect(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.with_edge(Edge::direct(from, to))
    }

    /// Add a conditional edge.
    pub fn connect_conditional(
        self,
        from: impl Into<String>,
        to: impl Into<String>,
        condition: impl Into<String>,
    ) -> Self {
        self.with_edge(Edge::conditional(from, to, condition))
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Structural preflight: node ids are unique and every edge endpoint
    /// references an existing node. Acyclicity is checked separately by the
    /// scheduler's wave computation.
    pub fn validate(&self) -> EngineResult<()> {
        let mut seen: HashSet<&str> = HashSet::new();
        for node in &self.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(EngineError::DuplicateNode(node.id.clone()));
            }
        }

        for edge in &self.edges {
            if !seen.contains(edge.from.as_str()) {
                return Err(EngineError::DanglingEdge {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    side: "source",
                });
            }
            if !seen.contains(edge.to.as_str()) {
                return Err(EngineError::DanglingEdge {
                    from: edge.from.clone(),
                    to: edge.to.clone(),
                    side: "target",
                });
            }
        }

        Ok(())
    }
}
