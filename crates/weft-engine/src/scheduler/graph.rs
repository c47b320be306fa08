//! Graph construction and wave computation.
//!
//! [`ExecutionGraph`] derives the scheduler's indices from a [`Workflow`]:
//! children, in-degrees and per-node incoming/outgoing edge lists. Wave
//! computation is Kahn's algorithm grouped by rounds — every node whose
//! in-degree has dropped to zero joins the current wave, so nodes within a
//! wave have no dependency edges between them and are parallel-eligible.

use std::collections::HashMap;
use weft_kernel::{Edge, EngineError, EngineResult, Workflow};

/// Scheduler-side indices over a workflow graph.
pub struct ExecutionGraph {
    /// Node ids in workflow declaration order. Waves list their members in
    /// this order, which makes the priority sort's tiebreak deterministic.
    order: Vec<String>,
    children: HashMap<String, Vec<String>>,
    in_degree: HashMap<String, usize>,
    incoming: HashMap<String, Vec<Edge>>,
    outgoing: HashMap<String, Vec<Edge>>,
}

impl ExecutionGraph {
    /// Build the indices, validating node-id uniqueness and edge endpoints.
    pub fn build(workflow: &Workflow) -> EngineResult<Self> {
        workflow.validate()?;

        let mut order = Vec::with_capacity(workflow.nodes.len());
        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        let mut in_degree: HashMap<String, usize> = HashMap::new();
        let mut incoming: HashMap<String, Vec<Edge>> = HashMap::new();
        let mut outgoing: HashMap<String, Vec<Edge>> = HashMap::new();

        for node in &workflow.nodes {
            order.push(node.id.clone());
            children.entry(node.id.clone()).or_default();
            in_degree.entry(node.id.clone()).or_insert(0);
            incoming.entry(node.id.clone()).or_default();
            outgoing.entry(node.id.clone()).or_default();
        }

        for edge in &workflow.edges {
            children
                .entry(edge.from.clone())
                .or_default()
                .push(edge.to.clone());
            *in_degree.entry(edge.to.clone()).or_insert(0) += 1;
            incoming.entry(edge.to.clone()).or_default().push(edge.clone());
            outgoing
                .entry(edge.from.clone())
                .or_default()
                .push(edge.clone());
        }

        Ok(Self {
            order,
            children,
            in_degree,
            incoming,
            outgoing,
        })
    }

    pub fn incoming_edges(&self, node_id: &str) -> &[Edge] {
        self.incoming.get(node_id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn outgoing_edges(&self, node_id: &str) -> &[Edge] {
        self.outgoing.get(node_id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Parent node ids, one per incoming edge.
    pub fn parents(&self, node_id: &str) -> Vec<&str> {
        self.incoming_edges(node_id)
            .iter()
            .map(|e| e.from.as_str())
            .collect()
    }

    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    /// Group the nodes into dependency waves.
    ///
    /// Round-grouped Kahn's algorithm: collect every node with current
    /// in-degree zero into a wave, remove them, decrement their children,
    /// repeat. Fails with [`EngineError::CycleDetected`] when no progress
    /// can be made with nodes left over.
    pub fn compute_waves(&self) -> EngineResult<Vec<Vec<String>>> {
        let mut in_degree = self.in_degree.clone();
        let mut remaining = self.order.len();
        let mut waves = Vec::new();

        while remaining > 0 {
            let wave: Vec<String> = self
                .order
                .iter()
                .filter(|id| in_degree.get(id.as_str()) == Some(&0))
                .cloned()
                .collect();

            if wave.is_empty() {
                return Err(EngineError::CycleDetected);
            }

            for node_id in &wave {
                in_degree.remove(node_id.as_str());
                if let Some(children) = self.children.get(node_id.as_str()) {
                    for child in children {
                        if let Some(degree) = in_degree.get_mut(child.as_str()) {
                            *degree = degree.saturating_sub(1);
                        }
                    }
                }
            }

            remaining -= wave.len();
            waves.push(wave);
        }

        Ok(waves)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_kernel::Node;

    fn transform(id: &str) -> Node {
        Node::new(id, id, "transform")
    }

    #[test]
    fn linear_chain_one_node_per_wave() {
        let wf = Workflow::new("wf", "Linear")
            .with_node(transform("a"))
            .with_node(transform("b"))
            .with_node(transform("c"))
            .connect("a", "b")
            .connect("b", "c");

        let graph = ExecutionGraph::build(&wf).unwrap();
        let waves = graph.compute_waves().unwrap();
        assert_eq!(
            waves,
            vec![
                vec!["a".to_string()],
                vec!["b".to_string()],
                vec!["c".to_string()],
            ]
        );
    }

    #[test]
    fn fork_join_groups_the_middle_wave() {
        let wf = Workflow::new("wf", "ForkJoin")
            .with_node(transform("s"))
            .with_node(transform("t1"))
            .with_node(transform("t2"))
            .with_node(transform("t3"))
            .with_node(transform("j"))
            .connect("s", "t1")
            .connect("s", "t2")
            .connect("s", "t3")
            .connect("t1", "j")
            .connect("t2", "j")
            .connect("t3", "j");

        let graph = ExecutionGraph::build(&wf).unwrap();
        let waves = graph.compute_waves().unwrap();
        assert_eq!(waves.len(), 3);
        assert_eq!(waves[0], vec!["s".to_string()]);
        assert_eq!(
            waves[1],
            vec!["t1".to_string(), "t2".to_string(), "t3".to_string()]
        );
        assert_eq!(waves[2], vec!["j".to_string()]);
    }

    #[test]
    fn disconnected_nodes_join_the_first_wave() {
        let wf = Workflow::new("wf", "Islands")
            .with_node(transform("a"))
            .with_node(transform("b"))
            .with_node(transform("c"))
            .connect("a", "c");

        let graph = ExecutionGraph::build(&wf).unwrap();
        let waves = graph.compute_waves().unwrap();
        assert_eq!(waves[0], vec!["a".to_string(), "b".to_string()]);
        assert_eq!(waves[1], vec!["c".to_string()]);
    }

    #[test]
    fn cycle_is_detected() {
        let wf = Workflow::new("wf", "Cycle")
            .with_node(transform("a"))
            .with_node(transform("b"))
            .with_node(transform("c"))
            .connect("a", "b")
            .connect("b", "c")
            .connect("c", "a");

        let graph = ExecutionGraph::build(&wf).unwrap();
        assert!(matches!(
            graph.compute_waves(),
            Err(EngineError::CycleDetected)
        ));
    }

    #[test]
    fn self_loop_is_a_cycle() {
        let wf = Workflow::new("wf", "SelfLoop")
            .with_node(transform("a"))
            .connect("a", "a");

        let graph = ExecutionGraph::build(&wf).unwrap();
        assert!(matches!(
            graph.compute_waves(),
            Err(EngineError::CycleDetected)
        ));
    }

    #[test]
    fn indices_reflect_edges() {
        let wf = Workflow::new("wf", "Indexed")
            .with_node(transform("a"))
            .with_node(transform("b"))
            .with_node(transform("c"))
            .connect("a", "c")
            .connect("b", "c");

        let graph = ExecutionGraph::build(&wf).unwrap();
        assert_eq!(graph.parents("c"), vec!["a", "b"]);
        assert!(graph.parents("a").is_empty());
        assert_eq!(graph.outgoing_edges("a").len(), 1);
        assert_eq!(graph.incoming_edges("c").len(), 2);
    }
}
