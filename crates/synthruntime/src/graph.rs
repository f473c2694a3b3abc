//! Dependency graph construction and analysis.

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, VecDeque};
use synthcore::{NodeId, WorkflowDefinition};

/// Adjacency of a workflow: every declared node, plus any undeclared id a
/// connection mentions. Edge weights are the connection's position in the
/// definition so that neighbour iteration follows definition order.
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<NodeId, usize>,
    index: HashMap<NodeId, NodeIndex>,
    declared: usize,
}

/// Best-effort topological order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOrder {
    pub nodes: Vec<NodeId>,
    /// True when Kahn's algorithm could not place every node
    pub has_cycle: bool,
    /// Nodes appended in definition order after the sort stalled
    pub unordered: Vec<NodeId>,
}

impl DependencyGraph {
    pub fn build(definition: &WorkflowDefinition) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();

        for node in &definition.nodes {
            let idx = graph.add_node(node.id.clone());
            index.insert(node.id.clone(), idx);
        }
        let declared = graph.node_count();

        for (position, conn) in definition.connections.iter().enumerate() {
            let from = Self::intern(&mut graph, &mut index, &conn.source_node_id);
            let to = Self::intern(&mut graph, &mut index, &conn.target_node_id);
            graph.add_edge(from, to, position);
        }

        Self { graph, index, declared }
    }

    fn intern(graph: &mut DiGraph<NodeId, usize>, index: &mut HashMap<NodeId, NodeIndex>, id: &NodeId) -> NodeIndex {
        if let Some(idx) = index.get(id) {
            return *idx;
        }
        tracing::warn!(node_id = %id, "Connection references undeclared node");
        let idx = graph.add_node(id.clone());
        index.insert(id.clone(), idx);
        idx
    }

    fn is_declared(&self, idx: NodeIndex) -> bool {
        idx.index() < self.declared
    }

    /// Outgoing neighbours of `idx`, one entry per connection, in
    /// definition order.
    fn targets(&self, idx: NodeIndex) -> Vec<NodeIndex> {
        let mut edges: Vec<(usize, NodeIndex)> = self
            .graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (*e.weight(), e.target()))
            .collect();
        edges.sort_by_key(|(position, _)| *position);
        edges.into_iter().map(|(_, target)| target).collect()
    }

    /// Node id -> directly dependent node ids. Duplicate connections
    /// produce duplicate entries.
    pub fn adjacency(&self) -> Vec<(NodeId, Vec<NodeId>)> {
        self.graph
            .node_indices()
            .map(|idx| {
                let targets = self.targets(idx).into_iter().map(|t| self.graph[t].clone()).collect();
                (self.graph[idx].clone(), targets)
            })
            .collect()
    }

    pub fn dependents(&self, id: &str) -> Vec<NodeId> {
        match self.index.get(id) {
            Some(idx) => self.targets(*idx).into_iter().map(|t| self.graph[t].clone()).collect(),
            None => Vec::new(),
        }
    }

    pub fn in_degree(&self, id: &str) -> usize {
        self.index
            .get(id)
            .map(|idx| self.graph.edges_directed(*idx, Direction::Incoming).count())
            .unwrap_or(0)
    }

    pub fn out_degree(&self, id: &str) -> usize {
        self.index
            .get(id)
            .map(|idx| self.graph.edges_directed(*idx, Direction::Outgoing).count())
            .unwrap_or(0)
    }

    /// Ids referenced by connections but absent from the definition.
    pub fn phantom_nodes(&self) -> Vec<NodeId> {
        self.graph
            .node_indices()
            .filter(|idx| !self.is_declared(*idx))
            .map(|idx| self.graph[idx].clone())
            .collect()
    }

    /// Kahn's algorithm, seeded in definition order. On a cycle the
    /// remaining nodes are appended in definition order instead of
    /// failing. Phantom nodes never appear in the result.
    pub fn execution_order(&self) -> ExecutionOrder {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.graph.edges_directed(idx, Direction::Incoming).count())
            .collect();

        let mut queue: VecDeque<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree[idx.index()] == 0)
            .collect();

        let mut placed = vec![false; self.graph.node_count()];
        let mut sorted = Vec::with_capacity(self.graph.node_count());

        while let Some(idx) = queue.pop_front() {
            placed[idx.index()] = true;
            sorted.push(idx);
            for target in self.targets(idx) {
                let degree = &mut in_degree[target.index()];
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(target);
                }
            }
        }

        let has_cycle = sorted.len() < self.graph.node_count();
        let mut unordered = Vec::new();
        if has_cycle {
            for idx in self.graph.node_indices().filter(|idx| !placed[idx.index()]) {
                sorted.push(idx);
                if self.is_declared(idx) {
                    unordered.push(self.graph[idx].clone());
                }
            }
            tracing::warn!(nodes = ?unordered, "Cycle detected, appending remaining nodes in definition order");
        }

        ExecutionOrder {
            nodes: sorted
                .into_iter()
                .filter(|idx| self.is_declared(*idx))
                .map(|idx| self.graph[idx].clone())
                .collect(),
            has_cycle,
            unordered,
        }
    }

    /// Strongly connected components that form cycles (size > 1, or a
    /// self-loop), each listed in definition order.
    pub fn cycles(&self) -> Vec<Vec<NodeId>> {
        let mut components: Vec<Vec<NodeIndex>> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .map(|mut scc| {
                scc.sort();
                scc
            })
            .collect();
        components.sort_by_key(|scc| scc[0]);
        components
            .into_iter()
            .map(|scc| scc.into_iter().map(|idx| self.graph[idx].clone()).collect())
            .collect()
    }
}

/// Nodes with no edges at all, excluding `input` nodes. They still run.
pub fn find_isolated_nodes(definition: &WorkflowDefinition, graph: &DependencyGraph) -> Vec<NodeId> {
    definition
        .nodes
        .iter()
        .filter(|node| !node.is_input())
        .filter(|node| graph.in_degree(&node.id) == 0 && graph.out_degree(&node.id) == 0)
        .map(|node| node.id.clone())
        .collect()
}

/// The last node in `order` that is an output node; otherwise the last
/// node overall.
pub fn determine_final_output_node(order: &[NodeId], output_node_ids: &[NodeId]) -> Option<NodeId> {
    order
        .iter()
        .rev()
        .find(|id| output_node_ids.contains(id))
        .or_else(|| order.last())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use synthcore::{node_types, NodeConfig};

    fn definition(nodes: &[(&str, &str)], edges: &[(&str, &str)]) -> WorkflowDefinition {
        let mut def = WorkflowDefinition::new();
        for (id, kind) in nodes {
            def.add_node(NodeConfig::new(*id, *kind));
        }
        for (from, to) in edges {
            def.connect(*from, *to);
        }
        def
    }

    fn position(order: &[NodeId], id: &str) -> usize {
        order.iter().position(|n| n == id).unwrap()
    }

    #[test]
    fn every_declared_node_is_a_key() {
        let def = definition(&[("a", "text"), ("b", "text"), ("c", "text")], &[("a", "b"), ("a", "b")]);
        let graph = DependencyGraph::build(&def);
        let adjacency = graph.adjacency();

        assert_eq!(adjacency.len(), 3);
        assert_eq!(adjacency[0], ("a".to_string(), vec!["b".to_string(), "b".to_string()]));
        assert_eq!(adjacency[2], ("c".to_string(), vec![]));
    }

    #[test]
    fn order_respects_every_connection() {
        let def = definition(
            &[("out", "output"), ("model", "model"), ("in", "input"), ("text", "text"), ("xf", "transform")],
            &[("in", "model"), ("text", "model"), ("model", "xf"), ("xf", "out"), ("in", "out")],
        );
        let order = DependencyGraph::build(&def).execution_order();

        assert!(!order.has_cycle);
        assert_eq!(order.nodes.len(), 5);
        for conn in &def.connections {
            assert!(position(&order.nodes, &conn.source_node_id) < position(&order.nodes, &conn.target_node_id));
        }
    }

    #[test]
    fn ties_break_in_definition_order() {
        let def = definition(&[("c", "text"), ("a", "text"), ("b", "text")], &[]);
        let order = DependencyGraph::build(&def).execution_order();
        assert_eq!(order.nodes, vec!["c", "a", "b"]);
    }

    #[test]
    fn cycle_still_yields_every_node_once() {
        let def = definition(
            &[("start", "input"), ("a", "text"), ("b", "text"), ("end", "output")],
            &[("start", "a"), ("a", "b"), ("b", "a"), ("b", "end")],
        );
        let graph = DependencyGraph::build(&def);
        let order = graph.execution_order();

        assert!(order.has_cycle);
        assert_eq!(order.nodes, vec!["start", "a", "b", "end"]);
        assert_eq!(order.unordered, vec!["a", "b", "end"]);
        assert_eq!(graph.cycles(), vec![vec!["a".to_string(), "b".to_string()]]);
    }

    #[test]
    fn self_loop_is_reported_as_cycle() {
        let def = definition(&[("a", "text")], &[("a", "a")]);
        let graph = DependencyGraph::build(&def);
        assert!(graph.execution_order().has_cycle);
        assert_eq!(graph.cycles(), vec![vec!["a".to_string()]]);
    }

    #[test]
    fn phantom_endpoints_stay_out_of_the_order() {
        let def = definition(&[("a", "text"), ("b", "output")], &[("ghost", "b"), ("a", "b")]);
        let graph = DependencyGraph::build(&def);

        assert_eq!(graph.phantom_nodes(), vec!["ghost"]);
        assert_eq!(graph.dependents("ghost"), vec!["b"]);
        assert_eq!(graph.execution_order().nodes, vec!["a", "b"]);
    }

    #[test]
    fn isolated_nodes_exclude_inputs() {
        let def = definition(
            &[("in", node_types::INPUT), ("lonely", node_types::TEXT), ("a", "text"), ("b", "output")],
            &[("a", "b")],
        );
        let graph = DependencyGraph::build(&def);
        assert_eq!(find_isolated_nodes(&def, &graph), vec!["lonely"]);
    }

    #[test]
    fn final_node_prefers_last_output() {
        let order: Vec<NodeId> = ["a", "out1", "b", "out2", "c"].iter().map(|s| s.to_string()).collect();
        let outputs = vec!["out1".to_string(), "out2".to_string()];

        assert_eq!(determine_final_output_node(&order, &outputs), Some("out2".to_string()));
        assert_eq!(determine_final_output_node(&order, &[]), Some("c".to_string()));
        assert_eq!(determine_final_output_node(&[], &outputs), None);
    }
}
