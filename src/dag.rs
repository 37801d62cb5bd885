//! Dependency scheduler: ready-count ordering of a pipeline's edges

use crate::error::{PumpError, Result};
use crate::graph::Pump;
use crate::models::{Edge, NodeHandle};
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

/// Per-node count of satisfied inputs.
///
/// Shared by the scheduler and the execution driver so both replay the
/// same bookkeeping.
#[derive(Debug, Default)]
pub struct ReadyCounter {
    satisfied: HashMap<NodeHandle, usize>,
}

impl ReadyCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one satisfied input of `target`.
    ///
    /// Returns `true` when this was the last of its `arity` inputs; the
    /// counter is reset at that point.
    pub fn satisfy(&mut self, target: NodeHandle, arity: usize) -> bool {
        let count = self.satisfied.entry(target).or_insert(0);
        *count += 1;
        if *count == arity {
            *count = 0;
            true
        } else {
            false
        }
    }

    /// Inputs of `target` satisfied so far
    pub fn satisfied(&self, target: NodeHandle) -> usize {
        self.satisfied.get(&target).copied().unwrap_or(0)
    }
}

/// Edge order plus the node visitation order it implies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    pub edges: Vec<Edge>,
    pub order: Vec<NodeHandle>,
}

/// Result of a scheduling pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleOutcome {
    /// Every node is reachable
    Scheduled(Schedule),
    /// Some nodes never get all of their inputs
    Unreachable { nodes: Vec<String> },
    /// Some nodes wait on each other
    CyclicDependency { cycle: String, nodes: Vec<String> },
}

impl ScheduleOutcome {
    pub fn into_result(self) -> Result<Schedule> {
        match self {
            ScheduleOutcome::Scheduled(schedule) => Ok(schedule),
            ScheduleOutcome::Unreachable { nodes } => Err(PumpError::UnreachableNodes(nodes)),
            ScheduleOutcome::CyclicDependency { cycle, .. } => {
                Err(PumpError::CycleDetected(cycle))
            }
        }
    }
}

/// Compute the ready-count order of `pump`'s edges.
///
/// Expects each node's outgoing edges to be contiguous and port-ordered
/// (see [`Pump::sort_edges`]). Source nodes seed a FIFO queue in arena
/// order; popping a node emits its outgoing edges and enqueues every target
/// whose satisfied-input count reaches its input arity.
pub fn schedule(pump: &Pump) -> ScheduleOutcome {
    let node_count = pump.nodes().len();

    let mut outgoing: Vec<Vec<Edge>> = vec![Vec::new(); node_count];
    for edge in pump.edges() {
        outgoing[edge.source.index()].push(*edge);
    }

    let mut counter = ReadyCounter::new();
    let mut enqueued = vec![false; node_count];
    let mut queue = VecDeque::new();

    for handle in pump.handles() {
        if pump.node(handle).is_source() {
            enqueued[handle.index()] = true;
            queue.push_back(handle);
        }
    }

    let mut edges = Vec::with_capacity(pump.edges().len());
    let mut order = Vec::with_capacity(node_count);

    while let Some(handle) = queue.pop_front() {
        order.push(handle);

        for edge in &outgoing[handle.index()] {
            edges.push(*edge);

            let target = pump.node(edge.target);
            if counter.satisfy(edge.target, target.input_arity()) && !enqueued[edge.target.index()]
            {
                debug!("Node '{}' is ready", target.id());
                enqueued[edge.target.index()] = true;
                queue.push_back(edge.target);
            }
        }
    }

    let residual: Vec<NodeHandle> = pump
        .handles()
        .filter(|handle| !enqueued[handle.index()])
        .collect();

    if residual.is_empty() {
        info!(
            "Scheduled {} nodes and {} edges",
            order.len(),
            edges.len()
        );
        return ScheduleOutcome::Scheduled(Schedule { edges, order });
    }

    let nodes: Vec<String> = residual
        .iter()
        .map(|&handle| pump.node(handle).id().to_string())
        .collect();

    let residual_graph = residual_graph(pump, &residual);
    if is_cyclic_directed(&residual_graph) {
        ScheduleOutcome::CyclicDependency {
            cycle: find_cycle(&residual_graph),
            nodes,
        }
    } else {
        ScheduleOutcome::Unreachable { nodes }
    }
}

/// Schedule `pump` and store the edge order in it
pub fn schedule_pump(pump: &mut Pump) -> Result<Schedule> {
    let schedule = schedule(pump).into_result()?;
    pump.set_scheduled_edges(schedule.edges.clone());
    Ok(schedule)
}

/// Subgraph of the nodes that were never enqueued
fn residual_graph(pump: &Pump, residual: &[NodeHandle]) -> DiGraph<String, ()> {
    let mut graph = DiGraph::new();
    let mut indices = HashMap::new();

    for &handle in residual {
        let index = graph.add_node(pump.node(handle).id().to_string());
        indices.insert(handle, index);
    }

    for edge in pump.edges() {
        if let (Some(&from), Some(&to)) = (indices.get(&edge.source), indices.get(&edge.target)) {
            graph.add_edge(from, to, ());
        }
    }

    graph
}

/// Find a cycle in the graph for error reporting
fn find_cycle(graph: &DiGraph<String, ()>) -> String {
    let mut visited = HashMap::new();
    let mut path = Vec::new();

    for node in graph.node_indices() {
        if !visited.contains_key(&node) {
            if let Some(cycle) = dfs_find_cycle(graph, node, &mut visited, &mut path) {
                return cycle;
            }
        }
    }

    "Unknown cycle".to_string()
}

fn dfs_find_cycle(
    graph: &DiGraph<String, ()>,
    node: NodeIndex,
    visited: &mut HashMap<NodeIndex, bool>,
    path: &mut Vec<NodeIndex>,
) -> Option<String> {
    if let Some(&in_path) = visited.get(&node) {
        if in_path {
            let start = path.iter().position(|&n| n == node).unwrap_or(0);
            let mut names: Vec<&str> = path[start..].iter().map(|&n| graph[n].as_str()).collect();
            names.push(graph[node].as_str());
            return Some(names.join(" -> "));
        }
        return None;
    }

    visited.insert(node, true);
    path.push(node);

    for neighbor in graph.neighbors(node) {
        if let Some(cycle) = dfs_find_cycle(graph, neighbor, visited, path) {
            return Some(cycle);
        }
    }

    path.pop();
    visited.insert(node, false);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::tests::test_node;
    use crate::port::PortDescriptor;

    fn build(nodes: &[(&str, usize, usize)], edges: &[(&str, &str)]) -> Pump {
        let mut pump = Pump::new();
        for &(id, inputs, outputs) in nodes {
            pump.add_node(test_node(id, inputs, outputs)).unwrap();
        }
        for &(source, target) in edges {
            pump.connect(
                &PortDescriptor::parse(source).unwrap(),
                &PortDescriptor::parse(target).unwrap(),
            )
            .unwrap();
        }
        pump.sort_edges();
        pump
    }

    fn ids(pump: &Pump, order: &[NodeHandle]) -> Vec<String> {
        order
            .iter()
            .map(|&h| pump.node(h).id().to_string())
            .collect()
    }

    fn described(pump: &Pump, edges: &[Edge]) -> Vec<String> {
        edges.iter().map(|e| pump.describe_edge(e)).collect()
    }

    #[test]
    fn test_ready_counter_resets_at_arity() {
        let mut counter = ReadyCounter::new();
        let node = NodeHandle(0);
        assert!(!counter.satisfy(node, 2));
        assert_eq!(counter.satisfied(node), 1);
        assert!(counter.satisfy(node, 2));
        assert_eq!(counter.satisfied(node), 0);
    }

    #[test]
    fn test_linear_chain() {
        let pump = build(
            &[("c", 1, 1), ("b", 1, 1), ("a", 0, 1)],
            &[("b.out.0", "c.in.0"), ("a.out.0", "b.in.0")],
        );

        let schedule = schedule(&pump).into_result().unwrap();
        assert_eq!(ids(&pump, &schedule.order), vec!["a", "b", "c"]);
        assert_eq!(
            described(&pump, &schedule.edges),
            vec!["a.out.0 -> b.in.0", "b.out.0 -> c.in.0"]
        );
    }

    #[test]
    fn test_diamond() {
        let pump = build(
            &[("a", 0, 1), ("b", 1, 1), ("c", 1, 1), ("d", 2, 1)],
            &[
                ("a.out.0", "b.in.0"),
                ("a.out.0", "c.in.0"),
                ("c.out.0", "d.in.1"),
                ("b.out.0", "d.in.0"),
            ],
        );

        let schedule = schedule(&pump).into_result().unwrap();
        assert_eq!(ids(&pump, &schedule.order), vec!["a", "b", "c", "d"]);
        assert_eq!(
            described(&pump, &schedule.edges),
            vec![
                "a.out.0 -> b.in.0",
                "a.out.0 -> c.in.0",
                "b.out.0 -> d.in.0",
                "c.out.0 -> d.in.1",
            ]
        );
    }

    #[test]
    fn test_outgoing_edges_stay_contiguous_and_port_ordered() {
        let pump = build(
            &[("s", 0, 3), ("x", 1, 1), ("y", 1, 1), ("z", 1, 1)],
            &[
                ("s.out.2", "z.in.0"),
                ("s.out.0", "x.in.0"),
                ("s.out.1", "y.in.0"),
            ],
        );

        let schedule = schedule(&pump).into_result().unwrap();
        assert_eq!(
            described(&pump, &schedule.edges),
            vec![
                "s.out.0 -> x.in.0",
                "s.out.1 -> y.in.0",
                "s.out.2 -> z.in.0",
            ]
        );
        assert_eq!(ids(&pump, &schedule.order), vec!["s", "x", "y", "z"]);
    }

    #[test]
    fn test_sources_seed_queue_in_arena_order() {
        let pump = build(
            &[("t", 2, 1), ("s2", 0, 1), ("s1", 0, 1)],
            &[("s1.out.0", "t.in.0"), ("s2.out.0", "t.in.1")],
        );

        let schedule = schedule(&pump).into_result().unwrap();
        assert_eq!(ids(&pump, &schedule.order), vec!["s2", "s1", "t"]);
        // t only becomes ready with its second input
        assert_eq!(
            described(&pump, &schedule.edges),
            vec!["s2.out.0 -> t.in.1", "s1.out.0 -> t.in.0"]
        );
    }

    #[test]
    fn test_two_node_cycle_rejected() {
        let pump = build(
            &[("A", 1, 1), ("B", 1, 1)],
            &[("A.out.0", "B.in.0"), ("B.out.0", "A.in.0")],
        );

        match schedule(&pump) {
            ScheduleOutcome::CyclicDependency { cycle, nodes } => {
                assert!(cycle.contains('A') && cycle.contains('B'));
                assert_eq!(nodes, vec!["A", "B"]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
        assert!(matches!(
            schedule(&pump).into_result(),
            Err(PumpError::CycleDetected(_))
        ));
    }

    #[test]
    fn test_cycle_behind_source_rejected() {
        let pump = build(
            &[("s", 0, 1), ("a", 2, 1), ("b", 1, 1)],
            &[
                ("s.out.0", "a.in.0"),
                ("a.out.0", "b.in.0"),
                ("b.out.0", "a.in.1"),
            ],
        );

        match schedule(&pump) {
            ScheduleOutcome::CyclicDependency { cycle, nodes } => {
                assert_eq!(nodes, vec!["a", "b"]);
                let hops: Vec<&str> = cycle.split(" -> ").collect();
                assert_eq!(hops.first(), hops.last());
                assert_eq!(hops.len(), 3);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_unreachable_nodes_reported() {
        // b declares two inputs but only one is connected; c waits on b
        let pump = build(
            &[("a", 0, 1), ("b", 2, 1), ("c", 1, 1)],
            &[("a.out.0", "b.in.0"), ("b.out.0", "c.in.0")],
        );

        assert_eq!(
            schedule(&pump),
            ScheduleOutcome::Unreachable {
                nodes: vec!["b".to_string(), "c".to_string()]
            }
        );
    }

    #[test]
    fn test_disconnected_sources() {
        let pump = build(&[("a", 0, 1), ("b", 0, 1), ("c", 0, 1)], &[]);
        let schedule = schedule(&pump).into_result().unwrap();
        assert_eq!(schedule.order.len(), 3);
        assert!(schedule.edges.is_empty());
    }

    #[test]
    fn test_replay_visits_every_node_once_after_its_inputs() {
        // Layered graph: each node of layer n reads one output of every node
        // in layer n - 1.
        let layers = [3usize, 4, 2, 3];
        let mut nodes = Vec::new();
        let mut edges = Vec::new();
        for (layer, &width) in layers.iter().enumerate() {
            let inputs = if layer == 0 { 0 } else { layers[layer - 1] };
            let outputs = layers.get(layer + 1).copied().unwrap_or(1);
            for i in 0..width {
                nodes.push((format!("n{}_{}", layer, i), inputs, outputs));
                if layer > 0 {
                    for j in 0..inputs {
                        edges.push((
                            format!("n{}_{}.out.{}", layer - 1, j, i),
                            format!("n{}_{}.in.{}", layer, i, j),
                        ));
                    }
                }
            }
        }
        let node_refs: Vec<(&str, usize, usize)> =
            nodes.iter().map(|(id, i, o)| (id.as_str(), *i, *o)).collect();
        let edge_refs: Vec<(&str, &str)> =
            edges.iter().map(|(s, t)| (s.as_str(), t.as_str())).collect();
        let pump = build(&node_refs, &edge_refs);

        let schedule = schedule(&pump).into_result().unwrap();
        assert_eq!(schedule.edges.len(), pump.edges().len());

        let mut visited: Vec<NodeHandle> = pump
            .handles()
            .filter(|&h| pump.node(h).is_source())
            .collect();
        let mut counter = ReadyCounter::new();
        for edge in &schedule.edges {
            assert!(
                visited.contains(&edge.source),
                "edge {} appears before its source ran",
                pump.describe_edge(edge)
            );
            if counter.satisfy(edge.target, pump.node(edge.target).input_arity()) {
                assert!(!visited.contains(&edge.target));
                visited.push(edge.target);
            }
        }

        assert_eq!(visited.len(), pump.nodes().len());
        assert_eq!(visited, schedule.order);
    }
}
