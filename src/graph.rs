//! Graph container owning the pipeline's nodes and edges

use crate::error::{PumpError, Result};
use crate::models::{Direction, Edge, Node, NodeHandle, NodeStatus};
use crate::port::PortDescriptor;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::debug;

/// Nodes live in an arena addressed by [`NodeHandle`]; every other
/// component refers to them by handle, so status changes are seen by all.
#[derive(Debug, Default)]
pub struct Pump {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    node_indices: HashMap<String, NodeHandle>,
    connected_inputs: HashSet<(NodeHandle, usize)>,
    scheduled: bool,
}

impl Pump {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, rejecting duplicate identifiers
    pub fn add_node(&mut self, node: Node) -> Result<NodeHandle> {
        if self.node_indices.contains_key(node.id()) {
            return Err(PumpError::DuplicateNode(node.id().to_string()));
        }

        let handle = NodeHandle(self.nodes.len());
        self.node_indices.insert(node.id().to_string(), handle);
        self.nodes.push(node);
        self.scheduled = false;
        Ok(handle)
    }

    /// Add an edge between existing nodes.
    ///
    /// Ports are checked against the declared arities, and an input port
    /// may only be fed once.
    pub fn add_edge(&mut self, edge: Edge) -> Result<()> {
        let source = self.try_node(edge.source)?;
        let target = self.try_node(edge.target)?;

        if edge.source_port >= source.output_arity() {
            return Err(PumpError::PortOutOfRange {
                node: source.id().to_string(),
                direction: Direction::Output,
                port: edge.source_port,
                arity: source.output_arity(),
            });
        }
        if edge.target_port >= target.input_arity() {
            return Err(PumpError::PortOutOfRange {
                node: target.id().to_string(),
                direction: Direction::Input,
                port: edge.target_port,
                arity: target.input_arity(),
            });
        }
        if self
            .connected_inputs
            .contains(&(edge.target, edge.target_port))
        {
            return Err(PumpError::PortAlreadyConnected {
                node: target.id().to_string(),
                port: edge.target_port,
            });
        }

        self.connected_inputs
            .insert((edge.target, edge.target_port));
        self.edges.push(edge);
        self.scheduled = false;
        Ok(())
    }

    /// Resolve two port descriptors against the registered nodes and add the edge
    pub fn connect(&mut self, source: &PortDescriptor, target: &PortDescriptor) -> Result<()> {
        let edge = Edge {
            source: self.require(&source.node)?,
            source_port: source.index,
            target: self.require(&target.node)?,
            target_port: target.index,
        };
        debug!("Connecting {} -> {}", source, target);
        self.add_edge(edge)
    }

    /// Look up a node by identifier
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.handle(id).map(|handle| &self.nodes[handle.0])
    }

    pub fn handle(&self, id: &str) -> Option<NodeHandle> {
        self.node_indices.get(id).copied()
    }

    fn require(&self, id: &str) -> Result<NodeHandle> {
        self.handle(id)
            .ok_or_else(|| PumpError::UnknownNode(id.to_string()))
    }

    fn try_node(&self, handle: NodeHandle) -> Result<&Node> {
        self.nodes
            .get(handle.0)
            .ok_or_else(|| PumpError::UnknownNode(format!("#{}", handle.0)))
    }

    /// Node behind a handle issued by this container.
    ///
    /// Panics on a handle from another container.
    pub fn node(&self, handle: NodeHandle) -> &Node {
        &self.nodes[handle.0]
    }

    pub(crate) fn set_status(&mut self, handle: NodeHandle, status: NodeStatus) {
        self.nodes[handle.0].set_status(status);
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn handles(&self) -> impl Iterator<Item = NodeHandle> {
        (0..self.nodes.len()).map(NodeHandle)
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Sort edges by `(source, source_port)`, keeping declaration order otherwise.
    ///
    /// Afterwards each node's outgoing edges are contiguous and port-ordered.
    pub fn sort_edges(&mut self) {
        self.edges
            .sort_by_key(|edge| (edge.source, edge.source_port));
    }

    /// Whether `edges()` is in scheduled order
    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    pub(crate) fn set_scheduled_edges(&mut self, edges: Vec<Edge>) {
        debug_assert_eq!(edges.len(), self.edges.len());
        self.edges = edges;
        self.scheduled = true;
    }

    /// Human-readable `a.out.0 -> b.in.0` form of an edge
    pub fn describe_edge(&self, edge: &Edge) -> String {
        format!(
            "{}.out.{} -> {}.in.{}",
            self.node(edge.source).id(),
            edge.source_port,
            self.node(edge.target).id(),
            edge.target_port
        )
    }

    /// Write the graph back as workflow text
    pub fn save<P: AsRef<Path>>(&self, _path: P) -> Result<()> {
        Err(PumpError::Unsupported("saving workflows"))
    }
}
