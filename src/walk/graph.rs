//! petgraph-based dependency graph derived from host pin links.

use std::collections::{HashMap, HashSet};

use petgraph::Direction;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;

use super::WalkError;
use crate::parse::types::PinDirection;
use crate::parse::GraphRef;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeLabel {
    pub source_pin: String,
    pub target_pin: String,
    pub exec: bool,
}

/// Directed graph where an edge `a → b` means "`a` feeds `b`": either an exec
/// output of `a` wired to `b`, or a data output of `a` read by `b`.
pub struct DependencyGraph {
    pub graph: DiGraph<String, EdgeLabel>,
    pub node_indices: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Links may be recorded on either endpoint; each physical wire becomes
    /// exactly one edge. Links to unknown nodes or pins are integrity errors.
    pub fn build(source: &dyn GraphRef) -> Result<Self, WalkError> {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();

        for id in source.node_ids() {
            let idx = graph.add_node(id.to_string());
            node_indices.insert(id.to_string(), idx);
        }

        let mut seen: HashSet<(String, String, String, String)> = HashSet::new();

        for id in source.node_ids() {
            let Some(node) = source.node(id) else {
                continue;
            };
            for pin in &node.pins {
                for link in &pin.links {
                    let Some(other) = source.node(&link.node) else {
                        return Err(WalkError::DanglingLink {
                            node: node.id.clone(),
                            pin: pin.id.clone(),
                            missing: link.node.clone(),
                        });
                    };
                    if other.pin(&link.pin).is_none() {
                        return Err(WalkError::DanglingPin {
                            node: node.id.clone(),
                            pin: pin.id.clone(),
                            target: link.node.clone(),
                            missing_pin: link.pin.clone(),
                        });
                    }

                    let (src, src_pin, dst, dst_pin) = match pin.direction {
                        PinDirection::Output => (&node.id, &pin.id, &link.node, &link.pin),
                        PinDirection::Input => (&link.node, &link.pin, &node.id, &pin.id),
                    };
                    let key = (src.clone(), src_pin.clone(), dst.clone(), dst_pin.clone());
                    if !seen.insert(key) {
                        continue;
                    }

                    graph.add_edge(
                        node_indices[src.as_str()],
                        node_indices[dst.as_str()],
                        EdgeLabel {
                            source_pin: src_pin.clone(),
                            target_pin: dst_pin.clone(),
                            exec: pin.is_exec(),
                        },
                    );
                }
            }
        }

        Ok(DependencyGraph {
            graph,
            node_indices,
        })
    }

    pub fn index(&self, id: &str) -> Option<NodeIndex> {
        self.node_indices.get(id).copied()
    }

    pub fn id(&self, idx: NodeIndex) -> &str {
        self.graph[idx].as_str()
    }

    /// Edges in a stable order (insertion order), independent of petgraph's
    /// internal adjacency ordering.
    pub fn edges(&self, idx: NodeIndex, direction: Direction) -> Vec<EdgeIndex> {
        let mut edges: Vec<EdgeIndex> = self
            .graph
            .edges_directed(idx, direction)
            .map(|e| e.id())
            .collect();
        edges.sort();
        edges
    }

    pub fn endpoints(&self, edge: EdgeIndex) -> Option<(NodeIndex, NodeIndex)> {
        self.graph.edge_endpoints(edge)
    }

    pub fn label(&self, edge: EdgeIndex) -> &EdgeLabel {
        &self.graph[edge]
    }

    /// Pin-level view of every edge, in insertion order.
    pub fn link_index(&self) -> LinkIndex {
        let mut index = LinkIndex::default();
        for edge in self.graph.edge_indices() {
            let Some((s, t)) = self.endpoints(edge) else {
                continue;
            };
            let label = self.label(edge);
            let source = PinEnd {
                node: self.id(s).to_string(),
                pin: label.source_pin.clone(),
            };
            let target = PinEnd {
                node: self.id(t).to_string(),
                pin: label.target_pin.clone(),
            };
            index
                .incoming
                .entry((target.node.clone(), target.pin.clone()))
                .or_default()
                .push(source.clone());
            index
                .outgoing
                .entry((source.node, source.pin))
                .or_default()
                .push(target);
        }
        index
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PinEnd {
    pub node: String,
    pub pin: String,
}

/// Deduplicated links keyed by pin, regardless of which endpoint recorded them.
#[derive(Debug, Clone, Default)]
pub struct LinkIndex {
    incoming: HashMap<(String, String), Vec<PinEnd>>,
    outgoing: HashMap<(String, String), Vec<PinEnd>>,
}

impl LinkIndex {
    /// Output pins wired into `node.pin`.
    pub fn sources(&self, node: &str, pin: &str) -> &[PinEnd] {
        self.incoming
            .get(&(node.to_string(), pin.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Input pins `node.pin` is wired to.
    pub fn targets(&self, node: &str, pin: &str) -> &[PinEnd] {
        self.outgoing
            .get(&(node.to_string(), pin.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
