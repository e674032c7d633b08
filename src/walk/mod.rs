//! Graph walker: host graph → acyclic traversal order.
//!
//! Produces an order in which every producer appears before its consumers.
//! Cycles are broken by an iterative three-color DFS: an edge into a node that
//! is still in progress is a back-edge, left out of the ordering and reported
//! so the serializer can rewrite it into a loop-carried variable.

pub mod graph;

use std::collections::{HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::graph::{EdgeIndex, NodeIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Diagnostic, DiagnosticKind, Severity};
use crate::parse::GraphRef;
pub use graph::{DependencyGraph, EdgeLabel, LinkIndex, PinEnd};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalkError {
    #[error("No entry nodes to walk from")]
    NoEntries,
    #[error("Entry node '{0}' does not exist in the graph")]
    UnknownEntry(String),
    #[error("Pin '{pin}' on node '{node}' links to unknown node '{missing}'")]
    DanglingLink {
        node: String,
        pin: String,
        missing: String,
    },
    #[error("Pin '{pin}' on node '{node}' links to unknown pin '{missing_pin}' on node '{target}'")]
    DanglingPin {
        node: String,
        pin: String,
        target: String,
        missing_pin: String,
    },
}

impl WalkError {
    pub fn code(&self) -> &'static str {
        match self {
            WalkError::NoEntries => "W001",
            WalkError::UnknownEntry(_) => "W002",
            WalkError::DanglingLink { .. } => "W003",
            WalkError::DanglingPin { .. } => "W004",
        }
    }

    pub fn node_id(&self) -> Option<&str> {
        match self {
            WalkError::NoEntries => None,
            WalkError::UnknownEntry(id) => Some(id),
            WalkError::DanglingLink { node, .. } | WalkError::DanglingPin { node, .. } => {
                Some(node)
            }
        }
    }
}

/// An edge that closes a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BackEdge {
    pub source: String,
    pub source_pin: String,
    pub target: String,
    pub target_pin: String,
    pub exec: bool,
}

#[derive(Debug, Clone, Default)]
pub struct WalkOutput {
    /// Reachable node ids, producers first.
    pub order: Vec<String>,
    pub back_edges: Vec<BackEdge>,
    /// Nodes not reachable from any entry, in host order.
    pub unreachable: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
    pub links: LinkIndex,
}

impl WalkOutput {
    pub fn is_back_edge(&self, source: &str, source_pin: &str, target: &str, target_pin: &str) -> bool {
        self.back_edges.iter().any(|e| {
            e.source == source
                && e.source_pin == source_pin
                && e.target == target
                && e.target_pin == target_pin
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// Walk `source` from `entries`; an empty entry list means the graph's own
/// entry nodes.
pub fn walk(source: &dyn GraphRef, entries: &[String]) -> Result<WalkOutput, WalkError> {
    let deps = DependencyGraph::build(source)?;

    let entry_ids: Vec<String> = if entries.is_empty() {
        source.entry_nodes().into_iter().map(str::to_string).collect()
    } else {
        entries.to_vec()
    };
    if entry_ids.is_empty() {
        return Err(WalkError::NoEntries);
    }

    let mut roots = Vec::new();
    for id in &entry_ids {
        let idx = deps
            .index(id)
            .ok_or_else(|| WalkError::UnknownEntry(id.clone()))?;
        if !roots.contains(&idx) {
            roots.push(idx);
        }
    }

    let reachable = collect_reachable(&deps, &roots);

    // Reverse post-order puts the last finished root first, so roots are
    // visited back to front: pure producers reached only through data reads
    // (host order), then the entries.
    let mut dfs_roots: Vec<NodeIndex> = roots.iter().rev().copied().collect();
    let extras: Vec<NodeIndex> = deps
        .graph
        .node_indices()
        .filter(|idx| reachable.contains(idx) && !roots.contains(idx))
        .collect();
    dfs_roots.extend(extras.into_iter().rev());

    let (postorder, back_edge_ids) = three_color_dfs(&deps, &dfs_roots, &reachable);

    let order: Vec<String> = postorder
        .iter()
        .rev()
        .map(|&idx| deps.id(idx).to_string())
        .collect();

    let mut output = WalkOutput {
        order,
        links: deps.link_index(),
        ..WalkOutput::default()
    };

    for edge in back_edge_ids {
        let Some((s, t)) = deps.endpoints(edge) else {
            continue;
        };
        let label = deps.label(edge);
        let back = BackEdge {
            source: deps.id(s).to_string(),
            source_pin: label.source_pin.clone(),
            target: deps.id(t).to_string(),
            target_pin: label.target_pin.clone(),
            exec: label.exec,
        };
        debug!(source = %back.source, target = %back.target, exec = back.exec, "back-edge detected");
        output.diagnostics.push(
            Diagnostic::new(
                DiagnosticKind::BackEdge,
                Severity::Info,
                format!(
                    "Cycle closed by link {}.{} -> {}.{}",
                    back.source, back.source_pin, back.target, back.target_pin
                ),
            )
            .at_node(back.target.clone()),
        );
        output.back_edges.push(back);
    }

    for idx in deps.graph.node_indices() {
        if !reachable.contains(&idx) {
            let id = deps.id(idx).to_string();
            output.diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::UnreachableNode,
                    Severity::Warning,
                    format!("Node '{}' is not reachable from any entry node", id),
                )
                .at_node(id.clone()),
            );
            output.unreachable.push(id);
        }
    }

    if !output.unreachable.is_empty() {
        warn!(
            graph = source.name(),
            count = output.unreachable.len(),
            "unreachable nodes excluded from translation"
        );
    }

    Ok(output)
}

/// Forward reachability from the entries, plus the data producers of every
/// reached node. Producers are only expanded backwards: pulling in a value
/// does not pull in the exec chain that follows its producer.
fn collect_reachable(deps: &DependencyGraph, roots: &[NodeIndex]) -> HashSet<NodeIndex> {
    let mut forward: HashSet<NodeIndex> = HashSet::new();
    let mut reachable: HashSet<NodeIndex> = HashSet::new();
    let mut queue: VecDeque<(NodeIndex, bool)> = roots.iter().map(|&r| (r, true)).collect();

    while let Some((idx, is_forward)) = queue.pop_front() {
        if is_forward {
            if !forward.insert(idx) {
                continue;
            }
        } else if reachable.contains(&idx) {
            continue;
        }
        reachable.insert(idx);

        if is_forward {
            for edge in deps.edges(idx, Direction::Outgoing) {
                if let Some((_, target)) = deps.endpoints(edge) {
                    queue.push_back((target, true));
                }
            }
        }
        for edge in deps.edges(idx, Direction::Incoming) {
            if deps.label(edge).exec {
                continue;
            }
            if let Some((producer, _)) = deps.endpoints(edge) {
                queue.push_back((producer, false));
            }
        }
    }

    reachable
}

struct Frame {
    node: NodeIndex,
    edges: Vec<EdgeIndex>,
    next: usize,
}

/// Iterative DFS over reachable nodes. Returns the post-order and the edges
/// that pointed at an in-progress node. Successors are pushed last-pin-first
/// so that, once reversed, the first pin's subtree comes first.
fn three_color_dfs(
    deps: &DependencyGraph,
    roots: &[NodeIndex],
    reachable: &HashSet<NodeIndex>,
) -> (Vec<NodeIndex>, Vec<EdgeIndex>) {
    let mut color: HashMap<NodeIndex, Color> = HashMap::new();
    let mut postorder = Vec::new();
    let mut back_edges = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    let color_of = |color: &HashMap<NodeIndex, Color>, idx: NodeIndex| {
        color.get(&idx).copied().unwrap_or(Color::White)
    };

    for &root in roots {
        if color_of(&color, root) != Color::White {
            continue;
        }
        color.insert(root, Color::Gray);
        stack.push(Frame {
            node: root,
            edges: successors(deps, root),
            next: 0,
        });

        while let Some(frame) = stack.last_mut() {
            if frame.next < frame.edges.len() {
                let edge = frame.edges[frame.next];
                frame.next += 1;

                let Some((_, target)) = deps.endpoints(edge) else {
                    continue;
                };
                if !reachable.contains(&target) {
                    continue;
                }
                match color_of(&color, target) {
                    Color::White => {
                        color.insert(target, Color::Gray);
                        stack.push(Frame {
                            node: target,
                            edges: successors(deps, target),
                            next: 0,
                        });
                    }
                    Color::Gray => back_edges.push(edge),
                    Color::Black => {}
                }
            } else {
                let node = frame.node;
                stack.pop();
                color.insert(node, Color::Black);
                postorder.push(node);
            }
        }
    }

    (postorder, back_edges)
}

fn successors(deps: &DependencyGraph, idx: NodeIndex) -> Vec<EdgeIndex> {
    let mut edges = deps.edges(idx, Direction::Outgoing);
    edges.reverse();
    edges
}
