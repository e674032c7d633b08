//! Read-only graph access used by every pipeline stage.

use std::collections::HashMap;

use super::types::{BlueprintInfo, GraphDocument, GraphType, HostNode, VariableDecl};
use crate::error::PipelineError;

/// Read-only view of a host graph.
///
/// The core never mutates anything reachable through this trait, so one graph
/// can be shared by several jobs translating different entry points.
pub trait GraphRef: Send + Sync {
    fn name(&self) -> &str;

    fn graph_type(&self) -> GraphType;

    fn blueprint(&self) -> Option<&BlueprintInfo>;

    /// All node ids in host order.
    fn node_ids(&self) -> Vec<&str>;

    fn node(&self, id: &str) -> Option<&HostNode>;

    fn local_variables(&self) -> &[VariableDecl];

    /// Default entry points: every event or function entry node, in host order.
    fn entry_nodes(&self) -> Vec<&str> {
        self.node_ids()
            .into_iter()
            .filter(|id| self.node(id).map(|n| n.is_entry()).unwrap_or(false))
            .collect()
    }

    /// A user graph this one can call into, looked up by name. Graphs the
    /// host does not export (engine functions) resolve to `None`.
    fn called_graph(&self, _name: &str) -> Option<&dyn GraphRef> {
        None
    }
}

/// `GraphRef` backed by a deserialized `GraphDocument`.
#[derive(Debug, Clone)]
pub struct HostGraph {
    document: GraphDocument,
    node_indices: HashMap<String, usize>,
    /// Exported subgraphs, nested ones flattened, indexed by name.
    subgraphs: Vec<HostGraph>,
    subgraph_indices: HashMap<String, usize>,
}

impl HostGraph {
    /// Index the document's nodes. Duplicate node ids are rejected; dangling
    /// pin links are left for the walker to report.
    pub fn build(mut document: GraphDocument) -> Result<Self, Vec<PipelineError>> {
        let mut errors = Vec::new();

        let mut pending = std::mem::take(&mut document.subgraphs);
        let mut subgraphs = Vec::new();
        let mut subgraph_indices = HashMap::new();
        while let Some(mut sub) = pending.pop() {
            pending.append(&mut sub.subgraphs);
            if sub.name == document.name || subgraph_indices.contains_key(&sub.name) {
                errors.push(PipelineError::parse(
                    "P003",
                    format!("Duplicate graph name '{}'", sub.name),
                    None,
                ));
                continue;
            }
            match HostGraph::build(sub) {
                Ok(graph) => {
                    subgraph_indices.insert(graph.document.name.clone(), subgraphs.len());
                    subgraphs.push(graph);
                }
                Err(mut errs) => errors.append(&mut errs),
            }
        }

        let mut node_indices = HashMap::new();

        for (idx, node) in document.nodes.iter().enumerate() {
            if node_indices.insert(node.id.clone(), idx).is_some() {
                errors.push(PipelineError::parse(
                    "P002",
                    format!("Duplicate node id '{}'", node.id),
                    Some(node.id.clone()),
                ));
            }
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        Ok(HostGraph {
            document,
            node_indices,
            subgraphs,
            subgraph_indices,
        })
    }

    pub fn document(&self) -> &GraphDocument {
        &self.document
    }
}

impl GraphRef for HostGraph {
    fn name(&self) -> &str {
        &self.document.name
    }

    fn graph_type(&self) -> GraphType {
        self.document.graph_type
    }

    fn blueprint(&self) -> Option<&BlueprintInfo> {
        self.document.blueprint.as_ref()
    }

    fn node_ids(&self) -> Vec<&str> {
        self.document.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    fn node(&self, id: &str) -> Option<&HostNode> {
        self.node_indices
            .get(id)
            .and_then(|&idx| self.document.nodes.get(idx))
    }

    fn local_variables(&self) -> &[VariableDecl] {
        &self.document.local_variables
    }

    fn called_graph(&self, name: &str) -> Option<&dyn GraphRef> {
        self.subgraph_indices
            .get(name)
            .and_then(|&idx| self.subgraphs.get(idx))
            .map(|graph| graph as &dyn GraphRef)
    }
}
