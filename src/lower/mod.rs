//! Assembly phase: walked + serialized graph → IrDocument.
//!
//! Aggregates node records and graph-level metadata into one ordered
//! document. Deterministic: the same graph and entry set always yield a
//! byte-identical serialized document.

pub mod signature;

use std::collections::{HashSet, VecDeque};

use tracing::{debug, info};

use crate::error::{Diagnostic, DiagnosticKind, PipelineError, Severity};
use crate::ir::types::*;
use crate::ir::validate::validate_ir;
use crate::parse::{GraphRef, HostNode};
use crate::serialize::{serialize_graph, SerializedGraph};
use crate::walk::{walk, WalkOutput};

/// An assembled document plus the graph-level diagnostics collected on the
/// way (unreachable nodes, back-edges).
#[derive(Debug, Clone)]
pub struct Assembly {
    pub document: IrDocument,
    pub diagnostics: Vec<Diagnostic>,
}

/// Walk, serialize and assemble in one step.
pub fn lower(
    graph: &dyn GraphRef,
    entries: &[String],
    language: TargetLanguage,
) -> Result<Assembly, PipelineError> {
    let walked = walk(graph, entries)?;
    let serialized = serialize_graph(graph, &walked);
    let document = assemble(graph, &walked, serialized, language)?;
    Ok(Assembly {
        document,
        diagnostics: walked.diagnostics,
    })
}

/// Build the document from a walk and its serialized records, then check the
/// document's ordering invariants.
pub fn assemble(
    graph: &dyn GraphRef,
    walked: &WalkOutput,
    serialized: SerializedGraph,
    language: TargetLanguage,
) -> Result<IrDocument, PipelineError> {
    let signature = signature::derive_signature(graph, &walked.order);

    let document = IrDocument {
        version: IR_VERSION.to_string(),
        metadata: GraphMetadata {
            name: graph.name().to_string(),
            graph_type: graph.graph_type(),
            blueprint: graph.blueprint().cloned(),
            signature,
            local_variables: graph.local_variables().to_vec(),
            loop_carried: serialized.loop_carried,
            target_language: language,
        },
        nodes: serialized.records,
        callees: Vec::new(),
    };

    let errors = validate_ir(&document);
    if let Some(first) = errors.into_iter().next() {
        debug!(graph = graph.name(), error = %first, "assembled document failed validation");
        return Err(first.into());
    }

    info!(
        graph = graph.name(),
        records = document.nodes.len(),
        loop_carried = document.metadata.loop_carried.len(),
        unsupported = document.unsupported().count(),
        "assembled IR document"
    );

    Ok(document)
}

// =============================================================================
// CALLED GRAPHS
// =============================================================================

/// Lower the user graphs `document` calls into and attach them as callees,
/// breadth first, at most `depth` call levels below the root. Depth 0
/// attaches nothing. Callees are resolved through `graph`, the root.
pub fn attach_callees(
    document: &mut IrDocument,
    graph: &dyn GraphRef,
    depth: u32,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    if depth == 0 {
        return diagnostics;
    }

    let language = document.metadata.target_language;
    let mut seen = HashSet::from([document.metadata.name.clone()]);
    let mut pending: VecDeque<(String, u32)> = called_names(&document.nodes, graph)
        .into_iter()
        .map(|name| (name, 1))
        .collect();

    while let Some((name, level)) = pending.pop_front() {
        if !seen.insert(name.clone()) {
            continue;
        }
        let Some(callee) = graph.called_graph(&name) else {
            debug!(graph = %name, "call target is not an exported graph");
            continue;
        };
        if level > depth {
            diagnostics.push(Diagnostic::new(
                DiagnosticKind::CalleeSkipped,
                Severity::Info,
                format!(
                    "Graph '{}' is deeper than the maximum translation depth of {}",
                    name, depth
                ),
            ));
            continue;
        }

        match lower(callee, &[], language) {
            Ok(assembly) => {
                pending.extend(
                    called_names(&assembly.document.nodes, callee)
                        .into_iter()
                        .map(|next| (next, level + 1)),
                );
                diagnostics.extend(assembly.diagnostics.into_iter().map(|mut d| {
                    d.message = format!("{}: {}", name, d.message);
                    d
                }));
                document.callees.push(CalleeGraph::from(assembly.document));
            }
            Err(e) => {
                debug!(graph = %name, error = %e, "callee failed to lower");
                diagnostics.push(Diagnostic::new(
                    DiagnosticKind::CalleeSkipped,
                    Severity::Warning,
                    format!("Graph '{}' could not be translated: {}", name, e),
                ));
            }
        }
    }

    if !document.callees.is_empty() {
        info!(
            graph = %document.metadata.name,
            callees = document.callees.len(),
            depth,
            "attached called graphs"
        );
    }
    diagnostics
}

/// Graph names invoked by the given records, first occurrence order.
fn called_names(records: &[NodeRecord], graph: &dyn GraphRef) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for record in records {
        let Some(name) = graph.node(&record.host_id).and_then(HostNode::graph_reference) else {
            continue;
        };
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
    }
    names
}
