//! Derive the declared signature the generated code must match.

use crate::ir::types::{FunctionSignature, NodeKind, Parameter};
use crate::parse::GraphRef;
use crate::parse::types::{GraphType, HostPin};
use crate::serialize::classify;

/// Function graphs: the entry node's data outputs are parameters and the first
/// result node's data inputs are return values. Other graphs: the first walked
/// event and its data outputs.
pub fn derive_signature(graph: &dyn GraphRef, walk_order: &[String]) -> Option<FunctionSignature> {
    let walked = || walk_order.iter().filter_map(|id| graph.node(id));

    if graph.graph_type() == GraphType::Function {
        let entry = walked().find(|n| classify(n) == NodeKind::FunctionEntry)?;
        let result = graph
            .node_ids()
            .into_iter()
            .filter_map(|id| graph.node(id))
            .find(|n| classify(n) == NodeKind::FunctionResult);

        return Some(FunctionSignature {
            name: sanitize_identifier(graph.name()),
            parameters: data_params(entry.outputs()),
            returns: result.map(|r| data_params(r.inputs())).unwrap_or_default(),
        });
    }

    let event = walked().find(|n| {
        matches!(
            classify(n),
            NodeKind::Event { .. } | NodeKind::CustomEvent { .. }
        )
    })?;
    let name = event.member_name.as_deref().unwrap_or(&event.name);

    Some(FunctionSignature {
        name: sanitize_identifier(name),
        parameters: data_params(event.outputs()),
        returns: vec![],
    })
}

fn data_params<'a>(pins: impl Iterator<Item = &'a HostPin>) -> Vec<Parameter> {
    pins.filter(|p| !p.is_exec())
        .map(|p| Parameter {
            name: sanitize_identifier(&p.name),
            pin_type: p.pin_type,
            sub_type: p.sub_type.clone(),
            container: p.container,
        })
        .collect()
}

/// Whitespace is dropped, any other non-identifier character becomes `_`, and
/// a leading digit gets a `_` prefix.
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() {
        return "Unnamed".into();
    }
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}
