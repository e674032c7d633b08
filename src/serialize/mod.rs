//! Node serializer: one host node → one `NodeRecord`.
//!
//! Record ids (`N1`, `N2`, …) follow the walker order with reroute nodes left
//! out. Pin ids (`P1`, `P2`, …) number every pin of the host node, so a pin
//! keeps its id whether or not it is emitted. Bindings that cross a reroute
//! chain are resolved to the real producer; bindings that would point forward
//! in the document become loop-carried variables.

pub mod kind;
pub mod pin_types;

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::{Diagnostic, DiagnosticKind, Severity};
use crate::ir::types::{
    ExecLink, LoopCarriedVariable, NodeRecord, OutputPin, PinAddress, PinBinding, PinSource,
};
use crate::parse::GraphRef;
use crate::parse::types::{HostNode, HostPin};
use crate::walk::{PinEnd, WalkOutput};
pub use kind::{classify, is_entry_type};
pub use pin_types::{are_pins_compatible, are_types_compatible, PinShape};

/// One serialized node plus the loop-carried variables its inputs introduced.
#[derive(Debug, Clone)]
pub struct SerializedNode {
    pub record: NodeRecord,
    pub loop_carried: Vec<LoopCarriedVariable>,
}

#[derive(Debug, Clone, Default)]
pub struct SerializedGraph {
    pub records: Vec<NodeRecord>,
    pub loop_carried: Vec<LoopCarriedVariable>,
}

pub struct NodeSerializer<'a> {
    graph: &'a dyn GraphRef,
    walk: &'a WalkOutput,
    /// host node id -> (record id, position in the document)
    records: HashMap<&'a str, (String, usize)>,
    order: Vec<&'a HostNode>,
}

impl<'a> NodeSerializer<'a> {
    pub fn new(graph: &'a dyn GraphRef, walk: &'a WalkOutput) -> Self {
        let mut records = HashMap::new();
        let mut order = Vec::new();

        for id in &walk.order {
            let Some(node) = graph.node(id) else {
                continue;
            };
            if classify(node).is_reroute() {
                continue;
            }
            let position = order.len();
            records.insert(node.id.as_str(), (format!("N{}", position + 1), position));
            order.push(node);
        }

        NodeSerializer {
            graph,
            walk,
            records,
            order,
        }
    }

    pub fn record_id(&self, host_id: &str) -> Option<&str> {
        self.records.get(host_id).map(|(id, _)| id.as_str())
    }

    /// Serialize every walked node in document order.
    pub fn serialize_all(&self) -> SerializedGraph {
        let mut out = SerializedGraph::default();
        for node in &self.order {
            if let Some(serialized) = self.serialize(node) {
                out.records.push(serialized.record);
                out.loop_carried.extend(serialized.loop_carried);
            }
        }
        debug!(
            graph = self.graph.name(),
            records = out.records.len(),
            loop_carried = out.loop_carried.len(),
            "serialized graph"
        );
        out
    }

    /// `None` for reroute nodes and nodes outside the walked set.
    pub fn serialize(&self, node: &HostNode) -> Option<SerializedNode> {
        let kind = classify(node);
        if kind.is_reroute() {
            return None;
        }
        let (record_id, position) = self.records.get(node.id.as_str())?.clone();

        let mut diagnostics = Vec::new();
        let mut loop_carried = Vec::new();

        let mut inputs = Vec::new();
        for pin in node.inputs().filter(|p| !p.is_exec()) {
            let input_id = pin_id(node, &pin.id);
            let source = self.resolve_input(
                node,
                pin,
                &record_id,
                position,
                &input_id,
                &mut diagnostics,
                &mut loop_carried,
            );
            inputs.push(PinBinding {
                id: input_id,
                name: pin.name.clone(),
                pin_type: pin.pin_type,
                sub_type: pin.sub_type.clone(),
                container: pin.container,
                source,
            });
        }

        let outputs = node
            .outputs()
            .filter(|p| !p.is_exec())
            .map(|pin| OutputPin {
                id: pin_id(node, &pin.id),
                name: pin.name.clone(),
                pin_type: pin.pin_type,
                sub_type: pin.sub_type.clone(),
                container: pin.container,
            })
            .collect();

        let mut exec = Vec::new();
        for pin in node.outputs().filter(|p| p.is_exec()) {
            let (targets, cyclic) = self.resolve_exec_targets(node, pin);
            if cyclic {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticKind::UnresolvedReroute,
                        Severity::Warning,
                        format!(
                            "Exec pin '{}' runs into a reroute cycle and was left unconnected",
                            pin.name
                        ),
                    )
                    .at_node(node.id.clone())
                    .at_record(record_id.clone()),
                );
            }
            for target in targets {
                let Some((target_id, target_pos)) = self.records.get(target) else {
                    continue;
                };
                exec.push(ExecLink {
                    pin: pin_id(node, &pin.id),
                    pin_name: pin.name.clone(),
                    target: target_id.clone(),
                    loop_back: *target_pos <= position,
                });
            }
        }

        Some(SerializedNode {
            record: NodeRecord {
                id: record_id,
                host_id: node.id.clone(),
                kind,
                name: node.name.clone(),
                comment: node.comment.clone().filter(|c| !c.is_empty()),
                inputs,
                outputs,
                exec,
                properties: node.properties.clone(),
                diagnostics,
            },
            loop_carried,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_input(
        &self,
        node: &HostNode,
        pin: &HostPin,
        record_id: &str,
        position: usize,
        consumer_pin: &str,
        diagnostics: &mut Vec<Diagnostic>,
        loop_carried: &mut Vec<LoopCarriedVariable>,
    ) -> PinSource {
        let Some(first) = self.walk.links.sources(&node.id, &pin.id).first() else {
            return literal_or_default(pin);
        };

        let Some((producer, producer_pin)) = self.resolve_producer(first) else {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::UnresolvedReroute,
                    Severity::Warning,
                    format!(
                        "Input '{}' is wired through a reroute chain with no producer",
                        pin.name
                    ),
                )
                .at_node(node.id.clone())
                .at_record(record_id.to_string()),
            );
            return literal_or_default(pin);
        };

        let Some((producer_record, producer_pos)) = self.records.get(producer.id.as_str()) else {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::UnresolvedReroute,
                    Severity::Warning,
                    format!(
                        "Input '{}' reads node '{}' which is not part of the translation",
                        pin.name, producer.id
                    ),
                )
                .at_node(node.id.clone())
                .at_record(record_id.to_string()),
            );
            return literal_or_default(pin);
        };

        if !are_pins_compatible(PinShape::from(pin), PinShape::from(producer_pin)) {
            diagnostics.push(
                Diagnostic::new(
                    DiagnosticKind::PinTypeMismatch,
                    Severity::Warning,
                    format!(
                        "Input '{}' ({:?}) is fed by '{}.{}' ({:?})",
                        pin.name,
                        pin.pin_type,
                        producer.name,
                        producer_pin.name,
                        producer_pin.pin_type
                    ),
                )
                .at_node(node.id.clone())
                .at_record(record_id.to_string()),
            );
        }

        let producer_pin_id = pin_id(producer, &producer_pin.id);

        if *producer_pos >= position {
            let variable = format!("loop_{}_{}", record_id, consumer_pin);
            loop_carried.push(LoopCarriedVariable {
                name: variable.clone(),
                pin_type: pin.pin_type,
                producer: PinAddress {
                    record: producer_record.clone(),
                    pin: producer_pin_id,
                },
                consumer: PinAddress {
                    record: record_id.to_string(),
                    pin: consumer_pin.to_string(),
                },
            });
            return PinSource::LoopCarried { variable };
        }

        PinSource::Node {
            record: producer_record.clone(),
            pin: producer_pin_id,
        }
    }

    /// Follow a data source backwards through reroute nodes. `None` when the
    /// chain is cyclic or ends unconnected.
    fn resolve_producer(&self, start: &PinEnd) -> Option<(&'a HostNode, &'a HostPin)> {
        let mut current = start.clone();
        let mut visited = HashSet::new();
        loop {
            let node = self.graph.node(&current.node)?;
            if !classify(node).is_reroute() {
                return node.pin(&current.pin).map(|pin| (node, pin));
            }
            if !visited.insert(node.id.as_str()) {
                return None;
            }
            let input = node.inputs().next()?;
            current = self.walk.links.sources(&node.id, &input.id).first()?.clone();
        }
    }

    /// Real exec successors of an output pin, looking through reroute nodes.
    /// The flag is set when a reroute cycle was hit.
    fn resolve_exec_targets(&self, node: &HostNode, pin: &HostPin) -> (Vec<&'a str>, bool) {
        let mut targets: Vec<&'a str> = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut cyclic = false;
        let mut pending: Vec<PinEnd> = self.walk.links.targets(&node.id, &pin.id).to_vec();
        pending.reverse();

        while let Some(end) = pending.pop() {
            let Some(target) = self.graph.node(&end.node) else {
                continue;
            };
            if !classify(target).is_reroute() {
                if !targets.contains(&target.id.as_str()) {
                    targets.push(target.id.as_str());
                }
                continue;
            }
            if !visited.insert(target.id.as_str()) {
                cyclic = true;
                continue;
            }
            let mut next: Vec<PinEnd> = target
                .outputs()
                .flat_map(|out| self.walk.links.targets(&target.id, &out.id).iter().cloned())
                .collect();
            next.reverse();
            pending.extend(next);
        }

        (targets, cyclic)
    }
}

/// Serialize a walked graph in one call.
pub fn serialize_graph(graph: &dyn GraphRef, walk: &WalkOutput) -> SerializedGraph {
    NodeSerializer::new(graph, walk).serialize_all()
}

fn pin_id(node: &HostNode, host_pin_id: &str) -> String {
    let index = node
        .pins
        .iter()
        .position(|p| p.id == host_pin_id)
        .unwrap_or(node.pins.len());
    format!("P{}", index + 1)
}

fn literal_or_default(pin: &HostPin) -> PinSource {
    match &pin.default_value {
        Some(value) if !value.is_empty() => PinSource::Literal {
            value: value.clone(),
        },
        _ => PinSource::Default,
    }
}
