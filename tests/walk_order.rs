#[allow(dead_code)]
mod helpers;

use helpers::*;
use node_to_code::error::{DiagnosticKind, Severity};
use node_to_code::parse::*;
use node_to_code::walk::{BackEdge, WalkError, walk};

fn position(order: &[String], id: &str) -> usize {
    order
        .iter()
        .position(|n| n == id)
        .unwrap_or_else(|| panic!("'{id}' not walked"))
}

// =============================================================================
// Acyclic graphs
// =============================================================================

#[test]
fn test_acyclic_order_is_topological() {
    let graph = begin_play_graph().build();
    let walked = walk(&graph, &[]).unwrap();

    assert_eq!(walked.order, vec!["get", "ev", "print", "hide"]);
    assert!(walked.back_edges.is_empty());
    assert!(walked.diagnostics.is_empty());

    // Every wire points forward in the order.
    for node in &graph.document().nodes {
        for pin in node.outputs() {
            for link in &pin.links {
                assert!(
                    position(&walked.order, &node.id) < position(&walked.order, &link.node),
                    "{} -> {} points backwards",
                    node.id,
                    link.node
                );
            }
        }
    }
}

#[test]
fn test_first_entry_is_walked_first() {
    let graph = GraphBuilder::event_graph("EventGraph")
        .node("ev1", "event", "Event BeginPlay")
        .exec_out("then")
        .node("ev2", "custom_event", "OnOpened")
        .exec_out("then")
        .node("c1", "call_function", "A")
        .exec_in("execute")
        .node("c2", "call_function", "B")
        .exec_in("execute")
        .wire("ev1", "then", "c1", "execute")
        .wire("ev2", "then", "c2", "execute")
        .build();

    let walked = walk(&graph, &[]).unwrap();
    assert_eq!(walked.order, vec!["ev1", "c1", "ev2", "c2"]);

    let walked = walk(&graph, &["ev2".to_string()]).unwrap();
    assert_eq!(walked.order, vec!["ev2", "c2"]);
    assert_eq!(walked.unreachable, vec!["ev1", "c1"]);
}

#[test]
fn test_unreachable_nodes_become_warnings() {
    let graph = begin_play_graph()
        .node("orphan", "call_function", "Orphan")
        .exec_in("execute")
        .build();

    let walked = walk(&graph, &[]).unwrap();
    assert!(!walked.order.contains(&"orphan".to_string()));
    assert_eq!(walked.unreachable, vec!["orphan"]);
    assert_eq!(walked.diagnostics.len(), 1);
    let diag = &walked.diagnostics[0];
    assert_eq!(diag.kind, DiagnosticKind::UnreachableNode);
    assert_eq!(diag.severity, Severity::Warning);
    assert_eq!(diag.location.node_id.as_deref(), Some("orphan"));
}

// =============================================================================
// Cycles
// =============================================================================

#[test]
fn test_exec_cycle_reports_exactly_the_closing_edge() {
    let graph = GraphBuilder::event_graph("EventGraph")
        .node("ev", "event", "Event Tick")
        .exec_out("then")
        .node("a", "call_function", "A")
        .exec_in("execute")
        .exec_out("then")
        .node("b", "call_function", "B")
        .exec_in("execute")
        .exec_out("then")
        .wire("ev", "then", "a", "execute")
        .wire("a", "then", "b", "execute")
        .wire("b", "then", "a", "execute")
        .build();

    let walked = walk(&graph, &[]).unwrap();
    assert_eq!(walked.order, vec!["ev", "a", "b"]);
    assert_eq!(
        walked.back_edges,
        vec![BackEdge {
            source: "b".into(),
            source_pin: "then".into(),
            target: "a".into(),
            target_pin: "execute".into(),
            exec: true,
        }]
    );
    assert!(walked.is_back_edge("b", "then", "a", "execute"));
    assert_eq!(walked.diagnostics[0].kind, DiagnosticKind::BackEdge);
}

#[test]
fn test_self_loop_terminates() {
    let graph = GraphBuilder::event_graph("EventGraph")
        .node("ev", "event", "Event Tick")
        .exec_out("then")
        .node("a", "call_function", "A")
        .exec_in("execute")
        .exec_out("then")
        .wire("ev", "then", "a", "execute")
        .wire("a", "then", "a", "execute")
        .build();

    let walked = walk(&graph, &[]).unwrap();
    assert_eq!(walked.order, vec!["ev", "a"]);
    assert_eq!(walked.back_edges.len(), 1);
}

// =============================================================================
// Integrity errors
// =============================================================================

#[test]
fn test_graph_without_entries_fails() {
    let graph = GraphBuilder::event_graph("EventGraph")
        .node("c1", "call_function", "A")
        .exec_in("execute")
        .build();
    assert_eq!(walk(&graph, &[]).unwrap_err(), WalkError::NoEntries);
}

#[test]
fn test_unknown_entry_fails() {
    let graph = begin_play_graph().build();
    let err = walk(&graph, &["ghost".to_string()]).unwrap_err();
    assert_eq!(err.code(), "W002");
    assert_eq!(err.node_id(), Some("ghost"));
}

#[test]
fn test_dangling_links_fail() {
    let graph = begin_play_graph()
        .wire("print", "then", "ghost", "execute")
        .build();
    let err = walk(&graph, &[]).unwrap_err();
    assert_eq!(err.code(), "W003");

    let graph = begin_play_graph()
        .wire("print", "then", "hide", "nope")
        .build();
    let err = walk(&graph, &[]).unwrap_err();
    assert_eq!(err.code(), "W004");
}

#[test]
fn test_duplicate_node_ids_are_rejected_at_build() {
    let mut doc = begin_play_graph().document();
    let copy = doc.nodes[1].clone();
    doc.nodes.push(copy);
    let errors = HostGraph::build(doc).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "P002");
    assert_eq!(errors[0].node_id.as_deref(), Some("print"));
}
