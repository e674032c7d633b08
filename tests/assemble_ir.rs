#[allow(dead_code)]
mod helpers;

use helpers::*;
use node_to_code::error::{Diagnostic, DiagnosticKind, ErrorKind, Severity, Stage};
use node_to_code::ir::*;
use node_to_code::lower::{attach_callees, lower};
use node_to_code::parse::*;

fn restore_health() -> HostGraph {
    parse_and_build(include_str!("fixtures/restore_health.json")).unwrap()
}

// =============================================================================
// Function graph fixture
// =============================================================================

#[test]
fn test_function_graph_document() {
    let graph = restore_health();
    let assembly = lower(&graph, &[], TargetLanguage::Cpp).unwrap();
    let doc = &assembly.document;

    assert!(assembly.diagnostics.is_empty());
    assert_eq!(doc.version, IR_VERSION);
    assert_eq!(doc.metadata.name, "Restore Health");
    assert_eq!(doc.metadata.graph_type, GraphType::Function);
    assert_eq!(doc.metadata.target_language, TargetLanguage::Cpp);
    assert_eq!(
        doc.metadata.blueprint.as_ref().map(|b| b.name.as_str()),
        Some("BP_Hero")
    );
    assert_eq!(doc.metadata.local_variables.len(), 1);

    let hosts: Vec<&str> = doc.nodes.iter().map(|r| r.host_id.as_str()).collect();
    assert_eq!(hosts, vec!["get", "entry", "add", "set", "result"]);

    let signature = doc.metadata.signature.as_ref().unwrap();
    assert_eq!(signature.name, "RestoreHealth");
    assert_eq!(
        signature
            .parameters
            .iter()
            .map(|p| (p.name.as_str(), p.pin_type))
            .collect::<Vec<_>>(),
        vec![("Amount", PinType::Float)]
    );
    assert_eq!(signature.returns[0].name, "Result");

    let add = doc.record_for_host("add").unwrap();
    assert_eq!(
        add.kind,
        NodeKind::FunctionCall {
            function: "Add_FloatFloat".into(),
            target: Some("KismetMathLibrary".into()),
            pure: true,
            latent: false,
        }
    );
    assert_eq!(
        add.input("B").map(|p| &p.source),
        Some(&PinSource::Node {
            record: "N2".into(),
            pin: "P2".into()
        })
    );

    let set = doc.record("N4").unwrap();
    assert_eq!(
        set.kind,
        NodeKind::VariableSet {
            variable: "NewHealth".into(),
            local: true
        }
    );
    assert_eq!(set.comment.as_deref(), Some("Clamp later"));
    assert_eq!(set.exec[0].target, "N5");

    let result = doc.record("N5").unwrap();
    assert_eq!(
        result.input("Result").map(|p| &p.source),
        Some(&PinSource::Literal {
            value: "0.0".into()
        })
    );
}

#[test]
fn test_assembly_is_deterministic() {
    let first = lower(&restore_health(), &[], TargetLanguage::Python)
        .unwrap()
        .document
        .to_json()
        .unwrap();
    for _ in 0..5 {
        let again = lower(&restore_health(), &[], TargetLanguage::Python)
            .unwrap()
            .document
            .to_json()
            .unwrap();
        assert_eq!(first, again);
    }
    assert!(first.contains("\"category\": \"function_entry\""));
    assert!(first.contains("\"target_language\": \"python\""));
}

#[test]
fn test_document_json_reloads() {
    let doc = lower(&restore_health(), &[], TargetLanguage::CSharp)
        .unwrap()
        .document;
    let reloaded: IrDocument = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
    assert_eq!(reloaded, doc);
    assert!(validate_ir(&reloaded).is_empty());
}

// =============================================================================
// Event graphs and failures
// =============================================================================

#[test]
fn test_event_graph_signature_comes_from_event() {
    let assembly = lower(&begin_play_graph().build(), &[], TargetLanguage::Cpp).unwrap();
    let signature = assembly.document.metadata.signature.unwrap();
    assert_eq!(signature.name, "ReceiveBeginPlay");
    assert!(signature.parameters.is_empty());
}

#[test]
fn test_unsupported_node_is_kept_in_document() {
    let graph = begin_play_graph()
        .node("tl", "timeline", "Door Timeline")
        .exec_in("play")
        .wire("hide", "then", "tl", "play")
        .build();
    let doc = lower(&graph, &[], TargetLanguage::Cpp).unwrap().document;
    let unsupported: Vec<&str> = doc.unsupported().map(|r| r.host_id.as_str()).collect();
    assert_eq!(unsupported, vec!["tl"]);
}

#[test]
fn test_walk_errors_become_pipeline_errors() {
    let graph = GraphBuilder::event_graph("Empty")
        .node("c1", "call_function", "A")
        .build();
    let err = lower(&graph, &[], TargetLanguage::Cpp).unwrap_err();
    assert_eq!(err.code, "W001");
    assert_eq!(err.stage, Stage::Walk);
    assert_eq!(err.kind, ErrorKind::GraphIntegrity);
}

#[test]
fn test_malformed_graph_json_fails_to_parse() {
    let errors = parse_and_build("{ \"name\": \"x\", \"nodes\": [ { \"id\": 1 } ] }").unwrap_err();
    assert_eq!(errors[0].code, "P001");
    assert_eq!(errors[0].stage, Stage::Parse);
}

// =============================================================================
// Called graphs
// =============================================================================

fn door_document(depth: u32) -> (IrDocument, Vec<Diagnostic>) {
    let graph = door_graph().build();
    let mut doc = lower(&graph, &[], TargetLanguage::Cpp).unwrap().document;
    let diagnostics = attach_callees(&mut doc, &graph, depth);
    (doc, diagnostics)
}

#[test]
fn test_depth_zero_translates_only_the_root() {
    let (doc, diagnostics) = door_document(0);
    assert!(doc.callees.is_empty());
    assert!(diagnostics.is_empty());
    assert!(!doc.to_json().unwrap().contains("callees"));
}

#[test]
fn test_depth_one_attaches_direct_callees() {
    let (doc, diagnostics) = door_document(1);
    let names: Vec<&str> = doc.callees.iter().map(|c| c.metadata.name.as_str()).collect();
    assert_eq!(names, vec!["OpenDoor"]);

    let open = doc.callee("OpenDoor").unwrap();
    assert_eq!(open.metadata.signature.as_ref().unwrap().name, "OpenDoor");
    let hosts: Vec<&str> = open.nodes.iter().map(|r| r.host_id.as_str()).collect();
    assert_eq!(hosts, vec!["entry", "call"]);

    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].kind, DiagnosticKind::CalleeSkipped);
    assert_eq!(diagnostics[0].severity, Severity::Info);
    assert!(diagnostics[0].message.contains("'UnlockDoor'"));
}

#[test]
fn test_deeper_limit_follows_the_call_chain() {
    let (doc, diagnostics) = door_document(2);
    let names: Vec<&str> = doc.callees.iter().map(|c| c.metadata.name.as_str()).collect();
    assert_eq!(names, vec!["OpenDoor", "UnlockDoor"]);
    // PrintString has no exported graph.
    assert!(diagnostics.is_empty());
    assert!(validate_ir(&doc).is_empty());

    let reloaded: IrDocument = serde_json::from_str(&doc.to_json().unwrap()).unwrap();
    assert_eq!(reloaded, doc);
}

#[test]
fn test_recursive_call_is_attached_once() {
    let graph = GraphBuilder::event_graph("EventGraph")
        .node("ev", "event", "Event BeginPlay")
        .member("ReceiveBeginPlay")
        .exec_out("then")
        .node("count", "call_function", "Countdown")
        .member("Countdown")
        .exec_in("execute")
        .wire("ev", "then", "count", "execute")
        .subgraph(calling_function("Countdown", "Countdown"))
        .build();
    let mut doc = lower(&graph, &[], TargetLanguage::Cpp).unwrap().document;
    let diagnostics = attach_callees(&mut doc, &graph, 5);
    assert_eq!(doc.callees.len(), 1);
    assert!(diagnostics.is_empty());
}

#[test]
fn test_callee_that_fails_to_lower_is_skipped() {
    let broken = GraphBuilder::function("OpenDoor").node("c1", "call_function", "A");
    let graph = GraphBuilder::event_graph("EventGraph")
        .node("ev", "event", "Event BeginPlay")
        .member("ReceiveBeginPlay")
        .exec_out("then")
        .node("open", "call_function", "Open Door")
        .member("OpenDoor")
        .exec_in("execute")
        .wire("ev", "then", "open", "execute")
        .subgraph(broken)
        .build();
    let mut doc = lower(&graph, &[], TargetLanguage::Cpp).unwrap().document;
    let diagnostics = attach_callees(&mut doc, &graph, 1);
    assert!(doc.callees.is_empty());
    assert_eq!(diagnostics.len(), 1);
    assert_eq!(diagnostics[0].severity, Severity::Warning);
    assert!(diagnostics[0].message.contains("W001"));
}

#[test]
fn test_subgraphs_survive_a_json_round_trip() {
    let json = serde_json::to_string(&door_graph().document()).unwrap();
    let graph = parse_and_build(&json).unwrap();
    assert!(graph.called_graph("OpenDoor").is_some());
    assert!(graph.called_graph("PrintString").is_none());
}

#[test]
fn test_duplicate_subgraph_names_are_rejected() {
    let document = door_graph()
        .subgraph(calling_function("OpenDoor", "PrintString"))
        .document();
    let errors = HostGraph::build(document).unwrap_err();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "P003");
}
