//! Host node type string → closed `NodeKind`.

use crate::ir::types::{LoopKind, NodeKind};
use crate::parse::types::{ContainerKind, HostNode};

/// Event-like node types that start an exec chain.
const EVENT_TYPES: &[&str] = &[
    "event",
    "actor_bound_event",
    "component_bound_event",
    "generated_bound_event",
    "input_action",
    "input_action_event",
    "input_axis_event",
    "input_axis_key_event",
    "input_key",
    "input_key_event",
    "input_touch",
    "input_touch_event",
    "input_vector_axis_event",
];

const CALL_TYPES: &[&str] = &[
    "call_function",
    "call_array_function",
    "call_datatable_function",
    "call_function_on_member",
    "call_parent_function",
    "call_material_parameter_collection",
    "call_delegate",
    "interface_message",
    "message",
];

pub fn is_entry_type(node_type: &str) -> bool {
    EVENT_TYPES.contains(&node_type) || node_type == "custom_event" || node_type == "function_entry"
}

pub fn is_call_type(node_type: &str) -> bool {
    CALL_TYPES.contains(&node_type)
}

pub fn classify(node: &HostNode) -> NodeKind {
    let member = || node.member_name.clone().unwrap_or_else(|| node.name.clone());
    let property = |key: &str| node.properties.get(key).cloned();

    match node.node_type.as_str() {
        t if EVENT_TYPES.contains(&t) => NodeKind::Event { event: member() },
        "custom_event" => NodeKind::CustomEvent {
            event: node.name.clone(),
        },
        "function_entry" => NodeKind::FunctionEntry,
        "function_result" | "function_terminator" => NodeKind::FunctionResult,
        t if CALL_TYPES.contains(&t) => NodeKind::FunctionCall {
            function: member(),
            target: node.clean_member_parent(),
            pure: node.pure,
            latent: node.latent,
        },
        "branch" | "if_then_else" => NodeKind::Branch,
        "sequence" | "execution_sequence" => NodeKind::Sequence,
        t if t == "switch" || t.starts_with("switch_") => NodeKind::Switch {
            selector: t.strip_prefix("switch_").unwrap_or("value").to_string(),
        },
        "for_loop" => NodeKind::Loop {
            loop_kind: LoopKind::For,
        },
        "for_each_loop" => NodeKind::Loop {
            loop_kind: LoopKind::ForEach,
        },
        "for_each_loop_with_break" => NodeKind::Loop {
            loop_kind: LoopKind::ForEachWithBreak,
        },
        "while_loop" => NodeKind::Loop {
            loop_kind: LoopKind::While,
        },
        "for_each_element_in_enum" => NodeKind::Loop {
            loop_kind: LoopKind::ForEachEnum,
        },
        "variable_get" => NodeKind::VariableGet {
            variable: member(),
            local: false,
        },
        "local_variable_get" => NodeKind::VariableGet {
            variable: member(),
            local: true,
        },
        "variable_set" | "variable_set_ref" => NodeKind::VariableSet {
            variable: member(),
            local: false,
        },
        "local_variable_set" => NodeKind::VariableSet {
            variable: member(),
            local: true,
        },
        "macro_instance" => NodeKind::Macro {
            macro_name: member(),
        },
        "dynamic_cast" | "class_dynamic_cast" | "cast_byte_to_enum" => NodeKind::Cast {
            target_type: property("target_type").unwrap_or_else(|| node.name.clone()),
        },
        "make_struct" => NodeKind::MakeStruct {
            struct_type: property("struct_type").unwrap_or_else(|| node.name.clone()),
        },
        "break_struct" => NodeKind::BreakStruct {
            struct_type: property("struct_type").unwrap_or_else(|| node.name.clone()),
        },
        "make_array" => NodeKind::MakeContainer {
            container: ContainerKind::Array,
        },
        "make_set" => NodeKind::MakeContainer {
            container: ContainerKind::Set,
        },
        "make_map" => NodeKind::MakeContainer {
            container: ContainerKind::Map,
        },
        "literal" | "enum_literal" | "bitmask_literal" | "text_literal" => NodeKind::Literal,
        "knot" => NodeKind::Reroute,
        other => NodeKind::Unsupported {
            node_type: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(node_type: &str) -> HostNode {
        HostNode {
            id: "n".into(),
            node_type: node_type.into(),
            name: "PrintString".into(),
            member_parent: Some("SKEL_KismetSystemLibrary_C".into()),
            member_name: Some("PrintString".into()),
            comment: None,
            pure: false,
            latent: false,
            pins: vec![],
            properties: Default::default(),
        }
    }

    #[test]
    fn call_function_strips_member_parent_decoration() {
        match classify(&node("call_function")) {
            NodeKind::FunctionCall { function, target, .. } => {
                assert_eq!(function, "PrintString");
                assert_eq!(target.as_deref(), Some("KismetSystemLibrary"));
            }
            other => panic!("expected FunctionCall, got {:?}", other),
        }
    }

    #[test]
    fn switch_family_keeps_selector() {
        assert_eq!(
            classify(&node("switch_enum")),
            NodeKind::Switch {
                selector: "enum".into()
            }
        );
    }

    #[test]
    fn unknown_type_is_unsupported_not_dropped() {
        assert_eq!(
            classify(&node("timeline")),
            NodeKind::Unsupported {
                node_type: "timeline".into()
            }
        );
    }

    #[test]
    fn entry_types() {
        assert!(is_entry_type("event"));
        assert!(is_entry_type("custom_event"));
        assert!(is_entry_type("function_entry"));
        assert!(is_entry_type("input_key_event"));
        assert!(!is_entry_type("call_function"));
        assert!(!is_entry_type("function_result"));
    }
}
