//! IR type definitions for node-to-code.
//!
//! The IR bridges the host node graph (input) and the generation backend
//! (output). A possibly cyclic graph of heterogeneous nodes is flattened into
//! an ordered list of `NodeRecord`s where every data reference points at a
//! record emitted earlier, and cycles are expressed as loop-carried variables.
//! The serialized document is self-describing JSON; field names are part of
//! the backend contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::Diagnostic;
use crate::parse::types::{BlueprintInfo, ContainerKind, GraphType, PinType, VariableDecl};

pub const IR_VERSION: &str = "1.0.0";

// =============================================================================
// TOP-LEVEL IR
// =============================================================================

/// Complete intermediate representation of one translated graph.
/// Produced by the assembler, consumed by the generation client and the
/// response validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IrDocument {
    pub version: String,
    pub metadata: GraphMetadata,
    /// Records in walker order: producers before consumers.
    pub nodes: Vec<NodeRecord>,
    /// User graphs called from this one, breadth first, up to the configured
    /// translation depth.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub callees: Vec<CalleeGraph>,
}

impl IrDocument {
    /// Pretty JSON with stable field order. Same document, same bytes.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn record(&self, id: &str) -> Option<&NodeRecord> {
        self.nodes.iter().find(|r| r.id == id)
    }

    pub fn record_for_host(&self, host_id: &str) -> Option<&NodeRecord> {
        self.nodes.iter().find(|r| r.host_id == host_id)
    }

    pub fn unsupported(&self) -> impl Iterator<Item = &NodeRecord> {
        self.nodes.iter().filter(|r| r.kind.is_unsupported())
    }

    pub fn callee(&self, name: &str) -> Option<&CalleeGraph> {
        self.callees.iter().find(|c| c.metadata.name == name)
    }
}

/// A called graph translated alongside the main one. Record ids are local to
/// the callee.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalleeGraph {
    pub metadata: GraphMetadata,
    pub nodes: Vec<NodeRecord>,
}

impl From<IrDocument> for CalleeGraph {
    fn from(document: IrDocument) -> Self {
        CalleeGraph {
            metadata: document.metadata,
            nodes: document.nodes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub name: String,
    pub graph_type: GraphType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blueprint: Option<BlueprintInfo>,
    /// Function (or event handler) the generated code must declare.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<FunctionSignature>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub local_variables: Vec<VariableDecl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loop_carried: Vec<LoopCarriedVariable>,
    pub target_language: TargetLanguage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionSignature {
    pub name: String,
    #[serde(default)]
    pub parameters: Vec<Parameter>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub returns: Vec<Parameter>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub pin_type: PinType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    #[serde(default, skip_serializing_if = "ContainerKind::is_none")]
    pub container: ContainerKind,
}

/// Variable replacing a data link that closes a cycle. The consumer reads the
/// value the producer wrote on the previous iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopCarriedVariable {
    pub name: String,
    pub pin_type: PinType,
    pub producer: PinAddress,
    pub consumer: PinAddress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinAddress {
    pub record: String,
    pub pin: String,
}

// =============================================================================
// TARGET LANGUAGE
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetLanguage {
    #[default]
    Cpp,
    Python,
    #[serde(rename = "javascript")]
    JavaScript,
    #[serde(rename = "csharp")]
    CSharp,
    Swift,
    Pseudocode,
}

impl TargetLanguage {
    pub fn display_name(self) -> &'static str {
        match self {
            TargetLanguage::Cpp => "C++",
            TargetLanguage::Python => "Python",
            TargetLanguage::JavaScript => "JavaScript",
            TargetLanguage::CSharp => "C#",
            TargetLanguage::Swift => "Swift",
            TargetLanguage::Pseudocode => "Pseudocode",
        }
    }

    /// Line comment prefix.
    pub fn line_comment(self) -> &'static str {
        match self {
            TargetLanguage::Python => "#",
            _ => "//",
        }
    }

    /// Whether `/* ... */` comments exist in the language.
    pub fn has_block_comments(self) -> bool {
        !matches!(self, TargetLanguage::Python)
    }

    /// Whether `'x'` is a character literal rather than a string.
    pub fn has_char_literals(self) -> bool {
        matches!(self, TargetLanguage::Cpp | TargetLanguage::CSharp)
    }
}

impl std::str::FromStr for TargetLanguage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpp" | "c++" => Ok(TargetLanguage::Cpp),
            "python" => Ok(TargetLanguage::Python),
            "javascript" | "js" => Ok(TargetLanguage::JavaScript),
            "csharp" | "c#" => Ok(TargetLanguage::CSharp),
            "swift" => Ok(TargetLanguage::Swift),
            "pseudocode" => Ok(TargetLanguage::Pseudocode),
            other => Err(format!("unknown target language '{}'", other)),
        }
    }
}

// =============================================================================
// NODE RECORDS
// =============================================================================

/// One serialized host node. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// `N1`, `N2`, … in document order.
    pub id: String,
    pub host_id: String,
    pub kind: NodeKind,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<PinBinding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputPin>,
    /// Execution successors, one per linked exec output.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exec: Vec<ExecLink>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl NodeRecord {
    pub fn input(&self, name: &str) -> Option<&PinBinding> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output(&self, pin_id: &str) -> Option<&OutputPin> {
        self.outputs.iter().find(|p| p.id == pin_id)
    }
}

/// Closed set of node categories the backend is told about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum NodeKind {
    Event {
        event: String,
    },
    CustomEvent {
        event: String,
    },
    FunctionEntry,
    FunctionResult,
    FunctionCall {
        function: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<String>,
        #[serde(default)]
        pure: bool,
        #[serde(default)]
        latent: bool,
    },
    Branch,
    Sequence,
    Switch {
        selector: String,
    },
    Loop {
        loop_kind: LoopKind,
    },
    VariableGet {
        variable: String,
        #[serde(default)]
        local: bool,
    },
    VariableSet {
        variable: String,
        #[serde(default)]
        local: bool,
    },
    Macro {
        macro_name: String,
    },
    Cast {
        target_type: String,
    },
    MakeStruct {
        struct_type: String,
    },
    BreakStruct {
        struct_type: String,
    },
    MakeContainer {
        container: ContainerKind,
    },
    Literal,
    /// Wire-layout node. Never emitted into a document.
    Reroute,
    /// Host node type the serializer does not know. Raw type, name, pins and
    /// properties stay on the record.
    Unsupported {
        node_type: String,
    },
}

impl NodeKind {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, NodeKind::Unsupported { .. })
    }

    pub fn is_reroute(&self) -> bool {
        matches!(self, NodeKind::Reroute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopKind {
    For,
    ForEach,
    ForEachWithBreak,
    While,
    ForEachEnum,
}

// =============================================================================
// PINS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinBinding {
    /// `P1`, `P2`, … numbered over all of the host node's pins.
    pub id: String,
    pub name: String,
    pub pin_type: PinType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    #[serde(default, skip_serializing_if = "ContainerKind::is_none")]
    pub container: ContainerKind,
    pub source: PinSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PinSource {
    Literal { value: String },
    /// Unlinked, no default: the target's zero value.
    Default,
    /// Output pin of a record earlier in the document.
    Node { record: String, pin: String },
    LoopCarried { variable: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputPin {
    pub id: String,
    pub name: String,
    pub pin_type: PinType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    #[serde(default, skip_serializing_if = "ContainerKind::is_none")]
    pub container: ContainerKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecLink {
    /// Exec output pin id on the owning record.
    pub pin: String,
    pub pin_name: String,
    /// Record id execution continues at.
    pub target: String,
    /// Target does not come later in the document (loop back).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub loop_back: bool,
}
