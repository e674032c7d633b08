//! Rust types mirroring the editor's exported graph document.
//!
//! These types are the serde target for the JSON the host editor writes when a
//! graph is handed to the translator. They are read-only from the core's
//! point of view: nothing in the pipeline mutates a `HostNode`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// =============================================================================
// TOP-LEVEL GRAPH DOCUMENT
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDocument {
    pub name: String,
    #[serde(default)]
    pub graph_type: GraphType,
    #[serde(default)]
    pub blueprint: Option<BlueprintInfo>,
    pub nodes: Vec<HostNode>,
    #[serde(default)]
    pub local_variables: Vec<VariableDecl>,
    /// User graphs reachable from this one (functions, macros, collapsed
    /// graphs), exported flat alongside it.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub subgraphs: Vec<GraphDocument>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GraphType {
    #[default]
    EventGraph,
    Function,
    Composite,
    Macro,
    Construction,
    Animation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlueprintInfo {
    pub name: String,
    #[serde(default)]
    pub blueprint_type: BlueprintType,
    #[serde(default)]
    pub blueprint_class: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlueprintType {
    #[default]
    Normal,
    Const,
    MacroLibrary,
    Interface,
    LevelScript,
    FunctionLibrary,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    pub pin_type: PinType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    #[serde(default, skip_serializing_if = "ContainerKind::is_none")]
    pub container: ContainerKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

// =============================================================================
// NODES
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostNode {
    pub id: String,
    /// Host node category, e.g. `call_function`, `branch`, `knot`.
    pub node_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub member_parent: Option<String>,
    #[serde(default)]
    pub member_name: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub pure: bool,
    #[serde(default)]
    pub latent: bool,
    #[serde(default)]
    pub pins: Vec<HostPin>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

impl HostNode {
    pub fn pin(&self, pin_id: &str) -> Option<&HostPin> {
        self.pins.iter().find(|p| p.id == pin_id)
    }

    pub fn inputs(&self) -> impl Iterator<Item = &HostPin> {
        self.pins.iter().filter(|p| p.direction == PinDirection::Input)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &HostPin> {
        self.pins.iter().filter(|p| p.direction == PinDirection::Output)
    }

    /// Nodes a translation may start from (events, function entries).
    pub fn is_entry(&self) -> bool {
        crate::serialize::kind::is_entry_type(&self.node_type)
    }

    /// Name of the graph this node invokes. Only meaningful for call,
    /// macro and collapsed-graph nodes; an explicit `graph` property wins.
    pub fn graph_reference(&self) -> Option<&str> {
        if let Some(graph) = self.properties.get("graph") {
            return Some(graph);
        }
        let invokes = crate::serialize::kind::is_call_type(&self.node_type)
            || matches!(self.node_type.as_str(), "macro_instance" | "composite");
        if !invokes {
            return None;
        }
        Some(self.member_name.as_deref().unwrap_or(&self.name)).filter(|n| !n.is_empty())
    }

    /// Member parent without the editor's `SKEL_` prefix and `_C` suffix.
    pub fn clean_member_parent(&self) -> Option<String> {
        self.member_parent.as_deref().map(|parent| {
            let trimmed = parent.strip_prefix("SKEL_").unwrap_or(parent);
            trimmed.strip_suffix("_C").unwrap_or(trimmed).to_string()
        })
    }
}

// =============================================================================
// PINS
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostPin {
    pub id: String,
    pub name: String,
    pub direction: PinDirection,
    pub pin_type: PinType,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub container: ContainerKind,
    #[serde(default)]
    pub default_value: Option<String>,
    #[serde(default)]
    pub links: Vec<PinLink>,
}

impl HostPin {
    pub fn is_exec(&self) -> bool {
        self.pin_type == PinType::Exec
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinLink {
    pub node: String,
    pub pin: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinDirection {
    Input,
    Output,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerKind {
    #[default]
    None,
    Array,
    Set,
    Map,
}

impl ContainerKind {
    pub fn is_none(&self) -> bool {
        *self == ContainerKind::None
    }
}

/// Pin categories as reported by the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PinType {
    Exec,
    Boolean,
    Byte,
    Integer,
    Integer64,
    Float,
    Double,
    Real,
    String,
    Name,
    Text,
    Vector,
    Vector2D,
    Vector4D,
    Rotator,
    Transform,
    Quat,
    Object,
    Class,
    Interface,
    Struct,
    Enum,
    Delegate,
    MulticastDelegate,
    Array,
    Set,
    Map,
    SoftObject,
    SoftClass,
    AssetId,
    Material,
    Texture,
    StaticMesh,
    SkeletalMesh,
    Pose,
    Animation,
    BlendSpace,
    FieldPath,
    Bitmask,
    #[serde(rename = "Self")]
    SelfRef,
    Index,
    Wildcard,
}

impl PinType {
    pub fn is_container(self) -> bool {
        matches!(self, PinType::Array | PinType::Set | PinType::Map)
    }

    pub fn is_object_like(self) -> bool {
        matches!(
            self,
            PinType::Object | PinType::Class | PinType::Interface | PinType::Struct
        )
    }
}
