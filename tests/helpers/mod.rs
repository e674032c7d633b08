use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use node_to_code::generate::{BackendReply, GenerationBackend, GenerationError, GenerationRequest};
use node_to_code::parse::*;

// =============================================================================
// Graph builders
// =============================================================================

/// Fluent host-graph builder. Pin ids double as pin names; links are recorded
/// on the output end only.
pub struct GraphBuilder {
    doc: GraphDocument,
}

impl GraphBuilder {
    pub fn event_graph(name: &str) -> Self {
        GraphBuilder {
            doc: GraphDocument {
                name: name.into(),
                graph_type: GraphType::EventGraph,
                blueprint: None,
                nodes: vec![],
                local_variables: vec![],
                subgraphs: vec![],
            },
        }
    }

    pub fn function(name: &str) -> Self {
        let mut builder = GraphBuilder::event_graph(name);
        builder.doc.graph_type = GraphType::Function;
        builder
    }

    pub fn named(mut self, name: &str) -> Self {
        self.doc.name = name.into();
        self
    }

    /// Export another graph alongside this one.
    pub fn subgraph(mut self, graph: GraphBuilder) -> Self {
        self.doc.subgraphs.push(graph.doc);
        self
    }

    pub fn property(mut self, key: &str, value: &str) -> Self {
        self.last().properties.insert(key.into(), value.into());
        self
    }

    /// Start a new node; pin methods apply to the most recent one.
    pub fn node(mut self, id: &str, node_type: &str, name: &str) -> Self {
        self.doc.nodes.push(HostNode {
            id: id.into(),
            node_type: node_type.into(),
            name: name.into(),
            member_parent: None,
            member_name: None,
            comment: None,
            pure: false,
            latent: false,
            pins: vec![],
            properties: Default::default(),
        });
        self
    }

    pub fn member(mut self, member_name: &str) -> Self {
        self.last().member_name = Some(member_name.into());
        self
    }

    pub fn pure(mut self) -> Self {
        self.last().pure = true;
        self
    }

    pub fn exec_in(self, id: &str) -> Self {
        self.pin(id, PinDirection::Input, PinType::Exec, None)
    }

    pub fn exec_out(self, id: &str) -> Self {
        self.pin(id, PinDirection::Output, PinType::Exec, None)
    }

    pub fn data_in(self, id: &str, pin_type: PinType) -> Self {
        self.pin(id, PinDirection::Input, pin_type, None)
    }

    pub fn data_in_default(self, id: &str, pin_type: PinType, default: &str) -> Self {
        self.pin(id, PinDirection::Input, pin_type, Some(default))
    }

    pub fn data_out(self, id: &str, pin_type: PinType) -> Self {
        self.pin(id, PinDirection::Output, pin_type, None)
    }

    pub fn local(mut self, name: &str, pin_type: PinType) -> Self {
        self.doc.local_variables.push(VariableDecl {
            name: name.into(),
            pin_type,
            sub_type: None,
            container: ContainerKind::None,
            default_value: None,
        });
        self
    }

    /// Wire `from.pin` (an output) to `to.pin`.
    pub fn wire(mut self, from: &str, from_pin: &str, to: &str, to_pin: &str) -> Self {
        let node = self
            .doc
            .nodes
            .iter_mut()
            .find(|n| n.id == from)
            .unwrap_or_else(|| panic!("no node '{from}'"));
        let pin = node
            .pins
            .iter_mut()
            .find(|p| p.id == from_pin)
            .unwrap_or_else(|| panic!("no pin '{from}.{from_pin}'"));
        pin.links.push(PinLink {
            node: to.into(),
            pin: to_pin.into(),
        });
        self
    }

    pub fn document(self) -> GraphDocument {
        self.doc
    }

    pub fn build(self) -> HostGraph {
        HostGraph::build(self.doc).expect("builder graph has unique ids")
    }

    pub fn shared(self) -> Arc<dyn GraphRef> {
        Arc::new(self.build())
    }

    fn last(&mut self) -> &mut HostNode {
        self.doc.nodes.last_mut().expect("call node() first")
    }

    fn pin(
        mut self,
        id: &str,
        direction: PinDirection,
        pin_type: PinType,
        default: Option<&str>,
    ) -> Self {
        self.last().pins.push(HostPin {
            id: id.into(),
            name: id.into(),
            direction,
            pin_type,
            sub_type: None,
            container: ContainerKind::None,
            default_value: default.map(str::to_string),
            links: vec![],
        });
        self
    }
}

/// Event → Print → SetHidden, with a pure getter feeding SetHidden.
pub fn begin_play_graph() -> GraphBuilder {
    GraphBuilder::event_graph("EventGraph")
        .node("ev", "event", "Event BeginPlay")
        .member("ReceiveBeginPlay")
        .exec_out("then")
        .node("print", "call_function", "Print String")
        .member("PrintString")
        .exec_in("execute")
        .exec_out("then")
        .data_in_default("InString", PinType::String, "Opened")
        .node("hide", "call_function", "Set Actor Hidden In Game")
        .member("SetActorHiddenInGame")
        .exec_in("execute")
        .exec_out("then")
        .data_in("bNewHidden", PinType::Boolean)
        .node("get", "variable_get", "bStartHidden")
        .member("bStartHidden")
        .pure()
        .data_out("bStartHidden", PinType::Boolean)
        .wire("ev", "then", "print", "execute")
        .wire("print", "then", "hide", "execute")
        .wire("get", "bStartHidden", "hide", "bNewHidden")
}

/// Entry → call `callee`. Calls with no matching subgraph are engine calls.
pub fn calling_function(name: &str, callee: &str) -> GraphBuilder {
    GraphBuilder::function(name)
        .node("entry", "function_entry", name)
        .exec_out("then")
        .node("call", "call_function", callee)
        .member(callee)
        .exec_in("execute")
        .exec_out("then")
        .wire("entry", "then", "call", "execute")
}

/// BeginPlay → OpenDoor → UnlockDoor → PrintString (engine).
pub fn door_graph() -> GraphBuilder {
    GraphBuilder::event_graph("EventGraph")
        .node("ev", "event", "Event BeginPlay")
        .member("ReceiveBeginPlay")
        .exec_out("then")
        .node("open", "call_function", "Open Door")
        .member("OpenDoor")
        .exec_in("execute")
        .exec_out("then")
        .wire("ev", "then", "open", "execute")
        .subgraph(calling_function("OpenDoor", "UnlockDoor"))
        .subgraph(calling_function("UnlockDoor", "PrintString"))
}

pub const BEGIN_PLAY_CPP: &str = "void ReceiveBeginPlay()\n{\n    PrintString(TEXT(\"Opened\"));\n    SetActorHiddenInGame(bStartHidden);\n}\n";

// =============================================================================
// Scripted backend
// =============================================================================

#[derive(Debug, Clone)]
pub enum Step {
    Reply(String),
    Fail(GenerationError),
    /// Reply after a delay.
    Slow(Duration, String),
    /// Never resolve; the attempt only ends when the caller drops it.
    Hang,
    /// Panic inside the job task.
    Panic,
}

/// Sets its flag when dropped, i.e. when an in-flight attempt is torn down.
struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Fake backend replaying a per-graph script of replies.
#[derive(Default)]
pub struct ScriptedBackend {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: AtomicU32,
    torn_down: Arc<AtomicBool>,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        ScriptedBackend::default()
    }

    pub fn script(self, graph_name: &str, steps: Vec<Step>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(graph_name.to_string(), steps.into());
        self
    }

    /// The last request seen, for inspecting what was sent.
    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// True once a hanging attempt has been dropped.
    pub fn torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, request: &GenerationRequest) -> Result<BackendReply, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&request.document.metadata.name)
            .and_then(VecDeque::pop_front);

        match step {
            Some(Step::Reply(text)) => Ok(reply(text)),
            Some(Step::Fail(e)) => Err(e),
            Some(Step::Slow(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(reply(text))
            }
            Some(Step::Hang) => {
                let _flag = DropFlag(Arc::clone(&self.torn_down));
                std::future::pending::<()>().await;
                unreachable!()
            }
            Some(Step::Panic) => panic!("scripted backend panic"),
            None => Err(GenerationError::MalformedResponse("script exhausted".into())),
        }
    }
}

fn reply(text: String) -> BackendReply {
    BackendReply {
        text,
        status: 200,
        usage: None,
    }
}
