//! WASM bindings for narrative-flow: lets a web page load a story, run
//! nodes and drive waits from `requestAnimationFrame`.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use wasm_bindgen::prelude::*;

use narrative_flow::core::actions::CommandHandler;
use narrative_flow::core::engine::FlowEngine;
use narrative_flow::core::node::{Directive, ExecContext, NodeStatus, Step};
use narrative_flow::schema::order::Scope;
use narrative_flow::schema::story::Story;
use narrative_flow::schema::value::Value;

// ---------------------------------------------------------------------------
// Embedded demo story: compiled into the WASM binary
// ---------------------------------------------------------------------------
mod data {
    pub const LANTERN_QUEST: &str = include_str!("../../stories/lantern_quest.ron");
}

// ---------------------------------------------------------------------------
// JSON helper types for communication across the WASM boundary
// ---------------------------------------------------------------------------
#[derive(Debug, Clone, serde::Serialize)]
struct CommandEvent {
    node: String,
    name: String,
    args: Vec<Value>,
}

#[derive(serde::Serialize)]
struct StepOutput {
    directives: Vec<Directive>,
    commands: Vec<CommandEvent>,
    diagnostics: Vec<String>,
}

#[derive(serde::Serialize)]
struct NodeInfo {
    name: String,
    status: NodeStatus,
}

#[derive(serde::Serialize)]
struct VariableInfo {
    key: String,
    scope: Scope,
    value: Value,
}

/// Host command that hands its invocation to JavaScript instead of acting.
struct ForwardCommand {
    name: String,
    events: Rc<RefCell<Vec<CommandEvent>>>,
}

impl CommandHandler for ForwardCommand {
    fn on_enter(&mut self, args: &[Value], ctx: &mut ExecContext<'_>) -> Step {
        self.events.borrow_mut().push(CommandEvent {
            node: ctx.node.to_string(),
            name: self.name.clone(),
            args: args.to_vec(),
        });
        Step::Continue
    }
}

fn parse_scope(s: &str) -> Result<Scope, JsError> {
    match s.to_lowercase().as_str() {
        "private" => Ok(Scope::Private),
        "public" => Ok(Scope::Public),
        "global" => Ok(Scope::Global),
        other => Err(JsError::new(&format!("Unknown scope: {other}"))),
    }
}

// ---------------------------------------------------------------------------
// StoryPlayer: the main exported struct
// ---------------------------------------------------------------------------
#[wasm_bindgen]
pub struct StoryPlayer {
    engine: FlowEngine,
    events: Rc<RefCell<Vec<CommandEvent>>>,
}

#[wasm_bindgen]
impl StoryPlayer {
    /// Load a story from RON source.
    #[wasm_bindgen(constructor)]
    pub fn new(story_ron: &str, seed: u64) -> Result<StoryPlayer, JsError> {
        let story = Story::parse_ron(story_ron)
            .map_err(|e| JsError::new(&format!("Story parse error: {e}")))?;
        let engine = FlowEngine::builder()
            .seed(seed)
            .with_story(story)
            .build()
            .map_err(|e| JsError::new(&format!("Engine build error: {e}")))?;

        Ok(StoryPlayer {
            engine,
            events: Rc::new(RefCell::new(Vec::new())),
        })
    }

    /// The bundled Lantern Quest story, with its `play_sound` command
    /// forwarded to JavaScript.
    pub fn demo(seed: u64) -> Result<StoryPlayer, JsError> {
        let mut player = StoryPlayer::new(data::LANTERN_QUEST, seed)?;
        player.forward_command("play_sound");
        Ok(player)
    }

    /// Report invocations of the named command in `commands` of the next
    /// step output.
    pub fn forward_command(&mut self, name: &str) {
        self.engine.register_command(
            name,
            Box::new(ForwardCommand {
                name: name.to_string(),
                events: Rc::clone(&self.events),
            }),
        );
    }

    /// Execute a node. Returns the step output as JSON.
    pub fn execute(&mut self, node: &str) -> Result<String, JsError> {
        self.engine
            .execute(node)
            .map_err(|e| JsError::new(&format!("Execute error: {e}")))?;
        self.drain()
    }

    /// Resume a node after a host command suspended it.
    pub fn resume(&mut self, node: &str) -> Result<String, JsError> {
        self.engine
            .continue_at(node, None)
            .map_err(|e| JsError::new(&format!("Resume error: {e}")))?;
        self.drain()
    }

    pub fn stop(&mut self, node: &str) -> Result<String, JsError> {
        self.engine
            .stop(node)
            .map_err(|e| JsError::new(&format!("Stop error: {e}")))?;
        self.drain()
    }

    /// Advance waiting nodes by `elapsed_ms`. Returns the step output as
    /// JSON.
    pub fn tick(&mut self, elapsed_ms: f64) -> Result<String, JsError> {
        let elapsed = Duration::from_secs_f64(elapsed_ms.max(0.0) / 1000.0);
        self.engine.tick(elapsed);
        self.drain()
    }

    /// Return a JSON array of `{name, status}` for every node.
    pub fn nodes(&self) -> Result<String, JsError> {
        let nodes: Vec<NodeInfo> = self
            .engine
            .node_names()
            .iter()
            .filter_map(|name| {
                self.engine.node(name).map(|node| NodeInfo {
                    name: name.clone(),
                    status: node.status(),
                })
            })
            .collect();
        serde_json::to_string(&nodes)
            .map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }

    /// Return a JSON array of local and global variables.
    pub fn variables(&self) -> Result<String, JsError> {
        let mut variables: Vec<VariableInfo> = self
            .engine
            .variables()
            .locals()
            .into_iter()
            .map(|v| VariableInfo {
                key: v.key().to_string(),
                scope: v.scope(),
                value: v.peek(),
            })
            .collect();
        for key in self.engine.globals().keys() {
            if let Some(v) = self.engine.globals().get(&key) {
                variables.push(VariableInfo {
                    key,
                    scope: Scope::Global,
                    value: v.peek(),
                });
            }
        }
        serde_json::to_string(&variables)
            .map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }

    /// Set a variable from a JSON-encoded value such as `{"Integer": 3}`.
    pub fn set_variable(&mut self, key: &str, scope: &str, value_json: &str) -> Result<(), JsError> {
        let scope = parse_scope(scope)?;
        let value: Value = serde_json::from_str(value_json)
            .map_err(|e| JsError::new(&format!("Invalid value JSON: {e}")))?;
        self.engine
            .variables()
            .set(key, scope, value)
            .map_err(|e| JsError::new(&format!("Variable error: {e}")))
    }

    pub fn reset_variables(&mut self) {
        self.engine.reset_variables();
    }
}

// Private helpers
impl StoryPlayer {
    fn drain(&mut self) -> Result<String, JsError> {
        let output = StepOutput {
            directives: self.engine.take_output(),
            commands: self.events.borrow_mut().drain(..).collect(),
            diagnostics: self
                .engine
                .take_diagnostics()
                .iter()
                .map(|d| d.to_string())
                .collect(),
        };
        serde_json::to_string(&output)
            .map_err(|e| JsError::new(&format!("Serialization error: {e}")))
    }
}
