//! The flow engine: owns a set of nodes, their variables and the output
//! they produce. Built via `FlowEngine::builder()`.
//!
//! Hosts start nodes with `execute`, drive `Wait` orders with `tick`, and
//! drain `take_output` / `take_diagnostics` between calls.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::core::actions::{CommandHandler, CommandRegistry};
use crate::core::config::{ConfigError, EngineConfig};
use crate::core::diagnostics::{Diagnostic, Diagnostics, Severity};
use crate::core::node::{Directive, ExecContext, Node, NodeStatus, NodeStatuses};
use crate::core::program::Program;
use crate::core::variable::{GlobalEnvironment, VariableStore};
use crate::schema::story::{NodeDef, Story, StoryError};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("story error: {0}")]
    Story(#[from] StoryError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("node not found: {0}")]
    NodeNotFound(String),
    #[error("node defined more than once: {0}")]
    DuplicateNode(String),
}

pub struct FlowEngine {
    nodes: FxHashMap<String, Node>,
    /// Node names in definition order.
    node_order: Vec<String>,
    /// What running orders see of every node's status.
    statuses: NodeStatuses,
    variables: VariableStore,
    commands: CommandRegistry,
    diagnostics: Diagnostics,
    output: Vec<Directive>,
    pending_calls: VecDeque<String>,
    rng: StdRng,
    config: EngineConfig,
}

/// Builder for constructing a `FlowEngine`.
pub struct FlowEngineBuilder {
    globals: Option<GlobalEnvironment>,
    config: Option<EngineConfig>,
    config_path: Option<PathBuf>,
    story_paths: Vec<PathBuf>,
    stories_dirs: Vec<PathBuf>,
    /// Directly provided stories (for testing without files).
    stories: Vec<Story>,
    /// Directly provided nodes, added after every story.
    nodes: Vec<NodeDef>,
    seed: Option<u64>,
    commands: CommandRegistry,
}

impl FlowEngine {
    pub fn builder() -> FlowEngineBuilder {
        FlowEngineBuilder {
            globals: None,
            config: None,
            config_path: None,
            story_paths: Vec::new(),
            stories_dirs: Vec::new(),
            stories: Vec::new(),
            nodes: Vec::new(),
            seed: None,
            commands: CommandRegistry::default(),
        }
    }

    /// Start a node from its first order, then run any nodes it called.
    /// Returns `false` if the node was already running.
    pub fn execute(&mut self, name: &str) -> Result<bool, EngineError> {
        let started = self
            .with_node(name, |node, ctx, commands| node.execute(ctx, commands))
            .ok_or_else(|| EngineError::NodeNotFound(name.to_string()))?;
        self.run_pending_calls();
        Ok(started)
    }

    /// Resume a node at `index`, or after its current order.
    pub fn continue_at(
        &mut self,
        name: &str,
        index: Option<usize>,
    ) -> Result<NodeStatus, EngineError> {
        let status = self
            .with_node(name, |node, ctx, commands| node.continue_at(index, ctx, commands))
            .ok_or_else(|| EngineError::NodeNotFound(name.to_string()))?;
        self.run_pending_calls();
        Ok(status)
    }

    pub fn stop(&mut self, name: &str) -> Result<(), EngineError> {
        self.with_node(name, |node, ctx, _| node.stop(ctx))
            .ok_or_else(|| EngineError::NodeNotFound(name.to_string()))
    }

    pub fn is_complete(&self, name: &str) -> Result<bool, EngineError> {
        Ok(self.status(name)? == NodeStatus::Complete)
    }

    pub fn status(&self, name: &str) -> Result<NodeStatus, EngineError> {
        self.nodes
            .get(name)
            .map(Node::status)
            .ok_or_else(|| EngineError::NodeNotFound(name.to_string()))
    }

    /// Advance every waiting node by `elapsed` (and by one frame).
    pub fn tick(&mut self, elapsed: Duration) {
        let waiting: Vec<String> = self
            .node_order
            .iter()
            .filter(|name| {
                self.nodes
                    .get(name.as_str())
                    .is_some_and(|n| n.status() == NodeStatus::Waiting)
            })
            .cloned()
            .collect();

        for name in waiting {
            self.with_node(&name, |node, ctx, commands| node.tick(elapsed, ctx, commands));
        }
        self.run_pending_calls();
    }

    /// Start queued `Call` targets in order. Nodes started here may queue
    /// more calls; at most `max_calls_per_run` are started.
    fn run_pending_calls(&mut self) {
        let mut started = 0usize;
        while let Some(target) = self.pending_calls.pop_front() {
            if started == self.config.max_calls_per_run {
                self.diagnostics.structural(
                    Severity::Error,
                    &target,
                    None,
                    format!(
                        "more than {} calls in one run; remaining calls dropped",
                        self.config.max_calls_per_run
                    ),
                );
                self.pending_calls.clear();
                return;
            }
            started += 1;

            let ran = self.with_node(&target, |node, ctx, commands| node.execute(ctx, commands));
            if ran.is_none() {
                self.diagnostics
                    .host(&target, None, "called node does not exist");
            }
        }
    }

    fn with_node<R>(
        &mut self,
        name: &str,
        f: impl FnOnce(&mut Node, &mut ExecContext<'_>, &mut CommandRegistry) -> R,
    ) -> Option<R> {
        let node = self.nodes.get_mut(name)?;
        if let Some(status) = self.statuses.get_mut(name) {
            *status = NodeStatus::Executing;
        }
        let result = {
            let mut ctx = ExecContext {
                node: name,
                variables: &self.variables,
                nodes: &self.statuses,
                diagnostics: &mut self.diagnostics,
                output: &mut self.output,
                rng: &mut self.rng,
                calls: &mut self.pending_calls,
                max_steps: self.config.max_steps_per_run,
            };
            f(node, &mut ctx, &mut self.commands)
        };
        if let Some(status) = self.statuses.get_mut(name) {
            *status = node.status();
        }
        Some(result)
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.variables
    }

    /// Restore every variable to the value it held when first read.
    pub fn reset_variables(&self) {
        self.variables.reset_all();
    }

    pub fn globals(&self) -> &GlobalEnvironment {
        self.variables.globals()
    }

    pub fn register_command(&mut self, name: &str, handler: Box<dyn CommandHandler>) {
        self.commands.insert(name.to_string(), handler);
    }

    pub fn output(&self) -> &[Directive] {
        &self.output
    }

    pub fn take_output(&mut self) -> Vec<Directive> {
        std::mem::take(&mut self.output)
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        self.diagnostics.take()
    }

    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.get(name)
    }

    pub fn node_mut(&mut self, name: &str) -> Option<&mut Node> {
        self.nodes.get_mut(name)
    }

    pub fn node_names(&self) -> &[String] {
        &self.node_order
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }
}

impl FlowEngineBuilder {
    /// Share a global environment with other engines.
    pub fn globals(mut self, globals: GlobalEnvironment) -> Self {
        self.globals = Some(globals);
        self
    }

    /// Provide the configuration directly. Takes precedence over
    /// `config_path`.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn config_path(mut self, path: impl AsRef<Path>) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn story_path(mut self, path: impl AsRef<Path>) -> Self {
        self.story_paths.push(path.as_ref().to_path_buf());
        self
    }

    /// Load every `.ron` story in a directory. Missing directories are
    /// skipped.
    pub fn stories_dir(mut self, path: impl AsRef<Path>) -> Self {
        self.stories_dirs.push(path.as_ref().to_path_buf());
        self
    }

    /// Provide a story directly (for testing without files).
    pub fn with_story(mut self, story: Story) -> Self {
        self.stories.push(story);
        self
    }

    pub fn with_node(mut self, node: NodeDef) -> Self {
        self.nodes.push(node);
        self
    }

    /// Seed for dice rolls. Overrides the configured seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn command(mut self, name: &str, handler: Box<dyn CommandHandler>) -> Self {
        self.commands.insert(name.to_string(), handler);
        self
    }

    pub fn build(self) -> Result<FlowEngine, EngineError> {
        // 1. Configuration
        let mut config = match (self.config, &self.config_path) {
            (Some(config), _) => config,
            (None, Some(path)) => EngineConfig::load_from_ron(path)?,
            (None, None) => EngineConfig::default(),
        };
        if let Some(seed) = self.seed {
            config.seed = seed;
        }

        // 2. Stories: directories, then files, then direct values. Later
        //    stories override earlier ones by variable key and node name.
        let mut story = Story::default();
        for dir in &self.stories_dirs {
            if dir.exists() {
                load_ron_files_from_dir(dir, |path| {
                    let loaded = Story::load_from_ron(path)?;
                    check_unique_nodes(&loaded)?;
                    story.merge(loaded);
                    Ok(())
                })?;
            }
        }
        for path in &self.story_paths {
            let loaded = Story::load_from_ron(path)?;
            check_unique_nodes(&loaded)?;
            story.merge(loaded);
        }
        for loaded in self.stories {
            check_unique_nodes(&loaded)?;
            story.merge(loaded);
        }

        // 3. Directly provided nodes may not shadow story nodes
        for def in self.nodes {
            if story.nodes.iter().any(|n| n.name == def.name) {
                return Err(EngineError::DuplicateNode(def.name));
            }
            story.nodes.push(def);
        }

        // 4. Variables
        let mut variables = VariableStore::new(self.globals.unwrap_or_default());
        for decl in &story.variables {
            variables.declare(decl);
        }

        // 5. Nodes
        let mut nodes = FxHashMap::default();
        let mut node_order = Vec::with_capacity(story.nodes.len());
        let mut statuses = NodeStatuses::default();
        for def in story.nodes {
            let node = Node::new(&def.name, Program::from(def.orders));
            node_order.push(def.name.clone());
            statuses.insert(def.name.clone(), node.status());
            nodes.insert(def.name, node);
        }

        // 6. Structural checks
        let mut diagnostics = Diagnostics::with_limit(config.max_recorded_diagnostics);
        if config.validate_on_build {
            for name in &node_order {
                let Some(node) = nodes.get(name) else { continue };
                for issue in node.program().validate() {
                    diagnostics.structural(
                        Severity::Warning,
                        name,
                        Some(issue.index()),
                        issue.to_string(),
                    );
                }
            }
        }

        tracing::info!(
            nodes = node_order.len(),
            variables = story.variables.len(),
            seed = config.seed,
            "flow engine built"
        );

        Ok(FlowEngine {
            nodes,
            node_order,
            statuses,
            variables,
            commands: self.commands,
            diagnostics,
            output: Vec::new(),
            pending_calls: VecDeque::new(),
            rng: StdRng::seed_from_u64(config.seed),
            config,
        })
    }
}

fn check_unique_nodes(story: &Story) -> Result<(), EngineError> {
    let mut seen = FxHashSet::default();
    for node in &story.nodes {
        if !seen.insert(node.name.as_str()) {
            return Err(EngineError::DuplicateNode(node.name.clone()));
        }
    }
    Ok(())
}

/// Load all .ron files from a directory, calling `loader` for each.
fn load_ron_files_from_dir<F>(dir: &Path, mut loader: F) -> Result<(), EngineError>
where
    F: FnMut(&Path) -> Result<(), EngineError>,
{
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("ron") {
            paths.push(path);
        }
    }
    // Directory order is platform dependent; overrides must be stable.
    paths.sort();
    for path in &paths {
        loader(path)?;
    }
    Ok(())
}
