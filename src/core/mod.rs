pub mod actions;
pub mod config;
pub mod control_flow;
pub mod diagnostics;
pub mod engine;
pub mod evaluator;
pub mod node;
pub mod program;
pub mod template;
pub mod variable;
