//! Narrative Flow: an order-list execution engine for narrative programs.
//!
//! Nodes hold ordered lists of orders (instructions) executed linearly
//! with jump-based control flow (`If` / `ElseIf` / `Else` / `End`,
//! `While` loops) over a typed, scoped variable system with shared
//! global variables.

pub mod core;
pub mod schema;
