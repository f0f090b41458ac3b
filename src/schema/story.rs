use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use super::order::{Order, Scope};
use super::value::Value;

#[derive(Debug, Error)]
pub enum StoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// A variable declared by a story, with its initial value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub key: String,
    #[serde(default)]
    pub scope: Scope,
    pub value: Value,
}

impl VariableDecl {
    pub fn new(key: &str, scope: Scope, value: impl Into<Value>) -> Self {
        Self {
            key: key.to_string(),
            scope,
            value: value.into(),
        }
    }
}

/// A named node and its orders, as authored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDef {
    pub name: String,
    #[serde(default)]
    pub orders: Vec<Order>,
}

impl NodeDef {
    pub fn new(name: &str, orders: Vec<Order>) -> Self {
        Self {
            name: name.to_string(),
            orders,
        }
    }
}

/// A set of variables and nodes loaded together into one engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Story {
    #[serde(default)]
    pub variables: Vec<VariableDecl>,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
}

impl Story {
    /// Load a story from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<Story, StoryError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a story from a RON string.
    pub fn parse_ron(input: &str) -> Result<Story, StoryError> {
        Ok(ron::from_str(input)?)
    }

    /// Merge another story into this one. Variables and nodes from `other`
    /// replace entries in `self` with the same key or name.
    pub fn merge(&mut self, other: Story) {
        for decl in other.variables {
            self.variables.retain(|v| v.key != decl.key);
            self.variables.push(decl);
        }
        for node in other.nodes {
            self.nodes.retain(|n| n.name != node.name);
            self.nodes.push(node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::order::{Instruction, OrderTag};

    const STORY: &str = r#"Story(
        variables: [
            (key: "visited", scope: Private, value: Boolean(false)),
            (key: "gold", scope: Global, value: Integer(10)),
        ],
        nodes: [
            (
                name: "gate",
                orders: [
                    (instruction: Say(text: "The gate creaks.")),
                    (instruction: Stop),
                ],
            ),
        ],
    )"#;

    #[test]
    fn parse_story() {
        let story = Story::parse_ron(STORY).unwrap();
        assert_eq!(story.variables.len(), 2);
        assert_eq!(story.variables[1].scope, Scope::Global);
        assert_eq!(story.nodes[0].name, "gate");
        assert_eq!(story.nodes[0].orders[1].tag(), OrderTag::Stop);
        assert!(matches!(
            &story.nodes[0].orders[0].instruction,
            Instruction::Say { speaker: None, text } if text == "The gate creaks."
        ));
    }

    #[test]
    fn parse_error_is_reported() {
        assert!(Story::parse_ron("Story(nodes: [").is_err());
    }

    #[test]
    fn merge_precedence() {
        let mut base = Story::parse_ron(STORY).unwrap();
        let other = Story {
            variables: vec![VariableDecl::new("gold", Scope::Global, 99i64)],
            nodes: vec![NodeDef::new("gate", vec![])],
        };
        base.merge(other);

        assert_eq!(base.variables.len(), 2);
        let gold = base.variables.iter().find(|v| v.key == "gold").unwrap();
        assert_eq!(gold.value, Value::Integer(99));
        assert_eq!(base.nodes.len(), 1);
        assert!(base.nodes[0].orders.is_empty());
    }
}
