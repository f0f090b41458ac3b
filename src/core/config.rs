use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
}

/// Engine tuning. Every field has a default, so a RON file only needs
/// the fields it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Seed for dice rolls.
    pub seed: u64,
    /// Orders a node may enter in one `continue_at` before it is stopped.
    pub max_steps_per_run: usize,
    /// Queued `Call` targets started per host entry point.
    pub max_calls_per_run: usize,
    /// Diagnostics kept in memory; older ones are dropped.
    pub max_recorded_diagnostics: usize,
    /// Report structural issues of every node when the engine is built.
    pub validate_on_build: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            max_steps_per_run: 10_000,
            max_calls_per_run: 64,
            max_recorded_diagnostics: 256,
            validate_on_build: true,
        }
    }
}

impl EngineConfig {
    pub fn load_from_ron(path: &Path) -> Result<EngineConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    pub fn parse_ron(input: &str) -> Result<EngineConfig, ConfigError> {
        Ok(ron::from_str(input)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let cfg = EngineConfig::parse_ron("(seed: 7, max_steps_per_run: 50)").unwrap();
        assert_eq!(cfg.seed, 7);
        assert_eq!(cfg.max_steps_per_run, 50);
        assert_eq!(cfg.max_calls_per_run, 64);
        assert!(cfg.validate_on_build);
    }

    #[test]
    fn empty_config_is_default() {
        let cfg = EngineConfig::parse_ron("()").unwrap();
        assert_eq!(cfg, EngineConfig::default());
    }

    #[test]
    fn unknown_field_is_an_error() {
        assert!(EngineConfig::parse_ron("(speed: 3)").is_err());
    }
}
