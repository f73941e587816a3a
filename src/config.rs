use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::DelimiterGrammar;
use crate::matching::{MatchWeights, WeightsError};
use crate::store::DEFAULT_MAX_WRITE_RETRIES;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid weights: {0}")]
    InvalidWeights(#[from] WeightsError),
    #[error("Placeholder delimiters must be non-empty single-line strings")]
    InvalidDelimiters,
    #[error("default_top_k must be at least 1")]
    InvalidTopK,
    #[error("plain_heading_max_chars must be at least 1")]
    InvalidHeadingLength,
}

/// Engine-wide settings. Every field has an explicit default, so a JSON file
/// only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub weights: MatchWeights,
    pub delimiters: DelimiterGrammar,
    pub default_top_k: usize,
    pub max_write_retries: u32,
    pub plain_heading_max_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::v0()
    }
}

impl EngineConfig {
    pub fn v0() -> Self {
        Self {
            weights: MatchWeights::default(),
            delimiters: DelimiterGrammar::default(),
            default_top_k: 5,
            max_write_retries: DEFAULT_MAX_WRITE_RETRIES,
            plain_heading_max_chars: 60,
        }
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.weights.validate()?;
        if !self.delimiters.is_valid() {
            return Err(ConfigError::InvalidDelimiters);
        }
        if self.default_top_k == 0 {
            return Err(ConfigError::InvalidTopK);
        }
        if self.plain_heading_max_chars == 0 {
            return Err(ConfigError::InvalidHeadingLength);
        }
        Ok(())
    }
}
