//! Hub configuration.

use crate::error::{BoardError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Upper bound for each repository write made by a mutation
    pub persist_timeout_ms: u64,
    /// Upper bound for loading a board on first access
    pub load_timeout_ms: u64,
    /// Title given to a column added with a blank title
    pub default_column_title: String,
    /// Title given to a card added with a blank title
    pub default_card_title: String,
    pub max_title_len: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            persist_timeout_ms: 5_000,
            load_timeout_ms: 10_000,
            default_column_title: "New Column".to_string(),
            default_card_title: "New Card".to_string(),
            max_title_len: 200,
        }
    }
}

impl HubConfig {
    pub fn persist_timeout(&self) -> Duration {
        Duration::from_millis(self.persist_timeout_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).await?;
        Self::from_json_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.persist_timeout_ms == 0 {
            return Err(BoardError::Config(
                "persist_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.load_timeout_ms == 0 {
            return Err(BoardError::Config(
                "load_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_title_len == 0 {
            return Err(BoardError::Config(
                "max_title_len must be greater than zero".to_string(),
            ));
        }
        if self.default_column_title.trim().is_empty() || self.default_card_title.trim().is_empty() {
            return Err(BoardError::Config(
                "default titles must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// Normalises a user supplied title: trims it, substitutes `default` when blank
    /// and rejects titles longer than `max_title_len` characters.
    pub fn resolve_title(&self, field: &'static str, title: &str, default: &str) -> Result<String> {
        let trimmed = title.trim();
        if trimmed.is_empty() {
            return Ok(default.to_string());
        }
        if trimmed.chars().count() > self.max_title_len {
            return Err(BoardError::invalid(
                field,
                format!("longer than {} characters", self.max_title_len),
            ));
        }
        Ok(trimmed.to_string())
    }
}
