//! Configuration loading and parsing

use anyhow::{Context, Result};
use cep_engine::{Condition, EngineConfig, JsonDataFormatter, Pattern, PatternStructure};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    pub pattern: PatternConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputConfig {
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default = "default_type_field")]
    pub type_field: String,
    #[serde(default = "default_timestamp_field")]
    pub timestamp_field: String,
}

fn default_type_field() -> String {
    "type".to_string()
}

fn default_timestamp_field() -> String {
    "timestamp".to_string()
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            files: Vec::new(),
            type_field: default_type_field(),
            timestamp_field: default_timestamp_field(),
        }
    }
}

impl InputConfig {
    /// Record formatter for the configured attribute names
    pub fn formatter(&self) -> JsonDataFormatter {
        JsonDataFormatter::new(&self.type_field, &self.timestamp_field)
    }
}

/// Matches are always written as JSON lines
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PatternConfig {
    pub structure: PatternStructure,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub window_ms: u64,
    #[serde(default)]
    pub freeze: Vec<String>,
}

impl PatternConfig {
    /// Build and validate the pattern
    pub fn build(&self) -> Result<Pattern> {
        let window = Duration::milliseconds(self.window_ms as i64);
        let pattern = Pattern::new(self.structure.clone(), self.conditions.clone(), window)
            .context("Invalid [pattern] section")?;
        if self.freeze.is_empty() {
            return Ok(pattern);
        }
        pattern
            .with_freeze(self.freeze.iter().cloned())
            .context("Invalid [pattern] freeze list")
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}
