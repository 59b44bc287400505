//! Configuration management for the dataviz agent.
//!
//! Handles loading configuration from a TOML file and environment variables.
//! Every section is optional; defaults suit a local single-user setup.

use crate::error::{DataVizError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Connection registry storage.
    #[serde(default)]
    pub store: StoreConfig,

    /// Liveness probe budgets.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Reasoning engine selection and limits.
    #[serde(default)]
    pub reasoning: ReasoningConfig,

    /// LLM provider used by the in-process agent and the chart advisor.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Optional LLM chart suggestion.
    #[serde(default)]
    pub advisor: AdvisorConfig,
}

/// Connection registry storage.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// Path of the SQLite registry file. Defaults to the platform config dir.
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Returns the configured path or the platform default.
    ///
    /// - Linux/macOS: `~/.config/dataviz/connections.db`
    /// - Windows: `%APPDATA%\dataviz\connections.db`
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("dataviz")
                .join("connections.db")
        })
    }
}

/// Liveness probe budgets.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Connect-and-query budget for relational backends.
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,

    /// Server selection budget for document-mongo.
    #[serde(default = "default_mongo_selection")]
    pub mongo_server_selection_ms: u64,
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_mongo_selection() -> u64 {
    5000
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_probe_timeout(),
            mongo_server_selection_ms: default_mongo_selection(),
        }
    }
}

impl ProbeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn mongo_server_selection(&self) -> Duration {
        Duration::from_millis(self.mongo_server_selection_ms)
    }
}

/// Which reasoning engine answers questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// In-process SQL agent driven by the configured LLM.
    #[default]
    Agent,
    /// External engine reached over HTTP.
    Http,
    /// Canned traces, for demos and tests.
    Mock,
}

/// Reasoning engine selection and limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningConfig {
    #[serde(default)]
    pub engine: EngineKind,

    /// Endpoint for `engine = "http"`.
    pub endpoint: Option<String>,

    /// Upper bound for one reasoning call.
    #[serde(default = "default_reasoning_timeout")]
    pub timeout_secs: u64,

    /// Example rows sampled per table to ground the engine.
    #[serde(default = "default_sample_rows")]
    pub sample_rows_in_table_info: usize,

    /// Optional table allowlist passed to the engine.
    #[serde(default)]
    pub include_tables: Option<Vec<String>>,

    /// Step budget for the in-process agent.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_reasoning_timeout() -> u64 {
    120
}

fn default_sample_rows() -> usize {
    3
}

fn default_max_iterations() -> usize {
    8
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            endpoint: None,
            timeout_secs: default_reasoning_timeout(),
            sample_rows_in_table_info: default_sample_rows(),
            include_tables: None,
            max_iterations: default_max_iterations(),
        }
    }
}

impl ReasoningConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Returns the validated HTTP endpoint.
    pub fn endpoint_url(&self) -> Result<Url> {
        let endpoint = self.endpoint.as_deref().ok_or_else(|| {
            DataVizError::config("reasoning.endpoint is required when engine = \"http\"")
        })?;
        Url::parse(endpoint)
            .map_err(|e| DataVizError::config(format!("Invalid reasoning.endpoint: {e}")))
    }
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider: "openai" or "mock".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name.
    #[serde(default = "default_model")]
    pub model: String,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct AdvisorConfig {
    #[serde(default)]
    pub enabled: bool,
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dataviz")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| DataVizError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            DataVizError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Applies environment overrides (`OPENAI_MODEL`).
    pub fn apply_env_overrides(&mut self) {
        if let Ok(model) = std::env::var("OPENAI_MODEL") {
            if !model.trim().is_empty() {
                self.llm.model = model;
            }
        }
    }
}
