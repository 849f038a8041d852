//! Configuration loading, validation, and management for deepdive.
//!
//! Loads configuration from `~/.deepdive/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.deepdive/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key for the OpenAI-compatible endpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of the OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model selection for each hosted collaborator
    #[serde(default)]
    pub models: ModelsConfig,

    /// Vector retrieval settings
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Tool execution settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Evidence store settings
    #[serde(default)]
    pub store: StoreConfig,
}

fn default_api_url() -> String {
    "https://api.openai.com/v1".into()
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("models", &self.models)
            .field("retrieval", &self.retrieval)
            .field("tools", &self.tools)
            .field("store", &self.store)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsConfig {
    #[serde(default = "default_embedding_model")]
    pub embedding: String,

    /// Model that decides on tool calls
    #[serde(default = "default_chat_model")]
    pub evaluator: String,

    #[serde(default = "default_chat_model")]
    pub summarizer: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.2
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            embedding: default_embedding_model(),
            evaluator: default_chat_model(),
            summarizer: default_chat_model(),
            temperature: default_temperature(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Similarity threshold; chunks scoring below are dropped
    #[serde(default = "default_min_score")]
    pub min_score: f32,

    #[serde(default = "default_max_results")]
    pub max_results: usize,

    /// JSONL corpus file. Relative paths resolve against the config dir.
    #[serde(default = "default_corpus_path")]
    pub corpus_path: PathBuf,
}

fn default_min_score() -> f32 {
    0.3
}
fn default_max_results() -> usize {
    20
}
fn default_corpus_path() -> PathBuf {
    PathBuf::from("corpus.jsonl")
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            min_score: default_min_score(),
            max_results: default_max_results(),
            corpus_path: default_corpus_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Upper bound on a single tool call
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Remote data publishers reachable through the `remote_source` tool
    #[serde(default)]
    pub sources: Vec<RemoteSourceConfig>,

    /// Look-back window of the `corpus_window` tool
    #[serde(default = "default_corpus_window_days")]
    pub corpus_window_days: u32,
}

fn default_timeout_secs() -> u64 {
    30
}
fn default_corpus_window_days() -> u32 {
    90
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            sources: vec![],
            corpus_window_days: default_corpus_window_days(),
        }
    }
}

/// One remote data publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSourceConfig {
    /// Name the evaluator refers to (e.g. "bls")
    pub name: String,

    /// Endpoint returning a JSON array of evidence records
    pub url: String,

    #[serde(default)]
    pub description: String,
}

/// Which EvidenceStore backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Sqlite,
    Memory,
    File,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Database or snapshot file. Defaults to a file in the config dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Resolve the on-disk location for the configured backend.
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(p) => resolve(p),
            None => match self.backend {
                StoreBackend::File => AppConfig::config_dir().join("uploads.json"),
                _ => AppConfig::config_dir().join("deepdive.db"),
            },
        }
    }
}

/// Resolve a path against the config dir unless it is absolute.
fn resolve(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        AppConfig::config_dir().join(path)
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.deepdive/config.toml).
    ///
    /// Also checks environment variables:
    /// - `DEEPDIVE_API_KEY` (highest priority), then `OPENAI_API_KEY`
    /// - `DEEPDIVE_API_URL`
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup("DEEPDIVE_API_KEY").or_else(|| lookup("OPENAI_API_KEY")) {
            if !key.is_empty() {
                self.api_key = Some(key);
            }
        }
        if let Some(url) = lookup("DEEPDIVE_API_URL") {
            self.api_url = url;
        }
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".deepdive")
    }

    /// The corpus file, resolved against the config dir.
    pub fn corpus_path(&self) -> PathBuf {
        resolve(&self.retrieval.corpus_path)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.retrieval.min_score) {
            return Err(ConfigError::ValidationError(
                "retrieval.min_score must be between 0.0 and 1.0".into(),
            ));
        }

        if self.retrieval.max_results == 0 {
            return Err(ConfigError::ValidationError(
                "retrieval.max_results must be > 0".into(),
            ));
        }

        if !(0.0..=2.0).contains(&self.models.temperature) {
            return Err(ConfigError::ValidationError(
                "models.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.tools.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "tools.timeout_secs must be > 0".into(),
            ));
        }

        let mut names = HashSet::new();
        for source in &self.tools.sources {
            if source.name.trim().is_empty() {
                return Err(ConfigError::ValidationError(
                    "tools.sources entries need a name".into(),
                ));
            }
            if !names.insert(source.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "duplicate tools.sources name '{}'",
                    source.name
                )));
            }
            if !(source.url.starts_with("http://") || source.url.starts_with("https://")) {
                return Err(ConfigError::ValidationError(format!(
                    "tools.sources '{}' must have an http(s) url",
                    source.name
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            models: ModelsConfig::default(),
            retrieval: RetrievalConfig::default(),
            tools: ToolsConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigError> for deepdive_core::Error {
    fn from(e: ConfigError) -> Self {
        deepdive_core::Error::Config {
            message: e.to_string(),
        }
    }
}
