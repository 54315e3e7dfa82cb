//! Devlog Configuration Management
//!
//! Handles configuration from environment variables and TOML files
//! with sensible defaults for a local Ollama install.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::debug;

/// Model used when none is configured
pub const DEFAULT_MODEL: &str = "llama3.2:3b";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Which extractors run
    pub extraction: ExtractionConfig,

    /// Ollama connection settings
    pub llm: LlmConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError::FileReadError {
            path: path.clone(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path,
            message: e.to_string(),
        })
    }

    /// Merge with environment variables (env takes precedence)
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        self.apply_env()?;
        Ok(self)
    }

    fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a key lookup; only keys that are present change
    /// the configuration.
    fn apply_vars<F>(&mut self, var: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            let value = var(key);
            if value.is_some() {
                debug!(key, "configuration overridden");
            }
            value
        };

        // Extraction
        if let Some(enabled) = var("DEVLOG_EXTRACTION_ENABLED") {
            self.extraction.enabled = parse_bool("DEVLOG_EXTRACTION_ENABLED", &enabled)?;
        }
        if let Some(kind) = var("DEVLOG_PRIMARY_EXTRACTOR") {
            self.extraction.primary_extractor = kind.parse()?;
        }

        // Ollama
        if let Some(host) = var("OLLAMA_HOST") {
            self.llm.ollama_url = host;
        }
        if let Some(model) = var("OLLAMA_MODEL") {
            self.llm.model = model;
        }
        if let Some(ms) = var("OLLAMA_PROBE_TIMEOUT_MS") {
            self.llm.probe_timeout_ms = ms.parse().map_err(|_| ConfigError::InvalidValue {
                key: "OLLAMA_PROBE_TIMEOUT_MS".to_string(),
                value: ms,
            })?;
        }
        if let Some(secs) = var("OLLAMA_TIMEOUT_SECS") {
            self.llm.timeout_secs = secs.parse().map_err(|_| ConfigError::InvalidValue {
                key: "OLLAMA_TIMEOUT_SECS".to_string(),
                value: secs,
            })?;
        }

        // Logging
        if let Some(level) = var("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = var("LOG_FORMAT") {
            self.logging.json_format = format.eq_ignore_ascii_case("json");
        }

        Ok(())
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// Extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Enable model-backed extraction at all
    pub enabled: bool,

    /// Extractor preferred when enabled
    pub primary_extractor: ExtractorKind,
}

/// Extractors that can be selected as primary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    #[default]
    #[serde(alias = "regex")]
    Pattern,
    #[serde(alias = "ollama", alias = "llm")]
    Model,
}

impl std::str::FromStr for ExtractorKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pattern" | "regex" => Ok(Self::Pattern),
            "model" | "llm" | "ollama" => Ok(Self::Model),
            _ => Err(ConfigError::InvalidValue {
                key: "DEVLOG_PRIMARY_EXTRACTOR".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Ollama connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama server URL; the scheme may be omitted
    pub ollama_url: String,

    /// Model name; empty selects [`DEFAULT_MODEL`]
    pub model: String,

    /// Availability probe timeout in milliseconds
    pub probe_timeout_ms: u64,

    /// Generation request timeout in seconds
    pub timeout_secs: u64,
}

impl LlmConfig {
    /// Configured model, or the default when unset
    pub fn model_or_default(&self) -> &str {
        let model = self.model.trim();
        if model.is_empty() {
            DEFAULT_MODEL
        } else {
            model
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://127.0.0.1:11434".to_string(),
            model: String::new(),
            probe_timeout_ms: 2000,
            timeout_secs: 120,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,

    /// JSON format for logs
    pub json_format: bool,

    /// Include file/line in logs
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
            include_location: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Failed to install tracing subscriber: {0}")]
    Telemetry(String),
}
