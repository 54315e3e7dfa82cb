//! Devlog Core - Data model, errors and shared configuration
//!
//! This crate defines the vocabulary shared by every extractor and by the
//! storage layer that consumes extraction output:
//! - Entities and relationships extracted from devlog text
//! - The merged per-run extraction result and its log record
//! - Common error types
//! - Configuration management and tracing setup

pub mod config;
pub mod telemetry;

pub use config::{AppConfig, ConfigError, ExtractionConfig, ExtractorKind, LlmConfig, LoggingConfig};

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Maximum number of characters of a raw model response kept in a parse error
pub const SNIPPET_LIMIT: usize = 200;

/// Core error types for devlog extraction
#[derive(Error, Debug)]
pub enum DevlogError {
    #[error("Failed to initialise model client: {0}")]
    ClientInit(String),

    #[error("Model service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Model transport error: {0}")]
    Transport(String),

    #[error("Failed to parse model response: {message} (response: {snippet})")]
    Parse { message: String, snippet: String },

    #[error("Extraction cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DevlogError {
    /// Build a parse error, keeping a bounded prefix of the raw response
    pub fn parse(message: impl Into<String>, raw: &str) -> Self {
        Self::Parse {
            message: message.into(),
            snippet: snippet(raw, SNIPPET_LIMIT),
        }
    }
}

/// Truncate `raw` to at most `limit` characters on a char boundary
pub fn snippet(raw: &str, limit: usize) -> String {
    match raw.char_indices().nth(limit) {
        Some((idx, _)) => format!("{}...", &raw[..idx]),
        None => raw.to_string(),
    }
}

pub type Result<T> = std::result::Result<T, DevlogError>;

// ============================================================================
// Extraction Model
// ============================================================================

/// Normalize a name into its merge-key form (trimmed, lowercase)
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A named concept found in devlog text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Normalized (lowercase) name, the merge key
    pub name: String,

    /// Free-form category (component, config, service, technology, ...)
    #[serde(rename = "type")]
    pub entity_type: String,

    /// Extractor's reliability score in [0, 1]
    pub confidence: f64,

    /// Which extractor produced this record
    pub source: String,
}

impl Entity {
    /// Create a new entity; the name is normalized on the way in
    pub fn new(
        name: &str,
        entity_type: impl Into<String>,
        confidence: f64,
        source: impl Into<String>,
    ) -> Self {
        Self {
            name: normalize_name(name),
            entity_type: entity_type.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source: source.into(),
        }
    }
}

/// A directed, typed edge between two entity names.
///
/// Endpoints need not refer to an entity present in the same result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub from_entity: String,
    pub to_entity: String,
    #[serde(rename = "type")]
    pub relationship_type: String,
}

impl Relationship {
    /// Create a new relationship; both endpoints are normalized
    pub fn new(from: &str, to: &str, relationship_type: impl Into<String>) -> Self {
        Self {
            from_entity: normalize_name(from),
            to_entity: normalize_name(to),
            relationship_type: relationship_type.into(),
        }
    }
}

/// Output of one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// At most one entity per normalized name, in first-seen order
    pub entities: Vec<Entity>,

    /// All relationships, in extractor registration order
    pub relationships: Vec<Relationship>,

    /// Wall time of the whole run
    pub duration: Duration,

    /// Which extractor(s) contributed, e.g. "pattern" or "pattern+llm"
    pub extractor: String,
}

impl ExtractionResult {
    /// Look up a merged entity by name
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        let key = normalize_name(name);
        self.entities.iter().find(|e| e.name == key)
    }

    /// Build the record persisted after each run
    pub fn log_entry(&self, session_id: Option<&str>, input: &str) -> ExtractionLogEntry {
        ExtractionLogEntry {
            session_id: session_id.map(str::to_string),
            extractor: self.extractor.clone(),
            input_length: input.len(),
            entities_found: self.entities.len(),
            duration_ms: self.duration.as_millis() as u64,
            recorded_at: Utc::now(),
        }
    }
}

/// Summary of one extraction run, as written to the extraction log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionLogEntry {
    /// Devlog session the text came from
    pub session_id: Option<String>,

    /// Provenance label of the run
    pub extractor: String,

    /// Input size in bytes
    pub input_length: usize,

    /// Number of merged entities
    pub entities_found: usize,

    /// Elapsed time in milliseconds
    pub duration_ms: u64,

    pub recorded_at: DateTime<Utc>,
}

// ============================================================================
// Tests
// ============================================================================
