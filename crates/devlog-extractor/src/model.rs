//! Model-backed extraction
//!
//! Asks a local Ollama model for entities and relationships. The model is
//! not trusted to follow the requested shape: code fences are stripped and
//! `name` may come back as a string or a list of strings.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::llm::{GenerateRequest, GenerationBackend, OllamaClient};
use crate::prompt::build_extraction_prompt;
use crate::{Extraction, Extractor};
use devlog_core::{normalize_name, DevlogError, Entity, LlmConfig, Relationship, Result};

/// Source tag for model output
pub const MODEL_SOURCE: &str = "llm";

/// Confidence assigned to every model entity
pub const MODEL_CONFIDENCE: f64 = 1.0;

/// Names shorter than this (after normalization) are dropped
const MIN_NAME_CHARS: usize = 2;

// ============================================================================
// Response schema
// ============================================================================

/// `name` as the model actually returns it
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NameField {
    One(String),
    Many(Vec<String>),
}

impl NameField {
    fn into_names(self) -> Vec<String> {
        match self {
            Self::One(name) => vec![name],
            Self::Many(names) => names,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResponse {
    entities: Vec<RawEntity>,
    relationships: Vec<RawRelationship>,
}

#[derive(Debug, Deserialize)]
struct RawEntity {
    name: NameField,
    #[serde(rename = "type")]
    entity_type: String,
}

#[derive(Debug, Deserialize)]
struct RawRelationship {
    from: String,
    to: String,
    #[serde(rename = "type")]
    relationship_type: String,
}

/// Strip surrounding whitespace and Markdown code fences
pub fn clean_response(raw: &str) -> &str {
    let s = raw.trim();
    let s = s
        .strip_prefix("```json")
        .or_else(|| s.strip_prefix("```"))
        .unwrap_or(s);
    let s = s.strip_suffix("```").unwrap_or(s);
    s.trim()
}

/// Parse a raw model reply into canonical entities and relationships
pub fn parse_response(raw: &str) -> Result<Extraction> {
    let parsed: RawResponse = serde_json::from_str(clean_response(raw))
        .map_err(|e| DevlogError::parse(e.to_string(), raw))?;

    let mut entities = Vec::new();
    for raw_entity in parsed.entities {
        for name in raw_entity.name.into_names() {
            let name = normalize_name(&name);
            if name.chars().count() < MIN_NAME_CHARS {
                continue;
            }
            entities.push(Entity::new(
                &name,
                raw_entity.entity_type.clone(),
                MODEL_CONFIDENCE,
                MODEL_SOURCE,
            ));
        }
    }

    let relationships = parsed
        .relationships
        .into_iter()
        .filter_map(|r| {
            let from = normalize_name(&r.from);
            let to = normalize_name(&r.to);
            if from.is_empty() || to.is_empty() {
                return None;
            }
            Some(Relationship::new(&from, &to, r.relationship_type))
        })
        .collect();

    Ok(Extraction {
        entities,
        relationships,
    })
}

// ============================================================================
// Extractor
// ============================================================================

/// Extractor backed by a text-generation service
pub struct ModelExtractor {
    backend: Arc<dyn GenerationBackend>,
    model: String,
    probe_timeout: Duration,
}

impl ModelExtractor {
    /// Create an extractor for `model` against the Ollama host named by
    /// `OLLAMA_HOST` (or the local default). An empty model selects the
    /// default model.
    pub fn new(model: &str) -> Result<Self> {
        let mut config = LlmConfig {
            model: model.to_string(),
            ..Default::default()
        };
        if let Ok(host) = std::env::var("OLLAMA_HOST") {
            config.ollama_url = host;
        }

        Self::from_config(&config)
    }

    /// Create from config
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let client = OllamaClient::from_config(config)?;

        Ok(Self::with_backend(
            Arc::new(client),
            config.model_or_default(),
            Duration::from_millis(config.probe_timeout_ms),
        ))
    }

    /// Use an arbitrary generation backend
    pub fn with_backend(
        backend: Arc<dyn GenerationBackend>,
        model: impl Into<String>,
        probe_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            model: model.into(),
            probe_timeout,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Fail fast when the service is down instead of waiting on a
    /// generation that cannot succeed.
    async fn ensure_available(&self, cancel: &CancellationToken) -> Result<()> {
        let probe = tokio::time::timeout(self.probe_timeout, self.backend.list_models());

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DevlogError::Cancelled),
            outcome = probe => match outcome {
                Ok(Ok(models)) => {
                    if !models.iter().any(|m| m == &self.model) {
                        debug!(model = %self.model, "model not listed by service, generating anyway");
                    }
                    Ok(())
                }
                Ok(Err(DevlogError::ServiceUnavailable(reason))) => {
                    Err(DevlogError::ServiceUnavailable(reason))
                }
                Ok(Err(e)) => Err(DevlogError::ServiceUnavailable(e.to_string())),
                Err(_) => Err(DevlogError::ServiceUnavailable(format!(
                    "availability probe timed out after {}ms",
                    self.probe_timeout.as_millis()
                ))),
            },
        }
    }

    async fn generate(&self, text: &str, cancel: &CancellationToken) -> Result<String> {
        let request = GenerateRequest::json(&self.model, build_extraction_prompt(text));

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DevlogError::Cancelled),
            result = self.backend.generate(&request) => result.map_err(|e| match e {
                DevlogError::Transport(_) | DevlogError::Cancelled => e,
                other => DevlogError::Transport(other.to_string()),
            }),
        }
    }
}

#[async_trait]
impl Extractor for ModelExtractor {
    fn name(&self) -> &str {
        MODEL_SOURCE
    }

    async fn extract(&self, text: &str, cancel: &CancellationToken) -> Result<Extraction> {
        self.ensure_available(cancel).await?;

        let raw = self.generate(text, cancel).await?;
        debug!(model = %self.model, bytes = raw.len(), "model response received");

        parse_response(&raw)
    }
}

// ============================================================================
// Tests
// ============================================================================
