//! Devlog Extractor - Entity and relationship extraction pipeline
//!
//! Combines a deterministic pattern extractor with an optional
//! Ollama-backed model extractor and merges their findings by
//! normalized name and confidence.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use devlog_core::{Entity, Relationship, Result};

pub mod crystallize;
pub mod llm;
pub mod model;
pub mod pattern;
pub mod pipeline;
pub mod prompt;

pub use llm::{GenerateRequest, GenerationBackend, OllamaClient};
pub use model::ModelExtractor;
pub use pattern::{extract_relationships, PatternExtractor};
pub use pipeline::{ExtractionOptions, Pipeline};

/// Entities and relationships produced by a single extractor
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
}

/// Capability implemented by every extractor variant
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Provenance tag used in entity sources and the result label
    fn name(&self) -> &str;

    /// Scan `text`; network-backed extractors must stop when `cancel` fires
    async fn extract(&self, text: &str, cancel: &CancellationToken) -> Result<Extraction>;
}
