//! Extraction pipeline
//!
//! Runs registered extractors in order and merges their output:
//! entities by normalized name (higher confidence replaces, ties keep the
//! first seen), relationships by concatenation.

use std::collections::HashMap;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::ModelExtractor;
use crate::pattern::PatternExtractor;
use crate::Extractor;
use devlog_core::{AppConfig, Entity, ExtractionResult, ExtractorKind, LlmConfig};

/// Label used when no extractor succeeded
const NO_EXTRACTOR: &str = "none";

/// Per-call switches
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractionOptions {
    /// Skip the model extractor even when configured
    pub force_pattern: bool,
}

/// Ordered set of extractors; fixed after construction apart from
/// [`Pipeline::register`].
pub struct Pipeline {
    extractors: Vec<Box<dyn Extractor>>,
}

impl Pipeline {
    /// Pattern extractor only
    pub fn new() -> Self {
        Self {
            extractors: vec![Box::new(PatternExtractor::new())],
        }
    }

    /// Pattern extractor followed by the model extractor, if it can be built
    pub fn with_model(config: &LlmConfig) -> Self {
        let pipeline = Self::new();

        match ModelExtractor::from_config(config) {
            Ok(model) => pipeline.register(Box::new(model)),
            Err(e) => {
                warn!(error = %e, "model extractor unavailable, continuing with patterns only");
                pipeline
            }
        }
    }

    /// Build from application config
    pub fn from_config(config: &AppConfig, options: ExtractionOptions) -> Self {
        let wants_model = config.extraction.enabled
            && config.extraction.primary_extractor == ExtractorKind::Model
            && !options.force_pattern;

        if wants_model {
            Self::with_model(&config.llm)
        } else {
            Self::new()
        }
    }

    /// Append an extractor after those already registered
    pub fn register(mut self, extractor: Box<dyn Extractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    /// Registered extractor names, in arbitration order
    pub fn extractor_names(&self) -> Vec<&str> {
        self.extractors.iter().map(|e| e.name()).collect()
    }

    /// Run all extractors without external cancellation
    pub async fn run(&self, text: &str) -> ExtractionResult {
        self.run_with_cancellation(text, &CancellationToken::new())
            .await
    }

    /// Run all extractors in registration order and merge the results.
    ///
    /// Extractor failures are logged and skipped; the returned result is
    /// always structurally valid.
    pub async fn run_with_cancellation(
        &self,
        text: &str,
        cancel: &CancellationToken,
    ) -> ExtractionResult {
        let start = Instant::now();

        let mut merger = EntityMerger::default();
        let mut relationships = Vec::new();
        let mut contributors: Vec<&str> = Vec::new();

        for extractor in &self.extractors {
            match extractor.extract(text, cancel).await {
                Ok(extraction) => {
                    debug!(
                        extractor = extractor.name(),
                        entities = extraction.entities.len(),
                        relationships = extraction.relationships.len(),
                        "extractor finished"
                    );
                    for entity in extraction.entities {
                        merger.offer(entity);
                    }
                    relationships.extend(extraction.relationships);
                    contributors.push(extractor.name());
                }
                Err(e) => {
                    warn!(extractor = extractor.name(), error = %e, "extractor failed, skipping");
                }
            }
        }

        let extractor = if contributors.is_empty() {
            NO_EXTRACTOR.to_string()
        } else {
            contributors.join("+")
        };

        let result = ExtractionResult {
            entities: merger.into_entities(),
            relationships,
            duration: start.elapsed(),
            extractor,
        };

        info!(
            extractor = %result.extractor,
            entities = result.entities.len(),
            relationships = result.relationships.len(),
            duration_ms = result.duration.as_millis() as u64,
            "extraction complete"
        );

        result
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Insertion-ordered merge keyed by entity name
#[derive(Default)]
struct EntityMerger {
    entities: Vec<Entity>,
    index: HashMap<String, usize>,
}

impl EntityMerger {
    /// Insert, or replace only on strictly higher confidence
    fn offer(&mut self, entity: Entity) {
        match self.index.get(&entity.name) {
            Some(&slot) => {
                if entity.confidence > self.entities[slot].confidence {
                    self.entities[slot] = entity;
                }
            }
            None => {
                self.index.insert(entity.name.clone(), self.entities.len());
                self.entities.push(entity);
            }
        }
    }

    fn into_entities(self) -> Vec<Entity> {
        self.entities
    }
}

// ============================================================================
// Tests
// ============================================================================
