//! Pattern-based extraction
//!
//! Deterministic regex rules for code-ish names found in devlogs
//! (CamelCase components, hooks, kebab-case services, infra names) plus
//! the explicit `- A -> B (type)` relationship lines.

use std::collections::HashSet;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::{Extraction, Extractor};
use devlog_core::{normalize_name, Entity, Relationship, Result};

/// Source tag for pattern matches
pub const PATTERN_SOURCE: &str = "pattern";

/// Entity type assigned to every pattern match
pub const PATTERN_ENTITY_TYPE: &str = "component";

/// Confidence assigned to every pattern match
pub const PATTERN_CONFIDENCE: f64 = 0.8;

/// Relationship type used when a line has no parenthetical
pub const DEFAULT_RELATIONSHIP_TYPE: &str = "depends_on";

const RELATIONSHIP_LINE: &str = r"^\s*-\s+(.+?)\s+->\s+(.+?)(?:\s+\(([^)]*)\))?\s*$";

/// Matches shorter than this many characters (inclusive) are dropped
const MIN_MATCH_CHARS: usize = 3;

/// Rule-based extractor; holds only compiled patterns, so one instance
/// can serve any number of concurrent runs.
pub struct PatternExtractor {
    /// Entity rules, applied in order
    patterns: Vec<Regex>,
    relationship_line: Option<Regex>,
}

impl PatternExtractor {
    /// Create the extractor with the built-in devlog rules
    pub fn new() -> Self {
        let relationship_line = Regex::new(RELATIONSHIP_LINE);
        debug_assert!(relationship_line.is_ok(), "invalid relationship rule");

        let mut extractor = Self {
            patterns: Vec::new(),
            relationship_line: relationship_line.ok(),
        };

        extractor.init_patterns();
        extractor
    }

    fn init_patterns(&mut self) {
        // CamelCase, e.g. ManageColumnsModal
        self.add_pattern(r"[A-Z][a-z]+(?:[A-Z][a-z]+)+");
        // Architectural keywords
        self.add_pattern(r"(?i)(modal|hook|endpoint|migration|service)");
        // kebab-case, e.g. mcp-sse
        self.add_pattern(r"[a-z]+-[a-z]+");

        // Infra and framework prefixes
        self.add_pattern(r"nginx[\w-]*");
        self.add_pattern(r"(?i)modal\w*");
        self.add_pattern(r"(use|api)\w+Service");
        self.add_pattern(r"cloudron\w*");
        self.add_pattern(r"mcp\w*");
        self.add_pattern(r"proxy_\w*");
        self.add_pattern(r"\d+\w+Modal");
        // Hooks, e.g. useSortable
        self.add_pattern(r"use\w+");
    }

    fn add_pattern(&mut self, pattern: &str) {
        let compiled = Regex::new(pattern);
        debug_assert!(compiled.is_ok(), "invalid entity rule {pattern}");
        if let Ok(regex) = compiled {
            self.patterns.push(regex);
        }
    }

    /// Entities in rule order; the first occurrence of each lowercase
    /// match wins.
    pub fn entities(&self, text: &str) -> Vec<Entity> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut entities = Vec::new();

        for regex in &self.patterns {
            for mat in regex.find_iter(text) {
                if mat.as_str().chars().count() <= MIN_MATCH_CHARS {
                    continue;
                }

                let name = mat.as_str().to_lowercase();
                if seen.insert(name.clone()) {
                    entities.push(Entity::new(
                        &name,
                        PATTERN_ENTITY_TYPE,
                        PATTERN_CONFIDENCE,
                        PATTERN_SOURCE,
                    ));
                }
            }
        }

        entities
    }

    /// Relationships declared as `- A -> B` or `- A -> B (type)` lines
    pub fn relationships(&self, text: &str) -> Vec<Relationship> {
        let Some(line_regex) = &self.relationship_line else {
            return Vec::new();
        };

        text.lines()
            .filter_map(|line| line_regex.captures(line))
            .filter_map(|caps| {
                let from = normalize_name(caps.get(1)?.as_str());
                let to = normalize_name(caps.get(2)?.as_str());
                if from.is_empty() || to.is_empty() {
                    return None;
                }

                let relationship_type = caps
                    .get(3)
                    .map(|m| m.as_str().trim())
                    .filter(|t| !t.is_empty())
                    .unwrap_or(DEFAULT_RELATIONSHIP_TYPE);

                Some(Relationship::new(&from, &to, relationship_type))
            })
            .collect()
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extractor for PatternExtractor {
    fn name(&self) -> &str {
        PATTERN_SOURCE
    }

    async fn extract(&self, text: &str, _cancel: &CancellationToken) -> Result<Extraction> {
        Ok(Extraction {
            entities: self.entities(text),
            relationships: self.relationships(text),
        })
    }
}

/// Built-in rules, compiled on first use
fn shared() -> &'static PatternExtractor {
    static RULES: OnceLock<PatternExtractor> = OnceLock::new();
    RULES.get_or_init(PatternExtractor::new)
}

/// Relationships from `- A -> B (type)` lines, using the built-in rules
pub fn extract_relationships(text: &str) -> Vec<Relationship> {
    shared().relationships(text)
}

// ============================================================================
// Tests
// ============================================================================
