//! Relationship write-back
//!
//! Appends discovered relationships to a devlog as explicit
//! `- from -> to (type)` lines under an "Architectural Relationships"
//! section, so later runs pick them up through the pattern extractor.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use tracing::info;

use devlog_core::{Relationship, Result};

/// Section header for written-back relationships
pub const RELATIONSHIPS_HEADER: &str = "### Architectural Relationships";

const FORMAT_HINT: &str = "<!-- Format: [From Entity] -> [To Entity] (relationship type) -->";

/// True when `content` already mentions `from -> to`, ignoring case and
/// whitespace around the arrow.
fn mentions(content: &str, from: &str, to: &str) -> bool {
    let pattern = format!(
        r"(?i){}\s*->\s*{}",
        regex::escape(from),
        regex::escape(to)
    );
    Regex::new(&pattern)
        .map(|re| re.is_match(content))
        .unwrap_or(false)
}

/// Lines for relationships not yet present in `content`, one per pair
fn missing_lines(content: &str, relationships: &[Relationship]) -> Vec<String> {
    let mut seen: HashSet<(&str, &str)> = HashSet::new();
    let mut lines = Vec::new();

    for rel in relationships {
        if !seen.insert((rel.from_entity.as_str(), rel.to_entity.as_str())) {
            continue;
        }
        if mentions(content, &rel.from_entity, &rel.to_entity) {
            continue;
        }
        lines.push(format!(
            "- {} -> {} ({})",
            rel.from_entity, rel.to_entity, rel.relationship_type
        ));
    }

    lines
}

/// Content with missing relationships appended, or `None` when every
/// relationship is already present.
pub fn render(content: &str, relationships: &[Relationship]) -> Option<String> {
    let lines = missing_lines(content, relationships);
    if lines.is_empty() {
        return None;
    }

    let mut out = String::with_capacity(content.len() + lines.len() * 48);
    out.push_str(content);

    if !content.contains(RELATIONSHIPS_HEADER) {
        if !content.is_empty() {
            if !content.ends_with('\n') {
                out.push('\n');
            }
            if !content.ends_with("\n\n") {
                out.push('\n');
            }
        }
        out.push_str(RELATIONSHIPS_HEADER);
        out.push('\n');
        out.push_str(FORMAT_HINT);
        out.push('\n');
    } else if !content.ends_with('\n') {
        out.push('\n');
    }

    for line in &lines {
        out.push_str(line);
        out.push('\n');
    }

    Some(out)
}

/// Write missing relationships into the devlog at `path`.
///
/// Returns the number of lines appended; the file is left untouched when
/// there is nothing to add.
pub fn crystallize_file(path: impl AsRef<Path>, relationships: &[Relationship]) -> Result<usize> {
    if relationships.is_empty() {
        return Ok(0);
    }

    let path = path.as_ref();
    let content = std::fs::read_to_string(path)?;

    let appended = missing_lines(&content, relationships).len();
    if let Some(updated) = render(&content, relationships) {
        std::fs::write(path, updated)?;
        info!(path = %path.display(), appended, "crystallized relationships");
    }

    Ok(appended)
}

// ============================================================================
// Tests
// ============================================================================
