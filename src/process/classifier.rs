//! Heuristic severity tagging for unstructured subprocess diagnostics.
//!
//! zoekt writes routine progress and genuine failures to the same stderr
//! stream with no severity field. Classification drives notifications only;
//! the exit code alone decides whether a run succeeded.

use regex::Regex;
use std::sync::LazyLock;

/// Marker zoekt-index prints each time it completes a shard
pub const SHARD_FINISHED_MARKER: &str = "finished shard";

static DEFAULT_ERROR_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)error|failed").expect("error pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    Progress,
    Success,
    Error,
}

/// Classify one diagnostic line. First match wins: success marker, then
/// error pattern, otherwise progress.
pub fn classify(line: &str, success_markers: &[String], error_pattern: &Regex) -> LineClass {
    if success_markers
        .iter()
        .any(|marker| !marker.is_empty() && line.contains(marker.as_str()))
    {
        LineClass::Success
    } else if error_pattern.is_match(line) {
        LineClass::Error
    } else {
        LineClass::Progress
    }
}

#[derive(Debug, Clone)]
pub struct OutputClassifier {
    success_markers: Vec<String>,
    error_pattern: Regex,
}

impl OutputClassifier {
    pub fn new(success_markers: Vec<String>, error_pattern: Regex) -> Self {
        Self {
            success_markers,
            error_pattern,
        }
    }

    /// Classifier with the default `error|failed` pattern
    pub fn with_markers(success_markers: Vec<String>) -> Self {
        Self::new(success_markers, DEFAULT_ERROR_PATTERN.clone())
    }

    /// Preset for zoekt-index stderr
    pub fn for_indexing() -> Self {
        Self::with_markers(vec![SHARD_FINISHED_MARKER.to_string()])
    }

    /// Preset for zoekt stderr; searches have no success marker
    pub fn for_search() -> Self {
        Self::with_markers(Vec::new())
    }

    pub fn classify(&self, line: &str) -> LineClass {
        classify(line, &self.success_markers, &self.error_pattern)
    }

    pub fn success_markers(&self) -> &[String] {
        &self.success_markers
    }
}
