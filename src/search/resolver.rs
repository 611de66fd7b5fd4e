//! Mapping reported match paths onto files in the workspace roots.

use crate::search::parser::MatchRecord;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A match whose file was found on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMatch {
    pub record: MatchRecord,
    /// Absolute path to an existing regular file
    pub absolute_path: PathBuf,
}

impl ResolvedMatch {
    pub fn line(&self) -> u32 {
        self.record.line
    }

    pub fn content(&self) -> &str {
        &self.record.content
    }
}

/// Resolve `path` against `roots`, first existing regular file wins.
///
/// An absolute path is checked on its own and the roots are not consulted.
pub fn resolve_path(path: &str, roots: &[PathBuf]) -> Option<PathBuf> {
    let reported = Path::new(path);
    if reported.is_absolute() {
        return reported.is_file().then(|| reported.to_path_buf());
    }

    roots
        .iter()
        .map(|root| root.join(reported))
        .find(|candidate| candidate.is_file())
}

/// Resolve every record, dropping the ones no root can satisfy.
/// Returns the resolved matches in input order and the number dropped.
pub fn resolve_all(records: Vec<MatchRecord>, roots: &[PathBuf]) -> (Vec<ResolvedMatch>, usize) {
    let mut resolved = Vec::with_capacity(records.len());
    let mut dropped = 0usize;

    for record in records {
        match resolve_path(&record.path, roots) {
            Some(absolute_path) => resolved.push(ResolvedMatch {
                record,
                absolute_path,
            }),
            None => {
                debug!(path = %record.path, line = record.line, "Dropping unresolvable match");
                dropped += 1;
            }
        }
    }

    (resolved, dropped)
}
