//! Query execution: run zoekt against one index directory, parse its output
//! and resolve every hit to a file in the workspace.

use crate::notifier::SharedNotifier;
use crate::process::{
    describe_exit_code, CommandSpec, LineClass, OutputClassifier, ProcessOutcome, ProcessRunner,
    StreamKind,
};
use crate::search::parser::parse_output;
use crate::search::resolver::{resolve_all, ResolvedMatch};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchError {
    #[error("search query is empty")]
    EmptyQuery,
    #[error("failed to start search process: {0}")]
    LaunchFailed(String),
    #[error("search process {}", describe_exit_code(.code))]
    Failed { code: Option<i32> },
}

/// Resolved matches of one query, in engine output order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResults {
    pub matches: Vec<ResolvedMatch>,
    /// Hits whose file could not be found under any candidate root
    pub unresolved: usize,
}

impl SearchResults {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    /// Append another index directory's results, keeping order
    pub fn extend(&mut self, other: SearchResults) {
        self.matches.extend(other.matches);
        self.unresolved += other.unresolved;
    }
}

pub struct SearchOrchestrator {
    runner: ProcessRunner,
    binary: PathBuf,
    recursive: bool,
    classifier: OutputClassifier,
    notifier: SharedNotifier,
}

impl SearchOrchestrator {
    pub fn new(binary: impl Into<PathBuf>, recursive: bool, notifier: SharedNotifier) -> Self {
        Self {
            runner: ProcessRunner::new(),
            binary: binary.into(),
            recursive,
            classifier: OutputClassifier::for_search(),
            notifier,
        }
    }

    /// `<binary> -index_dir <indexDir> [-r] <query>`
    pub fn command_for(&self, query: &str, index_dir: &Path) -> CommandSpec {
        let mut args = vec![
            "-index_dir".to_string(),
            index_dir.to_string_lossy().to_string(),
        ];
        if self.recursive {
            args.push("-r".to_string());
        }
        args.push(query.to_string());
        CommandSpec::new(&self.binary, args)
    }

    /// Run `query` against `index_dir` and resolve hits against
    /// `candidate_roots` in order.
    pub async fn search(
        &self,
        query: &str,
        index_dir: &Path,
        candidate_roots: &[PathBuf],
    ) -> Result<SearchResults, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let spec = self.command_for(query, index_dir);
        info!(query = query, index_dir = %index_dir.display(), "Running search");

        let mut stdout = String::new();
        let outcome = self
            .runner
            .run_with(&spec, |line| match line.stream {
                StreamKind::Stdout => {
                    stdout.push_str(&line.text);
                    stdout.push('\n');
                }
                StreamKind::Stderr => {
                    debug!("Search message: {}", line.text);
                    if self.classifier.classify(&line.text) == LineClass::Error {
                        self.notifier
                            .error(&format!("Search error: {}", line.text.trim()));
                    }
                }
            })
            .await;

        match outcome {
            ProcessOutcome::Succeeded => {}
            ProcessOutcome::FailedWithCode(code) => {
                let error = SearchError::Failed { code };
                warn!(query = query, "{}", error);
                self.notifier.error(&format!("Search failed: {}", error));
                return Err(error);
            }
            ProcessOutcome::FailedToLaunch(cause) => {
                let error = SearchError::LaunchFailed(cause);
                warn!(binary = %self.binary.display(), "{}", error);
                self.notifier.error(&error.to_string());
                return Err(error);
            }
        }

        let records = parse_output(&stdout);
        let parsed = records.len();
        let roots = candidate_roots.to_vec();

        // Resolution stats every hit against the filesystem.
        let (matches, unresolved) =
            match tokio::task::spawn_blocking(move || resolve_all(records, &roots)).await {
                Ok(resolved) => resolved,
                Err(e) => {
                    warn!(error = %e, "Path resolution task failed");
                    (Vec::new(), parsed)
                }
            };

        if unresolved > 0 {
            debug!(unresolved = unresolved, "Dropped matches with no file under any root");
        }
        info!(
            query = query,
            parsed = parsed,
            resolved = matches.len(),
            "Search completed"
        );

        Ok(SearchResults {
            matches,
            unresolved,
        })
    }
}
