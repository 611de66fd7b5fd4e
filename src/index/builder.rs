//! Index builds: the seam between the scheduler and the zoekt-index process.

use crate::index::IndexTarget;
use crate::notifier::SharedNotifier;
use crate::process::{
    CommandSpec, LineClass, OutputClassifier, OutputLine, ProcessOutcome, ProcessRunner,
    StreamKind,
};
use async_trait::async_trait;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Performs one index build for a target. Implementations report their own
/// diagnostics; the scheduler only sees the terminal outcome.
#[async_trait]
pub trait IndexBuilder: Send + Sync + 'static {
    async fn build(&self, target: &IndexTarget) -> ProcessOutcome;
}

/// Runs `<binary> -index <indexDir> <workspaceRoot>`.
pub struct ZoektIndexer {
    runner: ProcessRunner,
    binary: PathBuf,
    classifier: OutputClassifier,
    notifier: SharedNotifier,
}

impl ZoektIndexer {
    pub fn new(binary: impl Into<PathBuf>, notifier: SharedNotifier) -> Self {
        Self {
            runner: ProcessRunner::new(),
            binary: binary.into(),
            classifier: OutputClassifier::for_indexing(),
            notifier,
        }
    }

    pub fn with_classifier(mut self, classifier: OutputClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn command_for(&self, target: &IndexTarget) -> CommandSpec {
        CommandSpec::new(
            &self.binary,
            vec![
                "-index".to_string(),
                target.index_dir().to_string_lossy().to_string(),
                target.root().to_string_lossy().to_string(),
            ],
        )
        .with_cwd(target.root())
    }

    fn handle_line(&self, target: &IndexTarget, line: OutputLine) {
        let root = target.root().display();
        if line.stream == StreamKind::Stdout {
            debug!(root = %root, "{}", line.text);
            return;
        }

        match self.classifier.classify(&line.text) {
            LineClass::Success => {
                info!(root = %root, "{}", line.text);
                self.notifier.info("Indexing completed successfully");
            }
            LineClass::Error => {
                warn!(root = %root, "{}", line.text);
                self.notifier
                    .error(&format!("Indexing error: {}", line.text.trim()));
            }
            LineClass::Progress => {
                debug!(root = %root, "{}", line.text);
            }
        }
    }
}

#[async_trait]
impl IndexBuilder for ZoektIndexer {
    async fn build(&self, target: &IndexTarget) -> ProcessOutcome {
        if let Err(e) = target.ensure_index_dir() {
            let message = format!(
                "Failed to create index directory {}: {}",
                target.index_dir().display(),
                e
            );
            warn!(root = %target.root().display(), error = %e, "Failed to create index directory");
            self.notifier.error(&message);
            return ProcessOutcome::FailedToLaunch(message);
        }

        let spec = self.command_for(target);
        info!(command = %spec.display(), "Starting index build");

        let outcome = self
            .runner
            .run_with(&spec, |line| self.handle_line(target, line))
            .await;

        match &outcome {
            ProcessOutcome::Succeeded => {
                info!(root = %target.root().display(), "Index build finished");
            }
            ProcessOutcome::FailedWithCode(_) => {
                let message = format!("Indexing process {}", outcome);
                warn!(root = %target.root().display(), "{}", message);
                self.notifier.error(&message);
            }
            ProcessOutcome::FailedToLaunch(cause) => {
                let message = format!("Failed to start indexing process: {}", cause);
                warn!(root = %target.root().display(), binary = %self.binary.display(), "{}", message);
                self.notifier.error(&message);
            }
        }

        outcome
    }
}
