//! User-facing notifications and progress affordance.
//!
//! Components report terminal failures and classified diagnostics through a
//! [`Notifier`]. The console implementation prints to stderr and shows one
//! spinner per workspace while it is being indexed.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub trait Notifier: Send + Sync {
    /// Transient informational message
    fn info(&self, message: &str);

    /// Transient error message
    fn error(&self, message: &str);

    /// Show a progress indicator identified by `key`
    fn progress_started(&self, _key: &str, _message: &str) {}

    /// Remove the progress indicator identified by `key`
    fn progress_finished(&self, _key: &str) {}
}

pub type SharedNotifier = Arc<dyn Notifier>;

/// Terminal notifier backed by indicatif spinners.
pub struct ConsoleNotifier {
    multi: MultiProgress,
    spinners: Mutex<HashMap<String, ProgressBar>>,
    spinner_style: ProgressStyle,
}

impl ConsoleNotifier {
    pub fn new() -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());

        Self {
            multi: MultiProgress::new(),
            spinners: Mutex::new(HashMap::new()),
            spinner_style,
        }
    }

    fn print(&self, line: String) {
        // Printing through the MultiProgress keeps active spinners intact.
        self.multi.suspend(|| eprintln!("{}", line));
    }
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for ConsoleNotifier {
    fn info(&self, message: &str) {
        self.print(format!("✅ {}", message));
    }

    fn error(&self, message: &str) {
        self.print(format!("❌ {}", message));
    }

    fn progress_started(&self, key: &str, message: &str) {
        let bar = self.multi.add(ProgressBar::new_spinner());
        bar.set_style(self.spinner_style.clone());
        bar.set_message(message.to_string());
        bar.enable_steady_tick(Duration::from_millis(80));

        if let Ok(mut spinners) = self.spinners.lock() {
            if let Some(previous) = spinners.insert(key.to_string(), bar) {
                previous.finish_and_clear();
            }
        }
    }

    fn progress_finished(&self, key: &str) {
        let bar = self
            .spinners
            .lock()
            .ok()
            .and_then(|mut spinners| spinners.remove(key));
        if let Some(bar) = bar {
            bar.finish_and_clear();
            self.multi.remove(&bar);
        }
    }
}

/// A notification captured by [`RecordingNotifier`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Info(String),
    Error(String),
    ProgressStarted(String),
    ProgressFinished(String),
}

/// Keeps notifications in memory. Handy for embedding and for tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn errors(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Error(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    pub fn infos(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Info(msg) => Some(msg),
                _ => None,
            })
            .collect()
    }

    fn push(&self, notification: Notification) {
        if let Ok(mut events) = self.events.lock() {
            events.push(notification);
        }
    }
}

impl Notifier for RecordingNotifier {
    fn info(&self, message: &str) {
        self.push(Notification::Info(message.to_string()));
    }

    fn error(&self, message: &str) {
        self.push(Notification::Error(message.to_string()));
    }

    fn progress_started(&self, key: &str, _message: &str) {
        self.push(Notification::ProgressStarted(key.to_string()));
    }

    fn progress_finished(&self, key: &str) {
        self.push(Notification::ProgressFinished(key.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_notifier_filters() {
        let notifier = RecordingNotifier::new();
        notifier.info("indexed");
        notifier.error("boom");
        notifier.progress_started("/ws", "Indexing /ws");
        notifier.progress_finished("/ws");

        assert_eq!(notifier.infos(), vec!["indexed"]);
        assert_eq!(notifier.errors(), vec!["boom"]);
        assert_eq!(notifier.events().len(), 4);
    }

    #[test]
    fn test_console_notifier_progress_lifecycle() {
        let notifier = ConsoleNotifier::new();
        notifier.progress_started("/ws", "Indexing /ws");
        notifier.progress_started("/ws", "Indexing /ws again");
        notifier.progress_finished("/ws");
        notifier.progress_finished("/unknown");
        assert!(notifier.spinners.lock().unwrap().is_empty());
    }
}
