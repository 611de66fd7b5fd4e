//! Registry of active workspaces.
//!
//! Each activated root gets an [`IndexTarget`], a scheduler actor and
//! (optionally) a filesystem watcher. Entries are keyed by the canonical
//! root path and kept in activation order, which is also the order used to
//! fan a query out over several index directories.

use crate::index::builder::IndexBuilder;
use crate::index::schedule::ScheduleConfig;
use crate::index::scheduler::{
    IndexScheduler, IndexState, IndexStatus, SchedulerHandle, SchedulerStopped, TriggerResponse,
};
use crate::index::target::{IndexPlacement, IndexTarget};
use crate::index::watcher::{FileWatcher, WatcherConfig};
use crate::notifier::SharedNotifier;
use crate::search::{SearchError, SearchOrchestrator, SearchResults};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Settings shared by every workspace in the registry
#[derive(Debug, Clone, Default)]
pub struct RegistrySettings {
    pub placement: IndexPlacement,
    pub schedule: ScheduleConfig,
    /// Start a filesystem watcher per root
    pub watch: bool,
    /// Extra path patterns the watcher ignores
    pub exclude_patterns: Vec<String>,
}

struct WorkspaceEntry {
    key: PathBuf,
    target: IndexTarget,
    handle: SchedulerHandle,
    task: JoinHandle<()>,
    _watcher: Option<FileWatcher>,
}

pub struct WorkspaceRegistry {
    settings: RegistrySettings,
    builder: Arc<dyn IndexBuilder>,
    search: Arc<SearchOrchestrator>,
    notifier: SharedNotifier,
    entries: Vec<WorkspaceEntry>,
    /// Tasks of deactivated schedulers that may still be finishing a build
    retiring: Vec<(PathBuf, JoinHandle<()>)>,
}

impl WorkspaceRegistry {
    pub fn new(
        settings: RegistrySettings,
        builder: Arc<dyn IndexBuilder>,
        search: Arc<SearchOrchestrator>,
        notifier: SharedNotifier,
    ) -> Self {
        Self {
            settings,
            builder,
            search,
            notifier,
            entries: Vec::new(),
            retiring: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Active targets in activation order
    pub fn targets(&self) -> Vec<&IndexTarget> {
        self.entries.iter().map(|e| &e.target).collect()
    }

    pub fn handle(&self, root: &Path) -> Option<SchedulerHandle> {
        let key = canonical_root(root.to_path_buf());
        self.entries
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.handle.clone())
    }

    /// Start managing `root`. Activating an already active root returns the
    /// existing scheduler.
    pub fn activate(&mut self, root: impl Into<PathBuf>) -> SchedulerHandle {
        let root = canonical_root(root.into());
        let key = root.clone();
        if let Some(entry) = self.entries.iter().find(|e| e.key == key) {
            debug!(root = %root.display(), "Workspace already active");
            return entry.handle.clone();
        }

        self.retiring.retain(|(_, task)| !task.is_finished());
        let predecessor = self
            .retiring
            .iter()
            .position(|(retired, _)| *retired == key)
            .map(|position| self.retiring.swap_remove(position).1);
        if predecessor.is_some() {
            info!(root = %root.display(), "Previous build still running, new builds wait for it");
        }

        let target = IndexTarget::with_placement(&root, &self.settings.placement);
        let (handle, task) = IndexScheduler::spawn_after(
            target.clone(),
            self.settings.schedule.clone(),
            self.builder.clone(),
            self.notifier.clone(),
            predecessor,
        );

        let watcher = if self.settings.watch {
            self.start_watcher(&target, handle.clone())
        } else {
            None
        };

        info!(
            root = %target.root().display(),
            index_dir = %target.index_dir().display(),
            watching = watcher.is_some(),
            "Workspace activated"
        );

        self.entries.push(WorkspaceEntry {
            key,
            target,
            handle: handle.clone(),
            task,
            _watcher: watcher,
        });
        handle
    }

    fn start_watcher(&self, target: &IndexTarget, handle: SchedulerHandle) -> Option<FileWatcher> {
        let mut exclude_patterns = WatcherConfig::default().exclude_patterns;
        exclude_patterns.extend(self.settings.exclude_patterns.iter().cloned());

        let config = WatcherConfig {
            paths: vec![target.root().to_path_buf()],
            exclude_patterns,
            excluded_dirs: vec![target.index_dir().to_path_buf()],
            ..Default::default()
        };

        match FileWatcher::new(config, move |change| {
            for path in change.paths() {
                handle.notify_change(path.to_path_buf());
            }
        }) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(root = %target.root().display(), error = %e, "File watcher unavailable");
                self.notifier.error(&format!(
                    "Cannot watch {} for changes: {}",
                    target.root().display(),
                    e
                ));
                None
            }
        }
    }

    /// Stop managing `root`: timers and watcher are released. A build in
    /// flight runs to completion, and reactivating `root` before it ends
    /// starts no second build. Returns false if `root` was not active.
    pub fn deactivate(&mut self, root: &Path) -> bool {
        let key = canonical_root(root.to_path_buf());
        let Some(position) = self.entries.iter().position(|e| e.key == key) else {
            return false;
        };
        let entry = self.entries.remove(position);
        entry.handle.shutdown();
        info!(root = %entry.target.root().display(), "Workspace deactivated");
        self.retiring.push((entry.key, entry.task));
        true
    }

    /// Make the active set equal to `roots`, keeping schedulers of roots
    /// that stay.
    pub fn sync_roots(&mut self, roots: &[PathBuf]) {
        let wanted: Vec<PathBuf> = roots.iter().map(|r| canonical_root(r.clone())).collect();

        let stale: Vec<PathBuf> = self
            .entries
            .iter()
            .filter(|e| !wanted.contains(&e.key))
            .map(|e| e.target.root().to_path_buf())
            .collect();
        for root in stale {
            self.deactivate(&root);
        }

        for root in roots {
            self.activate(root.clone());
        }
    }

    /// Apply a new schedule to every active scheduler and to future ones
    pub fn apply_schedule(&mut self, schedule: ScheduleConfig) {
        for entry in &self.entries {
            entry.handle.reconfigure(schedule.clone());
        }
        self.settings.schedule = schedule;
    }

    pub async fn rebuild(&self, root: &Path) -> Option<Result<TriggerResponse, SchedulerStopped>> {
        let handle = self.handle(root)?;
        Some(handle.request_rebuild().await)
    }

    /// Manual rebuild of every active workspace
    pub async fn rebuild_all(&self) -> Vec<(PathBuf, Result<TriggerResponse, SchedulerStopped>)> {
        let mut responses = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let response = entry.handle.request_rebuild().await;
            responses.push((entry.target.root().to_path_buf(), response));
        }
        responses
    }

    /// Status of every active workspace; stopped schedulers are skipped
    pub async fn statuses(&self) -> Vec<IndexStatus> {
        let mut statuses = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            match entry.handle.status().await {
                Ok(status) => statuses.push(status),
                Err(e) => warn!(root = %entry.target.root().display(), error = %e, "No status"),
            }
        }
        statuses
    }

    /// Wait until no workspace is indexing
    pub async fn wait_idle(&self, poll_interval: Duration) {
        loop {
            let statuses = self.statuses().await;
            if statuses.iter().all(|s| s.state == IndexState::Idle) {
                return;
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Run `query` against every distinct index directory in activation
    /// order. Hits are resolved against the owning root first, then the
    /// other roots. The first failing index directory fails the query.
    pub async fn search(&self, query: &str) -> Result<SearchResults, SearchError> {
        if query.trim().is_empty() {
            return Err(SearchError::EmptyQuery);
        }
        let mut results = SearchResults::default();
        for (index_dir, roots) in self.search_plan() {
            let partial = self.search.search(query, &index_dir, &roots).await?;
            results.extend(partial);
        }
        Ok(results)
    }

    /// Distinct index directories with their candidate roots
    fn search_plan(&self) -> Vec<(PathBuf, Vec<PathBuf>)> {
        let all_roots: Vec<PathBuf> = self
            .entries
            .iter()
            .map(|e| e.target.root().to_path_buf())
            .collect();

        let mut plan: Vec<(PathBuf, Vec<PathBuf>)> = Vec::new();
        for entry in &self.entries {
            let index_dir = entry.target.index_dir();
            if plan.iter().any(|(dir, _)| dir == index_dir) {
                continue;
            }
            let owner = entry.target.root().to_path_buf();
            let mut roots = vec![owner.clone()];
            roots.extend(all_roots.iter().filter(|r| **r != owner).cloned());
            plan.push((index_dir.to_path_buf(), roots));
        }
        plan
    }

    /// Stop every scheduler and wait for the actors to exit. Builds in
    /// flight are waited for, not killed.
    pub async fn shutdown(&mut self) {
        let mut tasks = Vec::with_capacity(self.entries.len() + self.retiring.len());
        for entry in self.entries.drain(..) {
            entry.handle.shutdown();
            tasks.push((entry.key, entry.task));
        }
        tasks.append(&mut self.retiring);

        for (root, task) in tasks {
            if let Err(e) = task.await {
                warn!(root = %root.display(), error = %e, "Scheduler task failed");
            }
        }
    }
}

/// Canonical form of an existing root, so watcher paths and index paths
/// compare equal. Missing roots are kept as given.
fn canonical_root(root: PathBuf) -> PathBuf {
    std::fs::canonicalize(&root).unwrap_or(root)
}
