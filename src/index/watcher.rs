//! Filesystem watcher feeding change notifications to the scheduler.
//!
//! A short debouncer window collapses duplicate OS events for the same file;
//! the scheduler applies the real quiet-period debounce on top.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use notify_debouncer_full::{
    new_debouncer,
    notify::{
        event::{ModifyKind, RenameMode},
        EventKind, RecommendedWatcher, RecursiveMode,
    },
    DebouncedEvent, Debouncer, RecommendedCache,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// File change event types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    /// A file was created or modified
    Modified(PathBuf),
    /// A file or directory was deleted
    Deleted(PathBuf),
    /// A file was renamed from old path to new path
    Renamed { from: PathBuf, to: PathBuf },
}

impl FileChange {
    /// Every path touched by this change
    pub fn paths(&self) -> Vec<&Path> {
        match self {
            FileChange::Modified(path) | FileChange::Deleted(path) => vec![path.as_path()],
            FileChange::Renamed { from, to } => vec![from.as_path(), to.as_path()],
        }
    }
}

/// Configuration for the file watcher
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// Paths to watch
    pub paths: Vec<PathBuf>,
    /// Watch subdirectories too
    pub recursive: bool,
    /// Window for collapsing duplicate OS events
    pub debounce_duration: Duration,
    /// Glob patterns to exclude, matched against paths relative to the
    /// watched path they fall under
    pub exclude_patterns: Vec<String>,
    /// Directory subtrees to ignore entirely (index directories)
    pub excluded_dirs: Vec<PathBuf>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            paths: Vec::new(),
            recursive: true,
            debounce_duration: Duration::from_millis(250),
            exclude_patterns: vec!["**/.git/**".to_string()],
            excluded_dirs: Vec::new(),
        }
    }
}

/// File watcher handle. Dropping it stops watching.
pub struct FileWatcher {
    _watcher: Debouncer<RecommendedWatcher, RecommendedCache>,
}

impl FileWatcher {
    /// Create and start a watcher delivering each change to `sink`.
    /// `sink` runs on the watcher's thread and must not block.
    pub fn new<F>(config: WatcherConfig, sink: F) -> Result<Self>
    where
        F: Fn(FileChange) + Send + 'static,
    {
        let exclusions = PathExclusions::new(
            &config.paths,
            &config.exclude_patterns,
            &config.excluded_dirs,
        )?;

        let mut debouncer = new_debouncer(
            config.debounce_duration,
            None,
            move |result: Result<Vec<DebouncedEvent>, Vec<notify_debouncer_full::notify::Error>>| {
                match result {
                    Ok(events) => {
                        for event in events {
                            if let Some(change) = process_event(&event, &exclusions) {
                                sink(change);
                            }
                        }
                    }
                    Err(errors) => {
                        for error in errors {
                            error!("File watcher error: {:?}", error);
                        }
                    }
                }
            },
        )?;

        let mode = if config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        // Per-path failures are non-fatal; one over-limit root must not stop
        // the others from being watched.
        let mut watched = 0usize;
        let mut watch_errors = 0usize;
        for path in &config.paths {
            if !path.exists() {
                warn!(path = %path.display(), "Watch path does not exist, skipping");
                continue;
            }
            match debouncer.watch(path, mode) {
                Ok(()) => {
                    info!(path = %path.display(), "Watching directory for changes");
                    watched += 1;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to watch path (skipping)");
                    watch_errors += 1;
                }
            }
        }

        if watched == 0 && watch_errors > 0 {
            anyhow::bail!(
                "Could not watch any of {} path(s). On Linux, raise the inotify limit with \
                sudo sysctl -w fs.inotify.max_user_watches=524288, or set `index_on_save = false`.",
                watch_errors
            );
        }

        Ok(Self {
            _watcher: debouncer,
        })
    }
}

/// Paths the watcher drops before they reach the sink.
///
/// Patterns are compiled into a [`GlobSet`] and matched against the path
/// relative to the longest watched root containing it, so the location of
/// the root itself never decides whether a change counts.
#[derive(Debug)]
pub struct PathExclusions {
    roots: Vec<PathBuf>,
    globs: GlobSet,
    excluded_dirs: Vec<PathBuf>,
}

impl PathExclusions {
    pub fn new(roots: &[PathBuf], patterns: &[String], excluded_dirs: &[PathBuf]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern)
                .with_context(|| format!("Invalid exclude glob pattern: {}", pattern))?;
            builder.add(glob);
        }
        let globs = builder.build().context("Failed to build exclude GlobSet")?;

        Ok(Self {
            roots: roots.to_vec(),
            globs,
            excluded_dirs: excluded_dirs.to_vec(),
        })
    }

    /// Inside an excluded directory, or matching an exclude pattern
    pub fn is_excluded(&self, path: &Path) -> bool {
        if self.excluded_dirs.iter().any(|dir| path.starts_with(dir)) {
            return true;
        }
        if self.globs.is_empty() {
            return false;
        }
        let relative = self
            .roots
            .iter()
            .filter_map(|root| path.strip_prefix(root).ok())
            .min_by_key(|rel| rel.components().count())
            .unwrap_or(path);
        self.globs.is_match(relative)
    }
}

/// Convert a debounced notify event into a [`FileChange`]
fn process_event(event: &DebouncedEvent, exclusions: &PathExclusions) -> Option<FileChange> {
    let paths = &event.paths;

    if paths.iter().all(|path| exclusions.is_excluded(path)) {
        return None;
    }

    match &event.kind {
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if paths.len() == 2 => {
            Some(FileChange::Renamed {
                from: paths[0].clone(),
                to: paths[1].clone(),
            })
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            paths.first().map(|p| FileChange::Deleted(p.clone()))
        }
        EventKind::Create(_) | EventKind::Modify(_) => {
            let path = paths.first()?;
            if path.is_dir() {
                debug!(path = %path.display(), "Directory event, waiting for file events");
                return None;
            }
            Some(FileChange::Modified(path.clone()))
        }
        EventKind::Remove(_) => paths.first().map(|p| FileChange::Deleted(p.clone())),
        EventKind::Any | EventKind::Access(_) | EventKind::Other => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify_debouncer_full::notify::{event::CreateKind, Event};
    use std::sync::mpsc;
    use std::time::Instant;
    use tempfile::TempDir;

    fn debounced(kind: EventKind, paths: Vec<PathBuf>) -> DebouncedEvent {
        let mut event = Event::new(kind);
        event.paths = paths;
        DebouncedEvent::new(event, Instant::now())
    }

    fn no_exclusions() -> PathExclusions {
        PathExclusions::new(&[], &[], &[]).unwrap()
    }

    fn default_patterns() -> Vec<String> {
        vec![
            "**/node_modules/**".to_string(),
            "**/target/**".to_string(),
            "**/.git/**".to_string(),
        ]
    }

    #[test]
    fn test_exclusions_match_globs() {
        let root = PathBuf::from("/project");
        let exclusions = PathExclusions::new(
            &[root.clone()],
            &default_patterns(),
            &[root.join(".zoekt-index")],
        )
        .unwrap();

        assert!(exclusions.is_excluded(Path::new("/project/node_modules/package/index.js")));
        assert!(exclusions.is_excluded(Path::new("/project/.git/objects/abc")));
        assert!(exclusions.is_excluded(Path::new("/project/crates/core/target/debug/app")));
        assert!(exclusions.is_excluded(Path::new("/project/.zoekt-index/project_v16.00000.zoekt")));
        assert!(!exclusions.is_excluded(Path::new("/project/src/main.rs")));
    }

    #[test]
    fn test_exclusions_ignore_lookalike_names() {
        let root = PathBuf::from("/ws");
        let exclusions = PathExclusions::new(&[root], &default_patterns(), &[]).unwrap();

        assert!(!exclusions.is_excluded(Path::new("/ws/.gitignore")));
        assert!(!exclusions.is_excluded(Path::new("/ws/.github/workflows/ci.yml")));
        assert!(!exclusions.is_excluded(Path::new("/ws/src/targeting.go")));
        assert!(!exclusions.is_excluded(Path::new("/ws/node_modules_backup.txt")));
    }

    #[test]
    fn test_exclusions_relative_to_root() {
        // Root directories whose own path matches a pattern still report changes
        let roots = vec![
            PathBuf::from("/home/dev/target-app"),
            PathBuf::from("/home/dev/target/checkout"),
        ];
        let exclusions = PathExclusions::new(&roots, &default_patterns(), &[]).unwrap();

        assert!(!exclusions.is_excluded(Path::new("/home/dev/target-app/src/main.go")));
        assert!(!exclusions.is_excluded(Path::new("/home/dev/target/checkout/lib.go")));
        assert!(exclusions.is_excluded(Path::new("/home/dev/target-app/target/release/app")));
    }

    #[test]
    fn test_invalid_exclude_pattern_is_rejected() {
        let result = PathExclusions::new(&[], &["src/[".to_string()], &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_process_event_kinds() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("main.go");
        std::fs::write(&file, "package main").unwrap();

        let created = debounced(EventKind::Create(CreateKind::File), vec![file.clone()]);
        assert_eq!(
            process_event(&created, &no_exclusions()),
            Some(FileChange::Modified(file.clone()))
        );

        let removed = debounced(
            EventKind::Remove(notify_debouncer_full::notify::event::RemoveKind::File),
            vec![file.clone()],
        );
        assert_eq!(
            process_event(&removed, &no_exclusions()),
            Some(FileChange::Deleted(file.clone()))
        );

        let renamed = debounced(
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
            vec![file.clone(), dir.path().join("app.go")],
        );
        assert_eq!(
            process_event(&renamed, &no_exclusions()),
            Some(FileChange::Renamed {
                from: file.clone(),
                to: dir.path().join("app.go")
            })
        );

        let access = debounced(
            EventKind::Access(notify_debouncer_full::notify::event::AccessKind::Any),
            vec![file],
        );
        assert_eq!(process_event(&access, &no_exclusions()), None);
    }

    #[test]
    fn test_process_event_skips_excluded_dir() {
        let index_dir = PathBuf::from("/ws/.zoekt-index");
        let event = debounced(
            EventKind::Remove(notify_debouncer_full::notify::event::RemoveKind::File),
            vec![index_dir.join("ws_v16.00000.zoekt")],
        );
        let exclusions = PathExclusions::new(&[], &[], &[index_dir]).unwrap();
        assert_eq!(process_event(&event, &exclusions), None);
    }

    #[test]
    fn test_watcher_config_default() {
        let config = WatcherConfig::default();
        assert!(config.paths.is_empty());
        assert!(config.recursive);
        assert_eq!(config.debounce_duration, Duration::from_millis(250));
    }

    #[test]
    fn test_watcher_reports_file_writes() {
        let dir = TempDir::new().unwrap();
        let (tx, rx) = mpsc::channel();
        let _watcher = FileWatcher::new(
            WatcherConfig {
                paths: vec![dir.path().to_path_buf()],
                debounce_duration: Duration::from_millis(50),
                ..Default::default()
            },
            move |change| {
                let _ = tx.send(change);
            },
        )
        .unwrap();

        std::thread::sleep(Duration::from_millis(100));
        let file = dir.path().join("lib.go");
        std::fs::write(&file, "package lib").unwrap();

        let change = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        let canonical = std::fs::canonicalize(&file).unwrap();
        assert!(change
            .paths()
            .iter()
            .any(|p| p.ends_with("lib.go") || *p == canonical.as_path()));
    }
}
