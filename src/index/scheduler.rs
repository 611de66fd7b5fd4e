//! Per-workspace indexing scheduler.
//!
//! Each [`IndexTarget`] gets one actor task that owns its freshness state:
//!
//! - **Idle → Indexing → Idle.** A trigger that arrives while a build is in
//!   flight (settled file changes, cron fire, manual request) is logged and
//!   dropped, never queued.
//! - **Debounce.** Every file-change notification outside the index
//!   directory pushes a single deadline back by the debounce window; the
//!   rebuild starts when the deadline passes and `index_on_save` is set.
//! - **Cron.** At most one recurring timer. Reconfiguring replaces it inside
//!   one message handler, so two timers are never armed at once.
//!
//! The in-progress flag is set before the build task is spawned and cleared
//! only when that task's completion message arrives, after metrics were
//! collected. A stopped actor exits only once its build task has finished,
//! and a scheduler started after it for the same root treats that build as
//! its own until then.

use crate::index::builder::IndexBuilder;
use crate::index::schedule::{CronTrigger, ScheduleConfig};
use crate::index::IndexTarget;
use crate::notifier::SharedNotifier;
use crate::process::ProcessOutcome;
use crate::utils::{directory_size, format_bytes, format_secs};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

/// Indexing state of one workspace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexState {
    Idle,
    Indexing,
}

/// What asked for a rebuild
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    FileChange,
    Cron,
    Manual,
}

/// Answer to a rebuild request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerResponse {
    Started,
    AlreadyRunning,
}

/// Snapshot of a scheduler, suitable for display as JSON
#[derive(Debug, Clone, Serialize)]
pub struct IndexStatus {
    pub root: PathBuf,
    pub index_dir: PathBuf,
    pub state: IndexState,
    pub index_on_save: bool,
    pub cron_active: bool,
    pub cron_schedule: Option<String>,
    pub next_cron_fire: Option<DateTime<Utc>>,
    pub changes_pending: bool,
    pub runs_started: usize,
    pub runs_succeeded: usize,
    pub runs_failed: usize,
    pub triggers_suppressed: usize,
    pub last_trigger: Option<Trigger>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_outcome: Option<ProcessOutcome>,
    pub last_duration_ms: Option<u64>,
    pub last_index_size: Option<u64>,
}

#[derive(Debug, Error)]
#[error("index scheduler has stopped")]
pub struct SchedulerStopped;

enum Message {
    FileChanged(PathBuf),
    Rebuild(oneshot::Sender<TriggerResponse>),
    Reconfigure(ScheduleConfig),
    Status(oneshot::Sender<IndexStatus>),
    BuildFinished(BuildReport),
    Shutdown,
}

struct BuildReport {
    outcome: ProcessOutcome,
    elapsed: Duration,
    index_size: Option<u64>,
}

struct ArmedCron {
    trigger: CronTrigger,
    deadline: Instant,
    fire_at: DateTime<Utc>,
}

impl ArmedCron {
    /// Arm the next occurrence; `None` if the schedule has run out
    fn arm(mut trigger: CronTrigger) -> Option<Self> {
        let (fire_at, wait) = trigger.advance(Utc::now())?;
        Some(Self {
            trigger,
            deadline: Instant::now() + wait,
            fire_at,
        })
    }
}

/// Cheap, cloneable handle to a running scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    tx: UnboundedSender<Message>,
}

impl SchedulerHandle {
    /// Report a raw file-change notification. Never blocks; callable from
    /// watcher threads.
    pub fn notify_change(&self, path: PathBuf) {
        let _ = self.tx.send(Message::FileChanged(path));
    }

    /// Manual rebuild request
    pub async fn request_rebuild(&self) -> Result<TriggerResponse, SchedulerStopped> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Rebuild(reply))
            .map_err(|_| SchedulerStopped)?;
        rx.await.map_err(|_| SchedulerStopped)
    }

    pub fn reconfigure(&self, config: ScheduleConfig) {
        let _ = self.tx.send(Message::Reconfigure(config));
    }

    pub async fn status(&self) -> Result<IndexStatus, SchedulerStopped> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Message::Status(reply))
            .map_err(|_| SchedulerStopped)?;
        rx.await.map_err(|_| SchedulerStopped)
    }

    /// Stop timers and message handling. An in-flight build keeps running
    /// to completion; its result is discarded.
    pub fn shutdown(&self) {
        let _ = self.tx.send(Message::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

pub struct IndexScheduler {
    target: IndexTarget,
    config: ScheduleConfig,
    builder: Arc<dyn IndexBuilder>,
    notifier: SharedNotifier,
    self_tx: WeakUnboundedSender<Message>,
    state: IndexState,
    build_task: Option<JoinHandle<()>>,
    predecessor: Option<JoinHandle<()>>,
    debounce_deadline: Option<Instant>,
    cron: Option<ArmedCron>,
    status: IndexStatus,
}

impl IndexScheduler {
    /// Spawn the scheduler actor for `target` on the current runtime.
    pub fn spawn(
        target: IndexTarget,
        config: ScheduleConfig,
        builder: Arc<dyn IndexBuilder>,
        notifier: SharedNotifier,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        Self::spawn_after(target, config, builder, notifier, None)
    }

    /// Like [`spawn`](Self::spawn), but no build starts until `predecessor`
    /// (the task of a stopped scheduler for the same root) has exited.
    pub fn spawn_after(
        target: IndexTarget,
        config: ScheduleConfig,
        builder: Arc<dyn IndexBuilder>,
        notifier: SharedNotifier,
        predecessor: Option<JoinHandle<()>>,
    ) -> (SchedulerHandle, JoinHandle<()>) {
        let (scheduler, tx, rx) = Self::new(target, config, builder, notifier, predecessor);
        let task = tokio::spawn(scheduler.run(rx));
        (SchedulerHandle { tx }, task)
    }

    fn new(
        target: IndexTarget,
        config: ScheduleConfig,
        builder: Arc<dyn IndexBuilder>,
        notifier: SharedNotifier,
        predecessor: Option<JoinHandle<()>>,
    ) -> (Self, UnboundedSender<Message>, UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let status = IndexStatus {
            root: target.root().to_path_buf(),
            index_dir: target.index_dir().to_path_buf(),
            state: IndexState::Idle,
            index_on_save: config.index_on_save,
            cron_active: false,
            cron_schedule: None,
            next_cron_fire: None,
            changes_pending: false,
            runs_started: 0,
            runs_succeeded: 0,
            runs_failed: 0,
            triggers_suppressed: 0,
            last_trigger: None,
            last_started_at: None,
            last_outcome: None,
            last_duration_ms: None,
            last_index_size: None,
        };

        let mut scheduler = Self {
            target,
            config: config.clone(),
            builder,
            notifier,
            self_tx: tx.downgrade(),
            state: IndexState::Idle,
            build_task: None,
            predecessor,
            debounce_deadline: None,
            cron: None,
            status,
        };
        scheduler.replace_cron(config.cron_schedule.as_deref());
        (scheduler, tx, rx)
    }

    async fn run(mut self, mut rx: UnboundedReceiver<Message>) {
        info!(
            root = %self.target.root().display(),
            index_dir = %self.target.index_dir().display(),
            index_on_save = self.config.index_on_save,
            "Index scheduler started"
        );

        loop {
            let debounce = self.debounce_deadline;
            let cron = self.cron.as_ref().map(|c| c.deadline);

            tokio::select! {
                biased;
                message = rx.recv() => match message {
                    Some(Message::Shutdown) | None => break,
                    Some(message) => self.handle(message),
                },
                _ = sleep_until(debounce) => self.on_changes_settled(),
                _ = sleep_until(cron) => self.on_cron_fired(),
            }
        }

        rx.close();
        if self.state == IndexState::Indexing {
            self.notifier.progress_finished(&self.target.key());
            if let Some(build) = self.build_task.take() {
                info!(root = %self.target.root().display(), "Waiting for the running build to exit");
                let _ = build.await;
            }
        }
        info!(root = %self.target.root().display(), "Index scheduler stopped");
    }

    fn handle(&mut self, message: Message) {
        match message {
            Message::FileChanged(path) => self.on_file_changed(path),
            Message::Rebuild(reply) => {
                // Dropping the reply tells the caller the scheduler stopped
                let Some(response) = self.trigger(Trigger::Manual) else {
                    return;
                };
                if response == TriggerResponse::AlreadyRunning {
                    self.notifier.info(&format!(
                        "Indexing of {} is already running",
                        self.target.root().display()
                    ));
                }
                let _ = reply.send(response);
            }
            Message::Reconfigure(config) => self.apply_config(config),
            Message::Status(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Message::BuildFinished(report) => self.on_build_finished(report),
            Message::Shutdown => {}
        }
    }

    fn on_file_changed(&mut self, path: PathBuf) {
        if self.target.is_index_path(&path) {
            trace!(path = %path.display(), "Ignoring change inside index directory");
            return;
        }
        trace!(path = %path.display(), "File change noted, debounce reset");
        self.debounce_deadline = Some(Instant::now() + self.config.debounce);
    }

    fn on_changes_settled(&mut self) {
        self.debounce_deadline = None;
        if !self.config.index_on_save {
            debug!(root = %self.target.root().display(), "Changes settled, index_on_save is off");
            return;
        }
        self.trigger(Trigger::FileChange);
    }

    fn on_cron_fired(&mut self) {
        let Some(armed) = self.cron.take() else {
            return;
        };
        debug!(
            root = %self.target.root().display(),
            schedule = armed.trigger.expression(),
            "Cron trigger fired"
        );
        self.cron = ArmedCron::arm(armed.trigger);
        if self.cron.is_none() {
            info!(root = %self.target.root().display(), "Cron schedule has no further occurrences");
        }
        self.trigger(Trigger::Cron);
    }

    fn apply_config(&mut self, config: ScheduleConfig) {
        if config.cron_schedule != self.config.cron_schedule {
            self.replace_cron(config.cron_schedule.as_deref());
        }
        info!(
            root = %self.target.root().display(),
            index_on_save = config.index_on_save,
            cron_active = self.cron.is_some(),
            metrics = config.enable_performance_metrics,
            "Schedule configuration applied"
        );
        self.config = config;
    }

    /// Stop the current timer, validate `expression`, arm the new timer.
    fn replace_cron(&mut self, expression: Option<&str>) {
        if let Some(previous) = self.cron.take() {
            debug!(schedule = previous.trigger.expression(), "Cron trigger stopped");
        }

        let Some(expression) = expression.map(str::trim).filter(|e| !e.is_empty()) else {
            return;
        };

        match CronTrigger::parse(expression) {
            Ok(trigger) => {
                self.cron = ArmedCron::arm(trigger);
                if let Some(ref armed) = self.cron {
                    info!(
                        root = %self.target.root().display(),
                        schedule = expression,
                        next_fire = %armed.fire_at,
                        "Cron trigger armed"
                    );
                }
            }
            Err(e) => {
                warn!(
                    root = %self.target.root().display(),
                    error = %e,
                    "Invalid cron schedule, scheduled rebuilds disabled"
                );
            }
        }
    }

    /// Whether a stopped scheduler for the same root is still building
    fn predecessor_running(&self) -> bool {
        self.predecessor
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Start a build unless one is in flight. `None` once every handle is
    /// gone and the actor is about to exit.
    fn trigger(&mut self, trigger: Trigger) -> Option<TriggerResponse> {
        if self.predecessor.is_some() && !self.predecessor_running() {
            self.predecessor = None;
        }
        if self.state == IndexState::Indexing || self.predecessor_running() {
            self.status.triggers_suppressed += 1;
            info!(
                root = %self.target.root().display(),
                trigger = ?trigger,
                "Indexing already in progress, trigger ignored"
            );
            return Some(TriggerResponse::AlreadyRunning);
        }

        let tx = self.self_tx.upgrade()?;

        self.state = IndexState::Indexing;
        self.status.runs_started += 1;
        self.status.last_trigger = Some(trigger);
        self.status.last_started_at = Some(Utc::now());

        info!(
            root = %self.target.root().display(),
            trigger = ?trigger,
            "Index rebuild started"
        );
        self.notifier.progress_started(
            &self.target.key(),
            &format!("Indexing {}", self.target.root().display()),
        );

        let builder = self.builder.clone();
        let target = self.target.clone();
        let measure = self.config.enable_performance_metrics;
        let started = Instant::now();

        self.build_task = Some(tokio::spawn(async move {
            let index_dir = target.index_dir().to_path_buf();
            // A panicking builder must not leave the target stuck in Indexing.
            let outcome = match tokio::spawn(async move { builder.build(&target).await }).await {
                Ok(outcome) => outcome,
                Err(e) => ProcessOutcome::FailedToLaunch(format!("index build task failed: {}", e)),
            };
            let elapsed = started.elapsed();

            let index_size = if measure && outcome.is_success() {
                tokio::task::spawn_blocking(move || directory_size(&index_dir))
                    .await
                    .ok()
            } else {
                None
            };

            let _ = tx.send(Message::BuildFinished(BuildReport {
                outcome,
                elapsed,
                index_size,
            }));
        }));

        Some(TriggerResponse::Started)
    }

    fn on_build_finished(&mut self, report: BuildReport) {
        self.state = IndexState::Idle;
        self.build_task = None;
        self.notifier.progress_finished(&self.target.key());

        let root = self.target.root().display().to_string();
        self.status.last_duration_ms = Some(report.elapsed.as_millis() as u64);
        self.status.last_index_size = report.index_size;

        if report.outcome.is_success() {
            self.status.runs_succeeded += 1;
            info!(root = %root, elapsed = %format_secs(report.elapsed), "Index rebuild completed");

            if self.config.enable_performance_metrics {
                let size = report
                    .index_size
                    .map(format_bytes)
                    .unwrap_or_else(|| "unknown".to_string());
                info!(
                    root = %root,
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    index_size = %size,
                    "Index metrics"
                );
                self.notifier.info(&format!(
                    "Indexed {} in {}, index size {}",
                    root,
                    format_secs(report.elapsed),
                    size
                ));
            }
        } else {
            self.status.runs_failed += 1;
            warn!(root = %root, outcome = %report.outcome, "Index rebuild failed");
        }

        self.status.last_outcome = Some(report.outcome);
    }

    fn snapshot(&self) -> IndexStatus {
        let mut status = self.status.clone();
        status.state = if self.predecessor_running() {
            IndexState::Indexing
        } else {
            self.state
        };
        status.index_on_save = self.config.index_on_save;
        status.cron_active = self.cron.is_some();
        status.cron_schedule = self
            .cron
            .as_ref()
            .map(|c| c.trigger.expression().to_string());
        status.next_cron_fire = self.cron.as_ref().map(|c| c.fire_at);
        status.changes_pending = self.debounce_deadline.is_some();
        status
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::{Notification, RecordingNotifier};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;
    use tokio::sync::Semaphore;

    /// Counts builds; optionally blocks each build until a permit is added.
    struct FakeBuilder {
        builds: AtomicUsize,
        gate: Option<Arc<Semaphore>>,
        outcome: ProcessOutcome,
        write_bytes: usize,
    }

    impl FakeBuilder {
        fn instant() -> Arc<Self> {
            Arc::new(Self {
                builds: AtomicUsize::new(0),
                gate: None,
                outcome: ProcessOutcome::Succeeded,
                write_bytes: 0,
            })
        }

        fn gated(gate: Arc<Semaphore>) -> Arc<Self> {
            Arc::new(Self {
                builds: AtomicUsize::new(0),
                gate: Some(gate),
                outcome: ProcessOutcome::Succeeded,
                write_bytes: 0,
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                builds: AtomicUsize::new(0),
                gate: None,
                outcome: ProcessOutcome::FailedWithCode(Some(1)),
                write_bytes: 0,
            })
        }

        fn count(&self) -> usize {
            self.builds.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl IndexBuilder for FakeBuilder {
        async fn build(&self, target: &IndexTarget) -> ProcessOutcome {
            self.builds.fetch_add(1, Ordering::SeqCst);
            if let Some(ref gate) = self.gate {
                gate.acquire().await.unwrap().forget();
            }
            if self.write_bytes > 0 {
                target.ensure_index_dir().unwrap();
                std::fs::write(
                    target.index_dir().join("ws_v16.00000.zoekt"),
                    vec![0u8; self.write_bytes],
                )
                .unwrap();
            }
            self.outcome.clone()
        }
    }

    fn target() -> IndexTarget {
        IndexTarget::new("/ws", "/ws/.zoekt-index")
    }

    fn config() -> ScheduleConfig {
        ScheduleConfig {
            index_on_save: true,
            cron_schedule: None,
            enable_performance_metrics: false,
            debounce: Duration::from_secs(5),
        }
    }

    fn spawn(
        config: ScheduleConfig,
        builder: Arc<FakeBuilder>,
    ) -> (SchedulerHandle, Arc<RecordingNotifier>) {
        let notifier = Arc::new(RecordingNotifier::new());
        let (handle, _task) = IndexScheduler::spawn(target(), config, builder, notifier.clone());
        (handle, notifier)
    }

    async fn wait_idle(handle: &SchedulerHandle) -> IndexStatus {
        loop {
            let status = handle.status().await.unwrap();
            if status.state == IndexState::Idle {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn sleep(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_of_changes_triggers_single_rebuild() {
        let builder = FakeBuilder::instant();
        let (handle, _) = spawn(config(), builder.clone());

        for i in 0..50 {
            handle.notify_change(PathBuf::from(format!("/ws/src/file{}.go", i)));
            sleep(100).await;
        }
        sleep(4_000).await;
        assert_eq!(builder.count(), 0, "debounce window still open");

        sleep(1_500).await;
        let status = wait_idle(&handle).await;
        assert_eq!(builder.count(), 1);
        assert_eq!(status.runs_succeeded, 1);
        assert_eq!(status.last_trigger, Some(Trigger::FileChange));

        sleep(30_000).await;
        assert_eq!(builder.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_change_triggers_single_rebuild() {
        let builder = FakeBuilder::instant();
        let (handle, _) = spawn(config(), builder.clone());

        handle.notify_change(PathBuf::from("/ws/main.go"));
        sleep(6_000).await;
        wait_idle(&handle).await;
        assert_eq!(builder.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_rebuild_separately() {
        let builder = FakeBuilder::instant();
        let (handle, _) = spawn(config(), builder.clone());

        handle.notify_change(PathBuf::from("/ws/a.go"));
        sleep(6_000).await;
        wait_idle(&handle).await;
        handle.notify_change(PathBuf::from("/ws/b.go"));
        sleep(6_000).await;
        wait_idle(&handle).await;

        assert_eq!(builder.count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_index_on_save_disabled_ignores_changes() {
        let builder = FakeBuilder::instant();
        let (handle, _) = spawn(
            ScheduleConfig {
                index_on_save: false,
                ..config()
            },
            builder.clone(),
        );

        handle.notify_change(PathBuf::from("/ws/a.go"));
        sleep(10_000).await;
        let status = wait_idle(&handle).await;
        assert_eq!(builder.count(), 0);
        assert!(!status.changes_pending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_changes_inside_index_dir_are_ignored() {
        let builder = FakeBuilder::instant();
        let (handle, _) = spawn(config(), builder.clone());

        handle.notify_change(PathBuf::from("/ws/.zoekt-index/ws_v16.00000.zoekt"));
        assert!(!handle.status().await.unwrap().changes_pending);
        sleep(10_000).await;
        assert_eq!(builder.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_triggers_while_indexing_spawn_nothing() {
        let gate = Arc::new(Semaphore::new(0));
        let builder = FakeBuilder::gated(gate.clone());
        let (handle, notifier) = spawn(
            ScheduleConfig {
                cron_schedule: Some("* * * * * *".to_string()),
                ..config()
            },
            builder.clone(),
        );

        assert_eq!(handle.request_rebuild().await.unwrap(), TriggerResponse::Started);
        assert_eq!(
            handle.request_rebuild().await.unwrap(),
            TriggerResponse::AlreadyRunning
        );

        // Settled file changes and several cron fires while the build is stuck
        handle.notify_change(PathBuf::from("/ws/a.go"));
        handle.notify_change(PathBuf::from("/ws/b.go"));
        sleep(7_000).await;

        let status = handle.status().await.unwrap();
        assert_eq!(status.state, IndexState::Indexing);
        assert_eq!(builder.count(), 1);
        assert!(status.triggers_suppressed >= 3);
        assert!(notifier
            .infos()
            .iter()
            .any(|m| m.contains("already running")));

        // Stop the cron timer before releasing so no new build can start
        handle.reconfigure(config());
        gate.add_permits(1);
        let status = wait_idle(&handle).await;
        assert_eq!(builder.count(), 1);
        assert_eq!(status.runs_started, 1);
        assert_eq!(status.runs_succeeded, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_back_to_back_manual_requests_spawn_once() {
        let builder = FakeBuilder::instant();
        let (handle, _) = spawn(config(), builder.clone());

        let first = handle.request_rebuild().await.unwrap();
        let second = handle.request_rebuild().await.unwrap();
        assert_eq!(first, TriggerResponse::Started);
        assert_eq!(second, TriggerResponse::AlreadyRunning);

        wait_idle(&handle).await;
        assert_eq!(builder.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_build_returns_to_idle() {
        let builder = FakeBuilder::failing();
        let (handle, notifier) = spawn(config(), builder.clone());

        assert_eq!(handle.request_rebuild().await.unwrap(), TriggerResponse::Started);
        let status = wait_idle(&handle).await;
        assert_eq!(status.runs_failed, 1);
        assert_eq!(status.last_outcome, Some(ProcessOutcome::FailedWithCode(Some(1))));

        assert_eq!(handle.request_rebuild().await.unwrap(), TriggerResponse::Started);
        let status = wait_idle(&handle).await;
        assert_eq!(status.runs_failed, 2);
        assert_eq!(builder.count(), 2);

        let events = notifier.events();
        let started = events
            .iter()
            .filter(|e| matches!(e, Notification::ProgressStarted(_)))
            .count();
        let finished = events
            .iter()
            .filter(|e| matches!(e, Notification::ProgressFinished(_)))
            .count();
        assert_eq!((started, finished), (2, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_cron_leaves_no_timer() {
        let builder = FakeBuilder::instant();
        let (handle, _) = spawn(
            ScheduleConfig {
                cron_schedule: Some("* * * *".to_string()),
                ..config()
            },
            builder.clone(),
        );

        let status = handle.status().await.unwrap();
        assert!(!status.cron_active);
        assert!(status.next_cron_fire.is_none());

        sleep(120_000).await;
        assert_eq!(builder.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cron_fires_rebuilds() {
        let builder = FakeBuilder::instant();
        let (handle, _) = spawn(
            ScheduleConfig {
                cron_schedule: Some("* * * * * *".to_string()),
                ..config()
            },
            builder.clone(),
        );

        let status = handle.status().await.unwrap();
        assert!(status.cron_active);
        assert_eq!(status.cron_schedule.as_deref(), Some("* * * * * *"));

        sleep(5_500).await;
        wait_idle(&handle).await;
        assert!(builder.count() >= 2, "got {} builds", builder.count());
        assert_eq!(handle.status().await.unwrap().last_trigger, Some(Trigger::Cron));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconfigure_replaces_cron_timer() {
        let builder = FakeBuilder::instant();
        let (handle, _) = spawn(
            ScheduleConfig {
                cron_schedule: Some("* * * * * *".to_string()),
                ..config()
            },
            builder.clone(),
        );

        handle.reconfigure(ScheduleConfig {
            cron_schedule: Some("0 0 1 1 *".to_string()),
            ..config()
        });
        let status = wait_idle(&handle).await;
        assert!(status.cron_active);
        assert_eq!(status.cron_schedule.as_deref(), Some("0 0 1 1 *"));

        let before = builder.count();
        sleep(10_000).await;
        assert_eq!(builder.count(), before, "old per-second timer must be gone");

        handle.reconfigure(ScheduleConfig {
            cron_schedule: Some("not a cron".to_string()),
            ..config()
        });
        assert!(!handle.status().await.unwrap().cron_active);

        handle.reconfigure(config());
        assert!(!handle.status().await.unwrap().cron_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_measure_index_size() {
        let dir = TempDir::new().unwrap();
        let builder = Arc::new(FakeBuilder {
            builds: AtomicUsize::new(0),
            gate: None,
            outcome: ProcessOutcome::Succeeded,
            write_bytes: 2048,
        });
        let notifier = Arc::new(RecordingNotifier::new());
        let (handle, _task) = IndexScheduler::spawn(
            IndexTarget::new(dir.path(), dir.path().join(".zoekt-index")),
            ScheduleConfig {
                enable_performance_metrics: true,
                ..config()
            },
            builder,
            notifier.clone(),
        );

        handle.request_rebuild().await.unwrap();
        let status = wait_idle(&handle).await;
        assert_eq!(status.last_index_size, Some(2048));
        assert!(status.last_duration_ms.is_some());
        assert!(notifier.infos().iter().any(|m| m.contains("2.00 KB")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_actor() {
        let builder = FakeBuilder::instant();
        let notifier = Arc::new(RecordingNotifier::new());
        let (handle, task) = IndexScheduler::spawn(target(), config(), builder.clone(), notifier);

        handle.notify_change(PathBuf::from("/ws/a.go"));
        handle.shutdown();
        task.await.unwrap();

        assert!(handle.is_closed());
        assert!(handle.request_rebuild().await.is_err());
        sleep(10_000).await;
        assert_eq!(builder.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebuild_with_no_handles_left_reports_stopped() {
        let builder = FakeBuilder::instant();
        let notifier = Arc::new(RecordingNotifier::new());
        let (mut scheduler, tx, _rx) =
            IndexScheduler::new(target(), config(), builder.clone(), notifier.clone(), None);
        drop(tx);

        let (reply, response) = oneshot::channel();
        scheduler.handle(Message::Rebuild(reply));

        assert!(response.await.is_err());
        assert_eq!(scheduler.snapshot().runs_started, 0);
        assert_eq!(scheduler.snapshot().state, IndexState::Idle);
        assert!(notifier.infos().is_empty());
        assert_eq!(builder.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_scheduler_outlives_its_build() {
        let gate = Arc::new(Semaphore::new(0));
        let builder = FakeBuilder::gated(gate.clone());
        let notifier = Arc::new(RecordingNotifier::new());
        let (first, first_task) =
            IndexScheduler::spawn(target(), config(), builder.clone(), notifier.clone());

        assert_eq!(first.request_rebuild().await.unwrap(), TriggerResponse::Started);
        first.shutdown();
        sleep(1_000).await;
        assert!(!first_task.is_finished(), "actor exited while its build runs");
        assert!(first.request_rebuild().await.is_err());

        let (second, _task) = IndexScheduler::spawn_after(
            target(),
            config(),
            builder.clone(),
            notifier,
            Some(first_task),
        );
        assert_eq!(
            second.request_rebuild().await.unwrap(),
            TriggerResponse::AlreadyRunning
        );
        let status = second.status().await.unwrap();
        assert_eq!(status.state, IndexState::Indexing);
        assert_eq!(status.runs_started, 0);
        assert_eq!(status.triggers_suppressed, 1);

        gate.add_permits(2);
        wait_idle(&second).await;
        assert_eq!(second.request_rebuild().await.unwrap(), TriggerResponse::Started);
        let status = wait_idle(&second).await;
        assert_eq!(status.runs_succeeded, 1);
        assert_eq!(builder.count(), 2);
    }
}
