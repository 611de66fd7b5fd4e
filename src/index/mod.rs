pub mod builder;
pub mod registry;
pub mod schedule;
pub mod scheduler;
pub mod target;
pub mod watcher;

pub use builder::{IndexBuilder, ZoektIndexer};
pub use registry::{RegistrySettings, WorkspaceRegistry};
pub use schedule::{CronTrigger, ScheduleConfig, ScheduleError, DEFAULT_DEBOUNCE};
pub use scheduler::{
    IndexScheduler, IndexState, IndexStatus, SchedulerHandle, SchedulerStopped, Trigger,
    TriggerResponse,
};
pub use target::{IndexPlacement, IndexTarget, DEFAULT_INDEX_DIR_NAME};
pub use watcher::{FileChange, FileWatcher, PathExclusions, WatcherConfig};
