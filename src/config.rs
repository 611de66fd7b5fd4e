//! Configuration management for zoekt_code_search
//!
//! Supports loading configuration from TOML files with CLI overrides.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::index::{IndexPlacement, ScheduleConfig, DEFAULT_INDEX_DIR_NAME};
use crate::process::SHARD_FINISHED_MARKER;

/// Telemetry / OpenTelemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    /// Enable OpenTelemetry trace export (default: false)
    /// Can be overridden by env var ZCS_TRACING_ENABLED or OTEL_SDK_DISABLED
    #[serde(default)]
    pub enabled: bool,

    /// OTLP exporter endpoint (default: http://localhost:4317)
    /// Can be overridden by env var OTEL_EXPORTER_OTLP_ENDPOINT
    #[serde(default = "default_otlp_endpoint")]
    pub otlp_endpoint: String,

    /// Service name reported to the collector (default: zoekt_code_search)
    /// Can be overridden by env var OTEL_SERVICE_NAME
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

fn default_otlp_endpoint() -> String {
    "http://localhost:4317".to_string()
}

fn default_service_name() -> String {
    "zoekt_code_search".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            otlp_endpoint: default_otlp_endpoint(),
            service_name: default_service_name(),
        }
    }
}

impl TelemetryConfig {
    /// Apply environment variable overrides.
    /// Env vars take precedence over TOML config values.
    pub fn with_env_overrides(mut self) -> Self {
        // OTEL_SDK_DISABLED=true → disabled (official OTel convention)
        if let Ok(val) = std::env::var("OTEL_SDK_DISABLED") {
            if val.eq_ignore_ascii_case("true") {
                self.enabled = false;
            }
        }
        // ZCS_TRACING_ENABLED wins over everything else
        if let Ok(val) = std::env::var("ZCS_TRACING_ENABLED") {
            self.enabled = val.eq_ignore_ascii_case("true") || val == "1";
        }
        if let Ok(val) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT") {
            if !val.is_empty() {
                self.otlp_endpoint = val;
            }
        }
        if let Ok(val) = std::env::var("OTEL_SERVICE_NAME") {
            if !val.is_empty() {
                self.service_name = val;
            }
        }
        self
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub workspace: WorkspaceConfig,

    #[serde(default)]
    pub indexer: IndexerConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Which directory trees are kept indexed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkspaceConfig {
    /// Workspace roots; the current directory when empty
    #[serde(default)]
    pub roots: Vec<String>,

    /// Keep every index under this directory instead of inside each root
    #[serde(default, alias = "storageRoot")]
    pub storage_root: Option<String>,

    /// Index directory name used inside each root
    #[serde(default = "default_index_dir_name", alias = "indexDirName")]
    pub index_dir_name: String,
}

fn default_index_dir_name() -> String {
    DEFAULT_INDEX_DIR_NAME.to_string()
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            storage_root: None,
            index_dir_name: default_index_dir_name(),
        }
    }
}

/// Rebuild policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexerConfig {
    /// Rebuild after file changes settle (default: true)
    #[serde(default = "default_true", alias = "indexOnSave")]
    pub index_on_save: bool,

    /// Recurring rebuild schedule, five or six cron fields
    #[serde(default, alias = "cronSchedule")]
    pub cron_schedule: Option<String>,

    /// Report build time and index size after each successful build
    #[serde(default, alias = "enablePerformanceMetrics")]
    pub enable_performance_metrics: bool,

    /// Quiet period after the last file change, in milliseconds
    #[serde(default = "default_debounce_ms", alias = "debounceMs")]
    pub debounce_ms: u64,

    /// Glob patterns the file watcher ignores, relative to each workspace root
    #[serde(default = "default_exclude_patterns", alias = "excludePatterns")]
    pub exclude_patterns: Vec<String>,
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    5_000
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
        "**/.git/**".to_string(),
    ]
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            index_on_save: true,
            cron_schedule: None,
            enable_performance_metrics: false,
            debounce_ms: default_debounce_ms(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

/// The external zoekt executables
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Index builder executable (default: zoekt-index on PATH)
    #[serde(default = "default_index_binary", alias = "indexBinary")]
    pub index_binary: String,

    /// Search executable (default: zoekt on PATH)
    #[serde(default = "default_search_binary", alias = "searchBinary")]
    pub search_binary: String,

    /// Pass `-r` to the search executable
    #[serde(default)]
    pub recursive: bool,

    /// Substrings that mark an indexer stderr line as a success report
    #[serde(default = "default_success_markers", alias = "successMarkers")]
    pub success_markers: Vec<String>,
}

fn default_index_binary() -> String {
    "zoekt-index".to_string()
}

fn default_search_binary() -> String {
    "zoekt".to_string()
}

fn default_success_markers() -> Vec<String> {
    vec![SHARD_FINISHED_MARKER.to_string()]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_binary: default_index_binary(),
            search_binary: default_search_binary(),
            recursive: false,
            success_markers: default_success_markers(),
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from default locations
    ///
    /// Search order:
    /// 1. ZCS_CONFIG environment variable
    /// 2. ./zoekt_code_search.toml (current directory)
    /// 3. ~/.config/zoekt_code_search/config.toml (user config)
    pub fn from_default_locations() -> Result<Option<(Self, PathBuf)>> {
        if let Ok(env_path) = std::env::var("ZCS_CONFIG") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                let config = Self::from_file(&path)?;
                return Ok(Some((config, path)));
            }
        }

        let local_path = PathBuf::from("zoekt_code_search.toml");
        if local_path.exists() {
            let config = Self::from_file(&local_path)?;
            return Ok(Some((config, local_path)));
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_path = config_dir.join("zoekt_code_search").join("config.toml");
            if user_path.exists() {
                let config = Self::from_file(&user_path)?;
                return Ok(Some((config, user_path)));
            }
        }

        Ok(None)
    }

    /// Generate a template configuration file
    pub fn generate_template() -> String {
        r#"# zoekt_code_search configuration
# Generated template - customize as needed

[workspace]
# Directories to keep indexed (default: the current directory)
roots = [
    # "/home/user/projects/my-app",
    # "C:/code/another-project",
]

# Keep all indexes under one directory instead of inside each root
# storage_root = "/var/lib/zoekt_code_search"

# Index directory created inside each root when storage_root is unset
index_dir_name = ".zoekt-index"

[indexer]
# Rebuild the index once file changes have settled
index_on_save = true

# Recurring rebuilds, five fields (minute hour day month weekday)
# or six with a leading seconds field. Use day names for weekdays.
# cron_schedule = "0 3 * * *"

# Report build time and index size after each successful build
enable_performance_metrics = false

# Quiet period after the last change before rebuilding, in milliseconds
debounce_ms = 5000

# Globs the file watcher ignores, matched relative to each root
exclude_patterns = [
    "**/node_modules/**",
    "**/target/**",
    "**/.git/**",
]

[engine]
# zoekt executables, resolved through PATH unless absolute
index_binary = "zoekt-index"
search_binary = "zoekt"

# Pass -r to zoekt
recursive = false

[telemetry]
# Enable OpenTelemetry trace export (default: false)
# Set to true to enable OTLP export (console logging is always active)
# Env overrides: OTEL_SDK_DISABLED=true, ZCS_TRACING_ENABLED=true
enabled = false

# OTLP gRPC exporter endpoint (default: http://localhost:4317)
# Env override: OTEL_EXPORTER_OTLP_ENDPOINT
otlp_endpoint = "http://localhost:4317"

# Service name reported to the collector
# Env override: OTEL_SERVICE_NAME
service_name = "zoekt_code_search"
"#
        .to_string()
    }

    /// Write template config to the specified path
    pub fn write_template(path: &Path) -> Result<()> {
        let template = Self::generate_template();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        std::fs::write(path, template)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Merge CLI overrides into the configuration
    pub fn with_overrides(mut self, extra_roots: Vec<String>) -> Self {
        self.workspace.roots.extend(extra_roots);
        self
    }

    pub fn schedule(&self) -> ScheduleConfig {
        ScheduleConfig {
            index_on_save: self.indexer.index_on_save,
            cron_schedule: self
                .indexer
                .cron_schedule
                .clone()
                .filter(|expr| !expr.trim().is_empty()),
            enable_performance_metrics: self.indexer.enable_performance_metrics,
            debounce: Duration::from_millis(self.indexer.debounce_ms),
        }
    }

    pub fn placement(&self) -> IndexPlacement {
        match self.workspace.storage_root {
            Some(ref storage_root) if !storage_root.trim().is_empty() => {
                IndexPlacement::SharedStorage {
                    storage_root: PathBuf::from(storage_root),
                }
            }
            _ => IndexPlacement::InsideRoot {
                dir_name: self.workspace.index_dir_name.clone(),
            },
        }
    }

    /// Configured roots in order, duplicates removed. Falls back to the
    /// current directory when none are configured.
    pub fn root_paths(&self) -> Result<Vec<PathBuf>> {
        let mut roots: Vec<PathBuf> = Vec::new();
        for root in &self.workspace.roots {
            let path = PathBuf::from(root);
            if !roots.contains(&path) {
                roots.push(path);
            }
        }

        if roots.is_empty() {
            let cwd = std::env::current_dir().context("Failed to determine current directory")?;
            roots.push(cwd);
        }
        Ok(roots)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.workspace.roots.is_empty());
        assert_eq!(config.workspace.index_dir_name, ".zoekt-index");
        assert!(config.indexer.index_on_save);
        assert_eq!(config.indexer.debounce_ms, 5000);
        assert_eq!(config.engine.index_binary, "zoekt-index");
        assert_eq!(config.engine.search_binary, "zoekt");
        assert_eq!(config.engine.success_markers, vec!["finished shard"]);
    }

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[workspace]
roots = ["/code/project"]

[indexer]
cron_schedule = "0 3 * * *"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.workspace.roots, vec!["/code/project"]);
        assert_eq!(config.indexer.cron_schedule.as_deref(), Some("0 3 * * *"));
        assert!(config.indexer.index_on_save);
    }

    #[test]
    fn test_camel_case_keys_are_accepted() {
        let toml = r#"
[indexer]
indexOnSave = false
cronSchedule = "*/5 * * * *"
enablePerformanceMetrics = true
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let schedule = config.schedule();
        assert!(!schedule.index_on_save);
        assert_eq!(schedule.cron_schedule.as_deref(), Some("*/5 * * * *"));
        assert!(schedule.enable_performance_metrics);
        assert_eq!(schedule.debounce, Duration::from_secs(5));
    }

    #[test]
    fn test_blank_cron_means_no_schedule() {
        let config: Config = toml::from_str("[indexer]\ncron_schedule = \"  \"\n").unwrap();
        assert_eq!(config.schedule().cron_schedule, None);
    }

    #[test]
    fn test_placement() {
        let mut config = Config::default();
        assert_eq!(
            config.placement(),
            IndexPlacement::InsideRoot {
                dir_name: ".zoekt-index".to_string()
            }
        );

        config.workspace.storage_root = Some("/var/zoekt".to_string());
        assert_eq!(
            config.placement(),
            IndexPlacement::SharedStorage {
                storage_root: PathBuf::from("/var/zoekt")
            }
        );
    }

    #[test]
    fn test_root_paths_dedup_and_fallback() {
        let config = Config::default().with_overrides(vec![
            "/a".to_string(),
            "/b".to_string(),
            "/a".to_string(),
        ]);
        assert_eq!(
            config.root_paths().unwrap(),
            vec![PathBuf::from("/a"), PathBuf::from("/b")]
        );

        let fallback = Config::default().root_paths().unwrap();
        assert_eq!(fallback, vec![std::env::current_dir().unwrap()]);
    }

    #[test]
    fn test_template_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        Config::write_template(&path).unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[indexer\n").unwrap();

        let err = Config::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("bad.toml"));
    }
}
