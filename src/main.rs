use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn, Level};
use zoekt_code_search::config::Config;
use zoekt_code_search::index::{
    FileWatcher, RegistrySettings, ScheduleConfig, TriggerResponse, WatcherConfig,
    WorkspaceRegistry, ZoektIndexer,
};
use zoekt_code_search::notifier::{ConsoleNotifier, SharedNotifier};
use zoekt_code_search::process::OutputClassifier;
use zoekt_code_search::search::{render, SearchError, SearchOrchestrator};
use zoekt_code_search::telemetry;

/// Zoekt Code Search - keeps zoekt indexes fresh and searches them
#[derive(Parser, Debug)]
#[command(name = "zoekt_code_search")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Additional workspace roots (can be repeated, adds to config file roots)
    #[arg(short, long = "root", value_name = "PATH", global = true)]
    roots: Vec<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Generate a template configuration file and exit
    #[arg(long, value_name = "FILE")]
    init: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild the index of every root and wait for completion
    Index,
    /// Search the indexes and list matching lines
    Search {
        /// zoekt query
        query: String,
    },
    /// Print the scheduler status of every root as JSON
    Status,
    /// Keep indexes fresh until Ctrl-C; reads commands from stdin
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --init flag: generate template config and exit
    if let Some(init_path) = args.init {
        let path = if init_path.as_os_str().is_empty() {
            PathBuf::from("zoekt_code_search.toml")
        } else {
            init_path
        };

        if path.exists() {
            anyhow::bail!(
                "Config file already exists: {}\nRemove it first or choose a different path.",
                path.display()
            );
        }

        Config::write_template(&path)?;
        println!("✓ Generated config file: {}", path.display());
        println!("\nEdit the file to add your workspace roots, then start watching with:");
        println!("  zoekt_code_search --config {} watch", path.display());
        return Ok(());
    }

    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    let (config, config_path) = load_config(args.config.as_deref())?;
    let config = config.with_overrides(args.roots.clone());

    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let telemetry_config = config.telemetry.clone().with_env_overrides();
    telemetry::init_telemetry(&telemetry_config, log_level)?;

    match config_path {
        Some(ref path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("No config file found, using defaults"),
    }

    let notifier: SharedNotifier = Arc::new(ConsoleNotifier::new());
    let watching = matches!(command, Command::Watch);
    let mut registry = build_registry(&config, watching, notifier.clone());
    let roots = config.root_paths()?;

    registry.sync_roots(&roots);

    let result = match command {
        Command::Index => run_index(&registry).await,
        Command::Search { query } => run_search(&registry, &query).await,
        Command::Status => print_status(&registry).await,
        Command::Watch => run_watch(&mut registry, config_path, args.roots, notifier).await,
    };

    registry.shutdown().await;
    if telemetry_config.enabled {
        telemetry::shutdown_telemetry();
    }
    result
}

fn load_config(explicit: Option<&Path>) -> Result<(Config, Option<PathBuf>)> {
    if let Some(config_path) = explicit {
        if !config_path.exists() {
            anyhow::bail!(
                "Config file not found: {}\nUse --init {} to generate a template.",
                config_path.display(),
                config_path.display()
            );
        }
        let config = Config::from_file(config_path)?;
        return Ok((config, Some(config_path.to_path_buf())));
    }

    match Config::from_default_locations()? {
        Some((config, path)) => Ok((config, Some(path))),
        None => Ok((Config::default(), None)),
    }
}

fn build_registry(config: &Config, watching: bool, notifier: SharedNotifier) -> WorkspaceRegistry {
    let indexer = ZoektIndexer::new(&config.engine.index_binary, notifier.clone())
        .with_classifier(OutputClassifier::with_markers(
            config.engine.success_markers.clone(),
        ));
    let search = SearchOrchestrator::new(
        &config.engine.search_binary,
        config.engine.recursive,
        notifier.clone(),
    );

    // One-shot commands must not start extra rebuilds behind the user's back.
    let schedule = if watching {
        config.schedule()
    } else {
        ScheduleConfig {
            index_on_save: false,
            cron_schedule: None,
            ..config.schedule()
        }
    };

    WorkspaceRegistry::new(
        RegistrySettings {
            placement: config.placement(),
            schedule,
            watch: watching,
            exclude_patterns: config.indexer.exclude_patterns.clone(),
        },
        Arc::new(indexer),
        Arc::new(search),
        notifier,
    )
}

async fn run_index(registry: &WorkspaceRegistry) -> Result<()> {
    for (root, response) in registry.rebuild_all().await {
        response.with_context(|| format!("Scheduler for {} is gone", root.display()))?;
    }
    registry.wait_idle(Duration::from_millis(100)).await;

    let statuses = registry.statuses().await;
    let failed: Vec<String> = statuses
        .iter()
        .filter(|s| s.runs_failed > 0)
        .map(|s| s.root.display().to_string())
        .collect();
    for status in &statuses {
        if let Some(ref outcome) = status.last_outcome {
            println!("{}: {}", status.root.display(), outcome);
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("Indexing failed for {}", failed.join(", "));
    }
    Ok(())
}

async fn run_search(registry: &WorkspaceRegistry, query: &str) -> Result<()> {
    let results = registry.search(query).await?;
    if results.unresolved > 0 {
        info!(unresolved = results.unresolved, "Some matches could not be mapped to files");
    }
    print!("{}", render(&results));
    if results.is_empty() {
        println!();
    }
    Ok(())
}

async fn print_status(registry: &WorkspaceRegistry) -> Result<()> {
    let statuses = registry.statuses().await;
    let json = serde_json::to_string_pretty(&statuses).context("Failed to serialize status")?;
    println!("{}", json);
    Ok(())
}

async fn run_watch(
    registry: &mut WorkspaceRegistry,
    config_path: Option<PathBuf>,
    extra_roots: Vec<String>,
    notifier: SharedNotifier,
) -> Result<()> {
    let (reload_tx, mut reload_rx) = mpsc::unbounded_channel::<()>();
    let config_path = config_path.map(|p| std::fs::canonicalize(&p).unwrap_or(p));
    let _config_watcher = match config_path {
        Some(ref path) => watch_config_file(path, reload_tx),
        None => None,
    };

    info!(
        workspaces = registry.len(),
        "Watching for changes. Commands: index, search <query>, status, quit"
    );

    let mut stdin = spawn_stdin_reader();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
            Some(()) = reload_rx.recv() => {
                if let Some(ref path) = config_path {
                    reload_config(registry, path, &extra_roots, &notifier);
                }
            }
            // Once stdin is closed only Ctrl-C ends the loop
            Some(line) = stdin.recv() => {
                if !handle_command(registry, line.trim()).await {
                    break;
                }
            }
        }
    }

    Ok(())
}

/// Read stdin lines on a plain thread. A blocking read on a runtime thread
/// would keep the runtime from shutting down.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read stdin, interactive commands disabled");
                    break;
                }
            }
        }
    });
    rx
}

fn watch_config_file(path: &Path, reload_tx: mpsc::UnboundedSender<()>) -> Option<FileWatcher> {
    let parent = path.parent()?.to_path_buf();
    let file_name = path.file_name()?.to_os_string();

    let config = WatcherConfig {
        paths: vec![parent],
        recursive: false,
        exclude_patterns: Vec::new(),
        ..Default::default()
    };
    let watcher = FileWatcher::new(config, move |change| {
        if change
            .paths()
            .iter()
            .any(|p| p.file_name() == Some(file_name.as_os_str()))
        {
            let _ = reload_tx.send(());
        }
    });

    match watcher {
        Ok(watcher) => {
            info!(path = %path.display(), "Watching configuration file");
            Some(watcher)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Configuration changes will not be picked up");
            None
        }
    }
}

fn reload_config(
    registry: &mut WorkspaceRegistry,
    path: &Path,
    extra_roots: &[String],
    notifier: &SharedNotifier,
) {
    let config = match Config::from_file(path) {
        Ok(config) => config.with_overrides(extra_roots.to_vec()),
        Err(e) => {
            warn!(error = %e, "Keeping previous configuration");
            notifier.error(&format!("Invalid configuration: {:#}", e));
            return;
        }
    };

    info!(path = %path.display(), "Configuration changed, reloading");
    registry.apply_schedule(config.schedule());
    match config.root_paths() {
        Ok(roots) => registry.sync_roots(&roots),
        Err(e) => warn!(error = %e, "Workspace roots unchanged"),
    }
}

/// Returns false when the user asked to quit
async fn handle_command(registry: &WorkspaceRegistry, line: &str) -> bool {
    let (command, rest) = line
        .split_once(char::is_whitespace)
        .map(|(c, r)| (c, r.trim()))
        .unwrap_or((line, ""));

    match command {
        "" => {}
        "quit" | "exit" => return false,
        "index" => {
            for (root, response) in registry.rebuild_all().await {
                match response {
                    Ok(TriggerResponse::Started) => {
                        println!("Indexing started for {}", root.display())
                    }
                    Ok(TriggerResponse::AlreadyRunning) => {}
                    Err(e) => warn!(root = %root.display(), error = %e, "Rebuild request failed"),
                }
            }
        }
        "status" => {
            if let Err(e) = print_status(registry).await {
                warn!(error = %e, "Failed to print status");
            }
        }
        "search" => match registry.search(rest).await {
            Ok(results) => {
                print!("{}", render(&results));
                if results.is_empty() {
                    println!();
                }
            }
            Err(SearchError::EmptyQuery) => eprintln!("Usage: search <query>"),
            // Already reported through the notifier
            Err(_) => {}
        },
        other => eprintln!(
            "Unknown command `{}`. Commands: index, search <query>, status, quit",
            other
        ),
    }
    true
}
