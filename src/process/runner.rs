//! Subprocess execution with line-oriented output streaming.
//!
//! A [`ProcessRun`] yields every stdout/stderr line as it arrives and then
//! exactly one [`ProcessOutcome`]. The outcome depends only on how the process
//! ended: stderr content never turns an exit code of zero into a failure.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, warn};

/// Which pipe a line was read from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// One decoded line of subprocess output, without its line terminator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: StreamKind,
    pub text: String,
}

/// Terminal result of a single subprocess run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ProcessOutcome {
    /// Exit code zero
    Succeeded,
    /// Non-zero exit. `None` when the process was terminated by a signal.
    FailedWithCode(Option<i32>),
    /// The process could not be started
    FailedToLaunch(String),
}

impl ProcessOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Succeeded)
    }
}

impl fmt::Display for ProcessOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessOutcome::Succeeded => write!(f, "succeeded"),
            ProcessOutcome::FailedWithCode(code) => write!(f, "{}", describe_exit_code(code)),
            ProcessOutcome::FailedToLaunch(cause) => write!(f, "failed to launch: {}", cause),
        }
    }
}

/// Human readable form of a non-zero exit status
pub fn describe_exit_code(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exited with code {}", code),
        None => "was terminated by a signal".to_string(),
    }
}

/// Events produced by a [`ProcessRun`]. `Finished` is always the last one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Line(OutputLine),
    Finished(ProcessOutcome),
}

/// An external command invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            cwd: None,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Shell-like rendering for logs. Arguments with spaces are quoted.
    pub fn display(&self) -> String {
        let mut rendered = self.program.display().to_string();
        for arg in &self.args {
            rendered.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                rendered.push('"');
                rendered.push_str(arg);
                rendered.push('"');
            } else {
                rendered.push_str(arg);
            }
        }
        rendered
    }

    fn validate(&self) -> Result<(), String> {
        if self.program.as_os_str().is_empty() {
            return Err("no executable given".to_string());
        }
        if self.args.is_empty() {
            return Err(format!(
                "no arguments given for {}",
                self.program.display()
            ));
        }
        Ok(())
    }
}

/// A running (or finished) subprocess
pub struct ProcessRun {
    rx: UnboundedReceiver<RunEvent>,
    finished: bool,
}

impl ProcessRun {
    /// Next line or the terminal outcome. Returns `None` once the outcome
    /// has been delivered.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        if self.finished {
            return None;
        }
        match self.rx.recv().await {
            Some(RunEvent::Finished(outcome)) => {
                self.finished = true;
                Some(RunEvent::Finished(outcome))
            }
            Some(line) => Some(line),
            None => {
                // Supervisor task went away without reporting (runtime shutdown).
                self.finished = true;
                Some(RunEvent::Finished(ProcessOutcome::FailedWithCode(None)))
            }
        }
    }

    /// Drive the run to completion, handing every line to `on_line`.
    pub async fn run_with<F>(mut self, mut on_line: F) -> ProcessOutcome
    where
        F: FnMut(OutputLine) + Send,
    {
        while let Some(event) = self.next_event().await {
            match event {
                RunEvent::Line(line) => on_line(line),
                RunEvent::Finished(outcome) => return outcome,
            }
        }
        ProcessOutcome::FailedWithCode(None)
    }
}

/// Spawns external commands. Holds no state, so it is freely shareable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Start `spec`. Must be called from within a tokio runtime.
    pub fn spawn(&self, spec: &CommandSpec) -> ProcessRun {
        let (tx, rx) = mpsc::unbounded_channel();
        let run = ProcessRun {
            rx,
            finished: false,
        };

        if let Err(cause) = spec.validate() {
            let _ = tx.send(RunEvent::Finished(ProcessOutcome::FailedToLaunch(cause)));
            return run;
        }

        let mut command = Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref cwd) = spec.cwd {
            command.current_dir(cwd);
        }

        debug!(command = %spec.display(), "Spawning process");

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                debug!(command = %spec.display(), error = %e, "Process failed to launch");
                let _ = tx.send(RunEvent::Finished(ProcessOutcome::FailedToLaunch(
                    e.to_string(),
                )));
                return run;
            }
        };

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let program = spec.program.display().to_string();

        tokio::spawn(async move {
            let stdout_task = stdout.map(|out| tokio::spawn(pump(out, StreamKind::Stdout, tx.clone())));
            let stderr_task = stderr.map(|err| tokio::spawn(pump(err, StreamKind::Stderr, tx.clone())));

            // Both pipes must be drained before the outcome is reported.
            if let Some(task) = stdout_task {
                let _ = task.await;
            }
            if let Some(task) = stderr_task {
                let _ = task.await;
            }

            let outcome = match child.wait().await {
                Ok(status) if status.success() => ProcessOutcome::Succeeded,
                Ok(status) => ProcessOutcome::FailedWithCode(status.code()),
                Err(e) => {
                    warn!(program = %program, error = %e, "Failed to wait for process");
                    ProcessOutcome::FailedWithCode(None)
                }
            };
            debug!(program = %program, outcome = %outcome, "Process finished");
            let _ = tx.send(RunEvent::Finished(outcome));
        });

        run
    }

    /// Spawn `spec` and drive it to completion.
    pub async fn run_with<F>(&self, spec: &CommandSpec, on_line: F) -> ProcessOutcome
    where
        F: FnMut(OutputLine) + Send,
    {
        self.spawn(spec).run_with(on_line).await
    }
}

/// Forward every line of `reader` to `tx`. Keeps draining after the receiver
/// is gone so the child never blocks on a full pipe.
async fn pump<R>(reader: R, stream: StreamKind, tx: UnboundedSender<RunEvent>)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::with_capacity(256);
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let text = decode_line(&buf);
                let _ = tx.send(RunEvent::Line(OutputLine { stream, text }));
            }
            Err(e) => {
                debug!(stream = ?stream, error = %e, "Stopped reading process output");
                break;
            }
        }
    }
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\n', '\r'])
        .to_string()
}
