//! Subprocess-driven log source: `docker compose logs`.
//!
//! Spawns the container-log tool and drains its stdout and stderr as two
//! independent line streams. Each stream runs through its own grouper and
//! the compose normalizer; the exit code is awaited after both drains
//! complete and becomes the termination reason.

use super::{EndReason, SourceError, SourceHandle};
use crate::domain::{LogEntry, StreamKind};
use crate::parser::{LogGrouper, compose};
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const ENTRY_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ComposeOptions {
    /// Binary to spawn. Injected so tests can substitute a fake; `docker`
    /// in production.
    pub program: String,
    pub compose_file: PathBuf,
    /// Compose project scope (`-p`). Also used to strip the project prefix
    /// from container labels.
    pub project: Option<String>,
    pub profiles: Vec<String>,
    pub follow: bool,
    pub tail: u32,
    /// Restrict to one service via the positional argument.
    pub service: Option<String>,
}

impl ComposeOptions {
    pub fn new(compose_file: impl Into<PathBuf>) -> Self {
        Self {
            program: "docker".to_string(),
            compose_file: compose_file.into(),
            project: None,
            profiles: Vec::new(),
            follow: false,
            tail: 100,
            service: None,
        }
    }
}

pub struct ComposeLogSource {
    options: ComposeOptions,
}

impl ComposeLogSource {
    pub fn new(options: ComposeOptions) -> Self {
        Self { options }
    }

    /// Argument vector for the log subprocess, kept separate from spawning
    /// so the assembly is testable without a process.
    pub fn command_args(&self) -> Vec<String> {
        let opts = &self.options;
        let mut args = vec![
            "compose".to_string(),
            "-f".to_string(),
            opts.compose_file.display().to_string(),
        ];
        if let Some(project) = &opts.project {
            args.push("-p".to_string());
            args.push(project.clone());
        }
        for profile in &opts.profiles {
            args.push("--profile".to_string());
            args.push(profile.clone());
        }
        args.push("logs".to_string());
        if opts.follow {
            args.push("-f".to_string());
        }
        args.push("--tail".to_string());
        args.push(opts.tail.to_string());
        args.push("--timestamps".to_string());
        args.push("--no-color".to_string());
        if let Some(service) = &opts.service {
            args.push(service.clone());
        }
        args
    }

    /// Spawn the subprocess and start draining.
    pub fn spawn(self) -> Result<SourceHandle, SourceError> {
        let args = self.command_args();
        let program = self.options.program.clone();
        debug!(program = %program, ?args, "spawning compose log subprocess");

        let child = Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SourceError::Spawn { program, source })?;

        let (tx, rx) = mpsc::channel(ENTRY_CHANNEL_CAPACITY);
        let stop = CancellationToken::new();
        let done = tokio::spawn(run(child, tx, stop.clone(), self.options.project));

        Ok(SourceHandle::new(rx, stop, done))
    }
}

async fn run(
    mut child: Child,
    tx: mpsc::Sender<LogEntry>,
    stop: CancellationToken,
    project: Option<String>,
) -> EndReason {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let out_task = tokio::spawn(drain(stdout, StreamKind::Stdout, tx.clone(), project.clone()));
    let err_task = tokio::spawn(drain(stderr, StreamKind::Stderr, tx, project));

    let drains = async {
        let _ = out_task.await;
        let _ = err_task.await;
    };
    tokio::pin!(drains);

    tokio::select! {
        () = &mut drains => {}
        () = stop.cancelled() => {
            if let Err(err) = child.start_kill() {
                warn!(error = %err, "failed to kill compose log subprocess");
            }
            // Killing closes the pipes; let the drains flush what is left.
            drains.await;
        }
    }

    match child.wait().await {
        Ok(status) => {
            if status.success() || stop.is_cancelled() {
                // A kill we requested is a clean end, not a failure.
                EndReason::Eof
            } else {
                EndReason::Exit(status.code().unwrap_or(-1))
            }
        }
        Err(err) => EndReason::Error(format!("failed to await log subprocess: {err}")),
    }
}

/// Drain one pipe line by line through the grouper and normalizer. Each
/// pipe has its own drain task and its own grouper, so stdout and stderr
/// never block each other and no locking is needed.
async fn drain<R>(
    pipe: Option<R>,
    stream: StreamKind,
    tx: mpsc::Sender<LogEntry>,
    project: Option<String>,
) where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else { return };
    let mut lines = BufReader::new(pipe).lines();
    let mut grouper = LogGrouper::new();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                for unit in grouper.push(&line) {
                    let entry = compose::normalize_unit(&unit, stream, project.as_deref());
                    if tx.send(entry).await.is_err() {
                        return;
                    }
                }
            }
            Ok(None) => break,
            Err(err) => {
                debug!(error = %err, ?stream, "log pipe read failed");
                break;
            }
        }
    }

    // Stream end: flush still-open buffers so nothing is dropped.
    for unit in grouper.finish() {
        let entry = compose::normalize_unit(&unit, stream, project.as_deref());
        if tx.send(entry).await.is_err() {
            return;
        }
    }
}
