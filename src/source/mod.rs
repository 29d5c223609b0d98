//! Log sources: the compose subprocess backend and the Loki backend.
//!
//! Both backends are driven through one concrete handle shape (a channel
//! of canonical entries, a cancellation token, and an awaited termination
//! reason), so the CLI, the TUI, and the automation tool never branch on
//! backend type.

pub mod compose;
pub mod loki;

pub use compose::{ComposeLogSource, ComposeOptions};
pub use loki::{LokiLogSource, LokiOptions};

use crate::domain::LogEntry;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

/// Why a source stopped producing entries. Serialized into the `end`
/// event's `reason` field.
#[derive(Debug, Clone, PartialEq)]
pub enum EndReason {
    /// Subprocess drained to EOF with exit code 0, or a bounded snapshot
    /// completed.
    Eof,
    /// Subprocess exited non-zero on its own.
    Exit(i32),
    /// WebSocket closed cleanly (by us or by the server).
    Closed,
    /// Connectivity failure; the only fatal class.
    Error(String),
    /// A caller-supplied max-duration stop fired first.
    Timeout,
    /// A caller-supplied max-events stop fired first.
    MaxEvents,
}

impl EndReason {
    pub fn as_wire(&self) -> String {
        match self {
            Self::Eof => "eof".to_string(),
            Self::Exit(code) => format!("exit:{code}"),
            Self::Closed => "closed".to_string(),
            Self::Error(_) => "error".to_string(),
            Self::Timeout => "timeout".to_string(),
            Self::MaxEvents => "max_events".to_string(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

/// A running source: entries flow out of `next_entry`, `stop` cancels the
/// backend (kill the subprocess / close the socket), and `wait` resolves
/// the termination reason once the backend has fully wound down.
pub struct SourceHandle {
    entries: mpsc::Receiver<LogEntry>,
    stop: CancellationToken,
    done: JoinHandle<EndReason>,
}

impl SourceHandle {
    pub(crate) fn new(
        entries: mpsc::Receiver<LogEntry>,
        stop: CancellationToken,
        done: JoinHandle<EndReason>,
    ) -> Self {
        Self {
            entries,
            stop,
            done,
        }
    }

    /// Next canonical entry; `None` once the source has finished and the
    /// channel drained.
    pub async fn next_entry(&mut self) -> Option<LogEntry> {
        self.entries.recv().await
    }

    /// Request cancellation. Entries already in flight are still delivered.
    pub fn stop(&self) {
        self.stop.cancel();
    }

    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Await the backend's termination reason.
    pub async fn wait(self) -> EndReason {
        match self.done.await {
            Ok(reason) => reason,
            Err(err) => EndReason::Error(format!("source task failed: {err}")),
        }
    }
}
