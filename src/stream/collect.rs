//! In-memory collection with caller-supplied stop conditions.
//!
//! The TUI and the automation tool consume the pipeline through this
//! collector: tail until `max_events` entries have arrived or `max_duration`
//! has elapsed, whichever fires first. Entries received before the stop are
//! kept; the stop only prevents further entries and cancels the source.

use crate::domain::LogEntry;
use crate::source::{EndReason, SourceHandle};
use std::sync::Arc;
use std::sync::OnceLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What tripped a caller-side stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopCause {
    MaxEvents,
    Timeout,
}

impl From<StopCause> for EndReason {
    fn from(cause: StopCause) -> Self {
        match cause {
            StopCause::MaxEvents => EndReason::MaxEvents,
            StopCause::Timeout => EndReason::Timeout,
        }
    }
}

/// Shared stop flag: the first trigger wins and later triggers are ignored,
/// so a `max_events` stop is never re-labelled by a racing `timeout`.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

#[derive(Debug, Default)]
struct StopInner {
    cause: OnceLock<StopCause>,
    token: CancellationToken,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a stop cause. Returns `true` only for the first caller.
    pub fn trigger(&self, cause: StopCause) -> bool {
        let first = self.inner.cause.set(cause).is_ok();
        self.inner.token.cancel();
        first
    }

    pub fn cause(&self) -> Option<StopCause> {
        self.inner.cause.get().copied()
    }

    pub async fn cancelled(&self) {
        self.inner.token.cancelled().await;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CollectOptions {
    pub max_events: Option<usize>,
    pub max_duration: Option<Duration>,
}

#[derive(Debug)]
pub struct Collected {
    pub entries: Vec<LogEntry>,
    pub end: EndReason,
}

/// Drain a source into memory until it finishes on its own or a stop
/// condition fires.
pub async fn collect_entries(mut handle: SourceHandle, options: CollectOptions) -> Collected {
    let stop = StopSignal::new();

    let timer = options.max_duration.map(|duration| {
        let stop = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            stop.trigger(StopCause::Timeout);
        })
    });

    let mut entries = Vec::new();
    loop {
        tokio::select! {
            entry = handle.next_entry() => match entry {
                Some(entry) => {
                    entries.push(entry);
                    if options.max_events.is_some_and(|max| entries.len() >= max) {
                        stop.trigger(StopCause::MaxEvents);
                        break;
                    }
                }
                None => break,
            },
            () = stop.cancelled() => break,
        }
    }

    handle.stop();
    let source_end = handle.wait().await;
    if let Some(timer) = timer {
        timer.abort();
    }

    let end = match stop.cause() {
        Some(cause) => cause.into(),
        None => source_end,
    };

    Collected { entries, end }
}
