//! The wire envelope and the sinks that consume it.
//!
//! Every canonical entry, whichever backend produced it, is wrapped in a
//! [`LogStreamEvent`] and pushed to a registered sink: the NDJSON exporter,
//! the pretty formatter, or the in-memory collector behind the TUI and the
//! automation tool.

pub mod collect;
pub mod protocol;
pub mod sink;

pub use collect::{CollectOptions, Collected, StopCause, StopSignal, collect_entries};
pub use protocol::{LogStreamEvent, SessionContext, now_rfc3339};
pub use sink::{EventSink, NdjsonSink, PrettySink};
