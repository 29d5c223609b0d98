pub mod log_entry;
pub mod log_level;

pub use log_entry::{LogEntry, SourceKind, StreamKind};
pub use log_level::LogLevel;
