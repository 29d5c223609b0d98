use serde::{Deserialize, Serialize};

/// Severity of a log entry, normalised across backends.
///
/// This is distinct from the tracing level used to configure the CLI's own
/// diagnostics. `LogLevel` is the semantic level parsed from application
/// log payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Normalise a textual level label. Unknown labels map to `Info`.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" | "warning" => Self::Warn,
            "error" | "fatal" | "panic" => Self::Error,
            _ => Self::Info,
        }
    }

    /// Map a pino-style numeric level (10=trace .. 60=fatal) onto the
    /// 4-value enum.
    pub fn from_pino(level: i64) -> Self {
        if level >= 50 {
            Self::Error
        } else if level >= 40 {
            Self::Warn
        } else if level >= 30 {
            Self::Info
        } else {
            Self::Debug
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
