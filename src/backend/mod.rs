//! Backend choice: which of the two log sources a session uses.

pub mod select;
pub mod selector;

pub use select::{probe_loki_ready, resolve_should_try_loki, resolve_use_loki, ready_probe_timeout};
pub use selector::build_selector;

use serde::{Deserialize, Serialize};

/// A log backend, as named in configuration and session context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Compose,
    Loki,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compose => "compose",
            Self::Loki => "loki",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
