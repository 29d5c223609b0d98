use super::log_level::LogLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which backend produced a log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Compose,
    Loki,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Compose => f.write_str("compose"),
            Self::Loki => f.write_str("loki"),
        }
    }
}

/// Which subprocess pipe a compose line arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// A fully normalised log entry, the canonical representation shared by
/// every consumer of the pipeline.
///
/// `message` and `raw` are always present. Every other field is derived
/// best-effort from the transport line and may be absent without that being
/// an error. Field and label maps are `BTreeMap` so serialized output is
/// deterministically sorted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub source: SourceKind,
    /// Best-effort human message (decoded from the payload, or the raw text).
    pub message: String,
    /// The original untouched transport line, kept for audit and fallback
    /// search.
    pub raw: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<StreamKind>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    /// Numeric replica suffix of a scaled compose service (container `-2`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,

    /// Full label set from the Loki stream, when that backend produced the
    /// entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<BTreeMap<String, String>>,

    /// RFC 3339 timestamp, when one could be derived.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Decimal-nanosecond timestamp as delivered by Loki, pre-conversion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_ns: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,

    /// Extra structured keys extracted from the payload, stringified and
    /// sorted for stable rendering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, String>>,
}

impl LogEntry {
    /// Minimal entry carrying only the mandatory fields.
    pub fn plain(source: SourceKind, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        Self {
            source,
            message: raw.clone(),
            raw,
            stream: None,
            project: None,
            service: None,
            instance: None,
            labels: None,
            timestamp: None,
            timestamp_ns: None,
            level: None,
            fields: None,
        }
    }
}
