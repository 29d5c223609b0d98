//! Normalizer for lines delivered by the Loki log index.
//!
//! Loki hands back label sets and `[timestamp_ns, line]` value pairs; lines
//! are already whole, so no grouping is needed. The nanosecond timestamp is
//! converted to RFC 3339 at millisecond precision; conversion failure drops
//! the timestamp rather than the entry.

use super::fields;
use crate::domain::{LogEntry, SourceKind};
use chrono::{DateTime, SecondsFormat};
use std::collections::BTreeMap;

/// Convert a decimal-nanosecond timestamp string to RFC 3339.
pub fn ns_to_rfc3339(ns: &str) -> Option<String> {
    let ns: i64 = ns.trim().parse().ok()?;
    let millis = ns / 1_000_000;
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Normalise one Loki line with its stream labels.
pub fn normalize_line(
    labels: &BTreeMap<String, String>,
    timestamp_ns: Option<&str>,
    raw: &str,
) -> LogEntry {
    let parsed = fields::parse_payload(raw);

    LogEntry {
        source: SourceKind::Loki,
        message: parsed.message,
        raw: raw.to_string(),
        stream: None,
        project: labels.get("project").cloned(),
        service: labels.get("service").cloned(),
        instance: None,
        labels: if labels.is_empty() {
            None
        } else {
            Some(labels.clone())
        },
        timestamp: timestamp_ns.and_then(ns_to_rfc3339),
        timestamp_ns: timestamp_ns.map(str::to_string),
        level: parsed.level,
        fields: parsed.fields,
    }
}
