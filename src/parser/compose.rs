//! Normalizer for multiplexed compose log lines.
//!
//! The container-log tool prefixes every line with the emitting container
//! and a `|` separator, e.g.
//!
//! ```text
//! myproj-api-2  | 2025-12-30T03:30:48.866Z {"level":"info","msg":"hello"}
//! ```
//!
//! The prefix carries the service name and the replica suffix of a scaled
//! service; with `--timestamps` the payload additionally starts with an
//! RFC 3339 timestamp. Everything after that is handed to
//! [`fields::parse_payload`].

use super::fields;
use super::grouper::GroupedUnit;
use crate::domain::{LogEntry, LogLevel, SourceKind, StreamKind};
use regex::Regex;
use std::sync::LazyLock;

static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z) ?").expect("valid regex")
});

static INSTANCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+)-(\d+)$").expect("valid regex"));

/// Split a multiplexed line at the first `|` into container label and
/// payload. Lines without a separator are all payload.
pub fn split_prefix(line: &str) -> (Option<&str>, &str) {
    match line.find('|') {
        Some(idx) => {
            let label = line[..idx].trim();
            // The log tool emits exactly one space after the separator.
            let payload = line[idx + 1..].strip_prefix(' ').unwrap_or(&line[idx + 1..]);
            if label.is_empty() {
                (None, payload)
            } else {
                (Some(label), payload)
            }
        }
        None => (None, line),
    }
}

/// Strip a leading RFC 3339 timestamp (and the single space following it)
/// from a payload.
pub fn strip_timestamp(payload: &str) -> (Option<String>, &str) {
    match TIMESTAMP_RE.captures(payload) {
        Some(caps) => {
            let whole = caps.get(0).expect("capture 0");
            let ts = caps.get(1).expect("capture 1").as_str().to_string();
            (Some(ts), &payload[whole.end()..])
        }
        None => (None, payload),
    }
}

/// Split a container label into service name and replica instance,
/// stripping the compose project prefix when one is configured.
/// `myproj-api-2` with project `myproj` yields `("api", Some("2"))`.
pub fn split_service_label(label: &str, project: Option<&str>) -> (String, Option<String>) {
    let mut name = label;
    if let Some(project) = project {
        if let Some(rest) = name.strip_prefix(project).and_then(|r| r.strip_prefix('-')) {
            if !rest.is_empty() {
                name = rest;
            }
        }
    }

    match INSTANCE_RE.captures(name) {
        Some(caps) => (
            caps.get(1).expect("capture 1").as_str().to_string(),
            Some(caps.get(2).expect("capture 2").as_str().to_string()),
        ),
        None => (name.to_string(), None),
    }
}

/// Normalise one already-degrouped compose line.
pub fn normalize_line(line: &str, stream: StreamKind, project: Option<&str>) -> LogEntry {
    let (label, payload) = split_prefix(line);
    let (timestamp, payload) = strip_timestamp(payload);
    build_entry(line.to_string(), label, timestamp, payload, stream, project)
}

/// Normalise a grouper output unit. A reassembled group is parsed as one
/// payload whose prefix metadata comes from its first raw line.
pub fn normalize_unit(unit: &GroupedUnit, stream: StreamKind, project: Option<&str>) -> LogEntry {
    match unit {
        GroupedUnit::Line(line) => normalize_line(line, stream, project),
        GroupedUnit::Group {
            raw_lines,
            payload_lines,
        } => {
            let first = raw_lines.first().map_or("", String::as_str);
            let (label, first_payload) = split_prefix(first);
            let (timestamp, _) = strip_timestamp(first_payload);
            let payload = payload_lines.join("\n");
            build_entry(
                raw_lines.join("\n"),
                label,
                timestamp,
                &payload,
                stream,
                project,
            )
        }
    }
}

fn build_entry(
    raw: String,
    label: Option<&str>,
    timestamp: Option<String>,
    payload: &str,
    stream: StreamKind,
    project: Option<&str>,
) -> LogEntry {
    let parsed = fields::parse_payload(payload);
    let (service, instance) = match label {
        Some(label) => {
            let (service, instance) = split_service_label(label, project);
            (Some(service), instance)
        }
        None => (None, None),
    };

    // stderr output is an error signal regardless of what the payload claims.
    let level = if stream == StreamKind::Stderr {
        Some(LogLevel::Error)
    } else {
        parsed.level
    };

    LogEntry {
        source: SourceKind::Compose,
        message: parsed.message,
        raw,
        stream: Some(stream),
        project: project.map(str::to_string),
        service,
        instance,
        labels: None,
        timestamp,
        timestamp_ns: None,
        level,
        fields: parsed.fields,
    }
}
