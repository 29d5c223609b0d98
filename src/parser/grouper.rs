//! Reassembly of structured log records split across transport lines.
//!
//! Container log multiplexers emit one transport line per newline in the
//! underlying process output, so a pretty-printed JSON record arrives as
//! many lines. This state machine buffers consecutive fragments per service
//! and re-joins them before normalization, bounded so a producer that never
//! terminates its JSON cannot stall the stream or grow memory without limit.

use super::compose;
use std::collections::HashMap;

/// Flush once a buffer holds this many lines.
pub const MAX_GROUP_LINES: usize = 200;
/// Flush once a buffer holds this many characters of raw input.
pub const MAX_GROUP_CHARS: usize = 64_000;

/// Output unit of the grouper: either a line passed through untouched, or a
/// reassembled group carrying both the original lines and the
/// prefix-stripped payload fragments.
#[derive(Debug, Clone, PartialEq)]
pub enum GroupedUnit {
    Line(String),
    Group {
        raw_lines: Vec<String>,
        payload_lines: Vec<String>,
    },
}

/// Buffered fragments for one service, per the multiplexed prefix.
#[derive(Debug)]
struct GroupBuffer {
    raw_lines: Vec<String>,
    payload_lines: Vec<String>,
    size: usize,
}

impl GroupBuffer {
    fn seed(raw: &str, payload: &str) -> Self {
        Self {
            raw_lines: vec![raw.to_string()],
            payload_lines: vec![payload.to_string()],
            size: raw.chars().count(),
        }
    }

    fn append(&mut self, raw: &str, payload: &str) {
        self.size += raw.chars().count();
        self.raw_lines.push(raw.to_string());
        self.payload_lines.push(payload.to_string());
    }

    fn over_bounds(&self) -> bool {
        self.raw_lines.len() >= MAX_GROUP_LINES || self.size >= MAX_GROUP_CHARS
    }

    fn joined_payload_is_json(&self) -> bool {
        is_complete_json(&self.payload_lines.join("\n"))
    }

    fn into_unit(self) -> GroupedUnit {
        GroupedUnit::Group {
            raw_lines: self.raw_lines,
            payload_lines: self.payload_lines,
        }
    }
}

/// Does a trimmed payload look like the opening of a JSON object or array?
pub fn looks_like_json_start(payload: &str) -> bool {
    let trimmed = payload.trim();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

/// Does a trimmed payload look like the continuation of a JSON body already
/// being buffered? Empty lines count: pretty-printers emit them.
pub fn looks_like_continuation(payload: &str) -> bool {
    let trimmed = payload.trim();
    trimmed.is_empty() || matches!(trimmed.as_bytes()[0], b'{' | b'}' | b'[' | b']' | b'"' | b',')
}

/// Is the payload a complete JSON document on its own?
pub fn is_complete_json(payload: &str) -> bool {
    serde_json::from_str::<serde_json::Value>(payload.trim()).is_ok()
}

/// Per-source-key buffering state machine in front of the compose
/// normalizer. At most one buffer is open per service at any time.
#[derive(Debug, Default)]
pub struct LogGrouper {
    buffers: HashMap<String, GroupBuffer>,
}

impl LogGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw transport line; returns the units ready for
    /// normalization (possibly none while a group is accumulating).
    pub fn push(&mut self, line: &str) -> Vec<GroupedUnit> {
        let (label, payload) = compose::split_prefix(line);
        let Some(label) = label else {
            // Not the multiplexed format; never buffer such lines.
            return vec![GroupedUnit::Line(line.to_string())];
        };
        let (_, payload) = compose::strip_timestamp(payload);

        let mut out = Vec::new();

        if self.buffers.contains_key(label) {
            if looks_like_continuation(payload) {
                let buffer = self.buffers.get_mut(label).expect("open buffer");
                buffer.append(line, payload);
                let complete = buffer.over_bounds() || buffer.joined_payload_is_json();
                if complete {
                    let buffer = self.buffers.remove(label).expect("open buffer");
                    out.push(buffer.into_unit());
                }
                return out;
            }
            // The new line breaks the group; flush what we have and decide
            // afresh for the line itself.
            let buffer = self.buffers.remove(label).expect("open buffer");
            out.push(buffer.into_unit());
        }

        if looks_like_json_start(payload) && !is_complete_json(payload) {
            self.buffers
                .insert(label.to_string(), GroupBuffer::seed(line, payload));
        } else {
            out.push(GroupedUnit::Line(line.to_string()));
        }
        out
    }

    /// Flush every open buffer. Called at stream end so no record is ever
    /// dropped.
    pub fn finish(&mut self) -> Vec<GroupedUnit> {
        let mut keys: Vec<String> = self.buffers.keys().cloned().collect();
        keys.sort();
        keys.into_iter()
            .filter_map(|key| self.buffers.remove(&key))
            .map(GroupBuffer::into_unit)
            .collect()
    }

    pub fn open_buffers(&self) -> usize {
        self.buffers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_of(unit: &GroupedUnit) -> String {
        match unit {
            GroupedUnit::Line(line) => line.clone(),
            GroupedUnit::Group { payload_lines, .. } => payload_lines.join("\n"),
        }
    }

    #[test]
    fn test_plain_lines_pass_through() {
        let mut grouper = LogGrouper::new();
        let out = grouper.push("api-1  | plain text");
        assert_eq!(out, vec![GroupedUnit::Line("api-1  | plain text".into())]);
        assert_eq!(grouper.open_buffers(), 0);
    }

    #[test]
    fn test_unprefixed_lines_are_never_buffered() {
        let mut grouper = LogGrouper::new();
        let out = grouper.push("{");
        assert_eq!(out, vec![GroupedUnit::Line("{".into())]);
    }

    #[test]
    fn test_complete_json_on_one_line_passes_through() {
        let mut grouper = LogGrouper::new();
        let out = grouper.push(r#"api-1  | {"msg":"done"}"#);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], GroupedUnit::Line(_)));
        assert_eq!(grouper.open_buffers(), 0);
    }

    #[test]
    fn test_split_json_is_reassembled_losslessly() {
        let mut grouper = LogGrouper::new();
        assert!(grouper.push("api-1  | {").is_empty());
        assert!(grouper.push(r#"api-1  |   "level": "info","#).is_empty());
        assert!(grouper.push(r#"api-1  |   "msg": "hello""#).is_empty());
        let out = grouper.push("api-1  | }");

        assert_eq!(out.len(), 1);
        let joined = payload_of(&out[0]);
        let direct: serde_json::Value =
            serde_json::from_str(r#"{"level":"info","msg":"hello"}"#).unwrap();
        let reassembled: serde_json::Value = serde_json::from_str(&joined).unwrap();
        assert_eq!(direct, reassembled);
        assert_eq!(grouper.open_buffers(), 0);
    }

    #[test]
    fn test_buffers_are_keyed_per_service() {
        let mut grouper = LogGrouper::new();
        assert!(grouper.push("api-1  | {").is_empty());
        assert!(grouper.push("worker-1  | [").is_empty());
        assert_eq!(grouper.open_buffers(), 2);

        // api closing does not disturb worker's buffer
        let out = grouper.push(r#"api-1  | "x": 1}"#);
        assert_eq!(out.len(), 1);
        assert_eq!(grouper.open_buffers(), 1);
    }

    #[test]
    fn test_non_continuation_flushes_and_reevaluates() {
        let mut grouper = LogGrouper::new();
        assert!(grouper.push("api-1  | {").is_empty());
        let out = grouper.push("api-1  | plain interruption");

        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], GroupedUnit::Group { .. }));
        assert_eq!(
            out[1],
            GroupedUnit::Line("api-1  | plain interruption".into())
        );
    }

    #[test]
    fn test_flushed_buffer_can_be_replaced_in_one_push() {
        let mut grouper = LogGrouper::new();
        assert!(grouper.push("api-1  | {").is_empty());
        // A second bare `{` reads as a continuation and stays buffered, but a
        // non-continuation JSON start elsewhere replaces the buffer.
        let out = grouper.push("api-1  | done");
        assert_eq!(out.len(), 2);
        assert!(grouper.push("api-1  | [").is_empty());
        assert_eq!(grouper.open_buffers(), 1);
    }

    #[test]
    fn test_line_bound_forces_flush() {
        let mut grouper = LogGrouper::new();
        assert!(grouper.push("api-1  | {").is_empty());
        let mut flushed = None;
        // Never-closing JSON: continuation lines that never complete.
        for i in 0..MAX_GROUP_LINES {
            let out = grouper.push(&format!(r#"api-1  |   "k{i}": "v","#));
            if !out.is_empty() {
                flushed = Some((i, out));
                break;
            }
        }
        let (at, out) = flushed.expect("bound must force a flush");
        assert!(at < MAX_GROUP_LINES, "flushed before the line cap");
        match &out[0] {
            GroupedUnit::Group { raw_lines, .. } => {
                assert!(raw_lines.len() <= MAX_GROUP_LINES);
            }
            GroupedUnit::Line(_) => panic!("expected a group"),
        }
        assert_eq!(grouper.open_buffers(), 0);
    }

    #[test]
    fn test_char_bound_forces_flush() {
        let mut grouper = LogGrouper::new();
        assert!(grouper.push("api-1  | {").is_empty());
        let big = format!(r#"api-1  |   "k": "{}","#, "x".repeat(70_000));
        let out = grouper.push(&big);
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], GroupedUnit::Group { .. }));
        assert_eq!(grouper.open_buffers(), 0);
    }

    #[test]
    fn test_finish_flushes_open_buffers() {
        let mut grouper = LogGrouper::new();
        assert!(grouper.push("api-1  | {").is_empty());
        assert!(grouper.push(r#"api-1  |   "unterminated": true"#).is_empty());

        let out = grouper.finish();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], GroupedUnit::Group { .. }));
        assert_eq!(grouper.open_buffers(), 0);
    }

    #[test]
    fn test_empty_continuation_lines_are_buffered() {
        let mut grouper = LogGrouper::new();
        assert!(grouper.push("api-1  | [").is_empty());
        assert!(grouper.push("api-1  | ").is_empty());
        let out = grouper.push("api-1  | ]");
        assert_eq!(out.len(), 1);
        assert!(is_complete_json(&payload_of(&out[0])));
    }
}
