//! Payload-level normalization shared by both backends.
//!
//! Extracts level, message, and extra structured fields from one payload
//! string. Only a strict JSON object (trimmed payload starting with `{` and
//! ending with `}`) is parsed; everything else is plain text.

use crate::domain::LogLevel;
use serde_json::Value;
use std::collections::BTreeMap;

/// Keys consumed by level/message/timestamp resolution and therefore never
/// copied into `fields`.
const RESERVED_KEYS: [&str; 8] = [
    "level",
    "lvl",
    "severity",
    "msg",
    "message",
    "ts",
    "time",
    "timestamp",
];

const LEVEL_KEYS: [&str; 3] = ["level", "lvl", "severity"];

/// Result of payload normalization. `message` always holds something
/// printable; `level` and `fields` are present only when the payload was a
/// parsable JSON object.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadFields {
    pub level: Option<LogLevel>,
    pub message: String,
    pub fields: Option<BTreeMap<String, String>>,
}

impl PayloadFields {
    fn plain(payload: &str) -> Self {
        Self {
            level: None,
            message: payload.to_string(),
            fields: None,
        }
    }
}

/// Normalise one payload string. Never fails; an unparsable payload yields
/// a plain-text result carrying the payload as its message.
pub fn parse_payload(payload: &str) -> PayloadFields {
    let trimmed = payload.trim();
    if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
        return PayloadFields::plain(payload);
    }

    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(trimmed) else {
        return PayloadFields::plain(payload);
    };

    let level = LEVEL_KEYS.iter().find_map(|key| match obj.get(*key) {
        Some(Value::String(s)) => Some(LogLevel::from_label(s)),
        Some(Value::Number(n)) => n.as_i64().map(LogLevel::from_pino),
        _ => None,
    });

    let message = obj
        .get("msg")
        .and_then(Value::as_str)
        .or_else(|| obj.get("message").and_then(Value::as_str))
        .map_or_else(|| payload.to_string(), str::to_string);

    let mut fields = BTreeMap::new();
    for (key, value) in &obj {
        if RESERVED_KEYS.contains(&key.as_str()) {
            continue;
        }
        // Only scalar values survive; nested objects and arrays are dropped.
        let rendered = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => continue,
        };
        fields.insert(key.clone(), rendered);
    }

    PayloadFields {
        level,
        message,
        fields: if fields.is_empty() {
            None
        } else {
            Some(fields)
        },
    }
}
