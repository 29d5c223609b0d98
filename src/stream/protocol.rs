//! The log stream event envelope.
//!
//! One session is one `start`, zero or more `log`/`heartbeat`, and exactly
//! one `end` (an `error` precedes `end` on fatal failure). Each event
//! serializes to exactly one NDJSON line; the session context is repeated on
//! every event so consumers can process any line statelessly.
//!
//! `heartbeat` is a reserved extension point for long idle tails; no
//! backend currently emits it.

use crate::domain::LogEntry;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Wall-clock timestamp in the envelope's RFC 3339 format.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Session identity repeated on every event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LogStreamEvent {
    Start {
        ts: String,
        #[serde(flatten)]
        context: SessionContext,
        services: Vec<String>,
        follow: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        since: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        until: Option<String>,
    },
    Log {
        ts: String,
        #[serde(flatten)]
        context: SessionContext,
        entry: LogEntry,
    },
    Heartbeat {
        ts: String,
        #[serde(flatten)]
        context: SessionContext,
    },
    Error {
        ts: String,
        #[serde(flatten)]
        context: SessionContext,
        message: String,
    },
    End {
        ts: String,
        #[serde(flatten)]
        context: SessionContext,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl LogStreamEvent {
    pub fn start(
        context: &SessionContext,
        services: &[String],
        follow: bool,
        since: Option<&str>,
        until: Option<&str>,
    ) -> Self {
        Self::Start {
            ts: now_rfc3339(),
            context: context.clone(),
            services: services.to_vec(),
            follow,
            since: since.map(str::to_string),
            until: until.map(str::to_string),
        }
    }

    /// Wrap a canonical entry. The event timestamp mirrors the entry's own
    /// timestamp when one was derived, so replay ordering reflects source
    /// time rather than arrival time.
    pub fn log(context: &SessionContext, entry: LogEntry) -> Self {
        let ts = entry.timestamp.clone().unwrap_or_else(now_rfc3339);
        Self::Log {
            ts,
            context: context.clone(),
            entry,
        }
    }

    pub fn heartbeat(context: &SessionContext) -> Self {
        Self::Heartbeat {
            ts: now_rfc3339(),
            context: context.clone(),
        }
    }

    pub fn error(context: &SessionContext, message: impl Into<String>) -> Self {
        Self::Error {
            ts: now_rfc3339(),
            context: context.clone(),
            message: message.into(),
        }
    }

    pub fn end(context: &SessionContext, reason: Option<String>) -> Self {
        Self::End {
            ts: now_rfc3339(),
            context: context.clone(),
            reason,
        }
    }

    pub fn context(&self) -> &SessionContext {
        match self {
            Self::Start { context, .. }
            | Self::Log { context, .. }
            | Self::Heartbeat { context, .. }
            | Self::Error { context, .. }
            | Self::End { context, .. } => context,
        }
    }

    /// Serialize as one NDJSON line (without the trailing newline).
    /// `serde_json` never emits raw newlines inside a document, so the
    /// one-event-per-line contract holds by construction.
    pub fn to_ndjson(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LogEntry, SourceKind};

    fn context() -> SessionContext {
        SessionContext {
            project: Some("myproj".to_string()),
            backend: "compose".to_string(),
            branch: Some("main".to_string()),
        }
    }

    #[test]
    fn test_events_tag_their_type() {
        let event = LogStreamEvent::start(&context(), &["api".to_string()], true, None, None);
        let json: serde_json::Value = serde_json::from_str(&event.to_ndjson().unwrap()).unwrap();
        assert_eq!(json["type"], "start");
        assert_eq!(json["backend"], "compose");
        assert_eq!(json["project"], "myproj");
        assert_eq!(json["services"][0], "api");
        assert_eq!(json["follow"], true);
    }

    #[test]
    fn test_log_event_prefers_entry_timestamp() {
        let mut entry = LogEntry::plain(SourceKind::Compose, "hello");
        entry.timestamp = Some("2025-12-30T03:30:48.866Z".to_string());
        let event = LogStreamEvent::log(&context(), entry);

        match &event {
            LogStreamEvent::Log { ts, .. } => assert_eq!(ts, "2025-12-30T03:30:48.866Z"),
            _ => panic!("expected log event"),
        }
    }

    #[test]
    fn test_log_event_falls_back_to_wall_clock() {
        let entry = LogEntry::plain(SourceKind::Compose, "hello");
        let event = LogStreamEvent::log(&context(), entry);
        match &event {
            LogStreamEvent::Log { ts, .. } => assert!(!ts.is_empty()),
            _ => panic!("expected log event"),
        }
    }

    #[test]
    fn test_context_repeated_on_every_variant() {
        let ctx = context();
        let events = [
            LogStreamEvent::start(&ctx, &[], false, None, None),
            LogStreamEvent::log(&ctx, LogEntry::plain(SourceKind::Loki, "x")),
            LogStreamEvent::heartbeat(&ctx),
            LogStreamEvent::error(&ctx, "boom"),
            LogStreamEvent::end(&ctx, Some("eof".to_string())),
        ];
        for event in &events {
            let json: serde_json::Value =
                serde_json::from_str(&event.to_ndjson().unwrap()).unwrap();
            assert_eq!(json["backend"], "compose", "{event:?}");
            assert_eq!(json["project"], "myproj");
            assert_eq!(json["branch"], "main");
        }
    }

    #[test]
    fn test_event_is_single_line() {
        let event = LogStreamEvent::log(
            &context(),
            LogEntry::plain(SourceKind::Compose, "line one\nline two"),
        );
        let ndjson = event.to_ndjson().unwrap();
        assert!(!ndjson.contains('\n'));
    }

    #[test]
    fn test_round_trip() {
        let event = LogStreamEvent::end(&context(), Some("exit:2".to_string()));
        let parsed: LogStreamEvent =
            serde_json::from_str(&event.to_ndjson().unwrap()).unwrap();
        assert_eq!(parsed, event);
    }
}
