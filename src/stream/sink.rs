//! Event sinks: NDJSON export and human-readable formatting.

use super::protocol::LogStreamEvent;
use crate::domain::{LogEntry, LogLevel};
use std::io::Write;

/// Consumer of a session's event stream. Backend choice is invisible here;
/// sinks only ever see the envelope.
pub trait EventSink {
    fn emit(&mut self, event: &LogStreamEvent) -> std::io::Result<()>;
}

/// Writes every event as one JSON document per line.
pub struct NdjsonSink<W: Write> {
    writer: W,
}

impl<W: Write> NdjsonSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }
}

impl<W: Write> EventSink for NdjsonSink<W> {
    fn emit(&mut self, event: &LogStreamEvent) -> std::io::Result<()> {
        let line = event.to_ndjson()?;
        writeln!(self.writer, "{line}")?;
        self.writer.flush()
    }
}

/// Human-readable label for an entry: `<project>/<service>[#<instance>]`,
/// degrading to whatever parts are known.
pub fn entry_label(entry: &LogEntry) -> String {
    match (&entry.project, &entry.service) {
        (Some(project), Some(service)) => match &entry.instance {
            Some(instance) => format!("{project}/{service}#{instance}"),
            None => format!("{project}/{service}"),
        },
        (None, Some(service)) => match &entry.instance {
            Some(instance) => format!("{service}#{instance}"),
            None => service.clone(),
        },
        _ => entry.source.to_string(),
    }
}

/// Default CLI output: one formatted line per `log` event, everything else
/// suppressed (control events belong to the JSON wire; session-level
/// failures reach stderr through the diagnostic log).
pub struct PrettySink<W: Write> {
    writer: W,
}

impl<W: Write> PrettySink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    fn format_entry(ts: &str, entry: &LogEntry) -> String {
        // An entry with no inferable level renders as info.
        let level = entry.level.unwrap_or(LogLevel::Info);
        let mut line = format!(
            "{ts} {level:>5} {label}  {message}",
            level = level.as_str(),
            label = entry_label(entry),
            message = entry.message,
        );
        if let Some(fields) = &entry.fields {
            for (key, value) in fields {
                line.push_str(&format!(" {key}={value}"));
            }
        }
        line
    }
}

impl<W: Write> EventSink for PrettySink<W> {
    fn emit(&mut self, event: &LogStreamEvent) -> std::io::Result<()> {
        if let LogStreamEvent::Log { ts, entry, .. } = event {
            writeln!(self.writer, "{}", Self::format_entry(ts, entry))?;
            self.writer.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SourceKind;
    use crate::stream::protocol::SessionContext;

    fn context() -> SessionContext {
        SessionContext {
            project: None,
            backend: "compose".to_string(),
            branch: None,
        }
    }

    fn entry() -> LogEntry {
        let mut entry = LogEntry::plain(SourceKind::Compose, "raw");
        entry.project = Some("myproj".to_string());
        entry.service = Some("api".to_string());
        entry.instance = Some("2".to_string());
        entry.message = "started".to_string();
        entry.level = Some(LogLevel::Warn);
        entry.timestamp = Some("2025-12-30T03:30:48.866Z".to_string());
        entry
    }

    #[test]
    fn test_label_rewrite() {
        assert_eq!(entry_label(&entry()), "myproj/api#2");

        let mut no_instance = entry();
        no_instance.instance = None;
        assert_eq!(entry_label(&no_instance), "myproj/api");

        let bare = LogEntry::plain(SourceKind::Loki, "x");
        assert_eq!(entry_label(&bare), "loki");
    }

    #[test]
    fn test_ndjson_sink_writes_one_line_per_event() {
        let mut buf = Vec::new();
        {
            let mut sink = NdjsonSink::new(&mut buf);
            sink.emit(&LogStreamEvent::start(&context(), &[], true, None, None))
                .unwrap();
            sink.emit(&LogStreamEvent::log(&context(), entry())).unwrap();
            sink.emit(&LogStreamEvent::end(&context(), Some("eof".to_string())))
                .unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        for line in lines {
            serde_json::from_str::<serde_json::Value>(line).unwrap();
        }
    }

    #[test]
    fn test_pretty_sink_renders_only_log_events() {
        let mut buf = Vec::new();
        {
            let mut sink = PrettySink::new(&mut buf);
            sink.emit(&LogStreamEvent::start(&context(), &[], true, None, None))
                .unwrap();
            sink.emit(&LogStreamEvent::log(&context(), entry())).unwrap();
            sink.emit(&LogStreamEvent::end(&context(), None)).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("myproj/api#2"));
        assert!(lines[0].contains("warn"));
        assert!(lines[0].contains("started"));
    }

    #[test]
    fn test_pretty_sink_defaults_missing_level_to_info() {
        let mut buf = Vec::new();
        let mut plain = LogEntry::plain(SourceKind::Compose, "text");
        plain.service = Some("api".to_string());
        {
            let mut sink = PrettySink::new(&mut buf);
            sink.emit(&LogStreamEvent::log(&context(), plain)).unwrap();
        }
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("info"));
    }
}
