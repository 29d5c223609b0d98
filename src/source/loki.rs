//! Loki-driven log source: bounded range queries and live WebSocket tails.
//!
//! Snapshot mode issues one `query_range` call (`direction=BACKWARD`) and
//! re-orders the flattened result chronologically before emission; that
//! ordering is a contract consumers rely on. Tail mode holds a WebSocket
//! open on the `tail` endpoint until cancelled or broken. Malformed tail
//! messages are skipped silently; connectivity failures are the only fatal
//! outcome.

use super::{EndReason, SourceHandle};
use crate::domain::LogEntry;
use crate::parser::loki as loki_parser;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};
use url::Url;

const ENTRY_CHANNEL_CAPACITY: usize = 256;

/// Default snapshot window when no `--since` is given: 15 minutes back
/// from the window end.
pub const DEFAULT_SNAPSHOT_WINDOW: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
pub struct LokiOptions {
    pub base_url: Url,
    /// LogQL selector, either built from project/services or supplied raw.
    pub query: String,
    /// Maximum entries: `limit` on the range query, `limit` on the tail.
    pub limit: u32,
    /// Window start in nanoseconds; defaults to `end - 15m`.
    pub start_ns: Option<i64>,
    /// Window end in nanoseconds; defaults to now. Ignored by tail mode.
    pub end_ns: Option<i64>,
}

/// Wire shape of one Loki stream: a label set plus `[ts_ns, line]` pairs.
#[derive(Debug, Deserialize)]
struct WireStream {
    #[serde(default)]
    stream: BTreeMap<String, String>,
    #[serde(default)]
    values: Vec<(String, String)>,
}

#[derive(Debug, Deserialize)]
struct RangeResponse {
    data: RangeData,
}

#[derive(Debug, Deserialize)]
struct RangeData {
    #[serde(default)]
    result: Vec<WireStream>,
}

#[derive(Debug, Deserialize)]
struct TailMessage {
    #[serde(default)]
    streams: Vec<WireStream>,
}

pub struct LokiLogSource {
    client: reqwest::Client,
    options: LokiOptions,
}

impl LokiLogSource {
    pub fn new(options: LokiOptions) -> Self {
        Self {
            client: reqwest::Client::new(),
            options,
        }
    }

    pub fn with_client(client: reqwest::Client, options: LokiOptions) -> Self {
        Self { client, options }
    }

    /// Bounded historical query. Entries arrive oldest-first regardless of
    /// Loki's newest-first delivery.
    pub fn snapshot(self) -> SourceHandle {
        let (tx, rx) = mpsc::channel(ENTRY_CHANNEL_CAPACITY);
        let stop = CancellationToken::new();
        let task_stop = stop.clone();
        let done = tokio::spawn(run_snapshot(self.client, self.options, tx, task_stop));
        SourceHandle::new(rx, stop, done)
    }

    /// Unbounded live tail over the WebSocket endpoint.
    pub fn tail(self) -> SourceHandle {
        let (tx, rx) = mpsc::channel(ENTRY_CHANNEL_CAPACITY);
        let stop = CancellationToken::new();
        let task_stop = stop.clone();
        let done = tokio::spawn(run_tail(self.options, tx, task_stop));
        SourceHandle::new(rx, stop, done)
    }
}

fn now_ns() -> i64 {
    chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

/// Flatten the per-stream results and order them by source timestamp.
/// Loki returns newest-first within each stream; a plain reverse is not
/// enough across several streams, so this sorts (stably) on the raw
/// nanosecond value.
fn flatten_chronological(streams: Vec<WireStream>) -> Vec<LogEntry> {
    let mut keyed: Vec<(i128, LogEntry)> = Vec::new();
    for wire in &streams {
        for (ts_ns, line) in &wire.values {
            let key = ts_ns.parse::<i128>().unwrap_or(i128::MAX);
            keyed.push((
                key,
                loki_parser::normalize_line(&wire.stream, Some(ts_ns), line),
            ));
        }
    }
    keyed.sort_by_key(|(key, _)| *key);
    keyed.into_iter().map(|(_, entry)| entry).collect()
}

async fn run_snapshot(
    client: reqwest::Client,
    options: LokiOptions,
    tx: mpsc::Sender<LogEntry>,
    stop: CancellationToken,
) -> EndReason {
    let end_ns = options.end_ns.unwrap_or_else(now_ns);
    let start_ns = options
        .start_ns
        .unwrap_or_else(|| end_ns - DEFAULT_SNAPSHOT_WINDOW.as_nanos() as i64);

    let url = match options.base_url.join("loki/api/v1/query_range") {
        Ok(url) => url,
        Err(err) => return EndReason::Error(format!("invalid loki endpoint: {err}")),
    };

    let response = match client
        .get(url)
        .query(&[
            ("query", options.query.as_str()),
            ("direction", "BACKWARD"),
            ("limit", &options.limit.to_string()),
            ("start", &start_ns.to_string()),
            ("end", &end_ns.to_string()),
        ])
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => return EndReason::Error(format!("loki range query failed: {err}")),
    };

    let status = response.status();
    if !status.is_success() {
        return EndReason::Error(format!("loki range query returned status {status}"));
    }

    let body: RangeResponse = match response.json().await {
        Ok(body) => body,
        Err(err) => return EndReason::Error(format!("invalid loki response body: {err}")),
    };

    for entry in flatten_chronological(body.data.result) {
        tokio::select! {
            sent = tx.send(entry) => {
                if sent.is_err() {
                    break;
                }
            }
            () = stop.cancelled() => break,
        }
    }

    EndReason::Eof
}

/// Rewrite the HTTP base URL into the tail WebSocket endpoint.
fn tail_url(options: &LokiOptions) -> Result<Url, String> {
    let mut url = options
        .base_url
        .join("loki/api/v1/tail")
        .map_err(|err| format!("invalid loki endpoint: {err}"))?;

    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    url.set_scheme(scheme)
        .map_err(|()| format!("cannot derive websocket scheme for {url}"))?;

    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("query", &options.query);
        pairs.append_pair("limit", &options.limit.to_string());
        if let Some(start_ns) = options.start_ns {
            pairs.append_pair("start", &start_ns.to_string());
        }
    }
    Ok(url)
}

async fn run_tail(
    options: LokiOptions,
    tx: mpsc::Sender<LogEntry>,
    stop: CancellationToken,
) -> EndReason {
    let url = match tail_url(&options) {
        Ok(url) => url,
        Err(message) => return EndReason::Error(message),
    };

    let (mut socket, _) = match connect_async(url.as_str()).await {
        Ok(connected) => connected,
        Err(err) => return EndReason::Error(format!("loki tail connect failed: {err}")),
    };
    debug!(%url, "loki tail connected");

    loop {
        tokio::select! {
            () = stop.cancelled() => {
                let _ = socket.close(None).await;
                return EndReason::Closed;
            }
            message = socket.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    // Malformed frames are dropped, never fatal.
                    let Ok(parsed) = serde_json::from_str::<TailMessage>(text.as_str()) else {
                        trace!("skipping malformed tail message");
                        continue;
                    };
                    for wire in &parsed.streams {
                        for (ts_ns, line) in &wire.values {
                            let entry =
                                loki_parser::normalize_line(&wire.stream, Some(ts_ns), line);
                            if tx.send(entry).await.is_err() {
                                let _ = socket.close(None).await;
                                return EndReason::Closed;
                            }
                        }
                    }
                }
                Some(Ok(Message::Ping(payload))) => {
                    let _ = socket.send(Message::Pong(payload)).await;
                }
                Some(Ok(Message::Close(_))) | None => return EndReason::Closed,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    return EndReason::Error(format!("loki tail socket failed: {err}"));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(base: &str) -> LokiOptions {
        LokiOptions {
            base_url: Url::parse(base).unwrap(),
            query: r#"{project="p"}"#.to_string(),
            limit: 100,
            start_ns: None,
            end_ns: None,
        }
    }

    #[test]
    fn test_tail_url_swaps_scheme_and_carries_query() {
        let mut opts = options("http://127.0.0.1:3100");
        opts.start_ns = Some(42);
        let url = tail_url(&opts).unwrap();

        assert_eq!(url.scheme(), "ws");
        assert_eq!(url.path(), "/loki/api/v1/tail");
        let query = url.query().unwrap();
        assert!(query.contains("limit=100"));
        assert!(query.contains("start=42"));
    }

    #[test]
    fn test_tail_url_https_becomes_wss() {
        let url = tail_url(&options("https://loki.example.com")).unwrap();
        assert_eq!(url.scheme(), "wss");
    }

    #[test]
    fn test_flatten_reorders_newest_first_delivery() {
        let streams = vec![
            WireStream {
                stream: BTreeMap::new(),
                values: vec![
                    ("3000".to_string(), "third".to_string()),
                    ("1000".to_string(), "first".to_string()),
                ],
            },
            WireStream {
                stream: BTreeMap::new(),
                values: vec![("2000".to_string(), "second".to_string())],
            },
        ];

        let entries = flatten_chronological(streams);
        let messages: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_flatten_is_nondecreasing_for_any_delivery_order() {
        let streams = vec![WireStream {
            stream: BTreeMap::new(),
            values: vec![
                ("5".to_string(), "e".to_string()),
                ("1".to_string(), "a".to_string()),
                ("4".to_string(), "d".to_string()),
                ("2".to_string(), "b".to_string()),
                ("2".to_string(), "b2".to_string()),
            ],
        }];

        let entries = flatten_chronological(streams);
        let keys: Vec<i128> = entries
            .iter()
            .map(|e| e.timestamp_ns.as_deref().unwrap().parse().unwrap())
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }
}
