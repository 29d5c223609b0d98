//! One log session: backend resolution, source lifecycle, event pump.
//!
//! A session emits exactly one `start`, wraps every canonical entry as a
//! `log` event, and finishes with exactly one `end` (preceded by an `error`
//! event when the backend failed). Backend choice is resolved up front from
//! flags, configured defaults, and a live readiness probe.

use super::config::{Settings, resolve_time_bound};
use crate::backend::{
    BackendKind, build_selector, probe_loki_ready, ready_probe_timeout, resolve_should_try_loki,
    resolve_use_loki,
};
use crate::source::{
    ComposeLogSource, ComposeOptions, EndReason, LokiLogSource, LokiOptions, SourceHandle,
};
use crate::stream::{EventSink, LogStreamEvent, NdjsonSink, PrettySink, SessionContext};
use tracing::{debug, error};

/// Run one session to completion. Returns the process exit code: 0 for a
/// clean end, 1 when the session died of a connectivity failure.
pub async fn run_session(settings: Settings) -> i32 {
    let now_ns = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX);
    let start_ns = match &settings.since {
        Some(value) => match resolve_time_bound("--since", value, now_ns) {
            Ok(ns) => Some(ns),
            Err(err) => {
                error!("{err}");
                return 1;
            }
        },
        None => None,
    };
    let end_ns = match &settings.until {
        Some(value) => match resolve_time_bound("--until", value, now_ns) {
            Ok(ns) => Some(ns),
            Err(err) => {
                error!("{err}");
                return 1;
            }
        },
        None => None,
    };

    let backend = resolve_backend(&settings).await;
    debug!(backend = %backend, follow = settings.follow, "backend resolved");

    let context = SessionContext {
        project: settings.project.clone(),
        backend: backend.as_str().to_string(),
        branch: settings.branch.clone(),
    };

    let mut sink: Box<dyn EventSink> = if settings.json {
        Box::new(NdjsonSink::new(std::io::stdout()))
    } else {
        Box::new(PrettySink::new(std::io::stdout()))
    };

    let _ = sink.emit(&LogStreamEvent::start(
        &context,
        &settings.services,
        settings.follow,
        settings.since.as_deref(),
        settings.until.as_deref(),
    ));

    let handle = match open_source(&settings, backend, start_ns, end_ns) {
        Ok(handle) => handle,
        Err(message) => {
            return fail_session(sink.as_mut(), &context, &message);
        }
    };

    // SIGINT is a clean cancellation: stop the source, then let the normal
    // wind-down emit the end event.
    let stop = handle.stop_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("received SIGINT, stopping log session");
            stop.cancel();
        }
    });

    let code = pump(handle, sink.as_mut(), &context).await;
    debug!(code, "log session finished");
    code
}

async fn resolve_backend(settings: &Settings) -> BackendKind {
    let should_try = resolve_should_try_loki(
        settings.force_compose,
        settings.wants_loki,
        settings.follow,
        settings.follow_backend,
        settings.snapshot_backend,
    );

    // The probe only matters when falling back is still possible; an
    // explicit --loki is honored without asking.
    let reachable = if should_try && !settings.wants_loki {
        let client = reqwest::Client::new();
        probe_loki_ready(&client, &settings.loki_url, ready_probe_timeout()).await
    } else {
        false
    };

    if resolve_use_loki(
        settings.force_compose,
        settings.wants_loki,
        should_try,
        reachable,
    ) {
        BackendKind::Loki
    } else {
        BackendKind::Compose
    }
}

fn open_source(
    settings: &Settings,
    backend: BackendKind,
    start_ns: Option<i64>,
    end_ns: Option<i64>,
) -> Result<SourceHandle, String> {
    match backend {
        BackendKind::Loki => {
            let query = match &settings.query {
                Some(query) => query.clone(),
                None => {
                    if settings.project.is_none() && settings.services.is_empty() {
                        return Err(
                            "loki backend needs a project, services, or an explicit --query"
                                .to_string(),
                        );
                    }
                    build_selector(settings.project.as_deref(), &settings.services)
                }
            };

            let source = LokiLogSource::new(LokiOptions {
                base_url: settings.loki_url.clone(),
                query,
                limit: settings.tail,
                start_ns,
                end_ns,
            });
            Ok(if settings.follow {
                source.tail()
            } else {
                source.snapshot()
            })
        }
        BackendKind::Compose => {
            let options = ComposeOptions {
                program: "docker".to_string(),
                compose_file: settings.compose_file.clone(),
                project: settings.project.clone(),
                profiles: settings.profiles.clone(),
                follow: settings.follow,
                tail: settings.tail,
                service: match settings.services.as_slice() {
                    [service] => Some(service.clone()),
                    _ => None,
                },
            };
            ComposeLogSource::new(options)
                .spawn()
                .map_err(|err| err.to_string())
        }
    }
}

async fn pump(
    mut handle: SourceHandle,
    sink: &mut dyn EventSink,
    context: &SessionContext,
) -> i32 {
    while let Some(entry) = handle.next_entry().await {
        if sink.emit(&LogStreamEvent::log(context, entry)).is_err() {
            // Downstream is gone (broken pipe); stop producing.
            handle.stop();
            break;
        }
    }

    let end = handle.wait().await;
    if let EndReason::Error(message) = &end {
        error!("{message}");
        let _ = sink.emit(&LogStreamEvent::error(context, message.clone()));
    }
    let _ = sink.emit(&LogStreamEvent::end(context, Some(end.as_wire())));

    i32::from(end.is_error())
}

fn fail_session(sink: &mut dyn EventSink, context: &SessionContext, message: &str) -> i32 {
    error!("{message}");
    let _ = sink.emit(&LogStreamEvent::error(context, message));
    let _ = sink.emit(&LogStreamEvent::end(
        context,
        Some(EndReason::Error(message.to_string()).as_wire()),
    ));
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::config::DEFAULT_LOKI_URL;
    use std::path::PathBuf;

    fn settings() -> Settings {
        Settings {
            project: Some("myproj".to_string()),
            branch: None,
            compose_file: PathBuf::from("docker-compose.yml"),
            profiles: Vec::new(),
            loki_url: url::Url::parse(DEFAULT_LOKI_URL).unwrap(),
            json: true,
            force_compose: false,
            wants_loki: false,
            follow: true,
            tail: 100,
            since: None,
            until: None,
            services: Vec::new(),
            query: None,
            follow_backend: BackendKind::Compose,
            snapshot_backend: BackendKind::Compose,
            log_level: "warn".to_string(),
        }
    }

    #[tokio::test]
    async fn test_compose_default_needs_no_probe() {
        // Configured compose default: no probe happens and compose wins.
        let resolved = resolve_backend(&settings()).await;
        assert_eq!(resolved, BackendKind::Compose);
    }

    #[tokio::test]
    async fn test_explicit_loki_skips_probe_and_wins() {
        let mut settings = settings();
        settings.wants_loki = true;
        // Nothing is listening on the default URL; explicit choice still
        // resolves to loki so the failure surfaces downstream.
        let resolved = resolve_backend(&settings).await;
        assert_eq!(resolved, BackendKind::Loki);
    }

    #[tokio::test]
    async fn test_loki_without_scope_is_rejected() {
        let mut settings = settings();
        settings.project = None;
        let result = open_source(&settings, BackendKind::Loki, None, None);
        assert!(result.is_err());
    }
}
