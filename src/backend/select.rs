//! Backend decision functions and the Loki readiness probe.
//!
//! Selection happens in two steps: first decide whether Loki should even be
//! attempted (explicit flags beat configured defaults), then fold in live
//! reachability. An explicit `--loki` request is honored even when the probe
//! fails, so the failure surfaces loudly downstream instead of a silent
//! fallback to compose.

use super::BackendKind;
use std::time::Duration;
use url::Url;

/// Default timeout for the readiness probe.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_millis(800);

/// Environment override for the probe timeout, in milliseconds.
pub const READY_TIMEOUT_ENV: &str = "HACK_LOKI_READY_TIMEOUT_MS";

/// Should the session try the Loki backend at all?
pub fn resolve_should_try_loki(
    force_compose: bool,
    wants_loki_explicit: bool,
    follow: bool,
    follow_backend: BackendKind,
    snapshot_backend: BackendKind,
) -> bool {
    if force_compose {
        return false;
    }
    if wants_loki_explicit {
        return true;
    }
    let configured = if follow {
        follow_backend
    } else {
        snapshot_backend
    };
    configured == BackendKind::Loki
}

/// Final backend decision once reachability is known.
pub fn resolve_use_loki(
    force_compose: bool,
    wants_loki_explicit: bool,
    should_try_loki: bool,
    loki_reachable: bool,
) -> bool {
    if force_compose {
        return false;
    }
    if wants_loki_explicit {
        return true;
    }
    should_try_loki && loki_reachable
}

/// Probe timeout: `HACK_LOKI_READY_TIMEOUT_MS` when set and parsable,
/// 800 ms otherwise.
pub fn ready_probe_timeout() -> Duration {
    std::env::var(READY_TIMEOUT_ENV)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
        .map_or(DEFAULT_READY_TIMEOUT, Duration::from_millis)
}

/// Short-timeout readiness check against the Loki `/ready` endpoint.
/// Any failure (connect, timeout, non-2xx) reads as unreachable.
pub async fn probe_loki_ready(client: &reqwest::Client, base: &Url, timeout: Duration) -> bool {
    let Ok(ready_url) = base.join("ready") else {
        return false;
    };

    match client.get(ready_url).timeout(timeout).send().await {
        Ok(response) => {
            let ok = response.status().is_success();
            if !ok {
                tracing::debug!(status = %response.status(), "loki readiness probe rejected");
            }
            ok
        }
        Err(err) => {
            tracing::debug!(error = %err, "loki readiness probe failed");
            false
        }
    }
}
