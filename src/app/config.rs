//! CLI configuration and the project configuration file.
//!
//! Flags cover the pipeline's knobs only; the wider orchestration CLI owns
//! everything else. File values come from the project's `hack.toml` and are
//! overridden by flags.

use crate::backend::BackendKind;
use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid loki URL {url}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid {flag} value {value}: expected an RFC 3339 timestamp or a duration like 15m")]
    InvalidTimeBound { flag: &'static str, value: String },
}

#[derive(Parser, Debug, Clone)]
#[command(name = "hack-logs", version, about = "Stream and export development environment logs")]
pub struct Config {
    /// Project name (scopes the compose project and the loki selector)
    #[arg(long, env = "HACK_PROJECT")]
    pub project: Option<String>,

    /// Branch label mirrored into every stream event
    #[arg(long, env = "HACK_BRANCH")]
    pub branch: Option<String>,

    /// Project configuration file
    #[arg(long = "config", env = "HACK_LOGS_CONFIG", default_value = "hack.toml")]
    pub config_file: PathBuf,

    /// Compose file handed to the log subprocess
    #[arg(long)]
    pub compose_file: Option<PathBuf>,

    /// Compose profile (repeatable)
    #[arg(long = "profile")]
    pub profiles: Vec<String>,

    /// Loki base URL
    #[arg(long, env = "HACK_LOKI_URL")]
    pub loki_url: Option<String>,

    /// Emit NDJSON stream events instead of pretty lines
    #[arg(long)]
    pub json: bool,

    /// Force the loki backend even when unreachable
    #[arg(long, conflicts_with = "compose")]
    pub loki: bool,

    /// Force the compose backend
    #[arg(long)]
    pub compose: bool,

    /// Take a bounded snapshot instead of following
    #[arg(long)]
    pub no_follow: bool,

    /// Number of lines per service (compose --tail / loki limit)
    #[arg(long, default_value_t = 100)]
    pub tail: u32,

    /// Window start: RFC 3339 timestamp or a duration back from now
    #[arg(long)]
    pub since: Option<String>,

    /// Window end: RFC 3339 timestamp or a duration back from now
    #[arg(long)]
    pub until: Option<String>,

    /// Comma-separated service names to scope to
    #[arg(long, value_delimiter = ',')]
    pub services: Vec<String>,

    /// Raw LogQL selector, bypassing selector construction
    #[arg(long)]
    pub query: Option<String>,

    /// Diagnostic log level (diagnostics go to stderr)
    #[arg(long, env = "HACK_LOGS_LOG_LEVEL", default_value = "warn")]
    pub log_level: String,
}

/// `hack.toml`: the slice of project configuration this pipeline reads.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectConfig {
    pub name: Option<String>,
    pub compose_file: Option<PathBuf>,
    #[serde(default)]
    pub profiles: Vec<String>,
    pub branch: Option<String>,
    #[serde(default)]
    pub logs: LogsConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogsConfig {
    pub loki_url: Option<String>,
    pub follow_backend: Option<BackendKind>,
    pub snapshot_backend: Option<BackendKind>,
}

impl ProjectConfig {
    /// Load from a TOML file. A missing file is not an error; the project
    /// simply has no configuration yet and defaults apply.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Fully resolved inputs for one session, after merging flags over file
/// values and applying defaults.
#[derive(Debug, Clone)]
pub struct Settings {
    pub project: Option<String>,
    pub branch: Option<String>,
    pub compose_file: PathBuf,
    pub profiles: Vec<String>,
    pub loki_url: Url,
    pub json: bool,
    pub force_compose: bool,
    pub wants_loki: bool,
    pub follow: bool,
    pub tail: u32,
    pub since: Option<String>,
    pub until: Option<String>,
    pub services: Vec<String>,
    pub query: Option<String>,
    pub follow_backend: BackendKind,
    pub snapshot_backend: BackendKind,
    pub log_level: String,
}

pub const DEFAULT_LOKI_URL: &str = "http://127.0.0.1:3100";
pub const DEFAULT_COMPOSE_FILE: &str = "docker-compose.yml";

impl Config {
    pub fn resolve(self) -> Result<Settings, ConfigError> {
        let file = ProjectConfig::load(&self.config_file)?;

        let loki_url_raw = self
            .loki_url
            .or(file.logs.loki_url)
            .unwrap_or_else(|| DEFAULT_LOKI_URL.to_string());
        let loki_url = Url::parse(&loki_url_raw).map_err(|source| ConfigError::InvalidUrl {
            url: loki_url_raw,
            source,
        })?;

        Ok(Settings {
            project: self.project.or(file.name),
            branch: self.branch.or(file.branch),
            compose_file: self
                .compose_file
                .or(file.compose_file)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_COMPOSE_FILE)),
            profiles: if self.profiles.is_empty() {
                file.profiles
            } else {
                self.profiles
            },
            loki_url,
            json: self.json,
            force_compose: self.compose,
            wants_loki: self.loki,
            follow: !self.no_follow,
            tail: self.tail,
            since: self.since,
            until: self.until,
            services: self.services,
            query: self.query,
            follow_backend: file.logs.follow_backend.unwrap_or(BackendKind::Compose),
            snapshot_backend: file.logs.snapshot_backend.unwrap_or(BackendKind::Compose),
            log_level: self.log_level,
        })
    }
}

/// Parse a `--since`/`--until` value: an RFC 3339 timestamp, or a duration
/// interpreted as "that long ago". Returns nanoseconds since the epoch.
pub fn resolve_time_bound(
    flag: &'static str,
    value: &str,
    now_ns: i64,
) -> Result<i64, ConfigError> {
    if let Ok(ts) = chrono::DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&chrono::Utc).timestamp_nanos_opt().unwrap_or(now_ns));
    }
    if let Ok(duration) = humantime::parse_duration(value) {
        return Ok(now_ns.saturating_sub(duration.as_nanos() as i64));
    }
    Err(ConfigError::InvalidTimeBound {
        flag,
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Config {
        Config::parse_from(std::iter::once("hack-logs").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() {
        let settings = parse(&["--config", "/nonexistent/hack.toml"])
            .resolve()
            .unwrap();
        assert_eq!(settings.compose_file, PathBuf::from(DEFAULT_COMPOSE_FILE));
        assert_eq!(settings.loki_url.as_str(), "http://127.0.0.1:3100/");
        assert!(settings.follow);
        assert_eq!(settings.tail, 100);
        assert_eq!(settings.follow_backend, BackendKind::Compose);
        assert!(!settings.json);
    }

    #[test]
    fn test_services_csv() {
        let config = parse(&["--services", "api,worker", "--config", "/nonexistent/x.toml"]);
        assert_eq!(config.services, vec!["api", "worker"]);
    }

    #[test]
    fn test_file_values_and_flag_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
name = "myproj"
compose_file = "compose.dev.yml"
profiles = ["dev"]
branch = "main"

[logs]
loki_url = "http://loki.internal:3100"
follow_backend = "loki"
snapshot_backend = "compose"
"#
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let settings = parse(&["--config", &path]).resolve().unwrap();
        assert_eq!(settings.project.as_deref(), Some("myproj"));
        assert_eq!(settings.branch.as_deref(), Some("main"));
        assert_eq!(settings.compose_file, PathBuf::from("compose.dev.yml"));
        assert_eq!(settings.follow_backend, BackendKind::Loki);
        assert_eq!(settings.snapshot_backend, BackendKind::Compose);

        let overridden = parse(&["--config", &path, "--project", "other", "--no-follow"])
            .resolve()
            .unwrap();
        assert_eq!(overridden.project.as_deref(), Some("other"));
        assert!(!overridden.follow);
    }

    #[test]
    fn test_broken_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not [valid toml").unwrap();
        let path = file.path().to_str().unwrap().to_string();
        let result = parse(&["--config", &path]).resolve();
        assert!(matches!(result, Err(ConfigError::Toml { .. })));
    }

    #[test]
    fn test_time_bound_rfc3339() {
        let ns = resolve_time_bound("--since", "2025-12-30T03:30:48.866Z", 0).unwrap();
        assert_eq!(ns, 1_767_065_448_866_000_000);
    }

    #[test]
    fn test_time_bound_duration_is_relative() {
        let now = 1_000_000_000_000_000_000;
        let ns = resolve_time_bound("--since", "15m", now).unwrap();
        assert_eq!(ns, now - 15 * 60 * 1_000_000_000);
    }

    #[test]
    fn test_time_bound_rejects_garbage() {
        let result = resolve_time_bound("--until", "yesterday-ish", 0);
        assert!(matches!(
            result,
            Err(ConfigError::InvalidTimeBound { flag: "--until", .. })
        ));
    }
}
