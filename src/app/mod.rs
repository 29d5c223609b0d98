pub mod config;
pub mod logging;
pub mod session;

pub use config::{Config, ConfigError, ProjectConfig, Settings};
pub use logging::setup_logging;
pub use session::run_session;

use clap::Parser;

/// CLI entry point: parse flags, resolve configuration, run one session.
/// Returns the session's process exit code; configuration failures bubble
/// up as errors.
pub async fn run() -> anyhow::Result<i32> {
    let config = Config::parse();
    let settings = config.resolve()?;
    setup_logging(&settings.log_level);
    Ok(run_session(settings).await)
}
