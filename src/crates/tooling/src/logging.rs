//! Structured logging setup
//!
//! Initializes the global tracing subscriber from a [`LoggingConfig`]:
//! an optional console layer, an optional daily-rotated `app.log` (plain or
//! JSON) and a separate error-level `error.log`. Returns the appender
//! guards, which the caller must keep alive for the lifetime of the
//! process or buffered log lines are lost.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{filter::LevelFilter, EnvFilter, Layer};

use crate::{Result, ToolingError};

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace/debug/info/warn/error)
    #[serde(default = "default_level")]
    pub level: String,
    /// Directory for log files
    #[serde(default = "default_dir")]
    pub dir: String,
    /// Write log files under `dir`
    #[serde(default = "default_true")]
    pub enable_file: bool,
    /// Write to stdout
    #[serde(default = "default_true")]
    pub enable_console: bool,
    /// Emit file logs as JSON lines
    #[serde(default)]
    pub json_format: bool,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_dir() -> String {
    "./logs".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            dir: default_dir(),
            enable_file: true,
            enable_console: true,
            json_format: false,
        }
    }
}

/// Initialize the global tracing subscriber
///
/// Honors `RUST_LOG` when set, falling back to the configured level.
pub fn setup_logging(config: &LoggingConfig) -> Result<Vec<WorkerGuard>> {
    let mut guards = Vec::new();
    let mut layers = Vec::new();

    if config.enable_console {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed();
        layers.push(layer);
    }

    if config.enable_file {
        let dir = Path::new(&config.dir);
        std::fs::create_dir_all(dir)?;

        let (app_writer, app_guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "app.log"));
        guards.push(app_guard);
        let app_layer = if config.json_format {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(app_writer)
                .with_ansi(false)
                .boxed()
        } else {
            tracing_subscriber::fmt::layer()
                .with_writer(app_writer)
                .with_ansi(false)
                .boxed()
        };
        layers.push(app_layer);

        // Errors also land in their own file for quick triage
        let (err_writer, err_guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, "error.log"));
        guards.push(err_guard);
        let err_layer = tracing_subscriber::fmt::layer()
            .with_writer(err_writer)
            .with_ansi(false)
            .with_filter(LevelFilter::ERROR)
            .boxed();
        layers.push(err_layer);
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    tracing_subscriber::registry()
        .with(filter)
        .with(layers)
        .try_init()
        .map_err(|e| ToolingError::Logging(e.to_string()))?;

    Ok(guards)
}
