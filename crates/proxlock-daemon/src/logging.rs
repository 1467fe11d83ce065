//! Logging initialization.
//!
//! Two modes, selected by `PROXLOCK_ENV`:
//! - `production`: JSON logs to rolling daily files plus compact stdout for
//!   the systemd journal
//! - anything else: pretty stdout for development
//!
//! Log level comes from `RUST_LOG` or `PROXLOCK_LOG` (default `info`).

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Keeps the non-blocking writers alive for the lifetime of the process.
static GUARDS: OnceLock<Vec<WorkerGuard>> = OnceLock::new();

/// Selected logging mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// File + journald-friendly stdout.
    Production,
    /// Pretty stdout only.
    Development,
}

impl RunMode {
    /// Derive the mode from `PROXLOCK_ENV`.
    pub fn from_env() -> Self {
        match std::env::var("PROXLOCK_ENV").as_deref() {
            Ok("production") => Self::Production,
            _ => Self::Development,
        }
    }
}

/// Initialize the tracing subscriber for the given mode.
///
/// # Errors
///
/// Returns an error if the env filter cannot be parsed.
pub fn init(mode: RunMode) -> anyhow::Result<()> {
    let level = std::env::var("PROXLOCK_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&level))?;

    match mode {
        RunMode::Production => init_production(filter),
        RunMode::Development => init_development(filter),
    }
    Ok(())
}

fn init_production(filter: EnvFilter) {
    let log_dir = log_directory();
    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir).ok();
    }

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, "proxlock");
    let (file_writer, file_guard) = tracing_appender::non_blocking(file_appender);
    let (stdout_writer, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(file_writer)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // No ANSI colors; journald keeps the raw bytes.
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(stdout_writer)
        .with_target(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    let _ = GUARDS.set(vec![file_guard, stdout_guard]);
}

fn init_development(filter: EnvFilter) {
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .init();
}

fn log_directory() -> PathBuf {
    directories::ProjectDirs::from("", "", "proxlock")
        .map(|dirs| dirs.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("./logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_directory_is_a_valid_path() {
        assert!(!log_directory().as_os_str().is_empty());
    }

    #[test]
    fn run_mode_defaults_to_development() {
        // PROXLOCK_ENV is not set under `cargo test`.
        assert_eq!(RunMode::from_env(), RunMode::Development);
    }
}
