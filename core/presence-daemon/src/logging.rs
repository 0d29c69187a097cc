//! Tracing setup.
//!
//! Every line is `[<timestamp>] <message> <fields>`. The daemon writes to
//! stdout and appends to the configured log file; one-shot commands log to
//! stderr only so their stdout stays machine-readable.

use chrono::Local;
use std::env;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

struct BracketTime;

impl FormatTime for BracketTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "[{}]", Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

fn env_filter() -> EnvFilter {
    let debug_enabled = env::var("PRESENCED_DEBUG_LOG")
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn open_log_file(path: &Path) -> Result<RollingFileAppender, String> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let name = path
        .file_name()
        .ok_or_else(|| format!("Log path has no file name: {}", path.display()))?;
    std::fs::create_dir_all(dir)
        .map_err(|err| format!("Failed to create log directory {}: {}", dir.display(), err))?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name.to_string_lossy())
        .build(dir)
        .map_err(|err| format!("Failed to open log file {}: {}", path.display(), err))
}

/// Installs the daemon subscriber. Keep the returned guard alive until exit,
/// or buffered file lines are lost.
pub fn init_daemon(log_file: &Path) -> Option<WorkerGuard> {
    let (file_layer, guard, file_error) = match open_log_file(log_file) {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_timer(BracketTime)
                .with_level(false)
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard), None)
        }
        Err(err) => (None, None, Some(err)),
    };

    let stdout_layer = fmt::layer()
        .with_timer(BracketTime)
        .with_level(false)
        .with_target(false)
        .with_writer(std::io::stdout);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(stdout_layer)
        .with(file_layer)
        .init();

    if let Some(err) = file_error {
        tracing::warn!(error = %err, "Logging to stdout only");
    }
    guard
}

pub fn init_cli() {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_timer(BracketTime)
                .with_level(false)
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}
