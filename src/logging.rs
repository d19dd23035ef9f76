//! Structured logging bootstrap.
//!
//! Mirrors the teacher's `tracing_subscriber::registry()` setup: an
//! `EnvFilter` driven by `RUST_LOG` (default `info`), a human-readable
//! layer on stderr, and a daily-rolling file appender under
//! `<workspace>/.codeloom/logs/codeloom.log`.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Guard returned by [`init`]; drop it only at process shutdown, otherwise
/// the non-blocking file writer stops flushing.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

pub fn init(workspace_root: &Path) -> std::io::Result<LoggingGuard> {
    let logs_dir = workspace_root.join(".codeloom").join("logs");
    std::fs::create_dir_all(&logs_dir)?;

    let file_appender = rolling::daily(&logs_dir, "codeloom.log");
    let (non_blocking_file, file_guard) = non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_ansi(true))
        .with(
            fmt::layer()
                .with_writer(non_blocking_file)
                .with_target(true)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true),
        )
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
