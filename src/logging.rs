//! Tracing configuration and log routing.
//!
//! The proxy logs to stdout using a compact formatter; the tool server logs to stderr
//! because its stdout is the JSON-RPC response channel and must never carry anything
//! else. Both optionally log to a file: when `ASKPDF_LOG_FILE` is set, logs are appended
//! to that path; otherwise a file logger is created under `<workdir>/logs/askpdf.log`.
//! A non-blocking writer is used to minimize contention on hot paths.
use std::path::Path;
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Console destination for the compact fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    /// Log to stdout (HTTP proxy).
    Stdout,
    /// Log to stderr (tool server; stdout is the response channel).
    Stderr,
}

/// Configure tracing subscribers for console and optional file logging.
///
/// - Respects `RUST_LOG` for filtering (defaults to `info`).
/// - Installs a compact console layer on the requested target and, when available,
///   a file layer under `logs_dir`.
/// - Uses a global guard to keep the non-blocking writer alive for the process lifetime.
pub fn init_tracing(target: LogTarget, logs_dir: &Path) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);
    let file_writer = configure_file_writer(logs_dir);

    match target {
        LogTarget::Stdout => {
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false)
                    .compact()
            });
            let console_layer = fmt::layer().with_target(false).compact();
            registry.with(console_layer).with(file_layer).init();
        }
        LogTarget::Stderr => {
            let file_layer = file_writer.map(|writer| {
                fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false)
                    .compact()
            });
            let console_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact();
            registry.with(console_layer).with(file_layer).init();
        }
    }
}

/// Build a non-blocking writer for file logging.
///
/// Returns `None` when the logs directory cannot be created or the target file cannot
/// be opened.
fn configure_file_writer(logs_dir: &Path) -> Option<NonBlocking> {
    if let Ok(path) = std::env::var("ASKPDF_LOG_FILE") {
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
        {
            Ok(file) => {
                let (non_blocking, guard) = tracing_appender::non_blocking(file);
                let _ = LOG_GUARD.set(guard);
                Some(non_blocking)
            }
            Err(err) => {
                eprintln!("Failed to open log file {path}: {err}");
                None
            }
        }
    } else {
        if let Err(err) = std::fs::create_dir_all(logs_dir) {
            eprintln!("Failed to create logs directory: {err}");
            return None;
        }
        let file_appender = tracing_appender::rolling::never(logs_dir, "askpdf.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = LOG_GUARD.set(guard);
        Some(non_blocking)
    }
}
