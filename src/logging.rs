//! Logging configuration and initialization for filedrop.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::Result;

/// Map a config level string to a tracing level. Unknown values mean `info`.
fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Directives used when `RUST_LOG` is unset: our crate and the HTTP trace layer.
fn default_directives(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    format!("filedrop={level},tower_http={level}")
}

/// `RUST_LOG` wins over the configured level.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(parse_level(level))))
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

/// Initialize logging to stdout and the configured append-only file.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let log_file = open_log_file(Path::new(&config.file))?;

    tracing_subscriber::registry()
        .with(build_filter(&config.level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout.and(Arc::new(log_file)))
                .with_ansi(false),
        )
        .init();

    Ok(())
}

/// Initialize console-only logging, used when the log file cannot be opened.
pub fn init_console_only(level: &str) {
    tracing_subscriber::registry()
        .with(build_filter(level))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
