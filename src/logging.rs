//! Tracing subscriber setup for the CLI.
//!
//! Console output goes to stderr so `--json` output on stdout stays clean. The
//! console only shows warnings unless `--verbose` is set, since the progress
//! bars share the terminal. `RUST_LOG` overrides both filters.

use crate::config::LoggingSection;
use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, Registry, layer::SubscriberExt, util::SubscriberInitExt};

const LOG_FILE_PREFIX: &str = "drawing-pipeline.log";
const QUIET_FILTER: &str = "warn";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn env_or(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process so buffered file logs are flushed on exit.
pub fn init_logging(settings: &LoggingSection, log_dir: &Path, verbose: bool) -> Result<Option<WorkerGuard>> {
    let mut layers: Vec<BoxedLayer> = Vec::new();

    let console_filter = env_or(if verbose { &settings.filter } else { QUIET_FILTER });
    let console = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
    if settings.json {
        layers.push(console.json().with_filter(console_filter).boxed());
    } else {
        layers.push(console.with_filter(console_filter).boxed());
    }

    let mut guard = None;
    if settings.file {
        match std::fs::create_dir_all(log_dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
                let (writer, worker_guard) = tracing_appender::non_blocking(appender);
                guard = Some(worker_guard);
                let file = tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(false);
                let file_filter = env_or(&settings.filter);
                if settings.json {
                    layers.push(file.json().with_filter(file_filter).boxed());
                } else {
                    layers.push(file.with_filter(file_filter).boxed());
                }
            }
            Err(e) => eprintln!(
                "Warning: failed to create log directory {}: {}",
                log_dir.display(),
                e
            ),
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(guard)
}
