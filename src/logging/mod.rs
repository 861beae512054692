pub mod config;

pub use config::LoggingConfig;

use crate::Result;
use anyhow::{anyhow, Context};
use std::env;
use std::fs::{create_dir_all, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::prelude::*;

static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Guards that keep logging sinks active for the duration of the process.
pub struct LoggingGuard {
    _file_guard: Option<tracing_appender::non_blocking::WorkerGuard>,
    log_file_path: Option<PathBuf>,
}

impl LoggingGuard {
    /// Returns the log file path backed by the file sink, when enabled.
    pub fn log_file_path(&self) -> Option<&Path> {
        self.log_file_path.as_deref()
    }
}

/// Initialize the logging framework for the server process.
///
/// Configures the level filter, an optional file sink, and the console sink
/// based on deterministic configuration precedence. It errors when invoked
/// more than once per process unless tests explicitly reset the guard.
pub fn init(workspace_root: Option<&Path>) -> Result<LoggingGuard> {
    if LOGGER_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(anyhow!("logging already initialized"));
    }

    let config = LoggingConfig::load(workspace_root)?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.default_level))
        .context("failed to configure tracing level")?;

    let (file_layer, file_guard, log_file_path) = if config.enable_file {
        let path = log_file_path(&config, workspace_root)?;
        ensure_log_dir(&path)?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("failed to open log file {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(guard), Some(path))
    } else {
        (None, None, None)
    };

    let console_layer = tracing_subscriber::fmt::layer().with_target(false);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .with(env_filter)
        .init();

    Ok(LoggingGuard {
        _file_guard: file_guard,
        log_file_path,
    })
}

fn log_file_path(config: &LoggingConfig, workspace_root: Option<&Path>) -> Result<PathBuf> {
    let base_dir = if let Some(custom) = &config.log_dir {
        if custom.is_absolute() {
            custom.clone()
        } else if let Some(workspace) = workspace_root {
            workspace.join(custom)
        } else {
            env::current_dir()
                .context("current directory unavailable")?
                .join(custom)
        }
    } else if let Some(workspace) = workspace_root {
        workspace.join(".draftmill").join("logs")
    } else {
        env::current_dir()
            .context("current directory unavailable")?
            .join(".draftmill")
            .join("logs")
    };
    Ok(base_dir.join("draftmill.log"))
}

fn ensure_log_dir(log_file: &Path) -> Result<()> {
    let directory = log_file.parent().ok_or_else(|| {
        anyhow!(
            "log file path {} has no parent directory",
            log_file.display()
        )
    })?;
    create_dir_all(directory)
        .with_context(|| format!("failed to create log directory {}", directory.display()))?;
    Ok(())
}

#[cfg(test)]
/// Reset the initialization guard so tests can reconfigure logging multiple times.
pub fn reset_for_tests() {
    LOGGER_INITIALIZED.store(false, Ordering::SeqCst);
}
