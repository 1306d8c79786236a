use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

static INIT: OnceLock<()> = OnceLock::new();
static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Console logging on stderr so stdout carries only listings (`info`, or
/// `debug` when verbose; `RUST_LOG` wins) plus a debug-level log file under
/// the XDG state directory.
pub fn init(verbose: bool) -> Result<()> {
    if INIT.get().is_some() {
        return Ok(());
    }

    init_inner(verbose)?;
    let _ = INIT.set(());
    Ok(())
}

fn init_inner(verbose: bool) -> Result<()> {
    let log_path = determine_log_path()?;
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory at {}", parent.display()))?;
    }

    let (directory, file_name) = split_path(&log_path)?;
    let file_appender = rolling::never(directory, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = GUARD.set(guard);

    let console_level = if verbose { "debug" } else { "info" };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(console_level));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(std::io::stderr().is_terminal())
                .with_target(false)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .with_filter(EnvFilter::new("debug")),
        )
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}

fn determine_log_path() -> Result<PathBuf> {
    let state_home = std::env::var("XDG_STATE_HOME").ok();
    let cwd = std::env::current_dir()?;
    Ok(log_path_from(state_home, home::home_dir(), &cwd))
}

/// `$XDG_STATE_HOME/ocisictl/ocisictl.log`, else the XDG default under the
/// home directory, else the current directory.
fn log_path_from(state_home: Option<String>, home_dir: Option<PathBuf>, cwd: &Path) -> PathBuf {
    if let Some(state_home) = state_home.filter(|s| !s.is_empty()) {
        return PathBuf::from(state_home).join("ocisictl").join("ocisictl.log");
    }

    if let Some(home_dir) = home_dir {
        return home_dir
            .join(".local")
            .join("state")
            .join("ocisictl")
            .join("ocisictl.log");
    }

    cwd.join("ocisictl.log")
}

fn split_path(path: &Path) -> Result<(PathBuf, &str)> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| anyhow!("Invalid log file name"))?;

    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    Ok((dir, file_name))
}
