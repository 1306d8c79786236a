//! Run options resolved once per invocation from CLI flags and the
//! environment. Nothing downstream reads the environment again.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::config::DEFAULT_CONFIG_FILE;

/// Environment variable naming the fallback container engine.
pub const ENGINE_ENV: &str = "DBX_CONTAINER_MANAGER";

pub const DEFAULT_ENGINE: &str = "docker";

/// Pause between the last build and the first assembly.
pub const DEFAULT_SETTLE: Duration = Duration::from_secs(5);

/// Helper script copied next to the Containerfiles during builds.
pub const EXPORT_HELPER: &str = "distrobox-export";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Prune (optional), build, settle, assemble, clean (optional)
    Process,
    ListAll,
    ListAssemble,
    ListEnabled,
    ListLayers,
    /// Only the cleaning phase
    Clean,
}

/// Identity baked into dev images so sandbox files belong to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserIdentity {
    pub user: String,
    pub uid: u32,
    pub gid: u32,
}

impl UserIdentity {
    pub fn current() -> Self {
        let (uid, gid) = current_ids();
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("LOGNAME"))
            .ok()
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| uid.to_string());
        Self { user, uid, gid }
    }
}

#[cfg(unix)]
fn current_ids() -> (u32, u32) {
    // SAFETY: getuid() and getgid() are simple POSIX getters that always succeed and have no side effects.
    unsafe { (libc::getuid(), libc::getgid()) }
}

#[cfg(not(unix))]
fn current_ids() -> (u32, u32) {
    (0, 0)
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config_file: PathBuf,
    pub prune_before_run: bool,
    pub skip_clean_after_run: bool,
    pub verbose: bool,
    pub mode: Mode,
    pub fallback_engine: String,
    pub settle: Duration,
    pub identity: UserIdentity,
    /// Location of `distrobox-export` on this host, if installed
    pub export_helper: Option<PathBuf>,
}

impl RunOptions {
    /// Options with built-in defaults only; no environment lookups.
    pub fn new(mode: Mode, config_file: impl Into<PathBuf>) -> Self {
        Self {
            config_file: config_file.into(),
            prune_before_run: false,
            skip_clean_after_run: false,
            verbose: false,
            mode,
            fallback_engine: DEFAULT_ENGINE.to_string(),
            settle: DEFAULT_SETTLE,
            identity: UserIdentity {
                user: "user".to_string(),
                uid: 1000,
                gid: 1000,
            },
            export_helper: None,
        }
    }

    /// Options with engine, identity and helper location taken from the
    /// current process environment.
    pub fn from_env(mode: Mode, config_file: Option<PathBuf>) -> Self {
        let config_file = config_file.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
        let options = Self {
            fallback_engine: resolve_engine(std::env::var(ENGINE_ENV).ok()),
            identity: UserIdentity::current(),
            export_helper: which::which(EXPORT_HELPER).ok(),
            ..Self::new(mode, config_file)
        };
        debug!(?options, "context:resolved");
        options
    }

    /// Directory holding the config file; shared files live here.
    pub fn workdir(&self) -> &Path {
        match self.config_file.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        }
    }
}

/// Fallback engine from the raw environment value.
pub fn resolve_engine(env_value: Option<String>) -> String {
    env_value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_ENGINE.to_string())
}
