//! distrobox integration: sandbox assembly and the `distrobox-export`
//! helper that image builds copy into their context.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::cmd::{Cmd, Runner};
use crate::context::EXPORT_HELPER;
use crate::engine::CommandFailed;

/// Patch applied to the copied helper when present in the work directory.
pub const EXPORT_PATCH: &str = "distrobox-export-1.8.1.2.patch";

/// `distrobox assemble create --replace` for one sandbox. Never pulls a
/// fresh base image; the engine is passed through the environment.
pub fn assemble_command(engine: &str, sandbox_name: &str, dir: &Path) -> Cmd {
    Cmd::new("distrobox")
        .env("DBX_CONTAINER_ALWAYS_PULL", "0")
        .env("DBX_CONTAINER_MANAGER", engine)
        .args(["assemble", "create", "--replace", "--name", sandbox_name])
        .workdir(dir)
}

/// A file copied into place that is removed when dropped, including
/// during unwinding.
#[derive(Debug)]
pub struct ScopedFile {
    path: PathBuf,
}

impl ScopedFile {
    pub fn copy(from: &Path, to: &Path) -> Result<Self> {
        fs::copy(from, to)
            .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
        debug!(from = %from.display(), to = %to.display(), "distrobox:helper copied");
        Ok(Self {
            path: to.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScopedFile {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "distrobox:helper removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "distrobox:failed to remove helper"),
        }
    }
}

/// The (optionally patched) export helper for one build phase.
pub struct ExportHelper {
    file: Option<ScopedFile>,
}

impl ExportHelper {
    /// Copy the installed helper into `workdir` and apply [`EXPORT_PATCH`]
    /// if it exists there. Without an installed helper builds proceed
    /// without one.
    pub fn prepare(runner: &dyn Runner, source: Option<&Path>, workdir: &Path) -> Result<Self> {
        let Some(source) = source else {
            warn!("{EXPORT_HELPER} not found on PATH, building without it");
            return Ok(Self { file: None });
        };

        let file = ScopedFile::copy(source, &workdir.join(EXPORT_HELPER))?;

        if workdir.join(EXPORT_PATCH).exists() {
            let patch = Cmd::new("patch")
                .args([EXPORT_HELPER, EXPORT_PATCH])
                .workdir(workdir);
            let code = runner.status(&patch)?;
            if code != 0 {
                return Err(CommandFailed {
                    command: patch.to_string(),
                    code,
                })
                .context("Failed to patch the export helper");
            }
        }

        Ok(Self { file: Some(file) })
    }

    /// Copy the helper into an image build directory for one build. A file
    /// already present there is left alone and not owned.
    pub fn place_in(&self, dir: &Path) -> Result<Option<ScopedFile>> {
        let Some(file) = &self.file else {
            return Ok(None);
        };
        let target = dir.join(EXPORT_HELPER);
        if target.exists() {
            return Ok(None);
        }
        ScopedFile::copy(file.path(), &target).map(Some)
    }
}
