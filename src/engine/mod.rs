//! Container engine abstraction.
//!
//! Docker and Podman accept the same verbs but differ in listing output
//! shapes and a few flags. Each backend implements [`Engine`], which only
//! builds commands and parses their output; [`EngineAdapter`] runs them.

mod docker;
mod podman;

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use tracing::{debug, warn};

use crate::cmd::{Cmd, Runner};
use crate::distrobox;

pub use self::docker::DockerEngine;
pub use self::podman::PodmanEngine;

/// A command that must succeed exited non-zero.
#[derive(Debug, thiserror::Error)]
#[error("Command exited with status {code}: {command}")]
pub struct CommandFailed {
    pub command: String,
    pub code: i32,
}

/// `--build-arg` pairs passed to an image build.
pub type BuildArgs = Vec<(String, String)>;

/// Command construction and output parsing for one container engine.
///
/// Default methods cover the docker-compatible command surface; backends
/// override what differs.
pub trait Engine {
    /// Executable name, also the value passed to distrobox
    fn name(&self) -> &str;

    fn build(&self, containerfile: &str, image: &str, build_args: &BuildArgs, dir: &Path) -> Cmd {
        let mut cmd = Cmd::new(self.name())
            .args(["buildx", "build", "-f", containerfile, "-t", image]);
        for (key, value) in build_args {
            cmd = cmd.arg("--build-arg").arg(format!("{key}={value}"));
        }
        cmd.arg(".").workdir(dir)
    }

    fn stop_container(&self, name: &str) -> Cmd {
        Cmd::new(self.name()).args(["stop", name])
    }

    fn remove_container(&self, name: &str) -> Cmd {
        Cmd::new(self.name()).args(["rm", "-f", "--volumes", name])
    }

    fn remove_image(&self, image: &str) -> Cmd {
        Cmd::new(self.name()).args(["rmi", "-f", image])
    }

    /// `None` when the output shape of this engine is unknown.
    fn list_running(&self) -> Option<Cmd> {
        None
    }

    fn parse_running(&self, _stdout: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// `None` when the output shape of this engine is unknown.
    fn list_images(&self) -> Option<Cmd> {
        None
    }

    fn parse_image_names(&self, _stdout: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn inspect_image(&self, image: &str) -> Cmd {
        Cmd::new(self.name()).args(["inspect", "--format", "json", image])
    }

    fn parse_layers(&self, stdout: &str) -> Result<Vec<String>> {
        let docs = json_documents(stdout)?;
        Ok(docs
            .first()
            .and_then(|doc| doc.pointer("/RootFS/Layers"))
            .and_then(Value::as_array)
            .map(|layers| {
                layers
                    .iter()
                    .filter_map(|l| l.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    fn prune_build_cache(&self) -> Cmd {
        Cmd::new(self.name()).args(["buildx", "prune", "-af"])
    }

    fn prune_system(&self) -> Cmd {
        Cmd::new(self.name()).args(["system", "prune", "-af", "--volumes"])
    }

    /// How a locally built image is referenced from another build.
    fn local_reference(&self, image: &str) -> String {
        image.to_string()
    }
}

/// An engine this tool has no output parsers for. Commands are still
/// issued under its name; listings come back empty.
pub struct GenericEngine {
    name: String,
}

impl GenericEngine {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Engine for GenericEngine {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Look up the backend for an engine identifier.
pub fn for_name(name: &str) -> Box<dyn Engine> {
    match name {
        "docker" => Box::new(DockerEngine),
        "podman" => Box::new(PodmanEngine),
        other => Box::new(GenericEngine::new(other)),
    }
}

/// Split engine JSON output into objects. Handles both one object per line
/// and a single top-level array; empty output yields no objects.
pub(crate) fn json_documents(stdout: &str) -> Result<Vec<Value>> {
    let mut docs = Vec::new();
    for value in serde_json::Deserializer::from_str(stdout).into_iter::<Value>() {
        match value.context("Failed to parse engine JSON output")? {
            Value::Array(items) => docs.extend(items),
            other => docs.push(other),
        }
    }
    Ok(docs)
}

/// Runs engine operations through a [`Runner`], applying the failure policy:
/// builds and assemblies are checked, removals and prunes are best-effort.
pub struct EngineAdapter<'a> {
    runner: &'a dyn Runner,
}

impl<'a> EngineAdapter<'a> {
    pub fn new(runner: &'a dyn Runner) -> Self {
        Self { runner }
    }

    fn checked(&self, cmd: &Cmd) -> Result<()> {
        let code = self.runner.status(cmd)?;
        if code != 0 {
            return Err(CommandFailed {
                command: cmd.to_string(),
                code,
            }
            .into());
        }
        Ok(())
    }

    fn best_effort(&self, cmd: &Cmd) {
        match self.runner.status(cmd) {
            Ok(0) => {}
            Ok(code) => warn!(command = %cmd, code, "engine:best-effort command failed, continuing"),
            Err(e) => warn!(command = %cmd, error = %e, "engine:best-effort command did not run"),
        }
    }

    fn listing(&self, cmd: Option<Cmd>, parse: impl FnOnce(&str) -> Result<Vec<String>>) -> Vec<String> {
        let Some(cmd) = cmd else {
            return Vec::new();
        };
        let parsed = self.runner.capture(&cmd).and_then(|out| parse(&out));
        match parsed {
            Ok(items) => items,
            Err(e) => {
                warn!(command = %cmd, error = %e, "engine:listing failed");
                Vec::new()
            }
        }
    }

    pub fn build_image(
        &self,
        engine: &str,
        containerfile: &str,
        image: &str,
        build_args: &BuildArgs,
        dir: &Path,
    ) -> Result<()> {
        let cmd = for_name(engine).build(containerfile, image, build_args, dir);
        self.checked(&cmd)
            .with_context(|| format!("Failed to build {image} with {engine}"))
    }

    pub fn remove_image(&self, engine: &str, image: &str) {
        self.best_effort(&for_name(engine).remove_image(image));
    }

    pub fn stop_container(&self, engine: &str, name: &str) {
        self.best_effort(&for_name(engine).stop_container(name));
    }

    pub fn remove_container(&self, engine: &str, name: &str) {
        self.best_effort(&for_name(engine).remove_container(name));
    }

    pub fn list_running_containers(&self, engine: &str) -> Vec<String> {
        let backend = for_name(engine);
        let ids = self.listing(backend.list_running(), |out| backend.parse_running(out));
        debug!(engine, count = ids.len(), "engine:running containers");
        ids
    }

    pub fn list_image_names(&self, engine: &str) -> Vec<String> {
        let backend = for_name(engine);
        let mut names = self.listing(backend.list_images(), |out| backend.parse_image_names(out));
        names.sort();
        names
    }

    pub fn list_image_layers(&self, engine: &str, image: &str) -> Vec<String> {
        let backend = for_name(engine);
        self.listing(Some(backend.inspect_image(image)), |out| backend.parse_layers(out))
    }

    pub fn prune_build_cache(&self, engine: &str) {
        self.best_effort(&for_name(engine).prune_build_cache());
    }

    pub fn prune_system(&self, engine: &str) {
        self.best_effort(&for_name(engine).prune_system());
    }

    /// Create (or replace) a distrobox sandbox from a built image.
    pub fn assemble_sandbox(&self, engine: &str, sandbox_name: &str, dir: &Path) -> Result<()> {
        let cmd = distrobox::assemble_command(engine, sandbox_name, dir);
        self.checked(&cmd)
            .with_context(|| format!("Failed to assemble {sandbox_name} with {engine}"))
    }
}
