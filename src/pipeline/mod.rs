//! The build → assemble → clean pipeline.
//!
//! Every step runs sequentially against the external engine. A failed build
//! aborts the run; removals and prunes are best-effort; a failed assembly is
//! reported after the remaining sandboxes and the cleaning stage ran.

mod build;
mod clean;

use anyhow::Result;
use std::fmt;
use std::io::Write;
use tracing::{debug, error, info, warn};

use crate::cmd::Runner;
use crate::config::ImageRegistry;
use crate::context::RunOptions;
use crate::engine::EngineAdapter;
use crate::spinner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Pruning,
    Building,
    Settling,
    Assembling,
    Cleaning,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Pruning => "pruning",
            Stage::Building => "building",
            Stage::Settling => "settling",
            Stage::Assembling => "assembling",
            Stage::Cleaning => "cleaning",
        };
        f.write_str(name)
    }
}

pub struct Pipeline<'a> {
    options: &'a RunOptions,
    registry: &'a ImageRegistry,
    runner: &'a dyn Runner,
    adapter: EngineAdapter<'a>,
}

impl<'a> Pipeline<'a> {
    pub fn new(options: &'a RunOptions, registry: &'a ImageRegistry, runner: &'a dyn Runner) -> Self {
        Self {
            options,
            registry,
            runner,
            adapter: EngineAdapter::new(runner),
        }
    }

    fn stage<T>(&self, stage: Stage, f: impl FnOnce() -> Result<T>) -> Result<T> {
        info!(%stage, "pipeline:stage start");
        let result = f();
        match &result {
            Ok(_) => info!(%stage, "pipeline:stage done"),
            Err(e) => error!(%stage, error = ?e, "pipeline:stage failed"),
        }
        result
    }

    /// Full run: prune (optional), build, settle, assemble, clean (optional).
    pub fn process(&self) -> Result<()> {
        if self.options.prune_before_run {
            self.stage(Stage::Pruning, || {
                self.prune();
                Ok(())
            })?;
        }

        self.stage(Stage::Building, || self.build())?;

        self.stage(Stage::Settling, || {
            spinner::wait("Allowing the engine to settle", self.options.settle);
            Ok(())
        })?;

        let assembled = self.stage(Stage::Assembling, || self.assemble());

        if self.options.skip_clean_after_run {
            warn!("Skipping clean up of build artifacts (--skip-clean)");
        } else {
            self.stage(Stage::Cleaning, || {
                self.clean();
                Ok(())
            })?;
        }

        assembled
    }

    /// Stop every running container and prune each engine in play.
    pub fn prune(&self) {
        for engine in self.registry.engines_in_play() {
            info!(engine, "Shutting down and pruning");
            for id in self.adapter.list_running_containers(&engine) {
                self.adapter.stop_container(&engine, &id);
            }
            self.adapter.prune_system(&engine);
            self.adapter.prune_build_cache(&engine);
        }
    }

    /// Assemble a sandbox for every enabled assemble target. Keeps going
    /// after a failure and returns the last one.
    pub fn assemble(&self) -> Result<()> {
        let mut last_failure = None;
        for image in self.registry.assemble_targets() {
            let engine = self.registry.engine_for(image);
            info!(sandbox = image.sandbox_name(), engine, "Assembling");
            if let Err(e) =
                self.adapter
                    .assemble_sandbox(engine, image.sandbox_name(), self.options.workdir())
            {
                error!(sandbox = image.sandbox_name(), error = ?e, "Assembly failed");
                last_failure = Some(e);
            }
        }
        match last_failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Print the layer digests of every image each engine in play holds.
    pub fn list_layers(&self, out: &mut impl Write) -> Result<()> {
        for engine in self.registry.engines_in_play() {
            let names = self.adapter.list_image_names(&engine);
            debug!(engine, images = ?names, "pipeline:layers");
            for name in names {
                writeln!(out, "\n{engine} - {name}")?;
                for layer in self.adapter.list_image_layers(&engine, &name) {
                    writeln!(out, "{layer}")?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cmd::fake::RecordingRunner;
    use crate::context::{EXPORT_HELPER, Mode};
    use crate::engine::CommandFailed;
    use std::time::Duration;

    const BASE_AND_DEV: &str = r#"
- name: base
  path: /img
  enabled: true
- name: base-dx
  path: /img
  enabled: true
"#;

    fn options() -> RunOptions {
        RunOptions {
            settle: Duration::ZERO,
            ..RunOptions::new(Mode::Process, "/cfg/ocisictl.yaml")
        }
    }

    const DEV_BUILD: &str = "docker buildx build -f Containerfile.img-dx -t base-dx:latest \
        --build-arg USER=user --build-arg UID=1000 --build-arg GID=1000 \
        --build-arg IMG=base --build-arg TAG=latest .";

    #[test]
    fn full_run_issues_commands_in_order() {
        let registry = ImageRegistry::parse(BASE_AND_DEV, "docker").unwrap();
        let options = options();
        let runner = RecordingRunner::new();
        Pipeline::new(&options, &registry, &runner).process().unwrap();

        assert_eq!(
            runner.lines(),
            vec![
                "docker stop base",
                "docker rm -f --volumes base",
                "docker rmi -f base:latest",
                "docker buildx build -f Containerfile.base -t base:latest .",
                "docker stop base-dx",
                "docker rm -f --volumes base-dx",
                "docker rmi -f base-dx:latest",
                DEV_BUILD,
                "DBX_CONTAINER_ALWAYS_PULL=0 DBX_CONTAINER_MANAGER=docker distrobox assemble create --replace --name base-dx",
                "docker rmi -f base:latest",
                "docker buildx prune -af",
            ]
        );
    }

    #[test]
    fn builds_run_in_image_directory() {
        let registry = ImageRegistry::parse(BASE_AND_DEV, "docker").unwrap();
        let options = options();
        let runner = RecordingRunner::new();
        Pipeline::new(&options, &registry, &runner).process().unwrap();

        let build = runner
            .calls()
            .into_iter()
            .find(|c| c.get_args().first().map(String::as_str) == Some("buildx"))
            .unwrap();
        assert_eq!(build.get_workdir(), Some(std::path::Path::new("/img")));
    }

    #[test]
    fn prune_replaces_per_image_cleanup() {
        let registry = ImageRegistry::parse(BASE_AND_DEV, "docker").unwrap();
        let options = RunOptions {
            prune_before_run: true,
            skip_clean_after_run: true,
            ..options()
        };
        let runner = RecordingRunner::new().with_output(
            "docker ps",
            "{\"ID\":\"aaa\"}\n{\"ID\":\"bbb\"}\n",
        );
        Pipeline::new(&options, &registry, &runner).process().unwrap();

        assert_eq!(
            runner.lines(),
            vec![
                "docker ps --format json",
                "docker stop aaa",
                "docker stop bbb",
                "docker system prune -af --volumes",
                "docker buildx prune -af",
                "docker buildx build -f Containerfile.base -t base:latest .",
                DEV_BUILD,
                "DBX_CONTAINER_ALWAYS_PULL=0 DBX_CONTAINER_MANAGER=docker distrobox assemble create --replace --name base-dx",
            ]
        );
    }

    #[test]
    fn prune_covers_every_named_engine() {
        let yaml = r#"
- name: a
  path: .
  enabled: true
  manager: podman
- name: b
  path: .
  enabled: false
  manager: docker
"#;
        let registry = ImageRegistry::parse(yaml, "docker").unwrap();
        let options = options();
        let runner = RecordingRunner::new();
        Pipeline::new(&options, &registry, &runner).prune();

        assert_eq!(
            runner.lines(),
            vec![
                "docker ps --format json",
                "docker system prune -af --volumes",
                "docker buildx prune -af",
                "podman ps --format json",
                "podman system prune -af --volumes --build",
                "podman buildx prune -af",
            ]
        );
    }

    #[test]
    fn build_failure_aborts_before_assembly() {
        let registry = ImageRegistry::parse(BASE_AND_DEV, "docker").unwrap();
        let options = options();
        let runner = RecordingRunner::new().with_exit_code("docker buildx build -f Containerfile.base", 2);
        let err = Pipeline::new(&options, &registry, &runner).process().unwrap_err();

        let failed = err.chain().find_map(|e| e.downcast_ref::<CommandFailed>()).unwrap();
        assert_eq!(failed.code, 2);
        let lines = runner.lines();
        assert_eq!(lines.last().unwrap(), "docker buildx build -f Containerfile.base -t base:latest .");
        assert!(!lines.iter().any(|l| l.contains("distrobox")));
    }

    #[test]
    fn best_effort_failures_do_not_stop_the_build() {
        let registry = ImageRegistry::parse(BASE_AND_DEV, "docker").unwrap();
        let options = options();
        let runner = RecordingRunner::new()
            .with_exit_code("docker stop", 1)
            .with_exit_code("docker rmi", 1);
        Pipeline::new(&options, &registry, &runner).process().unwrap();
        assert!(runner.lines().iter().any(|l| l.contains("distrobox assemble")));
    }

    #[test]
    fn assembly_failure_still_cleans_then_reports() {
        let yaml = r#"
- name: one-dx
  path: .
  enabled: true
- name: two-dx
  path: .
  enabled: true
- name: tools
  path: .
  enabled: true
"#;
        let registry = ImageRegistry::parse(yaml, "docker").unwrap();
        let options = RunOptions {
            prune_before_run: true,
            ..options()
        };
        let runner = RecordingRunner::new().with_exit_code(
            "DBX_CONTAINER_ALWAYS_PULL=0 DBX_CONTAINER_MANAGER=docker distrobox assemble create --replace --name one-dx",
            5,
        );
        let err = Pipeline::new(&options, &registry, &runner).process().unwrap_err();
        let failed = err.chain().find_map(|e| e.downcast_ref::<CommandFailed>()).unwrap();
        assert_eq!(failed.code, 5);

        let lines = runner.lines();
        assert!(lines.iter().any(|l| l.ends_with("--name two-dx")));
        assert_eq!(lines.last().unwrap(), "docker buildx prune -af");
    }

    #[test]
    fn export_helper_is_removed_after_failed_build() {
        let dir = tempfile::tempdir().unwrap();
        let installed = dir.path().join("installed-helper");
        std::fs::write(&installed, "#!/bin/sh\n").unwrap();
        let image_dir = dir.path().join("img");
        std::fs::create_dir_all(&image_dir).unwrap();

        let yaml = "- name: base\n  path: img\n  enabled: true\n";
        let config = dir.path().join("ocisictl.yaml");
        std::fs::write(&config, yaml).unwrap();
        let registry = ImageRegistry::from_path(&config, "docker").unwrap();

        let options = RunOptions {
            settle: Duration::ZERO,
            export_helper: Some(installed.clone()),
            ..RunOptions::new(Mode::Process, &config)
        };
        let runner = RecordingRunner::new().with_exit_code("docker buildx build", 1);
        assert!(Pipeline::new(&options, &registry, &runner).process().is_err());

        assert!(!dir.path().join(EXPORT_HELPER).exists());
        assert!(!image_dir.join(EXPORT_HELPER).exists());
        assert!(installed.exists());
    }

    #[test]
    fn list_layers_prints_per_image_header() {
        let registry = ImageRegistry::parse(BASE_AND_DEV, "podman").unwrap();
        let options = options();
        let runner = RecordingRunner::new()
            .with_output(
                "podman image ls",
                r#"[{"Names":["localhost/base:latest"]}]"#,
            )
            .with_output(
                "podman inspect",
                r#"[{"RootFS":{"Layers":["sha256:one","sha256:two"]}}]"#,
            );
        let mut out = Vec::new();
        Pipeline::new(&options, &registry, &runner)
            .list_layers(&mut out)
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "\npodman - localhost/base:latest\nsha256:one\nsha256:two\n"
        );
    }

    #[test]
    fn list_layers_on_unknown_engine_prints_nothing() {
        let registry = ImageRegistry::parse(BASE_AND_DEV, "nerdctl").unwrap();
        let options = options();
        let runner = RecordingRunner::new();
        let mut out = Vec::new();
        Pipeline::new(&options, &registry, &runner)
            .list_layers(&mut out)
            .unwrap();
        assert!(out.is_empty());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::Settling.to_string(), "settling");
        assert_eq!(Stage::Cleaning.to_string(), "cleaning");
    }
}
