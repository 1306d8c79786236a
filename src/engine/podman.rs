use anyhow::Result;
use serde_json::Value;

use super::{Engine, json_documents};
use crate::cmd::Cmd;

/// Podman prints a single JSON array for `--format json` listings and
/// stores local builds under `localhost/`.
pub struct PodmanEngine;

impl Engine for PodmanEngine {
    fn name(&self) -> &str {
        "podman"
    }

    fn list_running(&self) -> Option<Cmd> {
        Some(Cmd::new("podman").args(["ps", "--format", "json"]))
    }

    fn parse_running(&self, stdout: &str) -> Result<Vec<String>> {
        Ok(json_documents(stdout)?
            .iter()
            .filter_map(|c| c.get("Id").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    fn list_images(&self) -> Option<Cmd> {
        Some(Cmd::new("podman").args(["image", "ls", "--format", "json"]))
    }

    fn parse_image_names(&self, stdout: &str) -> Result<Vec<String>> {
        Ok(json_documents(stdout)?
            .iter()
            .filter_map(|image| image.get("Names").and_then(Value::as_array))
            .filter_map(|names| names.first().and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    // Podman keeps the build cache unless asked.
    fn prune_system(&self) -> Cmd {
        Cmd::new("podman").args(["system", "prune", "-af", "--volumes", "--build"])
    }

    fn local_reference(&self, image: &str) -> String {
        format!("localhost/{image}")
    }
}
