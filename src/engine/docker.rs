use anyhow::Result;
use serde_json::Value;

use super::{Engine, json_documents};
use crate::cmd::Cmd;

/// Docker prints one JSON object per line for `--format json` listings.
pub struct DockerEngine;

const UNTAGGED: &str = "<none>";

impl Engine for DockerEngine {
    fn name(&self) -> &str {
        "docker"
    }

    fn list_running(&self) -> Option<Cmd> {
        Some(Cmd::new("docker").args(["ps", "--format", "json"]))
    }

    fn parse_running(&self, stdout: &str) -> Result<Vec<String>> {
        Ok(json_documents(stdout)?
            .iter()
            .filter_map(|c| c.get("ID").and_then(Value::as_str))
            .map(str::to_string)
            .collect())
    }

    fn list_images(&self) -> Option<Cmd> {
        Some(Cmd::new("docker").args(["image", "ls", "--format", "json"]))
    }

    fn parse_image_names(&self, stdout: &str) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for image in json_documents(stdout)? {
            let repository = image.get("Repository").and_then(Value::as_str).unwrap_or("");
            if repository.is_empty() || repository == UNTAGGED {
                continue;
            }
            match image.get("Tag").and_then(Value::as_str) {
                Some(tag) if !tag.is_empty() && tag != UNTAGGED => {
                    names.push(format!("{repository}:{tag}"))
                }
                _ => names.push(repository.to_string()),
            }
        }
        Ok(names)
    }
}
