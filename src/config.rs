use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "ocisictl.yaml";

/// Tag applied to images that do not name one.
pub const DEFAULT_TAG: &str = "latest";

/// Name suffix marking an image as a dev variant of a base image.
pub const DEV_SUFFIX: &str = "-dx";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Image #{index} has an empty `{field}`")]
    MissingField { index: usize, field: &'static str },

    #[error("Image name `{0}` is defined more than once")]
    DuplicateName(String),
}

/// One image entry as written in the YAML file.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct ImageRecord {
    /// Unique image name, also the default sandbox name
    pub name: String,

    /// Directory holding the Containerfile(s)
    pub path: String,

    /// Whether the image takes part in a run
    pub enabled: bool,

    /// Image tag (default: latest)
    #[serde(default)]
    pub tag: Option<String>,

    /// Container engine managing this image (default: process-wide fallback)
    #[serde(default)]
    pub manager: Option<String>,

    /// Sandbox container name (default: the image name)
    #[serde(default)]
    pub distrobox: Option<String>,

    /// Assemble a sandbox from the image (default: true for dev images)
    #[serde(default)]
    pub assemble: Option<bool>,
}

/// An image definition with every default applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageDefinition {
    name: String,
    build_path: PathBuf,
    enabled: bool,
    tag: String,
    engine: Option<String>,
    sandbox_name: String,
    assemble: bool,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl ImageDefinition {
    pub fn from_record(record: ImageRecord) -> Self {
        let is_dev = record.name.ends_with(DEV_SUFFIX);
        let sandbox_name = non_empty(record.distrobox).unwrap_or_else(|| record.name.clone());
        Self {
            build_path: PathBuf::from(record.path),
            enabled: record.enabled,
            tag: non_empty(record.tag).unwrap_or_else(|| DEFAULT_TAG.to_string()),
            engine: non_empty(record.manager),
            sandbox_name,
            assemble: record.assemble.unwrap_or(is_dev),
            name: record.name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn build_path(&self) -> &Path {
        &self.build_path
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn sandbox_name(&self) -> &str {
        &self.sandbox_name
    }

    pub fn assemble(&self) -> bool {
        self.assemble
    }

    /// Dev images layer user identity on top of a base image.
    pub fn is_dev(&self) -> bool {
        self.name.ends_with(DEV_SUFFIX)
    }

    /// Name of the image a dev image extends.
    pub fn base_name(&self) -> Option<&str> {
        self.name.strip_suffix(DEV_SUFFIX)
    }

    /// `name:tag`
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.name, self.tag)
    }

    /// The configured engine, else `fallback`.
    pub fn effective_engine<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.engine.as_deref().unwrap_or(fallback)
    }
}

/// The images of one configuration file, in file order.
#[derive(Debug, Clone)]
pub struct ImageRegistry {
    images: Vec<ImageDefinition>,
    fallback_engine: String,
}

impl ImageRegistry {
    /// Build a registry from parsed records, applying defaults and
    /// rejecting empty required values and duplicate names.
    pub fn load(
        records: Vec<ImageRecord>,
        fallback_engine: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        let mut images = Vec::with_capacity(records.len());

        for (index, record) in records.into_iter().enumerate() {
            if record.name.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    index,
                    field: "name",
                });
            }
            if record.path.trim().is_empty() {
                return Err(ConfigError::MissingField {
                    index,
                    field: "path",
                });
            }
            if !seen.insert(record.name.clone()) {
                return Err(ConfigError::DuplicateName(record.name));
            }
            images.push(ImageDefinition::from_record(record));
        }

        Ok(Self {
            images,
            fallback_engine: fallback_engine.into(),
        })
    }

    /// Parse YAML text holding a sequence of image records.
    pub fn parse(contents: &str, fallback_engine: impl Into<String>) -> Result<Self, ConfigError> {
        // An empty document is an empty list, not a parse error.
        let records: Vec<ImageRecord> = if contents.trim().is_empty() {
            Vec::new()
        } else {
            serde_yaml::from_str::<Option<Vec<ImageRecord>>>(contents)?.unwrap_or_default()
        };
        Self::load(records, fallback_engine)
    }

    /// Read and parse a config file. Relative build paths are anchored at
    /// the file's directory.
    pub fn from_path(path: &Path, fallback_engine: impl Into<String>) -> Result<Self, ConfigError> {
        debug!(path = %path.display(), "config:reading file");
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut registry = Self::parse(&contents, fallback_engine)?;

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            for image in &mut registry.images {
                if image.build_path.is_relative() {
                    image.build_path = dir.join(&image.build_path);
                }
            }
        }

        debug!(images = registry.images.len(), "config:loaded");
        Ok(registry)
    }

    pub fn images(&self) -> &[ImageDefinition] {
        &self.images
    }

    /// Engine used for `image`: its own setting, else the registry fallback.
    pub fn engine_for<'a>(&'a self, image: &'a ImageDefinition) -> &'a str {
        image.effective_engine(&self.fallback_engine)
    }

    pub fn enabled(&self) -> Vec<&ImageDefinition> {
        self.images.iter().filter(|i| i.enabled).collect()
    }

    pub fn assemble_targets(&self) -> Vec<&ImageDefinition> {
        self.images
            .iter()
            .filter(|i| i.enabled && i.assemble)
            .collect()
    }

    pub fn build_only(&self) -> Vec<&ImageDefinition> {
        self.images
            .iter()
            .filter(|i| i.enabled && !i.assemble)
            .collect()
    }

    /// Engines explicitly named by any image, sorted.
    pub fn engines(&self) -> Vec<String> {
        self.images
            .iter()
            .filter_map(|i| i.engine.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Engines a run touches: the explicitly named ones, or the fallback
    /// when no image names an engine.
    pub fn engines_in_play(&self) -> Vec<String> {
        let engines = self.engines();
        if engines.is_empty() {
            vec![self.fallback_engine.clone()]
        } else {
            engines
        }
    }
}
