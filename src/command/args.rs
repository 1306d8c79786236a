use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_FILE;
use crate::context::{DEFAULT_SETTLE, Mode};

#[derive(clap::Args, Debug)]
pub struct CommonArgs {
    /// Configuration FILE
    #[arg(
        short = 'f',
        long = "file",
        value_name = "FILE",
        default_value = DEFAULT_CONFIG_FILE,
        value_hint = clap::ValueHint::FilePath
    )]
    pub file: PathBuf,

    /// Enable verbose output (echo every engine command)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
pub struct ListSelection {
    /// List all images
    #[arg(long)]
    pub all: bool,

    /// List enabled images that get a sandbox
    #[arg(short = 'a', long)]
    pub assemble: bool,

    /// List enabled images
    #[arg(short = 'e', long)]
    pub enabled: bool,

    /// List layers of every image the engines hold
    #[arg(short = 'l', long)]
    pub layers: bool,
}

impl ListSelection {
    pub fn mode(&self) -> Mode {
        if self.layers {
            Mode::ListLayers
        } else if self.assemble {
            Mode::ListAssemble
        } else if self.enabled {
            Mode::ListEnabled
        } else {
            Mode::ListAll
        }
    }
}

#[derive(clap::Args, Debug)]
pub struct ProcessArgs {
    /// Stop running containers and prune the engines before building
    #[arg(short = 'p', long)]
    pub prune: bool,

    /// Keep build-only images and build cache after the run
    #[arg(short = 's', long)]
    pub skip_clean: bool,

    /// Seconds to wait between building and assembling
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_SETTLE.as_secs())]
    pub settle: u64,
}
