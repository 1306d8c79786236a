use crate::command::args::{CommonArgs, ListSelection, ProcessArgs};
use crate::context::{Mode, RunOptions};
use crate::{command, logger};
use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{Shell, generate};
use std::time::Duration;
use tracing::debug;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "ocisictl")]
#[command(about = "Build OCI images from a declarative list and assemble distrobox sandboxes from them")]
#[command(after_help = "The fallback engine is read from DBX_CONTAINER_MANAGER (default: docker).")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List information about the configuration or the system
    List {
        #[command(flatten)]
        selection: ListSelection,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Create images and assemble sandboxes
    Process {
        #[command(flatten)]
        args: ProcessArgs,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Clean up build-only images and build cache
    Clean {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Generate shell completions
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Turn parsed arguments into run options. `None` for commands that do
/// not touch a configuration.
fn resolve(command: Commands) -> Option<RunOptions> {
    let options = match command {
        Commands::List { selection, common } => RunOptions {
            verbose: common.verbose,
            ..RunOptions::from_env(selection.mode(), Some(common.file))
        },
        Commands::Process { args, common } => RunOptions {
            verbose: common.verbose,
            prune_before_run: args.prune,
            skip_clean_after_run: args.skip_clean,
            settle: Duration::from_secs(args.settle),
            ..RunOptions::from_env(Mode::Process, Some(common.file))
        },
        Commands::Clean { common } => RunOptions {
            verbose: common.verbose,
            ..RunOptions::from_env(Mode::Clean, Some(common.file))
        },
        Commands::Completions { shell } => {
            generate_completions(shell);
            return None;
        }
    };
    Some(options)
}

// --- Public Entry Point ---
pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let Some(options) = resolve(cli.command) else {
        return Ok(());
    };

    logger::init(options.verbose)?;
    debug!(args = ?std::env::args().collect::<Vec<_>>(), "ocisictl start");
    debug!(
        config = %options.config_file.display(),
        mode = ?options.mode,
        engine = %options.fallback_engine,
        prune = options.prune_before_run,
        skip_clean = options.skip_clean_after_run,
        "ocisictl options"
    );

    command::dispatch(&options)
}

fn generate_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}
