mod cli;
mod cmd;
mod command;
mod config;
mod context;
mod distrobox;
mod engine;
mod logger;
mod pipeline;
mod spinner;

use std::process::ExitCode;

use tracing::{debug, error};

use crate::engine::CommandFailed;

/// Exit status for a failed run: the code of the failed engine command,
/// else 1.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.chain()
        .find_map(|e| e.downcast_ref::<CommandFailed>())
        .and_then(|failed| u8::try_from(failed.code).ok())
        .filter(|code| *code != 0)
        .unwrap_or(1)
}

fn main() -> ExitCode {
    match cli::run() {
        Ok(()) => {
            debug!("ocisictl finished successfully");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = ?err, "ocisictl failed");
            eprintln!("ocisictl: {err:#}");
            ExitCode::from(exit_code(&err))
        }
    }
}
