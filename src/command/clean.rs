use anyhow::Result;

use crate::cmd::SystemRunner;
use crate::context::RunOptions;
use crate::pipeline::Pipeline;

pub fn run(options: &RunOptions) -> Result<()> {
    let registry = super::load_registry(options)?;
    let runner = SystemRunner::new(options.verbose);
    Pipeline::new(options, &registry, &runner).clean();
    Ok(())
}
