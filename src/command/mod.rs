pub mod args;
pub mod clean;
pub mod list;
pub mod process;

use anyhow::{Context, Result};

use crate::config::ImageRegistry;
use crate::context::{Mode, RunOptions};

/// Load the registry named by `options`. Fails before any engine command
/// runs when the file is missing, malformed or repeats a name.
pub fn load_registry(options: &RunOptions) -> Result<ImageRegistry> {
    ImageRegistry::from_path(&options.config_file, options.fallback_engine.clone())
        .with_context(|| format!("Invalid configuration {}", options.config_file.display()))
}

/// Run the mode selected in `options`.
pub fn dispatch(options: &RunOptions) -> Result<()> {
    match options.mode {
        Mode::Process => process::run(options),
        Mode::Clean => clean::run(options),
        Mode::ListAll | Mode::ListAssemble | Mode::ListEnabled | Mode::ListLayers => {
            list::run(options)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigError;

    #[test]
    fn duplicate_names_fail_before_dispatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ocisictl.yaml");
        std::fs::write(
            &path,
            "- name: a\n  path: .\n  enabled: true\n- name: a\n  path: .\n  enabled: true\n",
        )
        .unwrap();
        let options = RunOptions::new(Mode::Process, &path);

        let err = dispatch(&options).unwrap_err();
        assert!(
            err.chain()
                .any(|e| matches!(e.downcast_ref::<ConfigError>(), Some(ConfigError::DuplicateName(_))))
        );
    }

    #[test]
    fn missing_file_is_reported_with_path() {
        let options = RunOptions::new(Mode::Clean, "/nonexistent/ocisictl.yaml");
        let err = load_registry(&options).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/ocisictl.yaml"));
    }
}
