use anyhow::{Context, Result, anyhow};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, trace};

/// A fully described external command: program, arguments, extra
/// environment and working directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cmd {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    workdir: Option<PathBuf>,
}

impl Cmd {
    /// Create a new command builder
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            workdir: None,
        }
    }

    /// Add a single argument
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Add multiple arguments
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable for the child only
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Set the working directory for the command
    pub fn workdir(mut self, path: impl AsRef<Path>) -> Self {
        self.workdir = Some(path.as_ref().to_path_buf());
        self
    }

    #[cfg(test)]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    #[cfg(test)]
    pub fn get_workdir(&self) -> Option<&Path> {
        self.workdir.as_deref()
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.envs {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Quote one word for a shell. `KEY=value` words keep the key bare so they
/// still read as assignments.
fn shell_word(word: &str) -> String {
    match word.split_once('=') {
        Some((key, value))
            if !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') =>
        {
            format!("{key}={}", shell_words::quote(value))
        }
        _ => shell_words::quote(word).into_owned(),
    }
}

/// Renders the command the way a user would type it, env assignments first.
impl fmt::Display for Cmd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words: Vec<String> = self
            .envs
            .iter()
            .map(|(k, v)| format!("{k}={}", shell_words::quote(v)))
            .chain(std::iter::once(shell_words::quote(&self.program).into_owned()))
            .chain(self.args.iter().map(|a| shell_word(a)))
            .collect();
        f.write_str(&words.join(" "))
    }
}

/// Executes external commands on behalf of the engine adapter.
///
/// Kept as a trait so tests can record invocations instead of spawning
/// a container engine.
pub trait Runner {
    /// Run with stdio inherited from this process. Returns the exit code;
    /// a child killed by a signal reports -1.
    fn status(&self, cmd: &Cmd) -> Result<i32>;

    /// Run with stdout captured. A non-zero exit is an error.
    fn capture(&self, cmd: &Cmd) -> Result<String>;
}

/// Spawns real processes.
pub struct SystemRunner {
    verbose: bool,
}

impl SystemRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    fn announce(&self, cmd: &Cmd) {
        let workdir = cmd.workdir.as_ref().map(|p| p.display().to_string());
        if self.verbose {
            info!(workdir = ?workdir, "{cmd}");
        } else {
            debug!(command = %cmd, workdir = ?workdir, "cmd:run start");
        }
    }
}

impl Runner for SystemRunner {
    fn status(&self, cmd: &Cmd) -> Result<i32> {
        self.announce(cmd);
        let status = cmd
            .to_command()
            .status()
            .with_context(|| format!("Failed to execute command: {cmd}"))?;
        let code = status.code().unwrap_or(-1);
        trace!(command = %cmd, code, "cmd:run finished");
        Ok(code)
    }

    fn capture(&self, cmd: &Cmd) -> Result<String> {
        self.announce(cmd);
        let output = cmd
            .to_command()
            .output()
            .with_context(|| format!("Failed to execute command: {cmd}"))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(
                command = %cmd,
                status = ?output.status.code(),
                stderr = %stderr.trim(),
                "cmd:capture failure"
            );
            return Err(anyhow!("Command failed: {}\n{}", cmd, stderr.trim()));
        }
        trace!(command = %cmd, "cmd:capture success");
        Ok(String::from_utf8(output.stdout)?)
    }
}

#[cfg(test)]
pub mod fake {
    use super::{Cmd, Runner};
    use anyhow::{Result, anyhow};
    use std::cell::RefCell;

    /// Records every command and answers from a script keyed by command
    /// prefix. Unscripted commands succeed with empty output.
    #[derive(Default)]
    pub struct RecordingRunner {
        calls: RefCell<Vec<Cmd>>,
        outputs: Vec<(String, String)>,
        exit_codes: Vec<(String, i32)>,
    }

    impl RecordingRunner {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_output(mut self, prefix: &str, stdout: &str) -> Self {
            self.outputs.push((prefix.to_string(), stdout.to_string()));
            self
        }

        pub fn with_exit_code(mut self, prefix: &str, code: i32) -> Self {
            self.exit_codes.push((prefix.to_string(), code));
            self
        }

        pub fn calls(&self) -> Vec<Cmd> {
            self.calls.borrow().clone()
        }

        /// Rendered command lines, in invocation order.
        pub fn lines(&self) -> Vec<String> {
            self.calls.borrow().iter().map(|c| c.to_string()).collect()
        }

        fn exit_code_for(&self, line: &str) -> i32 {
            self.exit_codes
                .iter()
                .find(|(prefix, _)| line.starts_with(prefix.as_str()))
                .map_or(0, |(_, code)| *code)
        }
    }

    impl Runner for RecordingRunner {
        fn status(&self, cmd: &Cmd) -> Result<i32> {
            self.calls.borrow_mut().push(cmd.clone());
            Ok(self.exit_code_for(&cmd.to_string()))
        }

        fn capture(&self, cmd: &Cmd) -> Result<String> {
            self.calls.borrow_mut().push(cmd.clone());
            let line = cmd.to_string();
            let code = self.exit_code_for(&line);
            if code != 0 {
                return Err(anyhow!("Command failed: {line}"));
            }
            Ok(self
                .outputs
                .iter()
                .find(|(prefix, _)| line.starts_with(prefix.as_str()))
                .map(|(_, out)| out.clone())
                .unwrap_or_default())
        }
    }
}
