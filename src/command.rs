//! Abstraction over external command execution.
//!
//! [`CommandRunner`] allows swapping the real system command execution
//! ([`SystemCommandRunner`]) with a mock in tests. Every interaction with karaf
//! goes through its command line client, which is unavailable in CI.
//! Injecting a [`CommandRunner`] makes the property and feature handlers
//! testable without a running container.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use shell_words::split;
use tracing::debug;

/// Exit code, standard output and standard error of a finished command.
#[derive(Serialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Exit code (`-1` when the process was killed by a signal)
    pub code: i32,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl CommandOutput {
    /// Build an output, mostly useful in tests.
    pub fn new(code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }
    }

    /// `true` when the command exited with code 0.
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Trait for running a command line and capturing its result.
#[cfg_attr(test, mockall::automock)]
pub trait CommandRunner: Send + Sync {
    /// Run `command_line` synchronously and return its exit code and outputs.
    ///
    /// The line is split into words with shell quoting rules but is not
    /// interpreted by a shell.
    fn run(&self, command_line: &str) -> Result<CommandOutput>;
}

/// Default implementation that delegates to [`std::process::Command`].
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, command_line: &str) -> Result<CommandOutput> {
        let params = split(command_line)
            .with_context(|| format!("Splitting command line {command_line}"))?;
        if params.is_empty() {
            bail!("Empty command line");
        }
        debug!("Running command {:?}", params);
        let output = std::process::Command::new(&params[0])
            .args(&params[1..])
            .output()
            .with_context(|| format!("Running {}", &params[0]))?;
        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
