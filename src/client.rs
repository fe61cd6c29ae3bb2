//! Invocation of the karaf command line client.
//!
//! Karaf shell commands are passed as a single quoted argument to the client
//! binary. Several commands issued in one pass are joined with `&&` so that a
//! single client process (and a single ssh session to karaf) runs them all.
use crate::command::{CommandOutput, CommandRunner, SystemCommandRunner};
use anyhow::{Context, Result};
use derivative::Derivative;
use serde::Serialize;
use tracing::debug;

/// Default location of the karaf client binary.
pub const DEFAULT_CLIENT_BIN: &str = "/opt/karaf/bin/client";

/// Separator used to chain karaf shell commands.
const COMMAND_SEPARATOR: &str = " && ";

/// Marker preceding the human readable cause in karaf error messages.
const REASON_MARKER: &str = "reason: ";

/// A command line that was run, along with what it produced.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Full command line given to the runner
    pub cmd: String,
    /// Exit code and outputs
    #[serde(flatten)]
    pub output: CommandOutput,
}

/// Karaf client bound to a binary path and a [`CommandRunner`].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct KarafClient {
    bin: String,
    #[derivative(Debug = "ignore")]
    runner: Box<dyn CommandRunner>,
}

impl KarafClient {
    /// Create a client running `bin` as a real process.
    pub fn new(bin: impl Into<String>) -> Self {
        Self::with_runner(bin, Box::new(SystemCommandRunner))
    }

    /// Create a client with a custom command runner.
    pub fn with_runner(bin: impl Into<String>, runner: Box<dyn CommandRunner>) -> Self {
        KarafClient {
            bin: bin.into(),
            runner,
        }
    }

    /// Path of the client binary.
    pub fn bin(&self) -> &str {
        &self.bin
    }

    /// Build `<bin> "<cmd1> && <cmd2> ..."`.
    ///
    /// ```
    /// use lib::client::KarafClient;
    /// let client = KarafClient::new("/opt/karaf/bin/client");
    /// assert_eq!(
    ///     client.joined_command_line(&["a 1".to_string(), "b 2".to_string()]),
    ///     r#"/opt/karaf/bin/client "a 1 && b 2""#
    /// );
    /// ```
    pub fn joined_command_line(&self, commands: &[String]) -> String {
        format!("{} \"{}\"", self.bin, commands.join(COMMAND_SEPARATOR))
    }

    /// Build `<bin> '<cmd>'`.
    pub fn quoted_command_line(&self, command: &str) -> String {
        format!("{} '{}'", self.bin, command)
    }

    /// Run all `commands` in a single client invocation.
    pub fn run_joined(&self, commands: &[String]) -> Result<Invocation> {
        self.invoke(self.joined_command_line(commands))
    }

    /// Run a single `command` in its own client invocation.
    pub fn run_quoted(&self, command: &str) -> Result<Invocation> {
        self.invoke(self.quoted_command_line(command))
    }

    fn invoke(&self, cmd: String) -> Result<Invocation> {
        debug!("Invoking karaf client: {}", cmd);
        let output = self
            .runner
            .run(&cmd)
            .with_context(|| format!("Running karaf client {}", self.bin))?;
        debug!("Exit code {} for {}", output.code, cmd);
        Ok(Invocation { cmd, output })
    }
}

/// Extract the cause of a failed karaf command.
///
/// Returns what follows the `reason: ` marker, or the whole output when there
/// is no such marker.
///
/// ```
/// use lib::client::parse_error;
/// assert_eq!(
///     parse_error("Error executing command: reason: No matching features for foo\n"),
///     "No matching features for foo"
/// );
/// assert_eq!(parse_error("boom"), "boom");
/// ```
pub fn parse_error(output: &str) -> String {
    match output.find(REASON_MARKER) {
        Some(i) => output[i + REASON_MARKER.len()..].trim().to_owned(),
        None => output.to_owned(),
    }
}
