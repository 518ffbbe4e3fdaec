//! Privileged shell command execution.
//!
//! Every host mutation goes through [`CommandRunner::run`]. Commands are opaque
//! shell strings; quoting is the caller's job. When the process is not already
//! root the command is wrapped as `sudo -- sh -c <command>`, so compound
//! commands (`a && b`) are escalated as a whole and behave the same either way.

use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Output, Stdio};

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{ProvisionError, Result};

// ---------------------------------------------------------------------------
// Privilege
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Privilege {
    /// Effective uid is already 0.
    Elevated,
    /// Commands are prefixed with this `sudo` binary.
    Sudo(PathBuf),
}

impl Privilege {
    /// Checked once before any step runs.
    pub fn detect() -> Result<Self> {
        // SAFETY: geteuid has no preconditions and cannot fail.
        let euid = unsafe { libc::geteuid() };
        if euid == 0 {
            return Ok(Privilege::Elevated);
        }
        match which::which("sudo") {
            Ok(path) => Ok(Privilege::Sudo(path)),
            Err(_) => Err(ProvisionError::Privilege(format!(
                "running as uid {euid} and no sudo binary on PATH"
            ))),
        }
    }

    pub fn is_elevated(&self) -> bool {
        matches!(self, Privilege::Elevated)
    }
}

// ---------------------------------------------------------------------------
// FailureMode / CommandResult
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// A failure ends the run.
    FailFast,
    /// A failure is logged and handed back to the caller.
    BestEffort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub command: String,
    /// `None` when the process was killed by a signal.
    pub status: Option<i32>,
    /// Captured verbatim, so `cat` output round-trips byte for byte.
    pub stdout: String,
    /// Trimmed; only ever shown in messages.
    pub stderr: String,
    pub classification: Classification,
}

impl CommandResult {
    pub fn success(command: impl Into<String>, stdout: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
            classification: Classification::Success,
        }
    }

    pub fn failed(command: impl Into<String>, status: i32, stderr: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
            classification: Classification::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.classification == Classification::Success
    }

    /// Apply `mode` to this result: a failed fail-fast command becomes an error.
    pub fn into_checked(self, mode: FailureMode) -> Result<Self> {
        if self.is_success() || mode == FailureMode::BestEffort {
            return Ok(self);
        }
        Err(ProvisionError::Command {
            command: self.command,
            status: self.status,
            stderr: self.stderr,
        })
    }

    fn from_output(command: &str, output: Output) -> Self {
        let classification = if output.status.success() {
            Classification::Success
        } else {
            Classification::Failed
        };
        Self {
            command: command.to_string(),
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            classification,
        }
    }
}

// ---------------------------------------------------------------------------
// CommandRunner
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CommandRunner {
    privilege: Privilege,
    env: Vec<(String, String)>,
}

impl CommandRunner {
    pub fn new(privilege: Privilege) -> Self {
        Self {
            privilege,
            env: vec![("DEBIAN_FRONTEND".to_string(), "noninteractive".to_string())],
        }
    }

    pub fn privilege(&self) -> &Privilege {
        &self.privilege
    }

    /// Run `command` and classify the outcome.
    ///
    /// With [`FailureMode::FailFast`] a non-zero exit is returned as
    /// [`ProvisionError::Command`]; with [`FailureMode::BestEffort`] the failed
    /// [`CommandResult`] is returned for the caller to inspect.
    pub fn run(&self, command: &str, mode: FailureMode) -> Result<CommandResult> {
        self.execute(command, None, mode)
    }

    /// Like [`run`](Self::run), feeding `input` to the command's stdin.
    pub fn run_with_input(
        &self,
        command: &str,
        input: &[u8],
        mode: FailureMode,
    ) -> Result<CommandResult> {
        self.execute(command, Some(input), mode)
    }

    fn execute(
        &self,
        command: &str,
        input: Option<&[u8]>,
        mode: FailureMode,
    ) -> Result<CommandResult> {
        info!("executing command: {command}");

        let mut cmd = self.build_command(command);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        if input.is_some() {
            cmd.stdin(Stdio::piped());
        } else {
            cmd.stdin(Stdio::null());
        }

        let mut child = cmd.spawn()?;
        if let Some(data) = input {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(data)?;
            }
        }
        let output = child.wait_with_output()?;
        let result = CommandResult::from_output(command, output);

        for line in result.stdout.lines() {
            debug!("cmd-out: {line}");
        }
        if !result.is_success() {
            match mode {
                FailureMode::FailFast => error!("command failed: {}", result.stderr),
                FailureMode::BestEffort => warn!("command failed: {}", result.stderr),
            }
        }
        result.into_checked(mode)
    }

    fn build_command(&self, command: &str) -> Command {
        let mut cmd = match &self.privilege {
            Privilege::Elevated => {
                let mut c = Command::new("sh");
                c.args(["-c", command]);
                c
            }
            Privilege::Sudo(sudo) => {
                let mut c = Command::new(sudo);
                c.args(["--preserve-env=DEBIAN_FRONTEND", "--", "sh", "-c", command]);
                c
            }
        };
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn direct() -> CommandRunner {
        CommandRunner::new(Privilege::Elevated)
    }

    #[test]
    fn zero_exit_is_success_with_stdout() {
        let result = direct().run("echo hello", FailureMode::FailFast).unwrap();
        assert!(result.is_success());
        assert_eq!(result.status, Some(0));
        assert_eq!(result.stdout, "hello\n");
    }

    #[test]
    fn compound_commands_run_in_one_shell() {
        let result = direct()
            .run("echo one && echo two", FailureMode::FailFast)
            .unwrap();
        assert_eq!(result.stdout, "one\ntwo\n");
    }

    #[test]
    fn best_effort_failure_is_returned() {
        let result = direct()
            .run("echo oops >&2; exit 3", FailureMode::BestEffort)
            .unwrap();
        assert_eq!(result.classification, Classification::Failed);
        assert_eq!(result.status, Some(3));
        assert_eq!(result.stderr, "oops");
    }

    #[test]
    fn fail_fast_failure_is_an_error() {
        let err = direct()
            .run("echo broken >&2; exit 2", FailureMode::FailFast)
            .unwrap_err();
        match err {
            ProvisionError::Command {
                command,
                status,
                stderr,
            } => {
                assert_eq!(command, "echo broken >&2; exit 2");
                assert_eq!(status, Some(2));
                assert_eq!(stderr, "broken");
            }
            other => panic!("expected command error, got {other:?}"),
        }
    }

    #[test]
    fn stdin_is_forwarded() {
        let result = direct()
            .run_with_input("cat", b"  piped text\n\n", FailureMode::FailFast)
            .unwrap();
        assert_eq!(result.stdout, "  piped text\n\n");
    }

    #[test]
    fn noninteractive_frontend_is_set() {
        let result = direct()
            .run("echo $DEBIAN_FRONTEND", FailureMode::FailFast)
            .unwrap();
        assert_eq!(result.stdout.trim(), "noninteractive");
    }

    #[test]
    fn into_checked_respects_mode() {
        let failed = CommandResult::failed("false", 1, "");
        assert!(failed.clone().into_checked(FailureMode::BestEffort).is_ok());
        assert!(failed.into_checked(FailureMode::FailFast).is_err());
        let ok = CommandResult::success("true", "");
        assert!(ok.into_checked(FailureMode::FailFast).is_ok());
    }
}
