//! Test doubles for workflow and orchestrator tests.
//!
//! `RecordingHost` keeps an in-memory filesystem, records every command in
//! order and answers with canned results.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use crate::console::LineConsole;
use crate::error::Result;
use crate::host::HostEnvironment;
use crate::runner::{CommandResult, FailureMode};

struct Canned {
    prefix: String,
    status: i32,
    stdout: String,
    stderr: String,
}

struct Pending {
    path: PathBuf,
    contents: String,
    checks_left: usize,
}

#[derive(Default)]
pub struct RecordingHost {
    commands: RefCell<Vec<String>>,
    writes: RefCell<Vec<PathBuf>>,
    files: RefCell<BTreeMap<PathBuf, String>>,
    pending: RefCell<Vec<Pending>>,
    canned: Vec<Canned>,
    available: Vec<String>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands starting with `prefix` with the given status and output.
    pub fn respond(mut self, prefix: &str, status: i32, stdout: &str, stderr: &str) -> Self {
        self.canned.push(Canned {
            prefix: prefix.to_string(),
            status,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        });
        self
    }

    pub fn fail(self, prefix: &str, stderr: &str) -> Self {
        self.respond(prefix, 1, "", stderr)
    }

    pub fn with_file(self, path: impl Into<PathBuf>, contents: &str) -> Self {
        self.files
            .borrow_mut()
            .insert(path.into(), contents.to_string());
        self
    }

    /// The file shows up after `checks` existence checks have missed it.
    pub fn appears_after(self, path: impl Into<PathBuf>, contents: &str, checks: usize) -> Self {
        self.pending.borrow_mut().push(Pending {
            path: path.into(),
            contents: contents.to_string(),
            checks_left: checks,
        });
        self
    }

    pub fn with_command(mut self, name: &str) -> Self {
        self.available.push(name.to_string());
        self
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    pub fn writes(&self) -> Vec<PathBuf> {
        self.writes.borrow().clone()
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<String> {
        self.files.borrow().get(path.as_ref()).cloned()
    }

    fn answer(&self, command: &str, mode: FailureMode) -> Result<CommandResult> {
        self.commands.borrow_mut().push(command.to_string());
        let result = match self.canned.iter().find(|c| command.starts_with(&c.prefix)) {
            Some(c) if c.status == 0 => CommandResult::success(command, c.stdout.clone()),
            Some(c) => CommandResult {
                stdout: c.stdout.clone(),
                ..CommandResult::failed(command, c.status, c.stderr.clone())
            },
            None => CommandResult::success(command, ""),
        };
        result.into_checked(mode)
    }
}

impl HostEnvironment for RecordingHost {
    fn run(&self, command: &str, mode: FailureMode) -> Result<CommandResult> {
        self.answer(command, mode)
    }

    fn run_with_input(
        &self,
        command: &str,
        _input: &[u8],
        mode: FailureMode,
    ) -> Result<CommandResult> {
        self.answer(command, mode)
    }

    fn file_exists(&self, path: &Path) -> bool {
        let mut pending = self.pending.borrow_mut();
        if let Some(i) = pending.iter().position(|p| p.path == path) {
            if pending[i].checks_left == 0 {
                let p = pending.remove(i);
                self.files.borrow_mut().insert(p.path, p.contents);
            } else {
                pending[i].checks_left -= 1;
            }
        }
        self.files.borrow().contains_key(path)
    }

    fn read_file(&self, path: &Path) -> Result<Option<String>> {
        Ok(self.files.borrow().get(path).cloned())
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        self.writes.borrow_mut().push(path.to_path_buf());
        self.files
            .borrow_mut()
            .insert(path.to_path_buf(), contents.to_string());
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let mut files = self.files.borrow_mut();
        if let Some(data) = files.remove(from) {
            files.insert(to.to_path_buf(), data);
            Ok(())
        } else {
            Err(std::io::Error::new(std::io::ErrorKind::NotFound, "no such file").into())
        }
    }

    fn command_available(&self, name: &str) -> bool {
        self.available.iter().any(|a| a == name)
    }
}

pub type ScriptedConsole = LineConsole<Cursor<Vec<u8>>, Vec<u8>>;

/// Console fed from a fixed transcript, one answer per line.
pub fn scripted(answers: &[&str]) -> ScriptedConsole {
    let mut input = answers.join("\n");
    input.push('\n');
    LineConsole::new(Cursor::new(input.into_bytes()), Vec::new())
}

pub fn transcript(console: ScriptedConsole) -> String {
    String::from_utf8(console.into_output()).unwrap()
}

/// Permission bits of `path`, without the file type.
pub fn mode_of(path: &Path) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

/// Stand-in for `sudo` that drops `--preserve-env=.. --` and runs the rest
/// as the current user, so the escalated file path can be exercised unprivileged.
pub fn pass_through_sudo(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let path = dir.join("fake-sudo");
    std::fs::write(&path, "#!/bin/sh\nshift\nshift\nexec \"$@\"\n").unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
