//! Guarded edits of the deployed web front end.
//!
//! Two edit modes on one target file:
//! - full replacement, which first renames the current file to a single
//!   backup sibling (`app.py` → `app.bak`, overwriting any older backup);
//! - a targeted patch of the first `return "<text>", <status>` line, which
//!   rewrites only the quoted text and writes nothing when no line matches.
//!
//! The patch is a line-oriented text transform for the file this tool
//! generates, not a Python parser.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::console::Console;
use crate::error::{ProvisionError, Result};
use crate::host::{HostEnvironment, ServiceAction, ServiceStatus};
use crate::paths;
use crate::runner::FailureMode;

// ---------------------------------------------------------------------------
// ContentSource
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentSource {
    /// Copy the content of an existing file.
    File(PathBuf),
    /// Text captured from the console.
    Inline(String),
}

impl ContentSource {
    /// Lines typed at the console, joined with a trailing newline.
    pub fn from_lines(lines: &[String]) -> Self {
        let mut text = lines.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        ContentSource::Inline(text)
    }

    pub fn load(&self, host: &dyn HostEnvironment) -> Result<String> {
        match self {
            ContentSource::Inline(text) => Ok(text.clone()),
            ContentSource::File(path) => {
                if !host.file_exists(path) {
                    return Err(ProvisionError::FileNotFound(path.clone()));
                }
                host.read_file(path)?
                    .ok_or_else(|| ProvisionError::FileNotFound(path.clone()))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Replacement {
    pub path: PathBuf,
    /// Where the previous content went, if there was any.
    pub backup: Option<PathBuf>,
    pub bytes_written: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Patch {
    pub path: PathBuf,
    /// 1-based line number of the rewritten line.
    pub line: usize,
    pub previous: String,
    pub current: String,
}

// ---------------------------------------------------------------------------
// Return-line matching
// ---------------------------------------------------------------------------

static RETURN_LINE_RE: OnceLock<Regex> = OnceLock::new();

/// `return "<text>", <status>` with any indentation and trailing remainder.
fn return_line_re() -> &'static Regex {
    RETURN_LINE_RE.get_or_init(|| {
        Regex::new(r#"^(?P<prefix>\s*return\s+)"(?P<text>(?:[^"\\]|\\.)*)"(?P<suffix>\s*,\s*\d+.*)$"#)
            .unwrap()
    })
}

/// Locate the first `return "<text>", <status>` line.
/// Returns the 0-based line index and the quoted text as written.
pub fn find_return_line(content: &str) -> Option<(usize, String)> {
    content.lines().enumerate().find_map(|(i, line)| {
        return_line_re()
            .captures(line)
            .map(|caps| (i, caps["text"].to_string()))
    })
}

fn escape_python(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Rewrite the quoted text of the first matching line, keeping its prefix,
/// status suffix and line ending byte for byte. `None` when nothing matches.
pub fn patch_return_line(content: &str, new_text: &str) -> Option<(String, Patch)> {
    let mut out = String::with_capacity(content.len() + new_text.len());
    let mut patch = None;

    for (i, raw) in content.split_inclusive('\n').enumerate() {
        if patch.is_some() {
            out.push_str(raw);
            continue;
        }
        let body = raw.trim_end_matches(['\n', '\r']);
        let ending = &raw[body.len()..];
        match return_line_re().captures(body) {
            Some(caps) => {
                let replaced = format!(
                    "{}\"{}\"{}",
                    &caps["prefix"],
                    escape_python(new_text),
                    &caps["suffix"]
                );
                patch = Some(Patch {
                    path: PathBuf::new(),
                    line: i + 1,
                    previous: caps["text"].to_string(),
                    current: new_text.to_string(),
                });
                out.push_str(&replaced);
                out.push_str(ending);
            }
            None => out.push_str(raw),
        }
    }

    patch.map(|p| (out, p))
}

// ---------------------------------------------------------------------------
// GuardedFile
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct GuardedFile {
    path: PathBuf,
    backup_extension: String,
}

impl GuardedFile {
    pub fn new(path: impl Into<PathBuf>, backup_extension: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            backup_extension: backup_extension.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backup_path(&self) -> PathBuf {
        paths::backup_path(&self.path, &self.backup_extension)
    }

    /// Replace the whole file with `source`, keeping one backup generation.
    ///
    /// The source is loaded before anything is touched, so a missing source
    /// file leaves both the target and the existing backup as they were.
    pub fn replace(&self, host: &dyn HostEnvironment, source: &ContentSource) -> Result<Replacement> {
        let content = source.load(host)?;

        let backup = if host.file_exists(&self.path) {
            let backup = self.backup_path();
            info!(
                "backing up {} to {}",
                self.path.display(),
                backup.display()
            );
            host.rename(&self.path, &backup)?;
            Some(backup)
        } else {
            None
        };

        host.write_file(&self.path, &content)?;
        info!("replaced {}", self.path.display());
        Ok(Replacement {
            path: self.path.clone(),
            backup,
            bytes_written: content.len(),
        })
    }

    /// Rewrite the message of the first `return "...", <status>` line.
    pub fn patch_message(&self, host: &dyn HostEnvironment, new_text: &str) -> Result<Patch> {
        let content = host
            .read_file(&self.path)?
            .ok_or_else(|| ProvisionError::FileNotFound(self.path.clone()))?;

        let Some((updated, mut patch)) = patch_return_line(&content, new_text) else {
            warn!(
                "no 'return \"...\", <status>' line in {}; nothing changed",
                self.path.display()
            );
            return Err(ProvisionError::NoMatch(self.path.clone()));
        };

        host.write_file(&self.path, &updated)?;
        patch.path = self.path.clone();
        info!("landing message updated to: {new_text}");
        Ok(patch)
    }
}

// ---------------------------------------------------------------------------
// Service coordination
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopOutcome {
    Stopped,
    /// Running, but the operator chose to leave it up.
    LeftRunning,
    NotRunning(String),
}

/// Query the service live and offer to stop it only when it is active.
pub fn stop_if_active(
    host: &dyn HostEnvironment,
    console: &mut dyn Console,
    service: &str,
) -> Result<StopOutcome> {
    info!("checking status of service '{service}'");
    match host.service_status(service)? {
        ServiceStatus::Active => {
            if console.confirm(&format!("Stop service '{service}' before editing the site?"))? {
                host.set_service_state(service, ServiceAction::Stop, FailureMode::FailFast)?;
                info!("service '{service}' stopped");
                Ok(StopOutcome::Stopped)
            } else {
                Ok(StopOutcome::LeftRunning)
            }
        }
        ServiceStatus::Inactive(state) => {
            info!("service '{service}' is {state}; nothing to stop");
            Ok(StopOutcome::NotRunning(state))
        }
    }
}

/// Restart without failing the caller. Returns whether the restart succeeded.
pub fn restart_best_effort(host: &dyn HostEnvironment, service: &str) -> Result<bool> {
    info!("restarting service '{service}'");
    let result = host.set_service_state(service, ServiceAction::Restart, FailureMode::BestEffort)?;
    if !result.is_success() {
        warn!("restart of '{service}' failed; restart it manually");
    }
    Ok(result.is_success())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
