use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::console::Console;
use crate::error::Result;
use crate::host::HostEnvironment;
use crate::runner::{CommandResult, FailureMode};

/// Values discovered while running steps (e.g. the onion address).
pub type Facts = BTreeMap<String, String>;

// ---------------------------------------------------------------------------
// StepState
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Skipped,
    Succeeded,
    FailedSoft,
    FailedFatal,
}

impl StepState {
    pub fn as_str(self) -> &'static str {
        match self {
            StepState::Pending => "pending",
            StepState::Skipped => "skipped",
            StepState::Succeeded => "succeeded",
            StepState::FailedSoft => "failed_soft",
            StepState::FailedFatal => "failed_fatal",
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// StepContext
// ---------------------------------------------------------------------------

/// What a step action gets to work with.
pub struct StepContext<'r> {
    pub host: &'r dyn HostEnvironment,
    pub console: &'r mut dyn Console,
    pub facts: &'r mut Facts,
    pub(crate) warnings: Vec<String>,
}

impl<'r> StepContext<'r> {
    /// Run `command` fail-fast; an error ends the whole run.
    pub fn run(&mut self, command: &str) -> Result<CommandResult> {
        self.host.run(command, FailureMode::FailFast)
    }

    /// Run `command` best-effort; a failure is recorded as a soft warning.
    pub fn best_effort(&mut self, command: &str) -> Result<CommandResult> {
        let result = self.host.run(command, FailureMode::BestEffort)?;
        Ok(self.tolerate(result))
    }

    /// Accept the outcome of a best-effort host operation, recording a failure.
    pub fn tolerate(&mut self, result: CommandResult) -> CommandResult {
        if !result.is_success() {
            self.note_failure(&result);
        }
        result
    }

    /// Record a failed best-effort result produced through `self.host`.
    pub fn note_failure(&mut self, result: &CommandResult) {
        let detail = if result.stderr.is_empty() {
            format!("'{}' failed", result.command)
        } else {
            format!("'{}' failed: {}", result.command, result.stderr)
        };
        self.warnings.push(detail);
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.warnings.push(message);
    }
}

// ---------------------------------------------------------------------------
// Step
// ---------------------------------------------------------------------------

pub type Action<'a> = Box<dyn FnMut(&mut StepContext<'_>) -> Result<()> + 'a>;

/// One optional provisioning step. Every step is gated by a yes/no question.
pub struct Step<'a> {
    pub id: &'static str,
    pub prompt: String,
    pub skip_notice: Option<String>,
    /// Steps this one logically builds on. Skipping them only produces a warning.
    pub requires: Vec<&'static str>,
    pub(crate) action: Action<'a>,
}

impl<'a> Step<'a> {
    pub fn new(
        id: &'static str,
        prompt: impl Into<String>,
        action: impl FnMut(&mut StepContext<'_>) -> Result<()> + 'a,
    ) -> Self {
        Self {
            id,
            prompt: prompt.into(),
            skip_notice: None,
            requires: Vec::new(),
            action: Box::new(action),
        }
    }

    pub fn on_skip(mut self, notice: impl Into<String>) -> Self {
        self.skip_notice = Some(notice.into());
        self
    }

    pub fn requires(mut self, ids: &[&'static str]) -> Self {
        self.requires.extend_from_slice(ids);
        self
    }
}

impl fmt::Debug for Step<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.id)
            .field("prompt", &self.prompt)
            .field("requires", &self.requires)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// StepRecord
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    pub id: String,
    pub state: StepState,
    /// Soft failures collected while the step ran.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    /// Required steps that were skipped in this run.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unmet: Vec<String>,
}

impl StepRecord {
    pub fn pending(id: &str) -> Self {
        Self {
            id: id.to_string(),
            state: StepState::Pending,
            warnings: Vec::new(),
            unmet: Vec::new(),
        }
    }
}
