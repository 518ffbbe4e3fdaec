//! Ordered, individually skippable provisioning steps.
//!
//! [`Orchestrator::run`] walks the steps in declaration order. Each step is
//! confirmed through the [`Console`]; a declined step is `Skipped`, an accepted
//! one runs its action. A fatal error ends the run immediately and is returned
//! as [`RunAborted`]; soft errors and best-effort failures mark the step
//! `FailedSoft` and the run continues.

pub mod step;

pub use step::{Action, Facts, Step, StepContext, StepRecord, StepState};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::console::Console;
use crate::error::ProvisionError;
use crate::host::HostEnvironment;

// ---------------------------------------------------------------------------
// RunReport / RunAborted
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub workflow: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepRecord>,
    pub facts: Facts,
}

impl RunReport {
    pub fn state_of(&self, id: &str) -> Option<StepState> {
        self.steps.iter().find(|s| s.id == id).map(|s| s.state)
    }

    pub fn fact(&self, key: &str) -> Option<&str> {
        self.facts.get(key).map(|s| s.as_str())
    }

    /// Fact value, or `placeholder` when the producing step did not run.
    pub fn fact_or<'s>(&'s self, key: &str, placeholder: &'s str) -> &'s str {
        self.fact(key).unwrap_or(placeholder)
    }

    pub fn count(&self, state: StepState) -> usize {
        self.steps.iter().filter(|s| s.state == state).count()
    }
}

#[derive(Debug, thiserror::Error)]
#[error("step '{step}' failed")]
pub struct RunAborted {
    pub step: String,
    #[source]
    pub source: ProvisionError,
    pub steps: Vec<StepRecord>,
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct Orchestrator<'a> {
    workflow: String,
    steps: Vec<Step<'a>>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(workflow: impl Into<String>) -> Self {
        Self {
            workflow: workflow.into(),
            steps: Vec::new(),
        }
    }

    pub fn step(mut self, step: Step<'a>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn step_ids(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.id).collect()
    }

    pub fn run(
        self,
        host: &dyn HostEnvironment,
        console: &mut dyn Console,
    ) -> Result<RunReport, RunAborted> {
        let started_at = Utc::now();
        let mut records: Vec<StepRecord> =
            self.steps.iter().map(|s| StepRecord::pending(s.id)).collect();
        let mut facts = Facts::new();

        for (i, mut step) in self.steps.into_iter().enumerate() {
            let accepted = match console.confirm(&step.prompt) {
                Ok(answer) => answer,
                Err(e) => return Err(abort(records, i, e)),
            };

            if !accepted {
                match &step.skip_notice {
                    Some(notice) => info!("{notice}"),
                    None => info!("skipping step '{}'", step.id),
                }
                records[i].state = StepState::Skipped;
                continue;
            }

            let unmet: Vec<String> = step
                .requires
                .iter()
                .filter(|dep| {
                    records[..i]
                        .iter()
                        .any(|r| r.id == **dep && r.state == StepState::Skipped)
                })
                .map(|dep| dep.to_string())
                .collect();
            for dep in &unmet {
                warn!(
                    "step '{}' runs although '{}' was skipped; its preconditions are not checked",
                    step.id, dep
                );
            }
            records[i].unmet = unmet;

            let mut ctx = StepContext {
                host,
                console: &mut *console,
                facts: &mut facts,
                warnings: Vec::new(),
            };
            let outcome = (step.action)(&mut ctx);
            let mut warnings = std::mem::take(&mut ctx.warnings);

            match outcome {
                Ok(()) if warnings.is_empty() => {
                    records[i].state = StepState::Succeeded;
                }
                Ok(()) => {
                    records[i].state = StepState::FailedSoft;
                }
                Err(e) if !e.is_fatal() => {
                    warn!("step '{}': {e}", step.id);
                    warnings.push(e.to_string());
                    records[i].state = StepState::FailedSoft;
                }
                Err(e) => {
                    records[i].warnings = warnings;
                    return Err(abort(records, i, e));
                }
            }
            records[i].warnings = warnings;
        }

        Ok(RunReport {
            workflow: self.workflow,
            started_at,
            finished_at: Utc::now(),
            steps: records,
            facts,
        })
    }
}

fn abort(mut records: Vec<StepRecord>, index: usize, source: ProvisionError) -> RunAborted {
    records[index].state = StepState::FailedFatal;
    let step = records[index].id.clone();
    error!("step '{step}' failed: {source}");
    RunAborted {
        step,
        source,
        steps: records,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
