//! In-place edit of the deployed web front end.
//!
//! Linear flow: locate the app, optionally stop its service, replace the
//! file or patch its landing message, optionally restart. A missing app
//! directory or app file ends the run; a missing replacement source or an
//! unpatchable file only cancels the edit.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::console::Console;
use crate::error::{ProvisionError, Result};
use crate::host::HostEnvironment;
use crate::mutator::{self, ContentSource, GuardedFile, Patch, Replacement, StopOutcome};

use super::banner;

const MANUAL: &str = "manual";

pub fn title() -> String {
    banner(&["Wizard to update the web site content or code"])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditMode {
    Replace,
    Patch,
}

impl EditMode {
    pub fn parse(selection: &str) -> Option<Self> {
        match selection.trim() {
            "1" => Some(EditMode::Replace),
            "2" => Some(EditMode::Patch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum EditOutcome {
    Replaced(Replacement),
    Patched(Patch),
    /// Nothing was written.
    Unchanged { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub app_file: PathBuf,
    pub service: String,
    pub stop: StopOutcome,
    pub mode: Option<EditMode>,
    pub edit: EditOutcome,
    /// `None` when no restart was requested.
    pub restarted: Option<bool>,
}

pub fn run(
    config: &Config,
    host: &dyn HostEnvironment,
    console: &mut dyn Console,
) -> Result<UpdateReport> {
    let default_dir = config.app.dir.display().to_string();
    let dir = PathBuf::from(console.ask("Path to your web app directory?", &default_dir)?);
    if !host.file_exists(&dir) {
        error!("directory not found: {}", dir.display());
        return Err(ProvisionError::FileNotFound(dir));
    }
    let app_file = config.app.app_file(&dir);
    if !host.file_exists(&app_file) {
        error!("app file not found at {}", app_file.display());
        return Err(ProvisionError::FileNotFound(app_file));
    }

    let service = console.ask("systemd service name?", &config.app.service)?;
    let stop = mutator::stop_if_active(host, console, &service)?;

    console.say("")?;
    console.say("Choose an edit mode:")?;
    console.say("1) Replace the entire file with new code.")?;
    console.say("2) Just update the landing page text (the string returned at '/').")?;
    let selection = console.read_line("Select [1/2]: ")?;

    let file = GuardedFile::new(app_file.clone(), config.app.backup_extension.as_str());
    let mode = EditMode::parse(&selection);
    let edit = match mode {
        Some(EditMode::Replace) => replace(&file, host, console)?,
        Some(EditMode::Patch) => patch(&file, host, console)?,
        None => {
            info!("invalid selection; exiting without changes");
            return Ok(UpdateReport {
                app_file,
                service,
                stop,
                mode: None,
                edit: EditOutcome::Unchanged {
                    reason: format!("invalid selection '{}'", selection.trim()),
                },
                restarted: None,
            });
        }
    };

    let restarted = if console.confirm(&format!("Restart systemd service '{service}' now?"))? {
        Some(mutator::restart_best_effort(host, &service)?)
    } else {
        info!("skipping service restart; restart it manually for changes to take effect");
        None
    };

    Ok(UpdateReport {
        app_file,
        service,
        stop,
        mode,
        edit,
        restarted,
    })
}

fn replace(
    file: &GuardedFile,
    host: &dyn HostEnvironment,
    console: &mut dyn Console,
) -> Result<EditOutcome> {
    info!("replacing the entire application file");
    console.say("Option 1: provide the path to a local file with the new code.")?;
    console.say("Option 2: enter 'manual' to type the code here.")?;
    let choice = console.read_line("Enter file path or 'manual': ")?;
    let choice = choice.trim();

    let source = if choice.eq_ignore_ascii_case(MANUAL) {
        let lines = console.read_block("> Start typing your code (empty line to finish):")?;
        ContentSource::from_lines(&lines)
    } else {
        ContentSource::File(PathBuf::from(choice))
    };

    match file.replace(host, &source) {
        Ok(replacement) => Ok(EditOutcome::Replaced(replacement)),
        Err(ProvisionError::FileNotFound(path)) => {
            error!("file not found: {}; aborting replacement", path.display());
            Ok(EditOutcome::Unchanged {
                reason: format!("source not found: {}", path.display()),
            })
        }
        Err(e) => Err(e),
    }
}

fn patch(
    file: &GuardedFile,
    host: &dyn HostEnvironment,
    console: &mut dyn Console,
) -> Result<EditOutcome> {
    info!("editing only the landing page text");
    let message = console.read_line("Enter new site message (without quotes): ")?;
    let message = message.trim();
    if message.is_empty() {
        info!("no new message provided; skipping");
        return Ok(EditOutcome::Unchanged {
            reason: "empty message".to_string(),
        });
    }

    match file.patch_message(host, message) {
        Ok(patch) => Ok(EditOutcome::Patched(patch)),
        Err(ProvisionError::NoMatch(path)) => {
            warn!("could not find a 'return \"...\", <status>' line to replace");
            Ok(EditOutcome::Unchanged {
                reason: format!("no return line in {}", path.display()),
            })
        }
        Err(e) => Err(e),
    }
}

pub fn summary(report: &UpdateReport) -> String {
    let what = match &report.edit {
        EditOutcome::Replaced(r) => match &r.backup {
            Some(backup) => format!(
                "Replaced {} (previous version kept at {}).",
                r.path.display(),
                backup.display()
            ),
            None => format!("Wrote {}.", r.path.display()),
        },
        EditOutcome::Patched(p) => format!(
            "Landing message on line {} changed from \"{}\" to \"{}\".",
            p.line, p.previous, p.current
        ),
        EditOutcome::Unchanged { reason } => format!("No changes made ({reason})."),
    };
    let restart = match report.restarted {
        Some(true) => "Service restarted.".to_string(),
        Some(false) => format!("Restart failed; run: systemctl restart {}", report.service),
        None => format!("Service not restarted; run: systemctl restart {}", report.service),
    };
    format!(
        "Done!\n{what}\n{restart}\n\nTo confirm everything, visit the site or check:\n  systemctl status {}\n",
        report.service
    )
}

/// Whether `report` changed anything on disk.
pub fn changed(report: &UpdateReport) -> bool {
    !matches!(report.edit, EditOutcome::Unchanged { .. })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates;
    use crate::test_helpers::{scripted, transcript, RecordingHost};
    use std::path::Path;

    const DIR: &str = "/opt/onion_landing";
    const APP: &str = "/opt/onion_landing/app.py";

    fn deployed() -> RecordingHost {
        RecordingHost::new()
            .with_file(DIR, "")
            .with_file(APP, &templates::flask_app("Old Text", 80))
    }

    #[test]
    fn missing_directory_is_fatal() {
        let config = Config::default();
        let host = RecordingHost::new();
        let mut console = scripted(&["/nowhere"]);
        let err = run(&config, &host, &mut console).unwrap_err();
        assert!(matches!(err, ProvisionError::FileNotFound(ref p) if p == Path::new("/nowhere")));
    }

    #[test]
    fn missing_app_file_is_fatal() {
        let config = Config::default();
        let host = RecordingHost::new().with_file(DIR, "");
        let mut console = scripted(&[""]);
        let err = run(&config, &host, &mut console).unwrap_err();
        assert!(matches!(err, ProvisionError::FileNotFound(ref p) if p == Path::new(APP)));
    }

    #[test]
    fn patch_mode_rewrites_message_and_restarts() {
        let config = Config::default();
        let host = deployed().respond("systemctl is-active", 0, "active", "");
        let mut console = scripted(&["", "", "y", "2", "New Text", "y"]);
        let report = run(&config, &host, &mut console).unwrap();

        assert_eq!(report.stop, StopOutcome::Stopped);
        assert_eq!(report.mode, Some(EditMode::Patch));
        assert!(changed(&report));
        assert_eq!(report.restarted, Some(true));
        assert!(host.file(APP).unwrap().contains("    return \"New Text\", 200\n"));
        assert_eq!(
            host.commands(),
            vec![
                "systemctl is-active onion_landing",
                "systemctl stop onion_landing",
                "systemctl restart onion_landing",
            ]
        );
        assert!(summary(&report).contains("from \"Old Text\" to \"New Text\""));
    }

    #[test]
    fn manual_replacement_keeps_backup() {
        let config = Config::default();
        let host = deployed().respond("systemctl is-active", 3, "inactive", "");
        let mut console = scripted(&[
            "",
            "",
            "1",
            "manual",
            "print('one')",
            "print('two')",
            "",
            "n",
        ]);
        let report = run(&config, &host, &mut console).unwrap();

        assert_eq!(report.stop, StopOutcome::NotRunning("inactive".into()));
        assert_eq!(
            host.file(APP).as_deref(),
            Some("print('one')\nprint('two')\n")
        );
        assert_eq!(
            host.file("/opt/onion_landing/app.bak"),
            Some(templates::flask_app("Old Text", 80))
        );
        assert_eq!(report.restarted, None);
        assert!(summary(&report).contains("app.bak"));
    }

    #[test]
    fn missing_source_cancels_only_the_edit() {
        let config = Config::default();
        let host = deployed();
        let mut console = scripted(&["", "", "1", "/tmp/does-not-exist.py", "y"]);
        let report = run(&config, &host, &mut console).unwrap();

        assert!(!changed(&report));
        assert!(host.writes().is_empty());
        assert_eq!(report.restarted, Some(true));
        assert_eq!(
            host.file(APP),
            Some(templates::flask_app("Old Text", 80))
        );
    }

    #[test]
    fn unpatchable_file_writes_nothing() {
        let config = Config::default();
        let host = RecordingHost::new()
            .with_file(DIR, "")
            .with_file(APP, "print('custom app')\n");
        let mut console = scripted(&["", "", "2", "Hi", "n"]);
        let report = run(&config, &host, &mut console).unwrap();

        assert!(matches!(report.edit, EditOutcome::Unchanged { .. }));
        assert!(host.writes().is_empty());
    }

    #[test]
    fn invalid_selection_exits_without_changes() {
        let config = Config::default();
        let host = deployed();
        let mut console = scripted(&["", "", "3"]);
        let report = run(&config, &host, &mut console).unwrap();

        assert_eq!(report.mode, None);
        assert_eq!(report.restarted, None);
        assert!(host.writes().is_empty());
        assert!(!transcript(console).contains("Restart systemd service"));
    }

    #[test]
    fn restart_failure_is_reported_not_fatal() {
        let config = Config::default();
        let host = deployed().fail("systemctl restart", "unit not found");
        let mut console = scripted(&["", "", "2", "Hi", "y"]);
        let report = run(&config, &host, &mut console).unwrap();
        assert_eq!(report.restarted, Some(false));
        assert!(summary(&report).contains("Restart failed"));
    }

    #[test]
    fn edit_mode_selection() {
        assert_eq!(EditMode::parse(" 1 "), Some(EditMode::Replace));
        assert_eq!(EditMode::parse("2"), Some(EditMode::Patch));
        assert_eq!(EditMode::parse("replace"), None);
        assert_eq!(EditMode::parse(""), None);
    }
}
