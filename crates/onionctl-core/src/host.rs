//! Capability interface over the host: packages, services, files, firewall.
//!
//! Workflows only talk to [`HostEnvironment`]. Everything except raw command
//! execution and file access has a provided implementation expressed as shell
//! commands, so a fake only needs to record what it is asked to run.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::io::{self, shell_quote, shell_quote_path};
use crate::runner::{CommandResult, CommandRunner, FailureMode, Privilege};

// ---------------------------------------------------------------------------
// ServiceAction / ServiceStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Enable,
    Disable,
    /// `disable --now`: disable and stop in one call.
    DisableNow,
    Start,
    Stop,
    Restart,
}

impl ServiceAction {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceAction::Enable => "enable",
            ServiceAction::Disable => "disable",
            ServiceAction::DisableNow => "disable --now",
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Restart => "restart",
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Active,
    /// Anything other than `active`: inactive, failed, activating, unknown unit.
    Inactive(String),
}

impl ServiceStatus {
    /// Interpret `systemctl is-active` output. Only the exact word `active` counts.
    pub fn from_is_active(output: &str) -> Self {
        let word = output.trim();
        if word == "active" {
            ServiceStatus::Active
        } else if word.is_empty() {
            ServiceStatus::Inactive("unknown".to_string())
        } else {
            ServiceStatus::Inactive(word.to_string())
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ServiceStatus::Active)
    }
}

// ---------------------------------------------------------------------------
// FirewallRule
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    Allow,
    Deny,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum FirewallRule {
    Default { direction: Direction, policy: Policy },
    Allow { port: String },
    Deny { port: String },
}

impl FirewallRule {
    pub fn to_command(&self) -> String {
        match self {
            FirewallRule::Default { direction, policy } => {
                let policy = match policy {
                    Policy::Allow => "allow",
                    Policy::Deny => "deny",
                };
                let direction = match direction {
                    Direction::Incoming => "incoming",
                    Direction::Outgoing => "outgoing",
                };
                format!("ufw default {policy} {direction}")
            }
            FirewallRule::Allow { port } => format!("ufw allow {}", shell_quote(port)),
            FirewallRule::Deny { port } => format!("ufw deny {}", shell_quote(port)),
        }
    }
}

// ---------------------------------------------------------------------------
// HostEnvironment
// ---------------------------------------------------------------------------

pub trait HostEnvironment {
    /// Run an opaque shell command with elevated privilege.
    fn run(&self, command: &str, mode: FailureMode) -> Result<CommandResult>;

    fn run_with_input(&self, command: &str, input: &[u8], mode: FailureMode)
        -> Result<CommandResult>;

    fn file_exists(&self, path: &Path) -> bool;

    /// `Ok(None)` when the file does not exist or cannot be read.
    fn read_file(&self, path: &Path) -> Result<Option<String>>;

    /// Create parent directories as needed and replace the file's content.
    fn write_file(&self, path: &Path, contents: &str) -> Result<()>;

    /// Rename `from` to `to`, replacing `to` if it exists.
    fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Whether an executable is available on the host's PATH.
    fn command_available(&self, name: &str) -> bool;

    // -- provided operations ------------------------------------------------

    /// Refresh the package index and install `packages` in one transaction.
    fn install_packages(&self, packages: &[String], mode: FailureMode) -> Result<CommandResult> {
        let command = if packages.is_empty() {
            "apt-get update".to_string()
        } else {
            let names: Vec<String> = packages.iter().map(|p| shell_quote(p)).collect();
            format!("apt-get update && apt-get install -y {}", names.join(" "))
        };
        self.run(&command, mode)
    }

    fn purge_package(&self, package: &str, mode: FailureMode) -> Result<CommandResult> {
        self.run(&format!("apt-get purge -y {}", shell_quote(package)), mode)
    }

    fn set_service_state(
        &self,
        service: &str,
        action: ServiceAction,
        mode: FailureMode,
    ) -> Result<CommandResult> {
        self.run(
            &format!("systemctl {} {}", action.as_str(), shell_quote(service)),
            mode,
        )
    }

    /// Query live status; never fails on an inactive or unknown unit.
    fn service_status(&self, service: &str) -> Result<ServiceStatus> {
        let result = self.run(
            &format!("systemctl is-active {}", shell_quote(service)),
            FailureMode::BestEffort,
        )?;
        Ok(ServiceStatus::from_is_active(&result.stdout))
    }

    fn reload_units(&self) -> Result<CommandResult> {
        self.run("systemctl daemon-reload", FailureMode::FailFast)
    }

    fn set_firewall_rule(&self, rule: &FirewallRule, mode: FailureMode) -> Result<CommandResult> {
        self.run(&rule.to_command(), mode)
    }

    fn enable_firewall(&self, mode: FailureMode) -> Result<CommandResult> {
        self.run("ufw --force enable", mode)
    }

    fn remove_path(&self, target: &str, mode: FailureMode) -> Result<CommandResult> {
        self.run(&format!("rm -rf {target}"), mode)
    }
}

// ---------------------------------------------------------------------------
// SystemHost
// ---------------------------------------------------------------------------

/// The real machine, reached through a [`CommandRunner`].
///
/// File access uses `std::fs` when already root and falls back to `cat`,
/// `tee`, `mv` and `test -e` through the runner when escalating with sudo.
pub struct SystemHost {
    runner: CommandRunner,
}

impl SystemHost {
    pub fn new(runner: CommandRunner) -> Self {
        Self { runner }
    }

    pub fn detect() -> Result<Self> {
        Ok(Self::new(CommandRunner::new(Privilege::detect()?)))
    }

    pub fn privilege(&self) -> &Privilege {
        self.runner.privilege()
    }

    fn direct(&self) -> bool {
        self.runner.privilege().is_elevated()
    }
}

impl HostEnvironment for SystemHost {
    fn run(&self, command: &str, mode: FailureMode) -> Result<CommandResult> {
        self.runner.run(command, mode)
    }

    fn run_with_input(
        &self,
        command: &str,
        input: &[u8],
        mode: FailureMode,
    ) -> Result<CommandResult> {
        self.runner.run_with_input(command, input, mode)
    }

    fn file_exists(&self, path: &Path) -> bool {
        if self.direct() {
            return path.exists();
        }
        self.runner
            .run(
                &format!("test -e {}", shell_quote_path(path)),
                FailureMode::BestEffort,
            )
            .map(|r| r.is_success())
            .unwrap_or(false)
    }

    fn read_file(&self, path: &Path) -> Result<Option<String>> {
        if self.direct() {
            return match std::fs::read_to_string(path) {
                Ok(data) => Ok(Some(data)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
                Err(e) => Err(e.into()),
            };
        }
        let result = self.runner.run(
            &format!("cat {}", shell_quote_path(path)),
            FailureMode::BestEffort,
        )?;
        Ok(result.is_success().then_some(result.stdout))
    }

    fn write_file(&self, path: &Path, contents: &str) -> Result<()> {
        info!("writing {}", path.display());
        if self.direct() {
            return io::atomic_write(path, contents.as_bytes());
        }
        let quoted = shell_quote_path(path);
        let command = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => format!(
                "mkdir -p {} && tee {quoted} > /dev/null",
                shell_quote_path(parent)
            ),
            _ => format!("tee {quoted} > /dev/null"),
        };
        self.runner
            .run_with_input(&command, contents.as_bytes(), FailureMode::FailFast)?;
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        if self.direct() {
            std::fs::rename(from, to)?;
            return Ok(());
        }
        self.runner.run(
            &format!("mv -f {} {}", shell_quote_path(from), shell_quote_path(to)),
            FailureMode::FailFast,
        )?;
        Ok(())
    }

    fn command_available(&self, name: &str) -> bool {
        which::which(name).is_ok()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{mode_of, pass_through_sudo, RecordingHost};
    use tempfile::TempDir;

    #[test]
    fn status_requires_exact_active() {
        assert!(ServiceStatus::from_is_active("active\n").is_active());
        assert!(!ServiceStatus::from_is_active("inactive").is_active());
        assert!(!ServiceStatus::from_is_active("activating").is_active());
        assert_eq!(
            ServiceStatus::from_is_active(""),
            ServiceStatus::Inactive("unknown".to_string())
        );
    }

    #[test]
    fn firewall_rules_render_as_ufw_commands() {
        let rules = [
            FirewallRule::Default {
                direction: Direction::Outgoing,
                policy: Policy::Allow,
            },
            FirewallRule::Default {
                direction: Direction::Incoming,
                policy: Policy::Deny,
            },
            FirewallRule::Allow {
                port: "22/tcp".to_string(),
            },
            FirewallRule::Deny {
                port: "23".to_string(),
            },
        ];
        let commands: Vec<String> = rules.iter().map(FirewallRule::to_command).collect();
        assert_eq!(
            commands,
            vec![
                "ufw default allow outgoing",
                "ufw default deny incoming",
                "ufw allow 22/tcp",
                "ufw deny 23",
            ]
        );
    }

    #[test]
    fn provided_operations_issue_expected_commands() {
        let host = RecordingHost::new();
        host.install_packages(&["tor".to_string(), "ufw".to_string()], FailureMode::FailFast)
            .unwrap();
        host.set_service_state("tor", ServiceAction::Restart, FailureMode::FailFast)
            .unwrap();
        host.set_service_state("tor@default", ServiceAction::DisableNow, FailureMode::BestEffort)
            .unwrap();
        host.purge_package("tor", FailureMode::BestEffort).unwrap();
        assert_eq!(
            host.commands(),
            vec![
                "apt-get update && apt-get install -y tor ufw",
                "systemctl restart tor",
                "systemctl disable --now tor@default",
                "apt-get purge -y tor",
            ]
        );
    }

    #[test]
    fn service_status_reads_is_active_output() {
        let host = RecordingHost::new().respond("systemctl is-active web", 0, "active", "");
        assert!(host.service_status("web").unwrap().is_active());
        let host = RecordingHost::new().respond("systemctl is-active web", 3, "inactive", "");
        assert!(!host.service_status("web").unwrap().is_active());
    }

    #[test]
    fn system_host_direct_file_access() {
        let dir = TempDir::new().unwrap();
        let host = SystemHost::new(CommandRunner::new(Privilege::Elevated));
        let path = dir.path().join("etc/tor/torrc");
        assert!(!host.file_exists(&path));
        assert_eq!(host.read_file(&path).unwrap(), None);

        host.write_file(&path, "SocksPort 9050\n").unwrap();
        assert!(host.file_exists(&path));
        assert_eq!(
            host.read_file(&path).unwrap().as_deref(),
            Some("SocksPort 9050\n")
        );

        let moved = dir.path().join("etc/tor/torrc.old");
        host.rename(&path, &moved).unwrap();
        assert!(!host.file_exists(&path));
        assert!(host.file_exists(&moved));
    }

    #[test]
    fn system_host_direct_write_is_world_readable() {
        let dir = TempDir::new().unwrap();
        let host = SystemHost::new(CommandRunner::new(Privilege::Elevated));
        let path = dir.path().join("opt/onion_landing/app.py");
        host.write_file(&path, "print('hi')\n").unwrap();
        assert_eq!(mode_of(&path), 0o644);
    }

    #[test]
    fn system_host_sudo_file_access_keeps_exact_bytes() {
        let dir = TempDir::new().unwrap();
        let sudo = pass_through_sudo(dir.path());
        let host = SystemHost::new(CommandRunner::new(Privilege::Sudo(sudo)));
        let path = dir.path().join("site dir/app.py");
        let contents = "    indented()\n\n";

        assert!(!host.file_exists(&path));
        assert_eq!(host.read_file(&path).unwrap(), None);

        host.write_file(&path, contents).unwrap();
        assert!(host.file_exists(&path));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), contents);
        assert_eq!(host.read_file(&path).unwrap().as_deref(), Some(contents));

        let moved = dir.path().join("site dir/app.bak");
        host.rename(&path, &moved).unwrap();
        assert!(!host.file_exists(&path));
        assert_eq!(host.read_file(&moved).unwrap().as_deref(), Some(contents));
    }

    #[test]
    fn system_host_finds_shell() {
        let host = SystemHost::new(CommandRunner::new(Privilege::Elevated));
        assert!(host.command_available("sh"));
        assert!(!host.command_available("definitely-not-a-real-binary-7f3a"));
    }
}
