pub mod config;
pub mod deploy;
pub mod setup;
pub mod update;

use anyhow::Context;
use onionctl_core::config::{Config, WarnLevel};
use onionctl_core::console::{Console, LineConsole};
use onionctl_core::host::SystemHost;
use std::path::Path;
use tracing::warn;

/// Load the configuration for a workflow. Validation errors stop the run
/// before anything touches the host; warnings are only logged.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let config = Config::load(path).context("failed to load config")?;
    let warnings = config.validate();
    let mut errors = Vec::new();
    for w in warnings {
        match w.level {
            WarnLevel::Warning => warn!("config: {}", w.message),
            WarnLevel::Error => errors.push(w.message),
        }
    }
    if !errors.is_empty() {
        anyhow::bail!("invalid configuration: {}", errors.join("; "));
    }
    Ok(config)
}

/// Privilege pre-flight, done once before any step runs.
pub fn host() -> anyhow::Result<SystemHost> {
    SystemHost::detect().context("onionctl must run as root or with sudo available")
}

/// Run `f` against the terminal. Under `--json` prompts go to stderr so that
/// stdout carries only the report.
pub fn with_console<T>(json: bool, f: impl FnOnce(&mut dyn Console) -> T) -> T {
    if json {
        let mut console = LineConsole::new(std::io::stdin().lock(), std::io::stderr());
        f(&mut console)
    } else {
        let mut console = LineConsole::stdio();
        f(&mut console)
    }
}
