//! Single-instance tor hidden service on a fresh host.
//!
//! Steps, in order: `purge-tor`, `time-sync`, `selinux`, `install`, `torrc`,
//! `start-tor`, `secure`. The first three are best effort throughout.

use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::host::ServiceAction;
use crate::io::shell_quote_path;
use crate::orchestrator::{Orchestrator, RunReport, Step, StepContext};
use crate::paths;
use crate::poller::Poller;
use crate::runner::FailureMode;
use crate::templates;

use super::{banner, NOT_GENERATED, ONION_ADDRESS};

const TOR_PACKAGE: &str = "tor";
const SSH_SERVICE: &str = "ssh";
const FAIL2BAN_SERVICE: &str = "fail2ban";

pub fn title() -> String {
    banner(&[
        "Hidden Service Setup Wizard (tor only)",
        "Single-instance tor hidden service",
    ])
}

pub fn orchestrator(config: &Config) -> Orchestrator<'_> {
    let poller = Poller::new(config.tor.poll_interval(), config.tor.poll_timeout());
    orchestrator_with_poller(config, poller)
}

pub fn orchestrator_with_poller(config: &Config, poller: Poller) -> Orchestrator<'_> {
    let torrc = config.tor.torrc_path.display().to_string();
    Orchestrator::new("setup")
        .step(
            Step::new(
                "purge-tor",
                "Purge old tor configs (recommended for a clean setup)?",
                move |ctx| purge_tor(ctx, config),
            )
            .on_skip("Skipping old tor purge."),
        )
        .step(
            Step::new("time-sync", "Sync the system clock now?", move |ctx| {
                sync_time(ctx, config)
            })
            .on_skip("Skipping time sync. tor fails to bootstrap with a wrong clock."),
        )
        .step(
            Step::new(
                "selinux",
                "Disable SELinux if present (recommended on RHEL/CentOS)?",
                disable_selinux,
            )
            .on_skip("Skipping SELinux disable. An enforcing SELinux may block tor."),
        )
        .step(
            Step::new(
                "install",
                "Install tor, ufw, fail2ban and the other base packages now?",
                move |ctx| install_base(ctx, config),
            )
            .on_skip("Skipping package installation. Make sure tor is installed."),
        )
        .step(
            Step::new(
                "torrc",
                format!("Write a minimal {torrc} for a hidden service on port {}?", config.tor.virtual_port),
                move |ctx| write_torrc(ctx, config),
            )
            .on_skip(format!("Skipping minimal torrc. {torrc} must already be usable."))
            .requires(&["install"]),
        )
        .step(
            Step::new(
                "start-tor",
                "Enable and start single-instance tor now?",
                move |ctx| start_tor(ctx, config, poller),
            )
            .on_skip("Skipping tor start. Enable and start tor manually.")
            .requires(&["install", "torrc"]),
        )
        .step(
            Step::new(
                "secure",
                "Configure ufw, enable fail2ban and ensure SSH password auth?",
                move |ctx| secure(ctx, config),
            )
            .on_skip("Skipping security steps. Configure a firewall and fail2ban yourself.")
            .requires(&["install"]),
        )
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

fn purge_tor(ctx: &mut StepContext<'_>, config: &Config) -> Result<()> {
    info!("purging any old tor or multi-instance config");
    let host = ctx.host;
    let service = &config.tor.service;

    for unit in [format!("{service}@default"), service.clone()] {
        let result = host.set_service_state(&unit, ServiceAction::DisableNow, FailureMode::BestEffort)?;
        ctx.tolerate(result);
    }
    let result = host.remove_path(paths::TOR_INSTANCES_DIR, FailureMode::BestEffort)?;
    ctx.tolerate(result);
    let result = host.purge_package(TOR_PACKAGE, FailureMode::BestEffort)?;
    ctx.tolerate(result);

    let torrc = shell_quote_path(&config.tor.torrc_path);
    let result = host.remove_path(&format!("{torrc} {torrc}.*"), FailureMode::BestEffort)?;
    ctx.tolerate(result);
    let result = host.remove_path(
        &format!("{}/*", shell_quote_path(&config.tor.data_dir)),
        FailureMode::BestEffort,
    )?;
    ctx.tolerate(result);
    if !config.tor.hidden_service_in_data_dir() {
        let result = host.remove_path(
            &shell_quote_path(&config.tor.hidden_service_dir),
            FailureMode::BestEffort,
        )?;
        ctx.tolerate(result);
    }

    info!("old tor configs purged");
    Ok(())
}

fn sync_time(ctx: &mut StepContext<'_>, config: &Config) -> Result<()> {
    info!("syncing system clock with {}", config.packages.ntp_server);
    let host = ctx.host;
    let result = host.install_packages(&config.packages.time_sync, FailureMode::BestEffort)?;
    ctx.tolerate(result);

    let result = ctx.best_effort(&format!(
        "ntpdate -u {}",
        crate::io::shell_quote(&config.packages.ntp_server)
    ))?;
    let output = result.stdout.trim();
    if result.is_success() && !output.is_empty() {
        info!("ntpdate output: {output}");
    } else {
        warn!("time sync had no output; check network or logs");
    }

    ctx.best_effort("timedatectl set-ntp true")?;
    Ok(())
}

fn disable_selinux(ctx: &mut StepContext<'_>) -> Result<()> {
    info!("checking if SELinux is present");
    let config = std::path::Path::new(paths::SELINUX_CONFIG);
    if !(ctx.host.file_exists(config) && ctx.host.command_available("setenforce")) {
        info!("SELinux not detected; nothing to disable");
        return Ok(());
    }

    info!("SELinux detected; disabling");
    ctx.best_effort("setenforce 0")?;
    ctx.best_effort(&format!(
        "sed -i 's/^SELINUX=.*/SELINUX=disabled/' {}",
        paths::SELINUX_CONFIG
    ))?;
    info!("SELinux set to permissive/disabled; a reboot may be required");
    Ok(())
}

fn install_base(ctx: &mut StepContext<'_>, config: &Config) -> Result<()> {
    info!("installing tor and security packages");
    ctx.host
        .install_packages(&config.packages.base, FailureMode::FailFast)?;
    info!("tor and security packages installed");
    Ok(())
}

fn write_torrc(ctx: &mut StepContext<'_>, config: &Config) -> Result<()> {
    ctx.host
        .write_file(&config.tor.torrc_path, &templates::torrc(&config.tor))?;
    info!("minimal torrc ready at {}", config.tor.torrc_path.display());
    Ok(())
}

fn start_tor(ctx: &mut StepContext<'_>, config: &Config, poller: Poller) -> Result<()> {
    let host = ctx.host;
    let service = &config.tor.service;
    info!("enabling single-instance {service}.service");
    host.set_service_state(service, ServiceAction::Enable, FailureMode::FailFast)?;
    host.set_service_state(service, ServiceAction::Restart, FailureMode::FailFast)?;

    let log_dir = shell_quote_path(&config.tor.log_dir);
    ctx.best_effort(&format!("mkdir -p {log_dir} && chmod 755 {log_dir}"))?;

    let hostname = config.tor.hostname_file();
    info!(
        "waiting up to {}s for {}",
        poller.max_wait.as_secs(),
        hostname.display()
    );
    let polled = poller.await_file(host, &hostname)?;
    if !polled.found() {
        error!(
            "no {} after {}s; check 'journalctl -u {service}'",
            hostname.display(),
            poller.max_wait.as_secs()
        );
    }
    let address = polled.require(poller.max_wait)?;

    info!("your .onion address is: {address}");
    ctx.facts.insert(ONION_ADDRESS.to_string(), address);
    Ok(())
}

fn secure(ctx: &mut StepContext<'_>, config: &Config) -> Result<()> {
    info!("configuring ufw, fail2ban and SSH password auth");
    let host = ctx.host;

    for rule in &config.firewall {
        host.set_firewall_rule(rule, FailureMode::FailFast)?;
    }
    host.enable_firewall(FailureMode::FailFast)?;
    info!("ufw enabled with {} rules", config.firewall.len());

    host.set_service_state(FAIL2BAN_SERVICE, ServiceAction::Enable, FailureMode::FailFast)?;
    host.set_service_state(FAIL2BAN_SERVICE, ServiceAction::Start, FailureMode::FailFast)?;
    info!("fail2ban enabled");

    ctx.run(&format!(
        r"sed -i 's/^#\?PasswordAuthentication.*/PasswordAuthentication yes/' {}",
        paths::SSHD_CONFIG
    ))?;
    host.set_service_state(SSH_SERVICE, ServiceAction::Restart, FailureMode::FailFast)?;
    warn!("SSH password auth is ON; disable it once you no longer need it");
    Ok(())
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

pub fn summary(report: &RunReport, config: &Config) -> String {
    let address = report.fact(ONION_ADDRESS);
    let tor = &config.tor;
    let mut out = String::from("All done!\n\n");
    out.push_str(&format!(
        "Your onion address is: {}\n\n",
        address.unwrap_or(NOT_GENERATED)
    ));
    out.push_str(&format!(
        "To serve HTTP behind tor, run a web server on {}.\n\
         tor maps onion:{} to {}.\n",
        tor.target_addr, tor.virtual_port, tor.target_addr
    ));
    if let Some(address) = address {
        out.push_str(&format!("Then open http://{address} in Tor Browser.\n"));
    }
    out.push_str(&format!(
        "\nCheck logs:\n  sudo journalctl -u {} -n 100 --no-pager\n",
        tor.service
    ));
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
