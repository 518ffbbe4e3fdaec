//! Web front end behind the hidden service: packages, the app file and a
//! systemd unit that keeps it running.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::Config;
use crate::error::Result;
use crate::host::ServiceAction;
use crate::orchestrator::{Orchestrator, RunReport, Step, StepContext};
use crate::paths;
use crate::runner::FailureMode;
use crate::templates;

use super::{banner, APP_DIR, APP_PORT, SERVICE};

pub fn title(config: &Config) -> String {
    let line = format!(
        "Web Deployment Wizard - \"{}\" landing page",
        config.app.message
    );
    banner(&[line.as_str()])
}

pub fn orchestrator(config: &Config) -> Orchestrator<'_> {
    Orchestrator::new("deploy")
        .step(
            Step::new(
                "install-web",
                "Install Flask and its prerequisites now?",
                move |ctx| install_web(ctx, config),
            )
            .on_skip("Skipping Flask installation. Make sure Flask is installed."),
        )
        .step(
            Step::new("write-app", "Write the landing page application?", move |ctx| {
                write_app(ctx, config)
            })
            .on_skip("Skipping app generation.")
            .requires(&["install-web"]),
        )
        .step(
            Step::new(
                "service",
                "Create a systemd service to run the app in the background?",
                move |ctx| install_service(ctx, config),
            )
            .on_skip("Skipping systemd service setup. Run the app manually with python3.")
            .requires(&["write-app"]),
        )
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

fn install_web(ctx: &mut StepContext<'_>, config: &Config) -> Result<()> {
    info!("installing web packages");
    ctx.host
        .install_packages(&config.packages.web, FailureMode::FailFast)?;
    Ok(())
}

fn write_app(ctx: &mut StepContext<'_>, config: &Config) -> Result<()> {
    let default_dir = config.app.dir.display().to_string();
    let dir = ctx
        .console
        .ask("Where to deploy the web app?", &default_dir)?;
    let port = ctx
        .console
        .ask_port("Which port should the app listen on?", config.app.port)?;

    let app_file = config.app.app_file(Path::new(&dir));
    info!("creating app directory {dir}");
    ctx.host
        .write_file(&app_file, &templates::flask_app(&config.app.message, port))?;
    info!("app written to {}", app_file.display());

    ctx.facts.insert(APP_DIR.to_string(), dir);
    ctx.facts.insert(APP_PORT.to_string(), port.to_string());
    Ok(())
}

fn install_service(ctx: &mut StepContext<'_>, config: &Config) -> Result<()> {
    let name = ctx.console.ask("Service name?", &config.app.service)?;
    let user = ctx.console.ask("Run service as user?", &config.app.user)?;
    let app_dir = app_dir(ctx.facts.get(APP_DIR).map(String::as_str), config);

    let unit_path = paths::unit_file(&config.app.unit_dir, &name);
    info!("creating systemd service '{name}.service'");
    ctx.host.write_file(
        &unit_path,
        &templates::service_unit(&config.app, &app_dir, &user),
    )?;

    info!("reloading systemd and enabling service");
    let host = ctx.host;
    host.reload_units()?;
    host.set_service_state(&name, ServiceAction::Enable, FailureMode::FailFast)?;
    host.set_service_state(&name, ServiceAction::Restart, FailureMode::FailFast)?;
    info!("systemd service '{name}' started and enabled");

    ctx.facts.insert(SERVICE.to_string(), name);
    Ok(())
}

fn app_dir(recorded: Option<&str>, config: &Config) -> PathBuf {
    recorded
        .map(PathBuf::from)
        .unwrap_or_else(|| config.app.dir.clone())
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

pub fn summary(report: &RunReport, config: &Config) -> String {
    let dir = app_dir(report.fact(APP_DIR), config);
    let port = report
        .fact(APP_PORT)
        .map(str::to_string)
        .unwrap_or_else(|| config.app.port.to_string());

    format!(
        "Deployment complete!\n\n\
         Your landing page says \"{message}\" at the root URL.\n\n\
         - systemd service: {service}\n\
         - Without a service, run the app manually:\n    \
         cd {dir}\n    \
         python3 {file}\n\
         - The app listens on port {port}: http://<server-IP>:{port}/\n",
        message = config.app.message,
        service = report.fact_or(SERVICE, "(none)"),
        dir = dir.display(),
        file = config.app.file_name,
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
