use crate::cmd::{host, load_config, with_console};
use crate::output::{print_json, print_steps};
use onionctl_core::workflow::setup;
use std::path::Path;

pub fn run(config_path: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let host = host()?;

    let report = with_console(json, |console| -> anyhow::Result<_> {
        console.say(&setup::title())?;
        Ok(setup::orchestrator(&config).run(&host, console)?)
    })?;

    if json {
        print_json(&report)?;
    } else {
        println!();
        print_steps(&report.steps);
        println!();
        print!("{}", setup::summary(&report, &config));
    }
    Ok(())
}
