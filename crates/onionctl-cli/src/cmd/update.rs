use crate::cmd::{host, load_config, with_console};
use crate::output::print_json;
use anyhow::Context;
use onionctl_core::workflow::update;
use std::path::Path;

pub fn run(config_path: Option<&Path>, json: bool) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let host = host()?;

    let report = with_console(json, |console| -> anyhow::Result<_> {
        console.say(&update::title())?;
        update::run(&config, &host, console).context("update aborted")
    })?;

    if json {
        print_json(&report)?;
    } else {
        println!();
        print!("{}", update::summary(&report));
    }
    Ok(())
}
