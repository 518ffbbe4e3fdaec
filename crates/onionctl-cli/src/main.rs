mod cmd;
mod output;

use clap::{Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "onionctl",
    about = "Interactive wizard for a single-host tor hidden service and its web front end",
    version,
    propagate_version = true
)]
struct Cli {
    /// Configuration file (default: /etc/onionctl/config.yaml when present)
    #[arg(long, global = true, env = "ONIONCTL_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    /// Only log warnings and errors
    #[arg(long, global = true, short = 'q')]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install tor and bring up a single hidden service
    Setup,

    /// Deploy the landing page web app behind the hidden service
    Deploy,

    /// Replace or patch the deployed web app
    Update,

    /// Inspect and validate the configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.quiet {
        tracing::Level::WARN
    } else {
        tracing::Level::INFO
    };

    // RUST_LOG replaces the default level entirely when set.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::default().add_directive(default_level.into())
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = cli.config.as_deref();

    let result = match cli.command {
        Commands::Setup => cmd::setup::run(config, cli.json),
        Commands::Deploy => cmd::deploy::run(config, cli.json),
        Commands::Update => cmd::update::run(config, cli.json),
        Commands::Config { subcommand } => cmd::config::run(config, subcommand, cli.json),
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
