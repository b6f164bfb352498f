use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::{self, Write};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod common;
mod server;

use commands::{ServerCommand, ValidateCommand};
use common::config::{BrokerConfig, LoggingConfig};

#[derive(Parser)]
#[command(
    name = "role-broker",
    about = "Role Broker - per-caller STS credentials on a metadata-style API",
    version = env!("CARGO_PKG_VERSION"),
    author = "ktruck"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the credential broker
    Server(ServerCommand),
    /// Check a configuration file and exit
    Validate(ValidateCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Server(server_cmd) => {
            let mut config = match &server_cmd.config {
                Some(path) => BrokerConfig::load(path)?,
                None => BrokerConfig::default(),
            };
            server_cmd.apply(&mut config)?;
            init_logging(&config.logging, cli.verbose, cli.log_level.as_deref());

            print_banner();
            info!("Starting Role Broker");
            server::run(config, server_cmd.config).await?;
        }
        Commands::Validate(validate_cmd) => {
            let config = BrokerConfig::load(&validate_cmd.config)?;
            println!(
                "✅ {} is valid: {} role mappings, STS region {}",
                validate_cmd.config.display(),
                config.roles.len(),
                config.sts.region
            );
        }
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig, verbose: bool, level: Option<&str>) {
    let level = if verbose {
        "debug"
    } else {
        level.unwrap_or(logging.level.as_str())
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if logging.json_format {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn print_banner() {
    println!();
    println!("🔐 Role Broker");
    println!();
    let _ = io::stdout().flush();
}
