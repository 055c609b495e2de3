//! dbafs CLI Binary
//!
//! Command-line interface for the database-backed filesystem synchronizer.

use anyhow::Context;
use clap::Parser;
use dbafs::cli::{map_error, Cli, RunContext};
use dbafs::config::ConfigLoader;
use dbafs::logging::{init_logging, LoggingConfig};
use std::process;
use tracing::{error, info};

fn main() {
    let cli = Cli::parse();

    let logging_config = build_logging_config(&cli);
    if let Err(e) = init_logging(Some(&logging_config)) {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    info!("dbafs starting");

    let context = match RunContext::new(cli.root.clone(), cli.config.clone(), cli.store.clone()) {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("Error opening tracked root: {}", e);
            eprintln!("{}", map_error(&e));
            process::exit(1);
        }
    };

    match context.execute(&cli.command) {
        Ok(output) => {
            info!("Command completed successfully");
            println!("{}", output);
        }
        Err(e) => {
            error!("Command failed: {}", e);
            eprintln!("{}", map_error(&e));
            process::exit(1);
        }
    }
}

/// Build logging configuration from CLI args and the config file.
/// CLI flags override the config file, which overrides defaults.
fn build_logging_config(cli: &Cli) -> LoggingConfig {
    let mut config = load_logging_section(cli).unwrap_or_default();

    if cli.verbose {
        config.level = "debug".to_string();
    }
    if let Some(ref level) = cli.log_level {
        config.level = level.clone();
    }
    if let Some(ref format) = cli.log_format {
        config.format = format.clone();
    }
    config
}

fn load_logging_section(cli: &Cli) -> anyhow::Result<LoggingConfig> {
    let config = match cli.config {
        Some(ref path) => ConfigLoader::load_from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => ConfigLoader::load(&cli.root)
            .with_context(|| format!("loading config under {}", cli.root.display()))?,
    };
    Ok(config.logging)
}
