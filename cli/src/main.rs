// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Bastion Ledger CLI
//!
//! The `bastion` binary hosts the safety-case ledger daemon and the operator
//! tooling around it.
//!
//! ## Commands
//!
//! - `bastion serve` - Run the ledger HTTP API with its background sweeper
//! - `bastion config show|validate|generate` - Configuration management
//! - `bastion issue assertion|receipt` - Mint signed test credentials
//! - `bastion bundle verify <FILE>` - Re-verify an exported bundle offline

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

mod commands;

use commands::{BundleCommand, ConfigCommand, IssueCommand};

/// Bastion Ledger - capability verification and safety-case evidence
#[derive(Parser)]
#[command(name = "bastion")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "BASTION_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to spec.logging.level
    #[arg(long, global = true, env = "BASTION_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the ledger daemon
    #[command(name = "serve")]
    Serve {
        /// Override spec.network.port
        #[arg(long, env = "BASTION_PORT")]
        port: Option<u16>,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Issue signed capability assertions and access receipts
    #[command(name = "issue")]
    Issue {
        #[command(subcommand)]
        command: IssueCommand,
    },

    /// Safety-case bundle tooling
    #[command(name = "bundle")]
    Bundle {
        #[command(subcommand)]
        command: BundleCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is not an error
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Logging settings come from the config when it loads; the command reports load errors itself
    let logging = commands::load_config(cli.config.as_deref())
        .map(|config| config.spec.logging)
        .unwrap_or_default();
    let level = cli.log_level.as_deref().unwrap_or(&logging.level);
    init_logging(level, &logging.format)?;

    match cli.command {
        Some(Commands::Serve { port }) => commands::serve::run(cli.config, port).await,
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::Issue { command }) => {
            commands::issue::handle_command(command, cli.config).await
        }
        Some(Commands::Bundle { command }) => {
            commands::bundle::handle_command(command, cli.config).await
        }
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format.eq_ignore_ascii_case("json") {
        builder.json().with_current_span(false).init();
    } else {
        builder.with_target(false).compact().init();
    }

    Ok(())
}
