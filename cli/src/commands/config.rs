// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use bastion_ledger_core::application::runtime::SigningKeys;
use bastion_ledger_core::domain::ledger_config::LedgerConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Also resolve the signing key references
        #[arg(long)]
        keys: bool,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./bastion-ledger.yaml)
        #[arg(short, long, default_value = "./bastion-ledger.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(command: ConfigCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file, keys } => validate(file.or(config_override), keys),
        ConfigCommand::Generate { output, examples } => generate(output, examples),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = super::load_config(config_override.as_deref()).context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        for (i, path) in super::discovery_paths().iter().enumerate() {
            println!("  {}. {}", i + 2, path.display());
        }
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Node:".bold());
    println!("  Name: {}", config.metadata.name);
    println!("  Listen: {}:{}", spec.network.bind_address, spec.network.port);
    println!();

    println!("{}", "Authentication:".bold());
    println!("  Receipts required: {}", spec.auth.receipts_required);
    println!("  Replay protection: {}", spec.auth.replay_protection);
    match &spec.auth.known_tenants {
        Some(tenants) => println!("  Known tenants: {}", tenants.join(", ")),
        None => println!("  Known tenants: {}", "(any)".dimmed()),
    }
    println!(
        "  Rate limit: {} requests / {}",
        spec.rate_limit.max_requests,
        humantime::format_duration(spec.rate_limit.window)
    );
    println!();

    println!("{}", "Bundles:".bold());
    println!("  Retention: {}", humantime::format_duration(spec.bundles.retention));
    println!("  Certificate TTL: {}", humantime::format_duration(spec.bundles.certificate_ttl));
    println!(
        "  Attestation max age: {}",
        humantime::format_duration(spec.bundles.attestation_max_age)
    );
    println!("  Platform: {}", spec.bundles.platform);
    println!(
        "  Sweeper: {} (every {})",
        if spec.sweeper.enabled { "enabled" } else { "disabled" },
        humantime::format_duration(spec.sweeper.interval)
    );
    println!();

    // Key references only; resolved material is never printed
    println!("{}", "Signing keys:".bold());
    println!("  Capability: {}", redact_reference(&spec.signing.capability_key));
    println!("  Receipt: {}", redact_reference(&spec.signing.receipt_key));
    println!("  Ledger: {}", redact_reference(&spec.signing.ledger_key));
    println!();

    Ok(())
}

fn validate(config_path: Option<PathBuf>, check_keys: bool) -> Result<()> {
    println!("Validating configuration...");

    let config = super::load_config(config_path.as_deref()).context("Failed to load configuration")?;

    config.validate().context("Configuration validation failed")?;

    if check_keys {
        SigningKeys::resolve(&config.spec.signing).context("Signing key resolution failed")?;
        println!("{}", "✓ Signing keys resolved".green());
    }

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        include_str!("../../templates/ledger-config-with-examples.yaml").to_string()
    } else {
        LedgerConfigManifest::default().to_yaml()?
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

fn redact_reference(reference: &str) -> String {
    if reference.starts_with("env:") {
        reference.to_string()
    } else if let Some((scheme, _)) = reference.split_once(':') {
        format!("{}:****", scheme)
    } else {
        "****".to_string()
    }
}
