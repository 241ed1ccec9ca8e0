// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Safety-case bundle commands

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use bastion_ledger_core::application::runtime::SigningKeys;
use bastion_ledger_core::application::safety_case_service::verify_export;
use bastion_ledger_core::domain::ledger_config::to_chrono;
use bastion_ledger_core::infrastructure::crypto::HmacSha256Signer;

#[derive(Subcommand)]
pub enum BundleCommand {
    /// Re-verify an exported bundle (JSON or tar) with the ledger key
    Verify {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

pub async fn handle_command(command: BundleCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        BundleCommand::Verify { file } => verify(file, config_override),
    }
}

fn verify(file: PathBuf, config_override: Option<PathBuf>) -> Result<()> {
    let config = super::load_config(config_override.as_deref()).context("Failed to load configuration")?;
    let keys = SigningKeys::resolve(&config.spec.signing)?;
    let signer = HmacSha256Signer::new(keys.ledger).context("Invalid ledger key")?;

    let bytes = std::fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
    let report = verify_export(
        &bytes,
        &signer,
        Utc::now(),
        to_chrono(config.spec.bundles.attestation_max_age)?,
    )
    .with_context(|| format!("Failed to read bundle export {}", file.display()))?;

    println!("{}", "Bundle verification:".bold());
    println!("  ID: {}", report.bundle_id);
    println!("  Checked at: {}", report.verified_at);

    if report.verified {
        println!("{}", "✓ Bundle verified".green());
        Ok(())
    } else {
        for error in &report.errors {
            println!("  {} {}", "✗".red(), error);
        }
        anyhow::bail!("Bundle {} failed verification", report.bundle_id)
    }
}
