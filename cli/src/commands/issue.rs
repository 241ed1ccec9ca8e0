// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Credential issuing commands
//!
//! Mints capability assertions and access receipts signed with the configured
//! keys, for integration testing against a running ledger.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bastion_ledger_core::application::issuer::{encode_receipt_batch, CapabilityIssuer, ReceiptIssuer};
use bastion_ledger_core::application::runtime::SigningKeys;
use bastion_ledger_core::domain::ledger_config::to_chrono;
use bastion_ledger_core::domain::signing::PayloadSigner;
use bastion_ledger_core::infrastructure::crypto::HmacSha256Signer;

#[derive(Subcommand)]
pub enum IssueCommand {
    /// Issue a capability assertion token for the X-PF-Signature header
    Assertion {
        #[arg(long)]
        tenant: String,

        #[arg(long)]
        principal: String,

        /// Capability granted (repeatable)
        #[arg(long = "capability", value_name = "NAME", required = true)]
        capabilities: Vec<String>,

        /// Lifetime of the assertion (e.g. 5m, 1h)
        #[arg(long, default_value = "5m", value_parser = humantime::parse_duration)]
        ttl: Duration,

        /// Print the decoded assertion instead of only the token
        #[arg(long)]
        json: bool,
    },

    /// Issue a one-receipt batch for the X-Access-Receipts header
    Receipt {
        #[arg(long)]
        tenant: String,

        #[arg(long, default_value = "data_retrieval")]
        subject: String,

        #[arg(long)]
        shard: String,

        /// Query text that was executed
        #[arg(long)]
        query: String,

        /// Lifetime of the receipt (e.g. 1h, 2days)
        #[arg(long, default_value = "1h", value_parser = humantime::parse_duration)]
        ttl: Duration,
    },
}

pub async fn handle_command(command: IssueCommand, config_override: Option<PathBuf>) -> Result<()> {
    let config = super::load_config(config_override.as_deref()).context("Failed to load configuration")?;
    let keys = SigningKeys::resolve(&config.spec.signing)?;

    match command {
        IssueCommand::Assertion {
            tenant,
            principal,
            capabilities,
            ttl,
            json,
        } => {
            let signer = signer(keys.capability)?;
            let issued = CapabilityIssuer::new(signer)
                .issue(&tenant, &principal, capabilities, to_chrono(ttl)?)
                .context("Failed to sign capability assertion")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&issued.assertion)?);
                eprintln!(
                    "{}",
                    format!("✓ Assertion expires at {}", issued.assertion.expires_at).green()
                );
            }
            println!("{}", issued.token);
        }
        IssueCommand::Receipt {
            tenant,
            subject,
            shard,
            query,
            ttl,
        } => {
            let signer = signer(keys.receipt)?;
            let receipt = ReceiptIssuer::new(signer)
                .issue_at(
                    &tenant,
                    &subject,
                    &shard,
                    &query,
                    &serde_json::Value::Null,
                    to_chrono(ttl)?,
                    Utc::now(),
                )
                .context("Failed to sign access receipt")?;
            println!("{}", encode_receipt_batch(&[receipt])?);
        }
    }

    Ok(())
}

fn signer(key: Vec<u8>) -> Result<Arc<dyn PayloadSigner>> {
    Ok(Arc::new(HmacSha256Signer::new(key).context("Invalid signing key")?))
}
