// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Bastion CLI

pub mod bundle;
pub mod config;
pub mod issue;
pub mod serve;

pub use self::bundle::BundleCommand;
pub use self::config::ConfigCommand;
pub use self::issue::IssueCommand;

use anyhow::Result;
use std::path::{Path, PathBuf};

use bastion_ledger_core::domain::ledger_config::LedgerConfigManifest;

/// Paths searched, in order, when no `--config` is given.
pub fn discovery_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("./bastion-ledger.yaml"),
        PathBuf::from("/etc/bastion/ledger.yaml"),
    ]
}

/// Load the explicit config file, else the first discovered one, else defaults.
pub fn load_config(config_override: Option<&Path>) -> Result<LedgerConfigManifest> {
    if let Some(path) = config_override {
        return LedgerConfigManifest::load(path);
    }
    match discovery_paths().into_iter().find(|p| p.is_file()) {
        Some(path) => LedgerConfigManifest::load(&path),
        None => Ok(LedgerConfigManifest::default()),
    }
}
