// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Bastion Ledger Core
//!
//! Capability-receipt verification and safety-case ledger.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Authenticates inbound requests (capability assertions, access
//!   receipts, tenant rate limits) and assembles verified evidence into
//!   tamper-evident safety-case bundles.

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
