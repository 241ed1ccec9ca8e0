// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Layer
//!
//! Types and invariants of the ledger. Nothing here performs I/O or touches key
//! material directly; cryptography is reached through [`signing::PayloadSigner`].
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`capability_assertion`] | `CapabilityAssertion` wire record, `SchemaViolation` |
//! | [`access_receipt`] | `AccessReceipt` wire record |
//! | [`auth`] | Error-code taxonomy, `AuthFailure`, `ErrorEnvelope`, `PrincipalContext` |
//! | [`execution_plan`] | Plans, steps, trace and theorem evidence |
//! | [`safety_case`] | `SafetyCaseBundle` aggregate and its parts |
//! | [`repository`] | `SafetyCaseRepository` persistence trait |
//! | [`events`] | Domain events |
//! | [`ledger_config`] | YAML configuration manifest |

pub mod access_receipt;
pub mod auth;
pub mod capability_assertion;
pub mod events;
pub mod execution_plan;
pub mod ledger_config;
pub mod repository;
pub mod safety_case;
pub mod signing;
