// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Application Layer
//!
//! Use cases composed from domain types and infrastructure adapters.

pub mod bundle_builder;
pub mod capability_validator;
pub mod issuer;
pub mod lifecycle;
pub mod receipt_validator;
pub mod request_guard;
pub mod runtime;
pub mod safety_case_service;

pub use bundle_builder::{BundleRequest, SafetyCaseBuilder};
pub use capability_validator::CapabilityValidator;
pub use issuer::{CapabilityIssuer, ReceiptIssuer};
pub use lifecycle::LedgerSweeper;
pub use receipt_validator::ReceiptValidator;
pub use request_guard::{AuthorizedRequest, InboundRequest, RejectedRequest, RequestGuard};
pub use runtime::LedgerRuntime;
pub use safety_case_service::{SafetyCaseError, SafetyCaseService};
