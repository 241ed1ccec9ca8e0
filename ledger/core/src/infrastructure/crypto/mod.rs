// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod canonical;
pub mod signer;

pub use canonical::{canonicalize, canonicalize_value, canonicalize_without, CanonicalError};
pub use signer::{seal_record, verify_record, verify_record_value, HmacSha256Signer, SIGNATURE_FIELD};
