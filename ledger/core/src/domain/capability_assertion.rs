// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Capability Assertion ("PF signature")
//!
//! A signed, time-bounded claim that a principal may use a named set of
//! capabilities within a tenant. Issued externally, carried base64-encoded in a
//! request header, validated once per request and never persisted.
//!
//! ## Invariants
//!
//! - `capabilities` is non-empty and contains no empty names.
//! - `nonce` is at least [`MIN_NONCE_LEN`] bytes.
//! - `signature` is the keyed digest of every other field, canonicalized.
//!
//! Parsing is all-or-nothing: [`CapabilityAssertion::from_value`] either yields
//! a fully validated record or a [`SchemaViolation`].

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::auth::PrincipalContext;

/// Minimum nonce length in bytes.
pub const MIN_NONCE_LEN: usize = 16;

/// Structural defect found while parsing a wire record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaViolation {
    #[error("record must be a JSON object")]
    NotAnObject,

    #[error("field `{field}` {reason}")]
    Field { field: &'static str, reason: String },

    #[error("{0}")]
    Type(String),
}

impl SchemaViolation {
    pub(crate) fn empty(field: &'static str) -> Self {
        Self::Field {
            field,
            reason: "must not be empty".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityAssertion {
    pub tenant: String,
    pub principal_id: String,
    pub capabilities: BTreeSet<String>,
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
    pub signature: String,
}

impl CapabilityAssertion {
    /// Parse and schema-validate a decoded assertion.
    pub fn from_value(value: &Value) -> Result<Self, SchemaViolation> {
        if !value.is_object() {
            return Err(SchemaViolation::NotAnObject);
        }
        let assertion: Self = serde_json::from_value(value.clone())
            .map_err(|e| SchemaViolation::Type(e.to_string()))?;
        assertion.validate_schema()?;
        Ok(assertion)
    }

    fn validate_schema(&self) -> Result<(), SchemaViolation> {
        if self.tenant.trim().is_empty() {
            return Err(SchemaViolation::empty("tenant"));
        }
        if self.principal_id.trim().is_empty() {
            return Err(SchemaViolation::empty("principal_id"));
        }
        if self.capabilities.is_empty() {
            return Err(SchemaViolation::empty("capabilities"));
        }
        if self.capabilities.iter().any(|c| c.trim().is_empty()) {
            return Err(SchemaViolation::Field {
                field: "capabilities",
                reason: "must not contain empty capability names".to_string(),
            });
        }
        if self.nonce.len() < MIN_NONCE_LEN {
            return Err(SchemaViolation::Field {
                field: "nonce",
                reason: format!("must be at least {MIN_NONCE_LEN} bytes"),
            });
        }
        if self.signature.is_empty() {
            return Err(SchemaViolation::empty("signature"));
        }
        Ok(())
    }

    /// `true` once `now` is strictly past `expires_at`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn principal(&self) -> PrincipalContext {
        PrincipalContext {
            tenant: self.tenant.clone(),
            principal_id: self.principal_id.clone(),
            capabilities: self.capabilities.clone(),
        }
    }
}
