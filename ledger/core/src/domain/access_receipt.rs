// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Access Receipt
//!
//! Signed, time-bounded proof that a specific query against a specific data
//! shard was authorized and produced a specific result. Receipts are issued by
//! the retrieval gateway, presented in batches alongside a capability
//! assertion, and copied into safety-case bundles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::capability_assertion::SchemaViolation;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessReceipt {
    pub id: String,
    pub tenant: String,
    pub subject: String,
    pub shard: String,
    pub query_hash: String,
    pub result_hash: String,
    pub nonce: String,
    pub expires_at: DateTime<Utc>,
    pub signature: String,
}

impl AccessReceipt {
    /// Parse and schema-validate one receipt of a batch.
    pub fn from_value(value: &Value) -> Result<Self, SchemaViolation> {
        if !value.is_object() {
            return Err(SchemaViolation::NotAnObject);
        }
        let receipt: Self = serde_json::from_value(value.clone())
            .map_err(|e| SchemaViolation::Type(e.to_string()))?;
        receipt.validate_schema()?;
        Ok(receipt)
    }

    fn validate_schema(&self) -> Result<(), SchemaViolation> {
        let required = [
            ("id", &self.id),
            ("tenant", &self.tenant),
            ("subject", &self.subject),
            ("shard", &self.shard),
            ("query_hash", &self.query_hash),
            ("result_hash", &self.result_hash),
            ("nonce", &self.nonce),
            ("signature", &self.signature),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(SchemaViolation::empty(field));
            }
        }
        Ok(())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// Structural check used when re-verifying a stored bundle: identity fields
    /// and signature present, not expired. Signatures are not recomputed here.
    pub fn is_well_formed_at(&self, now: DateTime<Utc>) -> bool {
        !self.id.is_empty()
            && !self.tenant.is_empty()
            && !self.subject.is_empty()
            && !self.signature.is_empty()
            && !self.is_expired_at(now)
    }

    /// Synthetic capability id derived from the first 8 characters of `query_hash`.
    pub fn capability_id(&self) -> String {
        let prefix: String = self.query_hash.chars().take(8).collect();
        format!("receipt:{prefix}")
    }
}
