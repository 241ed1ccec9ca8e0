// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Access Receipt Batch Validator
//!
//! Validates the JSON array carried in the receipts header against the tenant
//! established by the capability assertion. Receipts are checked strictly in
//! array order and the first failing receipt rejects the whole batch:
//!
//! ```text
//! per receipt: schema → tenant == expected → expiry → signature
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::domain::access_receipt::AccessReceipt;
use crate::domain::auth::AuthFailure;
use crate::domain::signing::PayloadSigner;
use crate::infrastructure::crypto::verify_record_value;

pub struct ReceiptValidator {
    signer: Arc<dyn PayloadSigner>,
    receipts_required: bool,
}

impl ReceiptValidator {
    pub fn new(signer: Arc<dyn PayloadSigner>, receipts_required: bool) -> Self {
        Self {
            signer,
            receipts_required,
        }
    }

    pub fn receipts_required(&self) -> bool {
        self.receipts_required
    }

    /// Validate the raw header value. An absent header is an empty batch.
    pub fn validate_at(
        &self,
        header: Option<&str>,
        expected_tenant: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<AccessReceipt>, AuthFailure> {
        let raw = match header.map(str::trim) {
            Some(raw) if !raw.is_empty() => raw,
            _ if self.receipts_required => return Err(AuthFailure::ReceiptsMissing),
            _ => return Ok(Vec::new()),
        };

        let parsed: Value = serde_json::from_str(raw)
            .map_err(|_| AuthFailure::ReceiptBatchMalformed("header is not valid JSON".to_string()))?;
        let Value::Array(batch) = parsed else {
            return Err(AuthFailure::ReceiptBatchMalformed(
                "header must be a JSON array".to_string(),
            ));
        };
        self.validate_batch_at(&batch, expected_tenant, now)
    }

    /// Validate an already parsed batch.
    pub fn validate_batch_at(
        &self,
        batch: &[Value],
        expected_tenant: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<AccessReceipt>, AuthFailure> {
        if batch.is_empty() && self.receipts_required {
            return Err(AuthFailure::ReceiptsMissing);
        }

        let mut receipts = Vec::with_capacity(batch.len());
        for (index, value) in batch.iter().enumerate() {
            receipts.push(self.validate_one(index, value, expected_tenant, now)?);
        }
        debug!(tenant = expected_tenant, count = receipts.len(), "Access receipts accepted");
        Ok(receipts)
    }

    /// Check receipts submitted for a safety-case bundle.
    ///
    /// Same per-receipt checks as a header batch, but an empty set passes:
    /// completeness is judged when the bundle is verified.
    pub fn validate_receipts_at(
        &self,
        receipts: &[AccessReceipt],
        expected_tenant: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AuthFailure> {
        for (index, receipt) in receipts.iter().enumerate() {
            let value = serde_json::to_value(receipt).map_err(|e| AuthFailure::Internal(e.to_string()))?;
            self.validate_one(index, &value, expected_tenant, now)?;
        }
        Ok(())
    }

    fn validate_one(
        &self,
        index: usize,
        value: &Value,
        expected_tenant: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessReceipt, AuthFailure> {
        let receipt = AccessReceipt::from_value(value).map_err(|violation| {
            AuthFailure::ReceiptMalformed {
                index,
                reason: violation.to_string(),
            }
        })?;

        if receipt.tenant != expected_tenant {
            warn!(index, expected = expected_tenant, actual = %receipt.tenant, "Access receipt tenant mismatch");
            return Err(AuthFailure::ReceiptTenantMismatch {
                index,
                expected: expected_tenant.to_string(),
                actual: receipt.tenant,
            });
        }

        if receipt.is_expired_at(now) {
            return Err(AuthFailure::ReceiptExpired {
                index,
                expires_at: receipt.expires_at,
            });
        }

        match verify_record_value(self.signer.as_ref(), value) {
            Ok(true) => Ok(receipt),
            Ok(false) => {
                warn!(index, receipt_id = %receipt.id, tenant = expected_tenant, "Access receipt signature mismatch");
                Err(AuthFailure::ReceiptSignatureInvalid { index })
            }
            Err(e) => {
                error!(index, error = %e, "Access receipt verification failed internally");
                Err(AuthFailure::Internal(e.to_string()))
            }
        }
    }
}
