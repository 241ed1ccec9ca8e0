// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Credential Issuers
//!
//! Counterparts of the validators: mint signed capability assertions and
//! access receipts with the same canonical-bytes scheme. The ledger itself only
//! verifies; these are used by the operator CLI, by retrieval gateways embedding
//! this crate, and by tests.

use std::collections::BTreeSet;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use crate::domain::access_receipt::AccessReceipt;
use crate::domain::capability_assertion::CapabilityAssertion;
use crate::domain::signing::{PayloadSigner, SignatureError};
use crate::infrastructure::crypto::{canonicalize_value, seal_record};

const NONCE_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error(transparent)]
    Signing(#[from] SignatureError),

    #[error("lifetime of {0} overflows the timestamp range")]
    ExpiryOverflow(Duration),
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> Result<DateTime<Utc>, IssueError> {
    now.checked_add_signed(ttl).ok_or(IssueError::ExpiryOverflow(ttl))
}

/// A freshly signed assertion and its header-ready encoding.
#[derive(Debug, Clone)]
pub struct IssuedAssertion {
    pub assertion: CapabilityAssertion,
    pub token: String,
}

pub struct CapabilityIssuer {
    signer: Arc<dyn PayloadSigner>,
}

impl CapabilityIssuer {
    pub fn new(signer: Arc<dyn PayloadSigner>) -> Self {
        Self { signer }
    }

    pub fn issue<I, S>(
        &self,
        tenant: &str,
        principal_id: &str,
        capabilities: I,
        ttl: Duration,
    ) -> Result<IssuedAssertion, IssueError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.issue_at(tenant, principal_id, capabilities, ttl, Utc::now())
    }

    pub fn issue_at<I, S>(
        &self,
        tenant: &str,
        principal_id: &str,
        capabilities: I,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<IssuedAssertion, IssueError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut assertion = CapabilityAssertion {
            tenant: tenant.to_string(),
            principal_id: principal_id.to_string(),
            capabilities: capabilities.into_iter().map(Into::into).collect::<BTreeSet<_>>(),
            nonce: random_nonce(),
            expires_at: expiry(now, ttl)?,
            signature: String::new(),
        };
        assertion.signature = seal_record(self.signer.as_ref(), &assertion)?;

        let encoded = serde_json::to_vec(&assertion)
            .map_err(|e| SignatureError::Canonicalization(e.to_string()))?;
        debug!(tenant, principal_id, expires_at = %assertion.expires_at, "Issued capability assertion");
        Ok(IssuedAssertion {
            token: STANDARD.encode(encoded),
            assertion,
        })
    }
}

pub struct ReceiptIssuer {
    signer: Arc<dyn PayloadSigner>,
}

impl ReceiptIssuer {
    pub fn new(signer: Arc<dyn PayloadSigner>) -> Self {
        Self { signer }
    }

    /// Sign a receipt for `query` against `shard` that produced `results`.
    ///
    /// `query_hash` is the base64 SHA-256 of the query text and `result_hash`
    /// the base64 SHA-256 of the canonical results.
    #[allow(clippy::too_many_arguments)]
    pub fn issue_at(
        &self,
        tenant: &str,
        subject: &str,
        shard: &str,
        query: &str,
        results: &Value,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<AccessReceipt, IssueError> {
        let mut receipt = AccessReceipt {
            id: Uuid::new_v4().to_string(),
            tenant: tenant.to_string(),
            subject: subject.to_string(),
            shard: shard.to_string(),
            query_hash: sha256_base64(query.as_bytes()),
            result_hash: sha256_base64(&canonicalize_value(results)),
            nonce: Uuid::new_v4().simple().to_string(),
            expires_at: expiry(now, ttl)?,
            signature: String::new(),
        };
        receipt.signature = seal_record(self.signer.as_ref(), &receipt)?;
        Ok(receipt)
    }
}

/// Encode receipts as the JSON array carried in the receipts header.
pub fn encode_receipt_batch(receipts: &[AccessReceipt]) -> Result<String, serde_json::Error> {
    serde_json::to_string(receipts)
}

fn random_nonce() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(NONCE_LEN)
        .map(char::from)
        .collect()
}

fn sha256_base64(data: &[u8]) -> String {
    STANDARD.encode(Sha256::digest(data))
}
