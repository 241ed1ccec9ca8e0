// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! HMAC-SHA256 implementation of [`PayloadSigner`] plus helpers that seal and
//! check records over their canonical bytes.
//!
//! Digests are hex encoded. Comparison uses `subtle` for constant time.

use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::canonical::canonicalize_without;
use crate::domain::signing::{PayloadSigner, SignatureError};

type HmacSha256 = Hmac<Sha256>;

/// Name of the field that carries a record's own signature.
pub const SIGNATURE_FIELD: &str = "signature";

#[derive(Clone)]
pub struct HmacSha256Signer {
    key: Vec<u8>,
}

impl std::fmt::Debug for HmacSha256Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSha256Signer")
            .field("key", &"[redacted]")
            .finish()
    }
}

impl HmacSha256Signer {
    pub fn new(key: impl Into<Vec<u8>>) -> Result<Self, SignatureError> {
        let key = key.into();
        if key.is_empty() {
            return Err(SignatureError::KeyMaterial("key must not be empty".to_string()));
        }
        Ok(Self { key })
    }

    fn mac(&self) -> Result<HmacSha256, SignatureError> {
        HmacSha256::new_from_slice(&self.key).map_err(|e| SignatureError::KeyMaterial(e.to_string()))
    }
}

impl PayloadSigner for HmacSha256Signer {
    fn algorithm(&self) -> &'static str {
        "hmac-sha256"
    }

    fn sign(&self, payload: &[u8]) -> Result<String, SignatureError> {
        let mut mac = self.mac()?;
        mac.update(payload);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn verify(&self, payload: &[u8], signature: &str) -> Result<bool, SignatureError> {
        let Ok(expected) = hex::decode(signature) else {
            return Ok(false);
        };
        let mut mac = self.mac()?;
        mac.update(payload);
        let computed = mac.finalize().into_bytes();
        Ok(computed.as_slice().ct_eq(expected.as_slice()).into())
    }
}

/// Signature over the canonical form of `record` without its `signature` field.
pub fn seal_record<S, T>(signer: &S, record: &T) -> Result<String, SignatureError>
where
    S: PayloadSigner + ?Sized,
    T: Serialize,
{
    let value = serde_json::to_value(record)
        .map_err(|e| SignatureError::Canonicalization(e.to_string()))?;
    signer.sign(&canonicalize_without(&value, &[SIGNATURE_FIELD]))
}

/// Check the `signature` field of a decoded record against the rest of it.
///
/// A missing or non-string signature verifies as `false`.
pub fn verify_record_value<S>(signer: &S, value: &Value) -> Result<bool, SignatureError>
where
    S: PayloadSigner + ?Sized,
{
    let Some(signature) = value.get(SIGNATURE_FIELD).and_then(Value::as_str) else {
        return Ok(false);
    };
    signer.verify(&canonicalize_without(value, &[SIGNATURE_FIELD]), signature)
}

pub fn verify_record<S, T>(signer: &S, record: &T) -> Result<bool, SignatureError>
where
    S: PayloadSigner + ?Sized,
    T: Serialize,
{
    let value = serde_json::to_value(record)
        .map_err(|e| SignatureError::Canonicalization(e.to_string()))?;
    verify_record_value(signer, &value)
}
