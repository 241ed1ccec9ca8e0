// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Payload Signing Port
//!
//! Domain-level abstraction over the keyed digest used to authenticate
//! capability assertions, access receipts, egress certificates and attestation
//! quotes. Keeping the trait here leaves the domain free of `hmac`/`sha2`; the
//! concrete HMAC-SHA256 implementation lives in
//! [`crate::infrastructure::crypto::signer`].
//!
//! Signers always operate on **canonical bytes** (see
//! [`crate::infrastructure::crypto::canonical`]). The `signature` field of a
//! record is never part of its own input.

/// Errors raised by a [`PayloadSigner`] that are *not* a plain signature mismatch.
///
/// A mismatch is reported as `Ok(false)` from [`PayloadSigner::verify`]. These
/// variants represent internal faults (bad key material, serialization issues)
/// and map to the `INTERNAL_ERROR` code at the request boundary.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid key material: {0}")]
    KeyMaterial(String),

    #[error("failed to canonicalize record: {0}")]
    Canonicalization(String),
}

/// Keyed digest over canonical bytes.
///
/// # Security
///
/// Implementations **must** compare digests in constant time.
pub trait PayloadSigner: Send + Sync {
    /// Short identifier of the digest scheme (e.g. `"hmac-sha256"`).
    fn algorithm(&self) -> &'static str;

    /// Compute the encoded digest of `payload`.
    fn sign(&self, payload: &[u8]) -> Result<String, SignatureError>;

    /// Check `signature` against `payload`.
    ///
    /// Returns `Ok(false)` for a mismatch or an undecodable signature string.
    fn verify(&self, payload: &[u8], signature: &str) -> Result<bool, SignatureError>;
}
