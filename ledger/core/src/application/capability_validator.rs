// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Capability Assertion Validator
//!
//! Checks the "PF signature" header of an inbound request.
//!
//! ```text
//! absent ─▶ PF_SIG_MISSING
//! decode (base64 → JSON) ─▶ PF_SIG_INVALID
//! schema ─▶ PF_SIG_INVALID
//! expiry (now > expires_at) ─▶ PF_SIG_EXPIRED
//! signature over canonical(value − signature) ─▶ PF_SIG_INVALID ("Invalid signature")
//! replay (optional) ─▶ PF_SIG_INVALID ("Invalid signature")
//! ```
//!
//! The first failing step wins. The signature is recomputed over the decoded
//! JSON value itself rather than a re-serialized struct, so the issuer's exact
//! timestamp formatting is what gets authenticated.

use std::sync::Arc;

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::domain::auth::{AuthFailure, PrincipalContext};
use crate::domain::capability_assertion::CapabilityAssertion;
use crate::domain::signing::PayloadSigner;
use crate::infrastructure::crypto::verify_record_value;
use crate::infrastructure::replay_guard::NonceReplayGuard;

pub struct CapabilityValidator {
    signer: Arc<dyn PayloadSigner>,
    replay_guard: Option<Arc<NonceReplayGuard>>,
}

impl CapabilityValidator {
    pub fn new(signer: Arc<dyn PayloadSigner>) -> Self {
        Self {
            signer,
            replay_guard: None,
        }
    }

    /// Reject a `(tenant, nonce)` pair presented twice before it expires.
    pub fn with_replay_guard(mut self, guard: Arc<NonceReplayGuard>) -> Self {
        self.replay_guard = Some(guard);
        self
    }

    pub fn validate(&self, header: Option<&str>) -> Result<PrincipalContext, AuthFailure> {
        self.validate_at(header, Utc::now())
    }

    pub fn validate_at(
        &self,
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<PrincipalContext, AuthFailure> {
        let token = match header.map(str::trim) {
            Some(token) if !token.is_empty() => token,
            _ => return Err(AuthFailure::AssertionMissing),
        };

        let value = decode_token(token)?;
        let assertion = CapabilityAssertion::from_value(&value)
            .map_err(|violation| AuthFailure::AssertionMalformed(violation.to_string()))?;

        if assertion.is_expired_at(now) {
            debug!(tenant = %assertion.tenant, expires_at = %assertion.expires_at, "Capability assertion expired");
            return Err(AuthFailure::AssertionExpired {
                expires_at: assertion.expires_at,
            });
        }

        match verify_record_value(self.signer.as_ref(), &value) {
            Ok(true) => {}
            Ok(false) => {
                warn!(tenant = %assertion.tenant, principal = %assertion.principal_id, "Capability assertion signature mismatch");
                return Err(AuthFailure::AssertionSignatureInvalid);
            }
            Err(e) => {
                error!(error = %e, "Capability assertion verification failed internally");
                return Err(AuthFailure::Internal(e.to_string()));
            }
        }

        if let Some(guard) = &self.replay_guard {
            if !guard.check_and_record(&assertion.tenant, &assertion.nonce, assertion.expires_at, now) {
                warn!(tenant = %assertion.tenant, "Capability assertion nonce replayed");
                return Err(AuthFailure::AssertionReplayed {
                    tenant: assertion.tenant,
                    nonce: assertion.nonce,
                });
            }
        }

        Ok(assertion.principal())
    }
}

/// Decode a base64 token (standard or URL-safe, padded or not) into JSON.
pub fn decode_token(token: &str) -> Result<Value, AuthFailure> {
    let bytes = [STANDARD, URL_SAFE, STANDARD_NO_PAD, URL_SAFE_NO_PAD]
        .iter()
        .find_map(|engine| engine.decode(token).ok())
        .ok_or_else(|| AuthFailure::AssertionMalformed("token is not valid base64".to_string()))?;
    serde_json::from_slice(&bytes)
        .map_err(|_| AuthFailure::AssertionMalformed("token is not valid JSON".to_string()))
}
