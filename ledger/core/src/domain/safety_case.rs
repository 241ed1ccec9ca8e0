// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Safety-Case Bundle Aggregate
//!
//! An aggregated, independently re-verifiable audit record binding one
//! execution session's access receipts, kernel decisions, egress certificate
//! and attestation quote together.
//!
//! ## Lifecycle
//!
//! ```text
//! SafetyCaseBuilder::build()          → status = Pending
//!   └─ SafetyCaseService::verify()    → status = Verified | Failed (recomputed every call)
//!   └─ SafetyCaseService::export()    → only after a successful verify
//!   └─ cleanup_expired()              → purged once now > expires_at
//! ```
//!
//! ## Invariants
//!
//! - `verification_status` is recomputed from scratch on every verification;
//!   it is never patched incrementally.
//! - The bundle owns *copies* of its receipts; there are no back-references.
//! - `kernel_decision_log` holds one immutable entry per plan step.
//! - Certificate and quote expiry are independent of the bundle's retention.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::domain::access_receipt::AccessReceipt;
use crate::domain::execution_plan::TheoremEvidence;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BundleId(pub Uuid);

impl BundleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn parse_str(value: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(value)?))
    }
}

impl Default for BundleId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BundleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Verified,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionOutcome {
    Allow,
    Deny,
    Escalate,
}

/// One kernel decision per plan step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KernelDecision {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub decision_type: String,
    pub decision: DecisionOutcome,
    pub reason: String,
    pub context: Value,
    /// Trace ids whose `tool_call_id` matched the step.
    pub evidence: Vec<String>,
}

/// Short-lived signed grant of permissions for a session leaving the trust boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EgressCertificate {
    pub id: String,
    pub session_id: String,
    pub tenant: String,
    pub permissions: Vec<String>,
    pub restrictions: Vec<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub signature: String,
}

impl EgressCertificate {
    pub fn is_present(&self) -> bool {
        !self.id.is_empty() && !self.signature.is_empty()
    }
}

/// Signed platform measurement binding a session to a runtime snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttestationQuote {
    pub id: String,
    pub session_id: String,
    pub platform: String,
    pub measurements: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub signature: String,
}

impl AttestationQuote {
    pub fn is_present(&self) -> bool {
        !self.id.is_empty() && !self.signature.is_empty()
    }

    /// Quote was issued no more than `max_age` before `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now.signed_duration_since(self.timestamp) <= max_age
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub journey: String,
    pub step_count: usize,
    pub trace_count: usize,
    pub receipt_count: usize,
    #[serde(default)]
    pub theorem_evidence: Vec<TheoremEvidence>,
    pub builder_version: String,
    pub retention_days: i64,
}

/// First failing verification check. Messages are part of the audit contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleDefect {
    MissingComponents,
    InvalidReceipts,
    ExpiredCertificates,
    InvalidSignatures,
}

impl BundleDefect {
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingComponents => "Missing required components",
            Self::InvalidReceipts => "Invalid access receipts",
            Self::ExpiredCertificates => "Expired certificates",
            Self::InvalidSignatures => "Invalid certificate signatures",
        }
    }
}

impl std::fmt::Display for BundleDefect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Aggregate root of the safety-case ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyCaseBundle {
    pub id: BundleId,
    pub session_id: String,
    pub tenant: String,
    pub capability_ids: BTreeSet<String>,
    pub access_receipts: Vec<AccessReceipt>,
    pub plan_hash: String,
    pub kernel_decision_log: Vec<KernelDecision>,
    pub egress_certificate: EgressCertificate,
    pub attestation_quote: AttestationQuote,
    pub metadata: BundleMetadata,
    pub verification_status: VerificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_errors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl SafetyCaseBundle {
    /// Structural, receipt and temporal checks, evaluated in fixed order.
    ///
    /// Signature checks need key material and live in
    /// [`crate::application::safety_case_service`].
    pub fn check_integrity(
        &self,
        now: DateTime<Utc>,
        attestation_max_age: Duration,
    ) -> Result<(), BundleDefect> {
        // 1. Structural completeness
        if self.capability_ids.is_empty()
            || self.access_receipts.is_empty()
            || self.plan_hash.is_empty()
            || self.kernel_decision_log.is_empty()
            || !self.egress_certificate.is_present()
            || !self.attestation_quote.is_present()
        {
            return Err(BundleDefect::MissingComponents);
        }

        // 2. Every receipt well-formed, unexpired and owned by the bundle's tenant
        if !self
            .access_receipts
            .iter()
            .all(|r| r.is_well_formed_at(now) && r.tenant == self.tenant)
        {
            return Err(BundleDefect::InvalidReceipts);
        }

        // 3. Certificate still valid, quote recent enough
        if self.egress_certificate.expires_at <= now
            || !self.attestation_quote.is_fresh_at(now, attestation_max_age)
        {
            return Err(BundleDefect::ExpiredCertificates);
        }

        Ok(())
    }

    pub fn record_verified(&mut self, now: DateTime<Utc>) {
        self.verification_status = VerificationStatus::Verified;
        self.verification_errors = None;
        self.verified_at = Some(now);
    }

    pub fn record_failed(&mut self, errors: Vec<String>, now: DateTime<Utc>) {
        self.verification_status = VerificationStatus::Failed;
        self.verification_errors = Some(errors);
        self.verified_at = Some(now);
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}
