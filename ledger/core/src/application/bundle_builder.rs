// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Safety-Case Bundle Builder
//!
//! Turns the evidence of one finished execution session into a
//! [`SafetyCaseBundle`]:
//!
//! | Field | Derivation |
//! |-------|------------|
//! | `capability_ids` | each step's declared capability ∪ `receipt:<query_hash[..8]>` per receipt |
//! | `plan_hash` | SHA-256 hex of canonical `{id, steps, metadata}` |
//! | `kernel_decision_log` | one entry per step; `allow` iff the step completed |
//! | `egress_certificate` | step types as permissions, tenant/session restrictions, sealed |
//! | `attestation_quote` | plan hash, runtime, host and counts as measurements, sealed |
//!
//! Certificates and quotes are sealed with the ledger key so verification can
//! re-check them later. Empty receipts, traces or theorem evidence are
//! accepted; the structural skeleton is always complete.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::domain::access_receipt::AccessReceipt;
use crate::domain::execution_plan::{ExecutionPlan, PlanStep, StepStatus, TheoremEvidence, TraceEvidence};
use crate::domain::safety_case::{
    AttestationQuote, BundleId, BundleMetadata, DecisionOutcome, EgressCertificate, KernelDecision,
    SafetyCaseBundle, VerificationStatus,
};
use crate::domain::signing::{PayloadSigner, SignatureError};
use crate::infrastructure::crypto::{canonicalize_value, seal_record};

pub const BUILDER_VERSION: &str = env!("CARGO_PKG_VERSION");
const DECISION_TYPE: &str = "plan_step";

/// Everything needed to assemble one bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleRequest {
    pub session_id: String,
    pub tenant: String,
    pub journey: String,
    pub plan: ExecutionPlan,
    #[serde(default)]
    pub receipts: Vec<AccessReceipt>,
    #[serde(default)]
    pub traces: Vec<TraceEvidence>,
    #[serde(default)]
    pub theorem_evidence: Vec<TheoremEvidence>,
}

#[derive(Debug, Clone)]
pub struct BuilderSettings {
    pub retention: Duration,
    pub certificate_ttl: Duration,
    pub attestation_validity: Duration,
    pub platform: String,
    pub host: String,
    pub runtime: String,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            retention: Duration::days(90),
            certificate_ttl: Duration::hours(24),
            attestation_validity: Duration::hours(24),
            platform: "software".to_string(),
            host: "localhost".to_string(),
            runtime: format!("bastion-ledger/{BUILDER_VERSION}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Signing(#[from] SignatureError),

    #[error("{field} of {span} overflows the timestamp range")]
    TimeOverflow { field: &'static str, span: Duration },
}

/// `now + span`, or [`BuildError::TimeOverflow`] naming the setting.
fn deadline(now: DateTime<Utc>, span: Duration, field: &'static str) -> Result<DateTime<Utc>, BuildError> {
    now.checked_add_signed(span)
        .ok_or(BuildError::TimeOverflow { field, span })
}

pub struct SafetyCaseBuilder {
    ledger_signer: Arc<dyn PayloadSigner>,
    settings: BuilderSettings,
}

impl SafetyCaseBuilder {
    pub fn new(ledger_signer: Arc<dyn PayloadSigner>, settings: BuilderSettings) -> Self {
        Self {
            ledger_signer,
            settings,
        }
    }

    pub fn settings(&self) -> &BuilderSettings {
        &self.settings
    }

    /// Assemble a `pending` bundle. Fails only if the ledger signer does or a
    /// configured lifetime runs past the representable time range.
    pub fn build_at(
        &self,
        request: BundleRequest,
        now: DateTime<Utc>,
    ) -> Result<SafetyCaseBundle, BuildError> {
        let BundleRequest {
            session_id,
            tenant,
            journey,
            plan,
            receipts,
            traces,
            theorem_evidence,
        } = request;

        let expires_at = deadline(now, self.settings.retention, "retention")?;
        let capability_ids = derive_capability_ids(&plan, &receipts);
        let plan_hash = plan_fingerprint(&plan);
        let kernel_decision_log: Vec<KernelDecision> = plan
            .steps
            .iter()
            .map(|step| kernel_decision(&session_id, step, &traces, now))
            .collect();

        let egress_certificate = self.egress_certificate(&session_id, &tenant, &plan, now)?;
        let attestation_quote =
            self.attestation_quote(&session_id, &plan_hash, traces.len(), receipts.len(), now)?;

        let bundle = SafetyCaseBundle {
            id: BundleId::new(),
            session_id,
            tenant,
            capability_ids,
            plan_hash,
            kernel_decision_log,
            egress_certificate,
            attestation_quote,
            metadata: BundleMetadata {
                journey,
                step_count: plan.steps.len(),
                trace_count: traces.len(),
                receipt_count: receipts.len(),
                theorem_evidence,
                builder_version: BUILDER_VERSION.to_string(),
                retention_days: self.settings.retention.num_days(),
            },
            access_receipts: receipts,
            verification_status: VerificationStatus::Pending,
            verification_errors: None,
            verified_at: None,
            created_at: now,
            expires_at,
        };

        info!(
            bundle_id = %bundle.id,
            session_id = %bundle.session_id,
            tenant = %bundle.tenant,
            steps = bundle.metadata.step_count,
            receipts = bundle.metadata.receipt_count,
            "Built safety-case bundle"
        );
        Ok(bundle)
    }

    fn egress_certificate(
        &self,
        session_id: &str,
        tenant: &str,
        plan: &ExecutionPlan,
        now: DateTime<Utc>,
    ) -> Result<EgressCertificate, BuildError> {
        let mut permissions: Vec<String> = Vec::new();
        for step in &plan.steps {
            if !permissions.contains(&step.step_type) {
                permissions.push(step.step_type.clone());
            }
        }

        let mut certificate = EgressCertificate {
            id: format!("cert-{}", Uuid::new_v4()),
            session_id: session_id.to_string(),
            tenant: tenant.to_string(),
            permissions,
            restrictions: vec![format!("tenant:{tenant}"), format!("session:{session_id}")],
            issued_at: now,
            expires_at: deadline(now, self.settings.certificate_ttl, "certificate_ttl")?,
            signature: String::new(),
        };
        certificate.signature = seal_record(self.ledger_signer.as_ref(), &certificate)?;
        Ok(certificate)
    }

    fn attestation_quote(
        &self,
        session_id: &str,
        plan_hash: &str,
        trace_count: usize,
        receipt_count: usize,
        now: DateTime<Utc>,
    ) -> Result<AttestationQuote, BuildError> {
        let measurements = BTreeMap::from([
            ("plan_hash".to_string(), plan_hash.to_string()),
            ("runtime".to_string(), self.settings.runtime.clone()),
            ("host".to_string(), self.settings.host.clone()),
            ("trace_count".to_string(), trace_count.to_string()),
            ("receipt_count".to_string(), receipt_count.to_string()),
        ]);

        let mut quote = AttestationQuote {
            id: format!("quote-{}", Uuid::new_v4()),
            session_id: session_id.to_string(),
            platform: self.settings.platform.clone(),
            measurements,
            timestamp: now,
            expires_at: deadline(now, self.settings.attestation_validity, "attestation_validity")?,
            signature: String::new(),
        };
        quote.signature = seal_record(self.ledger_signer.as_ref(), &quote)?;
        Ok(quote)
    }
}

/// Step capabilities plus one synthetic id per receipt, deduplicated.
pub fn derive_capability_ids(plan: &ExecutionPlan, receipts: &[AccessReceipt]) -> BTreeSet<String> {
    plan.steps
        .iter()
        .map(|step| step.capability.clone())
        .filter(|capability| !capability.is_empty())
        .chain(receipts.iter().map(AccessReceipt::capability_id))
        .collect()
}

pub fn plan_fingerprint(plan: &ExecutionPlan) -> String {
    hex::encode(Sha256::digest(canonicalize_value(&plan.fingerprint_projection())))
}

/// Deterministic id for the decision about `step_id` in `session_id`.
pub fn decision_id(session_id: &str, step_id: &str) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("{session_id}:{step_id}").as_bytes()).to_string()
}

fn kernel_decision(
    session_id: &str,
    step: &PlanStep,
    traces: &[TraceEvidence],
    now: DateTime<Utc>,
) -> KernelDecision {
    let decision = if step.status == StepStatus::Completed {
        DecisionOutcome::Allow
    } else {
        DecisionOutcome::Deny
    };
    let evidence = traces
        .iter()
        .filter(|trace| trace.tool_call_id == step.id)
        .map(|trace| trace.id.clone())
        .collect();

    KernelDecision {
        id: decision_id(session_id, &step.id),
        timestamp: now,
        decision_type: DECISION_TYPE.to_string(),
        decision,
        reason: format!("Step {} finished with status {}", step.id, step.status.as_str()),
        context: json!({
            "step_id": step.id,
            "step_type": step.step_type,
            "capability": step.capability,
            "status": step.status,
        }),
        evidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::crypto::{verify_record, HmacSha256Signer};
    use serde_json::Value;

    fn signer() -> Arc<dyn PayloadSigner> {
        Arc::new(HmacSha256Signer::new(b"ledger-test-key-0123456789abcdefghij".to_vec()).unwrap())
    }

    fn step(id: &str, step_type: &str, capability: &str, status: StepStatus) -> PlanStep {
        PlanStep {
            id: id.into(),
            step_type: step_type.into(),
            capability: capability.into(),
            status,
            params: Value::Null,
        }
    }

    fn plan() -> ExecutionPlan {
        ExecutionPlan {
            id: "plan-1".into(),
            steps: vec![
                step("s1", "retrieve", "crm.read", StepStatus::Completed),
                step("s2", "summarize", "llm.generate", StepStatus::Failed),
                step("s3", "retrieve", "crm.read", StepStatus::Completed),
            ],
            metadata: BTreeMap::new(),
        }
    }

    fn trace(id: &str, tool_call_id: &str) -> TraceEvidence {
        TraceEvidence {
            id: id.into(),
            tool_call_id: tool_call_id.into(),
            timestamp: Utc::now(),
            data: Value::Null,
        }
    }

    fn receipt(query_hash: &str) -> AccessReceipt {
        AccessReceipt {
            id: Uuid::new_v4().to_string(),
            tenant: "acme".into(),
            subject: "data_retrieval".into(),
            shard: "acme-1".into(),
            query_hash: query_hash.into(),
            result_hash: "r".into(),
            nonce: "n".into(),
            expires_at: Utc::now() + Duration::hours(1),
            signature: "sig".into(),
        }
    }

    fn request(plan: ExecutionPlan) -> BundleRequest {
        BundleRequest {
            session_id: "sess-1".into(),
            tenant: "acme".into(),
            journey: "quarterly-report".into(),
            plan,
            receipts: vec![receipt("abcdefgh1234"), receipt("abcdefgh5678"), receipt("zz")],
            traces: vec![trace("t1", "s1"), trace("t2", "s2"), trace("t3", "s1")],
            theorem_evidence: vec![],
        }
    }

    #[test]
    fn test_capability_ids_union_and_dedup() {
        let req = request(plan());
        let ids = derive_capability_ids(&req.plan, &req.receipts);
        let expected: BTreeSet<String> = ["crm.read", "llm.generate", "receipt:abcdefgh", "receipt:zz"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_decision_log_follows_steps() {
        let now = Utc::now();
        let bundle = SafetyCaseBuilder::new(signer(), BuilderSettings::default())
            .build_at(request(plan()), now)
            .unwrap();
        let log = &bundle.kernel_decision_log;
        assert_eq!(log.len(), 3);
        assert_eq!(log[0].decision, DecisionOutcome::Allow);
        assert_eq!(log[0].evidence, vec!["t1".to_string(), "t3".to_string()]);
        assert_eq!(log[1].decision, DecisionOutcome::Deny);
        assert_eq!(log[1].evidence, vec!["t2".to_string()]);
        assert!(log[2].evidence.is_empty());
        assert_eq!(log[0].id, decision_id("sess-1", "s1"));
        assert_eq!(bundle.verification_status, VerificationStatus::Pending);
    }

    #[test]
    fn test_certificate_and_quote() {
        let now = Utc::now();
        let signer = signer();
        let bundle = SafetyCaseBuilder::new(signer.clone(), BuilderSettings::default())
            .build_at(request(plan()), now)
            .unwrap();

        let cert = &bundle.egress_certificate;
        assert_eq!(cert.permissions, vec!["retrieve".to_string(), "summarize".to_string()]);
        assert_eq!(cert.restrictions, vec!["tenant:acme".to_string(), "session:sess-1".to_string()]);
        assert_eq!(cert.expires_at, now + Duration::hours(24));
        assert!(verify_record(signer.as_ref(), cert).unwrap());

        let quote = &bundle.attestation_quote;
        assert_eq!(quote.measurements["plan_hash"], bundle.plan_hash);
        assert_eq!(quote.measurements["trace_count"], "3");
        assert_eq!(quote.measurements["receipt_count"], "3");
        assert!(verify_record(signer.as_ref(), quote).unwrap());

        assert_eq!(bundle.expires_at, now + Duration::days(90));
        assert_eq!(bundle.metadata.retention_days, 90);
    }

    #[test]
    fn test_plan_hash_tracks_steps_and_metadata() {
        let base = plan_fingerprint(&plan());
        assert_eq!(base, plan_fingerprint(&plan()));
        assert_eq!(base.len(), 64);

        let mut changed_step = plan();
        changed_step.steps[1].status = StepStatus::Completed;
        assert_ne!(base, plan_fingerprint(&changed_step));

        let mut changed_meta = plan();
        changed_meta.metadata.insert("owner".into(), Value::from("ops"));
        assert_ne!(base, plan_fingerprint(&changed_meta));
    }

    #[test]
    fn test_empty_plan_still_has_certificate_and_quote() {
        let empty = ExecutionPlan {
            id: "plan-empty".into(),
            steps: vec![],
            metadata: BTreeMap::new(),
        };
        let mut req = request(empty);
        req.receipts.clear();
        req.traces.clear();
        let bundle = SafetyCaseBuilder::new(signer(), BuilderSettings::default())
            .build_at(req, Utc::now())
            .unwrap();
        assert!(bundle.egress_certificate.is_present());
        assert!(bundle.attestation_quote.is_present());
        assert!(bundle.kernel_decision_log.is_empty());
        assert!(bundle.capability_ids.is_empty());
    }

    #[test]
    fn test_oversized_retention_is_an_error() {
        let settings = BuilderSettings {
            retention: Duration::days(365 * 1_000_000),
            ..BuilderSettings::default()
        };
        let err = SafetyCaseBuilder::new(signer(), settings)
            .build_at(request(plan()), Utc::now())
            .unwrap_err();
        assert!(matches!(err, BuildError::TimeOverflow { field: "retention", .. }));
    }
}
