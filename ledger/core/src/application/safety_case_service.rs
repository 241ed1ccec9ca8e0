// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Safety-Case Service
//!
//! Application service over the bundle store: create, query, verify, export,
//! report and expire safety-case bundles.
//!
//! ## Verification
//!
//! Every call recomputes the status from scratch and records it on the bundle:
//!
//! 1. `"Missing required components"`
//! 2. `"Invalid access receipts"`
//! 3. `"Expired certificates"`
//! 4. `"Invalid certificate signatures"` (certificate and quote seals)
//!
//! The first failing check is the only recorded error. A signer fault is
//! recorded as [`VERIFICATION_INTERNAL_ERROR`] instead of escaping.
//!
//! ## Creation
//!
//! Receipts submitted with a bundle get the same signature, tenant and expiry
//! checks as a receipts header before anything is built.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::application::bundle_builder::{BuildError, BundleRequest, SafetyCaseBuilder};
use crate::application::receipt_validator::ReceiptValidator;
use crate::domain::auth::AuthFailure;
use crate::domain::events::SafetyCaseEvent;
use crate::domain::repository::{RepositoryError, SafetyCaseRepository};
use crate::domain::safety_case::{BundleDefect, BundleId, SafetyCaseBundle, VerificationStatus};
use crate::domain::signing::PayloadSigner;
use crate::infrastructure::crypto::verify_record;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::export::{self, ExportError, ExportFormat};

pub const VERIFICATION_INTERNAL_ERROR: &str = "Verification error: internal failure";

#[derive(Debug, thiserror::Error)]
pub enum SafetyCaseError {
    #[error("Bundle {0} not found")]
    NotFound(BundleId),

    #[error("Bundle {id} failed verification: {}", .errors.join("; "))]
    VerificationFailed { id: BundleId, errors: Vec<String> },

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error("Bundle receipts rejected: {0}")]
    ReceiptRejected(AuthFailure),

    #[error("Bundle build failed: {0}")]
    Build(#[from] BuildError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),
}

/// Outcome of one verification pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    pub bundle_id: BundleId,
    pub verified: bool,
    pub status: VerificationStatus,
    pub errors: Vec<String>,
    pub verified_at: DateTime<Utc>,
}

impl VerificationReport {
    fn from_bundle(bundle: &SafetyCaseBundle, now: DateTime<Utc>) -> Self {
        Self {
            bundle_id: bundle.id,
            verified: bundle.verification_status == VerificationStatus::Verified,
            status: bundle.verification_status,
            errors: bundle.verification_errors.clone().unwrap_or_default(),
            verified_at: bundle.verified_at.unwrap_or(now),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub total: usize,
    pub pending: usize,
    pub verified: usize,
    pub failed: usize,
    pub expired: usize,
}

/// Run the verification checks against `bundle` without touching its state.
pub fn evaluate_bundle(
    bundle: &SafetyCaseBundle,
    ledger_signer: &dyn PayloadSigner,
    now: DateTime<Utc>,
    attestation_max_age: Duration,
) -> Result<(), String> {
    bundle
        .check_integrity(now, attestation_max_age)
        .map_err(|defect| defect.message().to_string())?;

    let certificate = verify_record(ledger_signer, &bundle.egress_certificate);
    let quote = verify_record(ledger_signer, &bundle.attestation_quote);
    match (certificate, quote) {
        (Ok(true), Ok(true)) => Ok(()),
        (Err(e), _) | (_, Err(e)) => {
            error!(bundle_id = %bundle.id, error = %e, "Bundle signature check failed internally");
            Err(VERIFICATION_INTERNAL_ERROR.to_string())
        }
        _ => Err(BundleDefect::InvalidSignatures.message().to_string()),
    }
}

/// Apply [`evaluate_bundle`] and record the outcome on the bundle.
fn apply_verification(
    bundle: &mut SafetyCaseBundle,
    ledger_signer: &dyn PayloadSigner,
    now: DateTime<Utc>,
    attestation_max_age: Duration,
) {
    match evaluate_bundle(bundle, ledger_signer, now, attestation_max_age) {
        Ok(()) => bundle.record_verified(now),
        Err(message) => bundle.record_failed(vec![message], now),
    }
}

pub struct SafetyCaseService {
    repository: Arc<dyn SafetyCaseRepository>,
    builder: SafetyCaseBuilder,
    receipt_validator: ReceiptValidator,
    ledger_signer: Arc<dyn PayloadSigner>,
    event_bus: EventBus,
    attestation_max_age: Duration,
}

impl SafetyCaseService {
    pub fn new(
        repository: Arc<dyn SafetyCaseRepository>,
        builder: SafetyCaseBuilder,
        receipt_validator: ReceiptValidator,
        ledger_signer: Arc<dyn PayloadSigner>,
        event_bus: EventBus,
        attestation_max_age: Duration,
    ) -> Self {
        Self {
            repository,
            builder,
            receipt_validator,
            ledger_signer,
            event_bus,
            attestation_max_age,
        }
    }

    pub async fn create(&self, request: BundleRequest) -> Result<SafetyCaseBundle, SafetyCaseError> {
        self.create_at(request, Utc::now()).await
    }

    pub async fn create_at(
        &self,
        request: BundleRequest,
        now: DateTime<Utc>,
    ) -> Result<SafetyCaseBundle, SafetyCaseError> {
        if let Err(failure) =
            self.receipt_validator
                .validate_receipts_at(&request.receipts, &request.tenant, now)
        {
            warn!(tenant = %request.tenant, session_id = %request.session_id, %failure, "Bundle receipts rejected");
            return Err(SafetyCaseError::ReceiptRejected(failure));
        }
        let bundle = self.builder.build_at(request, now)?;
        self.repository.save(&bundle).await?;
        self.event_bus.publish_safety_case_event(SafetyCaseEvent::BundleCreated {
            bundle_id: bundle.id,
            session_id: bundle.session_id.clone(),
            tenant: bundle.tenant.clone(),
            created_at: bundle.created_at,
        });
        Ok(bundle)
    }

    pub async fn get(&self, id: BundleId) -> Result<SafetyCaseBundle, SafetyCaseError> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or(SafetyCaseError::NotFound(id))
    }

    pub async fn list_by_session(&self, session_id: &str) -> Result<Vec<SafetyCaseBundle>, SafetyCaseError> {
        Ok(self.repository.find_by_session(session_id).await?)
    }

    pub async fn list_by_tenant(&self, tenant: &str) -> Result<Vec<SafetyCaseBundle>, SafetyCaseError> {
        Ok(self.repository.find_by_tenant(tenant).await?)
    }

    pub async fn verify(&self, id: BundleId) -> Result<VerificationReport, SafetyCaseError> {
        self.verify_at(id, Utc::now()).await
    }

    /// Recompute and persist the verification status of a bundle.
    pub async fn verify_at(
        &self,
        id: BundleId,
        now: DateTime<Utc>,
    ) -> Result<VerificationReport, SafetyCaseError> {
        let bundle = self.verify_and_record(id, now).await?;
        Ok(VerificationReport::from_bundle(&bundle, now))
    }

    async fn verify_and_record(
        &self,
        id: BundleId,
        now: DateTime<Utc>,
    ) -> Result<SafetyCaseBundle, SafetyCaseError> {
        let mut bundle = self.get(id).await?;
        apply_verification(&mut bundle, self.ledger_signer.as_ref(), now, self.attestation_max_age);
        if !self.repository.update(&bundle).await? {
            // purged while verifying
            return Err(SafetyCaseError::NotFound(id));
        }

        match bundle.verification_status {
            VerificationStatus::Verified => {
                info!(bundle_id = %id, "Safety-case bundle verified");
                self.event_bus.publish_safety_case_event(SafetyCaseEvent::BundleVerified {
                    bundle_id: id,
                    verified_at: now,
                });
            }
            _ => {
                let errors = bundle.verification_errors.clone().unwrap_or_default();
                warn!(bundle_id = %id, ?errors, "Safety-case bundle failed verification");
                self.event_bus.publish_safety_case_event(SafetyCaseEvent::BundleVerificationFailed {
                    bundle_id: id,
                    errors,
                    failed_at: now,
                });
            }
        }
        Ok(bundle)
    }

    pub async fn export(&self, id: BundleId, format: ExportFormat) -> Result<Vec<u8>, SafetyCaseError> {
        self.export_at(id, format, Utc::now()).await
    }

    /// Verify, then serialize. A bundle that fails verification is not exported.
    pub async fn export_at(
        &self,
        id: BundleId,
        format: ExportFormat,
        now: DateTime<Utc>,
    ) -> Result<Vec<u8>, SafetyCaseError> {
        let bundle = self.verify_and_record(id, now).await?;
        if bundle.verification_status != VerificationStatus::Verified {
            return Err(SafetyCaseError::VerificationFailed {
                id,
                errors: bundle.verification_errors.unwrap_or_default(),
            });
        }
        let bytes = export::write_export(&bundle, format, now)?;
        info!(bundle_id = %id, format = ?format, bytes = bytes.len(), "Exported safety-case bundle");
        Ok(bytes)
    }

    pub async fn stats(&self) -> Result<LedgerStats, SafetyCaseError> {
        self.stats_at(Utc::now()).await
    }

    pub async fn stats_at(&self, now: DateTime<Utc>) -> Result<LedgerStats, SafetyCaseError> {
        let bundles = self.repository.list_all().await?;
        Ok(tally(&bundles, now))
    }

    /// Stats restricted to one tenant's bundles.
    pub async fn tenant_stats_at(
        &self,
        tenant: &str,
        now: DateTime<Utc>,
    ) -> Result<LedgerStats, SafetyCaseError> {
        let bundles = self.repository.find_by_tenant(tenant).await?;
        Ok(tally(&bundles, now))
    }

    pub async fn cleanup_expired(&self) -> Result<usize, SafetyCaseError> {
        self.cleanup_expired_at(Utc::now()).await
    }

    /// Remove bundles with `expires_at < now`; returns the exact count removed.
    pub async fn cleanup_expired_at(&self, now: DateTime<Utc>) -> Result<usize, SafetyCaseError> {
        let removed = self.repository.remove_expired(now).await?;
        if removed > 0 {
            info!(removed, "Purged expired safety-case bundles");
            self.event_bus.publish_safety_case_event(SafetyCaseEvent::BundlesExpired {
                removed,
                swept_at: now,
            });
        }
        Ok(removed)
    }
}

fn tally(bundles: &[SafetyCaseBundle], now: DateTime<Utc>) -> LedgerStats {
    let mut stats = LedgerStats {
        total: bundles.len(),
        ..LedgerStats::default()
    };
    for bundle in bundles {
        match bundle.verification_status {
            VerificationStatus::Pending => stats.pending += 1,
            VerificationStatus::Verified => stats.verified += 1,
            VerificationStatus::Failed => stats.failed += 1,
        }
        if bundle.is_expired_at(now) {
            stats.expired += 1;
        }
    }
    stats
}

/// Re-verify an exported bundle (JSON or tar) offline, without the store.
pub fn verify_export(
    bytes: &[u8],
    ledger_signer: &dyn PayloadSigner,
    now: DateTime<Utc>,
    attestation_max_age: Duration,
) -> Result<VerificationReport, ExportError> {
    let format = export::detect_format(bytes);
    let mut bundle = export::read_bundle(bytes, format)?;
    apply_verification(&mut bundle, ledger_signer, now, attestation_max_age);
    Ok(VerificationReport::from_bundle(&bundle, now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::bundle_builder::BuilderSettings;
    use crate::domain::execution_plan::{ExecutionPlan, PlanStep, StepStatus};
    use crate::infrastructure::crypto::HmacSha256Signer;
    use crate::infrastructure::repositories::InMemorySafetyCaseRepository;
    use crate::application::issuer::ReceiptIssuer;
    use crate::domain::signing::SignatureError;
    use crate::domain::repository::RepositoryError;
    use crate::domain::access_receipt::AccessReceipt;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::BTreeMap;

    struct FailingSigner;

    impl PayloadSigner for FailingSigner {
        fn algorithm(&self) -> &'static str {
            "failing"
        }
        fn sign(&self, _payload: &[u8]) -> Result<String, SignatureError> {
            Ok("00".to_string())
        }
        fn verify(&self, _payload: &[u8], _signature: &str) -> Result<bool, SignatureError> {
            Err(SignatureError::KeyMaterial("key unavailable".to_string()))
        }
    }

    fn ledger_signer() -> Arc<dyn PayloadSigner> {
        Arc::new(HmacSha256Signer::new(b"ledger-service-key-0123456789abcdef".to_vec()).unwrap())
    }

    fn receipt_signer() -> Arc<dyn PayloadSigner> {
        Arc::new(HmacSha256Signer::new(b"receipt-service-key-0123456789abcde".to_vec()).unwrap())
    }

    fn service_on(repository: Arc<dyn SafetyCaseRepository>, signer: Arc<dyn PayloadSigner>) -> SafetyCaseService {
        SafetyCaseService::new(
            repository,
            SafetyCaseBuilder::new(signer.clone(), BuilderSettings::default()),
            ReceiptValidator::new(receipt_signer(), false),
            signer,
            EventBus::new(16),
            Duration::hours(24),
        )
    }

    fn service_with(signer: Arc<dyn PayloadSigner>) -> SafetyCaseService {
        service_on(Arc::new(InMemorySafetyCaseRepository::new()), signer)
    }

    fn receipt(tenant: &str, ttl: Duration, now: DateTime<Utc>) -> AccessReceipt {
        ReceiptIssuer::new(receipt_signer())
            .issue_at(tenant, "data_retrieval", "acme-1", "SELECT 1", &json!([]), ttl, now)
            .unwrap()
    }

    fn request(receipt_ttl: Duration, now: DateTime<Utc>) -> BundleRequest {
        BundleRequest {
            session_id: "sess-1".into(),
            tenant: "acme".into(),
            journey: "quarterly-report".into(),
            plan: ExecutionPlan {
                id: "plan-1".into(),
                steps: vec![PlanStep {
                    id: "s1".into(),
                    step_type: "retrieve".into(),
                    capability: "crm.read".into(),
                    status: StepStatus::Completed,
                    params: Value::Null,
                }],
                metadata: BTreeMap::new(),
            },
            receipts: vec![receipt("acme", receipt_ttl, now)],
            traces: vec![],
            theorem_evidence: vec![],
        }
    }

    #[tokio::test]
    async fn test_verify_is_idempotent() {
        let service = service_with(ledger_signer());
        let now = Utc::now();
        let bundle = service.create_at(request(Duration::days(3), now), now).await.unwrap();

        let first = service.verify_at(bundle.id, now).await.unwrap();
        let second = service.verify_at(bundle.id, now).await.unwrap();
        assert!(first.verified);
        assert_eq!(first, second);
        assert_eq!(service.get(bundle.id).await.unwrap().verification_status, VerificationStatus::Verified);
    }

    #[tokio::test]
    async fn test_certificate_expiry_flips_status() {
        let service = service_with(ledger_signer());
        let now = Utc::now();
        let bundle = service.create_at(request(Duration::days(3), now), now).await.unwrap();
        assert!(service.verify_at(bundle.id, now).await.unwrap().verified);

        let later = now + Duration::hours(25);
        let report = service.verify_at(bundle.id, later).await.unwrap();
        assert!(!report.verified);
        assert_eq!(report.status, VerificationStatus::Failed);
        assert_eq!(report.errors, vec!["Expired certificates".to_string()]);
    }

    #[tokio::test]
    async fn test_tampered_certificate_fails_signature_check() {
        let signer = ledger_signer();
        let repository = Arc::new(InMemorySafetyCaseRepository::new());
        let service = service_on(repository.clone(), signer);
        let now = Utc::now();
        let mut bundle = service.create_at(request(Duration::days(3), now), now).await.unwrap();
        bundle.egress_certificate.permissions.push("export".into());
        repository.save(&bundle).await.unwrap();

        let report = service.verify_at(bundle.id, now).await.unwrap();
        assert_eq!(report.errors, vec!["Invalid certificate signatures".to_string()]);
    }

    #[tokio::test]
    async fn test_signer_fault_is_recorded_not_raised() {
        let service = service_with(Arc::new(FailingSigner));
        let now = Utc::now();
        let bundle = service.create_at(request(Duration::days(3), now), now).await.unwrap();
        let report = service.verify_at(bundle.id, now).await.unwrap();
        assert_eq!(report.status, VerificationStatus::Failed);
        assert_eq!(report.errors, vec![VERIFICATION_INTERNAL_ERROR.to_string()]);
    }

    #[tokio::test]
    async fn test_export_requires_successful_verification() {
        let service = service_with(ledger_signer());
        let now = Utc::now();
        let mut req = request(Duration::days(3), now);
        req.receipts.clear();
        let bundle = service.create_at(req, now).await.unwrap();

        match service.export_at(bundle.id, ExportFormat::Json, now).await {
            Err(SafetyCaseError::VerificationFailed { errors, .. }) => {
                assert_eq!(errors, vec!["Missing required components".to_string()])
            }
            other => panic!("unexpected result: {:?}", other.map(|b| b.len())),
        }
    }

    #[tokio::test]
    async fn test_unknown_bundle_is_not_found() {
        let service = service_with(ledger_signer());
        let id = BundleId::new();
        assert!(matches!(
            service.verify(id).await,
            Err(SafetyCaseError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_stats_counts_by_status() {
        let service = service_with(ledger_signer());
        let now = Utc::now();
        let ok = service.create_at(request(Duration::days(3), now), now).await.unwrap();
        let mut empty = request(Duration::days(3), now);
        empty.receipts.clear();
        let bad = service.create_at(empty, now).await.unwrap();
        service.create_at(request(Duration::days(3), now), now).await.unwrap();

        service.verify_at(ok.id, now).await.unwrap();
        service.verify_at(bad.id, now).await.unwrap();

        let stats = service.stats_at(now).await.unwrap();
        assert_eq!(
            stats,
            LedgerStats { total: 3, pending: 1, verified: 1, failed: 1, expired: 0 }
        );
        let far_future = service.stats_at(now + Duration::days(91)).await.unwrap();
        assert_eq!(far_future.expired, 3);
    }

    #[tokio::test]
    async fn test_create_rejects_unsigned_or_foreign_receipts() {
        let service = service_with(ledger_signer());
        let now = Utc::now();

        let mut forged = request(Duration::days(3), now);
        forged.receipts[0].signature = "FORGED".into();
        assert!(matches!(
            service.create_at(forged, now).await,
            Err(SafetyCaseError::ReceiptRejected(AuthFailure::ReceiptSignatureInvalid { index: 0 }))
        ));

        let mut foreign = request(Duration::days(3), now);
        foreign.receipts.push(receipt("globex", Duration::days(3), now));
        assert!(matches!(
            service.create_at(foreign, now).await,
            Err(SafetyCaseError::ReceiptRejected(AuthFailure::ReceiptTenantMismatch { index: 1, .. }))
        ));

        let mut expired = request(Duration::days(3), now);
        expired.receipts = vec![receipt("acme", Duration::minutes(5), now - Duration::hours(1))];
        assert!(matches!(
            service.create_at(expired, now).await,
            Err(SafetyCaseError::ReceiptRejected(AuthFailure::ReceiptExpired { index: 0, .. }))
        ));

        assert_eq!(service.stats_at(now).await.unwrap().total, 0);
    }

    /// Drops the bundle from the inner store as soon as it is read.
    struct PurgeOnRead(InMemorySafetyCaseRepository);

    #[async_trait]
    impl SafetyCaseRepository for PurgeOnRead {
        async fn save(&self, bundle: &SafetyCaseBundle) -> Result<(), RepositoryError> {
            self.0.save(bundle).await
        }
        async fn update(&self, bundle: &SafetyCaseBundle) -> Result<bool, RepositoryError> {
            self.0.update(bundle).await
        }
        async fn find_by_id(&self, id: BundleId) -> Result<Option<SafetyCaseBundle>, RepositoryError> {
            let found = self.0.find_by_id(id).await?;
            if let Some(bundle) = &found {
                self.0.remove_expired(bundle.expires_at + Duration::seconds(1)).await?;
            }
            Ok(found)
        }
        async fn find_by_session(&self, session_id: &str) -> Result<Vec<SafetyCaseBundle>, RepositoryError> {
            self.0.find_by_session(session_id).await
        }
        async fn find_by_tenant(&self, tenant: &str) -> Result<Vec<SafetyCaseBundle>, RepositoryError> {
            self.0.find_by_tenant(tenant).await
        }
        async fn list_all(&self) -> Result<Vec<SafetyCaseBundle>, RepositoryError> {
            self.0.list_all().await
        }
        async fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
            self.0.remove_expired(now).await
        }
    }

    #[tokio::test]
    async fn test_verify_does_not_resurrect_a_purged_bundle() {
        let store = InMemorySafetyCaseRepository::new();
        let service = service_on(Arc::new(PurgeOnRead(store.clone())), ledger_signer());
        let now = Utc::now();
        let bundle = service.create_at(request(Duration::days(3), now), now).await.unwrap();
        let mut events = service.event_bus.subscribe();

        assert!(matches!(
            service.verify_at(bundle.id, now).await,
            Err(SafetyCaseError::NotFound(missing)) if missing == bundle.id
        ));
        assert!(store.find_by_id(bundle.id).await.unwrap().is_none());
        assert!(store.list_all().await.unwrap().is_empty());
        assert!(events.try_recv().is_err());
    }
}
