// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Request Guard
//!
//! Single choke-point every inbound ledger request passes through before any
//! business logic runs.
//!
//! ```text
//! InboundRequest
//!   └─ request id (caller supplied or UUID v4)
//!   └─ CapabilityValidator        PF_SIG_*
//!   └─ tenant directory           TENANT_NOT_FOUND (only if configured)
//!   └─ ReceiptValidator           ACCESS_RECEIPT_*
//!   └─ TenantRateLimiter          RATE_LIMIT_EXCEEDED
//!   ▼
//! AuthorizedRequest | RejectedRequest
//! ```
//!
//! Only requests that pass authentication consume the tenant's rate window.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::application::capability_validator::CapabilityValidator;
use crate::application::receipt_validator::ReceiptValidator;
use crate::domain::access_receipt::AccessReceipt;
use crate::domain::auth::{AuthErrorCode, AuthFailure, ErrorEnvelope, PrincipalContext};
use crate::domain::events::AccessEvent;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::rate_limiter::{RateDecision, TenantRateLimiter};

/// Raw authentication material lifted off a request by the transport.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub assertion: Option<String>,
    pub receipts: Option<String>,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthorizedRequest {
    pub request_id: String,
    pub principal: PrincipalContext,
    pub receipts: Vec<AccessReceipt>,
    pub rate: RateDecision,
}

#[derive(Debug, Clone)]
pub struct RejectedRequest {
    pub request_id: String,
    pub failure: AuthFailure,
    pub rejected_at: DateTime<Utc>,
}

impl RejectedRequest {
    pub fn status(&self) -> u16 {
        self.failure.status()
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        self.failure.to_envelope(&self.request_id, self.rejected_at)
    }
}

pub struct RequestGuard {
    capability_validator: CapabilityValidator,
    receipt_validator: ReceiptValidator,
    rate_limiter: Arc<TenantRateLimiter>,
    known_tenants: Option<HashSet<String>>,
    event_bus: EventBus,
}

impl RequestGuard {
    pub fn new(
        capability_validator: CapabilityValidator,
        receipt_validator: ReceiptValidator,
        rate_limiter: Arc<TenantRateLimiter>,
        event_bus: EventBus,
    ) -> Self {
        Self {
            capability_validator,
            receipt_validator,
            rate_limiter,
            known_tenants: None,
            event_bus,
        }
    }

    /// Restrict accepted tenants to a registered set.
    pub fn with_known_tenants<I, S>(mut self, tenants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.known_tenants = Some(tenants.into_iter().map(Into::into).collect());
        self
    }

    pub fn authorize(&self, request: InboundRequest) -> Result<AuthorizedRequest, RejectedRequest> {
        self.authorize_at(request, Utc::now())
    }

    pub fn authorize_at(
        &self,
        request: InboundRequest,
        now: DateTime<Utc>,
    ) -> Result<AuthorizedRequest, RejectedRequest> {
        let request_id = request
            .request_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut tenant = None;
        let outcome = self.run_checks(&request, now, &mut tenant);
        match outcome {
            Ok((principal, receipts, rate)) => {
                debug!(
                    request_id = %request_id,
                    tenant = %principal.tenant,
                    principal = %principal.principal_id,
                    receipts = receipts.len(),
                    remaining = rate.remaining,
                    "Request authorized"
                );
                Ok(AuthorizedRequest {
                    request_id,
                    principal,
                    receipts,
                    rate,
                })
            }
            Err(failure) => Err(self.reject(request_id, failure, tenant, now)),
        }
    }

    fn run_checks(
        &self,
        request: &InboundRequest,
        now: DateTime<Utc>,
        tenant: &mut Option<String>,
    ) -> Result<(PrincipalContext, Vec<AccessReceipt>, RateDecision), AuthFailure> {
        let principal = self
            .capability_validator
            .validate_at(request.assertion.as_deref(), now)?;
        *tenant = Some(principal.tenant.clone());

        if let Some(known) = &self.known_tenants {
            if !known.contains(&principal.tenant) {
                return Err(AuthFailure::TenantNotFound(principal.tenant));
            }
        }

        let receipts =
            self.receipt_validator
                .validate_at(request.receipts.as_deref(), &principal.tenant, now)?;

        let rate = self
            .rate_limiter
            .check_at(&principal.tenant, now)
            .map_err(AuthFailure::RateLimited)?;

        Ok((principal, receipts, rate))
    }

    fn reject(
        &self,
        request_id: String,
        failure: AuthFailure,
        tenant: Option<String>,
        now: DateTime<Utc>,
    ) -> RejectedRequest {
        let code = failure.code();
        if code == AuthErrorCode::InternalError {
            error!(request_id = %request_id, error = %failure, "Request authentication failed internally");
        } else {
            warn!(request_id = %request_id, code = %code, tenant = ?tenant, reason = %failure, "Request rejected");
        }
        self.event_bus.publish_access_event(AccessEvent::RequestRejected {
            request_id: request_id.clone(),
            code,
            tenant,
            rejected_at: now,
        });
        RejectedRequest {
            request_id,
            failure,
            rejected_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::issuer::{encode_receipt_batch, CapabilityIssuer, ReceiptIssuer};
    use crate::domain::signing::PayloadSigner;
    use crate::infrastructure::crypto::HmacSha256Signer;
    use crate::infrastructure::event_bus::LedgerEvent;
    use crate::infrastructure::rate_limiter::RateLimitPolicy;
    use chrono::Duration;
    use serde_json::json;

    struct Fixture {
        capability_signer: Arc<dyn PayloadSigner>,
        receipt_signer: Arc<dyn PayloadSigner>,
        bus: EventBus,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                capability_signer: Arc::new(
                    HmacSha256Signer::new(b"guard-capability-key-0123456789abcdef".to_vec()).unwrap(),
                ),
                receipt_signer: Arc::new(
                    HmacSha256Signer::new(b"guard-receipt-key-0123456789abcdefgh".to_vec()).unwrap(),
                ),
                bus: EventBus::new(16),
            }
        }

        fn guard(&self, max_requests: u32) -> RequestGuard {
            RequestGuard::new(
                CapabilityValidator::new(self.capability_signer.clone()),
                ReceiptValidator::new(self.receipt_signer.clone(), false),
                Arc::new(TenantRateLimiter::new(RateLimitPolicy {
                    max_requests,
                    window: Duration::minutes(15),
                })),
                self.bus.clone(),
            )
        }

        fn token(&self, tenant: &str, now: DateTime<Utc>) -> String {
            CapabilityIssuer::new(self.capability_signer.clone())
                .issue_at(tenant, "analyst-7", ["crm.read"], Duration::minutes(5), now)
                .unwrap()
                .token
        }

        fn receipts(&self, tenant: &str, now: DateTime<Utc>) -> String {
            let receipt = ReceiptIssuer::new(self.receipt_signer.clone())
                .issue_at(tenant, "data_retrieval", "s-1", "q", &json!([]), Duration::minutes(5), now)
                .unwrap();
            encode_receipt_batch(&[receipt]).unwrap()
        }
    }

    #[test]
    fn test_authorized_request_carries_principal_and_receipts() {
        let fx = Fixture::new();
        let now = Utc::now();
        let authorized = fx
            .guard(100)
            .authorize_at(
                InboundRequest {
                    assertion: Some(fx.token("acme", now)),
                    receipts: Some(fx.receipts("acme", now)),
                    request_id: Some("req-42".into()),
                },
                now,
            )
            .unwrap();
        assert_eq!(authorized.request_id, "req-42");
        assert_eq!(authorized.principal.tenant, "acme");
        assert_eq!(authorized.receipts.len(), 1);
        assert_eq!(authorized.rate.remaining, 99);
    }

    #[test]
    fn test_missing_assertion_gets_generated_request_id() {
        let fx = Fixture::new();
        let mut events = fx.bus.subscribe();
        let rejected = fx.guard(100).authorize(InboundRequest::default()).unwrap_err();
        assert_eq!(rejected.failure.code(), AuthErrorCode::PfSigMissing);
        assert!(Uuid::parse_str(&rejected.request_id).is_ok());

        let envelope = rejected.envelope();
        assert_eq!(envelope.status, 403);
        assert_eq!(envelope.request_id, rejected.request_id);

        match events.try_recv().unwrap() {
            LedgerEvent::Access(AccessEvent::RequestRejected { code, tenant, .. }) => {
                assert_eq!(code, AuthErrorCode::PfSigMissing);
                assert!(tenant.is_none());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_unknown_tenant_rejected_before_receipts() {
        let fx = Fixture::new();
        let now = Utc::now();
        let guard = fx.guard(100).with_known_tenants(["globex"]);
        let rejected = guard
            .authorize_at(
                InboundRequest {
                    assertion: Some(fx.token("acme", now)),
                    receipts: Some("garbage".into()),
                    request_id: None,
                },
                now,
            )
            .unwrap_err();
        assert_eq!(rejected.failure.code(), AuthErrorCode::TenantNotFound);
        assert_eq!(rejected.status(), 403);
    }

    #[test]
    fn test_rejected_requests_do_not_consume_rate_budget() {
        let fx = Fixture::new();
        let now = Utc::now();
        let guard = fx.guard(1);
        let bad = InboundRequest {
            assertion: Some(fx.token("acme", now)),
            receipts: Some(fx.receipts("globex", now)),
            request_id: None,
        };
        assert!(guard.authorize_at(bad, now).is_err());

        let good = InboundRequest {
            assertion: Some(fx.token("acme", now)),
            ..Default::default()
        };
        assert!(guard.authorize_at(good.clone(), now).is_ok());
        let limited = guard.authorize_at(good, now).unwrap_err();
        assert_eq!(limited.status(), 429);
        let details = limited.envelope().error.details.unwrap();
        assert_eq!(details["tenant"], "acme");
        assert_eq!(details["limit"], 1);
    }
}
