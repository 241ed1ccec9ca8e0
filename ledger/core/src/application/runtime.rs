// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Ledger Runtime - explicit component wiring
//
// Builds every ledger component from a validated `LedgerConfigManifest`:
// signers, validators, rate limiter, replay guard, bundle store, service,
// request guard and sweeper. Constructed once by the process startup routine
// and shared by reference; nothing is created implicitly at module load.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::application::bundle_builder::{BuilderSettings, SafetyCaseBuilder, BUILDER_VERSION};
use crate::application::capability_validator::CapabilityValidator;
use crate::application::lifecycle::{LedgerSweeper, LedgerSweeperConfig};
use crate::application::receipt_validator::ReceiptValidator;
use crate::application::request_guard::RequestGuard;
use crate::application::safety_case_service::SafetyCaseService;
use crate::domain::ledger_config::{resolve_key_reference, to_chrono, LedgerConfigManifest, SigningConfig};
use crate::domain::repository::SafetyCaseRepository;
use crate::domain::signing::PayloadSigner;
use crate::infrastructure::crypto::HmacSha256Signer;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::rate_limiter::{RateLimitPolicy, TenantRateLimiter};
use crate::infrastructure::replay_guard::NonceReplayGuard;
use crate::infrastructure::repositories::InMemorySafetyCaseRepository;

/// Raw key material for the three signing roles.
pub struct SigningKeys {
    pub capability: Vec<u8>,
    pub receipt: Vec<u8>,
    pub ledger: Vec<u8>,
}

impl std::fmt::Debug for SigningKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningKeys([redacted])")
    }
}

impl SigningKeys {
    pub fn resolve(config: &SigningConfig) -> Result<Self> {
        Ok(Self {
            capability: resolve_key_reference(&config.capability_key)
                .context("Failed to resolve signing.capability_key")?,
            receipt: resolve_key_reference(&config.receipt_key)
                .context("Failed to resolve signing.receipt_key")?,
            ledger: resolve_key_reference(&config.ledger_key)
                .context("Failed to resolve signing.ledger_key")?,
        })
    }
}

pub struct LedgerRuntime {
    pub config: LedgerConfigManifest,
    pub event_bus: EventBus,
    pub rate_limiter: Arc<TenantRateLimiter>,
    pub replay_guard: Option<Arc<NonceReplayGuard>>,
    pub repository: Arc<dyn SafetyCaseRepository>,
    pub service: Arc<SafetyCaseService>,
    pub guard: Arc<RequestGuard>,
    pub ledger_signer: Arc<dyn PayloadSigner>,
}

impl LedgerRuntime {
    /// Resolve keys from the manifest's references and wire the runtime.
    pub fn from_config(config: LedgerConfigManifest) -> Result<Self> {
        let keys = SigningKeys::resolve(&config.spec.signing)?;
        Self::with_keys(config, keys)
    }

    pub fn with_keys(config: LedgerConfigManifest, keys: SigningKeys) -> Result<Self> {
        config.validate()?;
        let spec = &config.spec;

        let capability_signer: Arc<dyn PayloadSigner> =
            Arc::new(HmacSha256Signer::new(keys.capability).context("Invalid capability key")?);
        let receipt_signer: Arc<dyn PayloadSigner> =
            Arc::new(HmacSha256Signer::new(keys.receipt).context("Invalid receipt key")?);
        let ledger_signer: Arc<dyn PayloadSigner> =
            Arc::new(HmacSha256Signer::new(keys.ledger).context("Invalid ledger key")?);

        let event_bus = EventBus::with_default_capacity();

        let rate_limiter = Arc::new(TenantRateLimiter::new(RateLimitPolicy {
            max_requests: spec.rate_limit.max_requests,
            window: to_chrono(spec.rate_limit.window)?,
        }));

        let replay_guard = spec
            .auth
            .replay_protection
            .then(|| Arc::new(NonceReplayGuard::new()));

        let mut capability_validator = CapabilityValidator::new(capability_signer);
        if let Some(guard) = &replay_guard {
            capability_validator = capability_validator.with_replay_guard(guard.clone());
        }
        let receipt_validator =
            ReceiptValidator::new(receipt_signer.clone(), spec.auth.receipts_required);

        let mut guard = RequestGuard::new(
            capability_validator,
            receipt_validator,
            rate_limiter.clone(),
            event_bus.clone(),
        );
        if let Some(tenants) = &spec.auth.known_tenants {
            guard = guard.with_known_tenants(tenants.iter().cloned());
        }

        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| config.metadata.name.clone());
        let settings = BuilderSettings {
            retention: to_chrono(spec.bundles.retention)?,
            certificate_ttl: to_chrono(spec.bundles.certificate_ttl)?,
            attestation_validity: to_chrono(spec.bundles.attestation_max_age)?,
            platform: spec.bundles.platform.clone(),
            host,
            runtime: format!("bastion-ledger/{BUILDER_VERSION}"),
        };

        let repository: Arc<dyn SafetyCaseRepository> = Arc::new(InMemorySafetyCaseRepository::new());
        let service = Arc::new(SafetyCaseService::new(
            repository.clone(),
            SafetyCaseBuilder::new(ledger_signer.clone(), settings),
            ReceiptValidator::new(receipt_signer, spec.auth.receipts_required),
            ledger_signer.clone(),
            event_bus.clone(),
            to_chrono(spec.bundles.attestation_max_age)?,
        ));

        info!(
            node = %config.metadata.name,
            receipts_required = spec.auth.receipts_required,
            replay_protection = spec.auth.replay_protection,
            max_requests = spec.rate_limit.max_requests,
            "Ledger runtime initialized"
        );

        Ok(Self {
            event_bus,
            rate_limiter,
            replay_guard,
            repository,
            service,
            guard: Arc::new(guard),
            ledger_signer,
            config,
        })
    }

    /// Background sweeper configured from `spec.sweeper`.
    pub fn sweeper(&self) -> Arc<LedgerSweeper> {
        Arc::new(LedgerSweeper::new(
            self.service.clone(),
            self.rate_limiter.clone(),
            self.replay_guard.clone(),
            LedgerSweeperConfig {
                interval: self.config.spec.sweeper.interval,
                enabled: self.config.spec.sweeper.enabled,
            },
        ))
    }

    pub fn attestation_max_age(&self) -> Result<chrono::Duration> {
        to_chrono(self.config.spec.bundles.attestation_max_age)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys() -> SigningKeys {
        SigningKeys {
            capability: vec![1u8; 32],
            receipt: vec![2u8; 32],
            ledger: vec![3u8; 32],
        }
    }

    #[test]
    fn test_runtime_wires_optional_components() {
        let mut config = LedgerConfigManifest::default();
        let runtime = LedgerRuntime::with_keys(config.clone(), keys()).unwrap();
        assert!(runtime.replay_guard.is_none());
        assert_eq!(runtime.rate_limiter.policy().max_requests, 100);

        config.spec.auth.replay_protection = true;
        let runtime = LedgerRuntime::with_keys(config, keys()).unwrap();
        assert!(runtime.replay_guard.is_some());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = LedgerConfigManifest::default();
        config.spec.rate_limit.max_requests = 0;
        assert!(LedgerRuntime::with_keys(config, keys()).is_err());
    }

    #[test]
    fn test_key_debug_is_redacted() {
        assert_eq!(format!("{:?}", keys()), "SigningKeys([redacted])");
    }
}
