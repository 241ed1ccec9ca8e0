// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Ledger Configuration Types
//
// Defines the configuration manifest for a Bastion ledger node:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Request authentication policy (receipts, replay protection, tenant directory)
// - Tenant rate-limit window
// - Safety-case retention and certificate lifetimes
// - Background sweeper cadence
// - Signing key references
// - Network and logging settings

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};

pub const API_VERSION: &str = "bastion.dev/v1";
pub const KIND: &str = "LedgerConfig";

/// Resolved signing keys shorter than this are rejected.
pub const MIN_KEY_BYTES: usize = 32;

/// Upper bound for every configured duration (100 years).
pub const MAX_DURATION: Duration = Duration::from_secs(100 * 365 * 86_400);

/// Top-level ledger configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfigManifest {
    /// API version (must be "bastion.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "LedgerConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: LedgerConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable node name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfigSpec {
    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub bundles: BundleConfig,

    #[serde(default)]
    pub sweeper: SweeperConfig,

    #[serde(default)]
    pub signing: SigningConfig,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Reject requests that carry no access receipts
    #[serde(default)]
    pub receipts_required: bool,

    /// Reject a (tenant, nonce) pair presented twice within its validity window
    #[serde(default)]
    pub replay_protection: bool,

    /// Registered tenants. `None` accepts any tenant named by a valid assertion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_tenants: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Requests allowed per tenant per window
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Fixed window length (e.g. "15m")
    #[serde(default = "default_rate_window", with = "humantime_serde")]
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window: default_rate_window(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleConfig {
    /// How long a bundle is retained before the sweeper purges it
    #[serde(default = "default_retention", with = "humantime_serde")]
    pub retention: Duration,

    /// Validity of the egress certificate issued with each bundle
    #[serde(default = "default_certificate_ttl", with = "humantime_serde")]
    pub certificate_ttl: Duration,

    /// Maximum age of an attestation quote at verification time
    #[serde(default = "default_attestation_max_age", with = "humantime_serde")]
    pub attestation_max_age: Duration,

    /// Platform label recorded in attestation quotes
    #[serde(default = "default_platform")]
    pub platform: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            retention: default_retention(),
            certificate_ttl: default_certificate_ttl(),
            attestation_max_age: default_attestation_max_age(),
            platform: default_platform(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_sweep_interval", with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_sweep_interval(),
        }
    }
}

/// Key references: `env:VAR`, `hex:<hex>`, `base64:<b64>` or a literal secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Key shared with the capability-assertion issuer
    #[serde(default = "default_capability_key")]
    pub capability_key: String,

    /// Key shared with the retrieval gateway that issues access receipts
    #[serde(default = "default_receipt_key")]
    pub receipt_key: String,

    /// Ledger-local key sealing egress certificates and attestation quotes
    #[serde(default = "default_ledger_key")]
    pub ledger_key: String,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            capability_key: default_capability_key(),
            receipt_key: default_receipt_key(),
            ledger_key: default_ledger_key(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for LedgerConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "bastion-ledger".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: None,
            },
            spec: LedgerConfigSpec::default(),
        }
    }
}

impl LedgerConfigManifest {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let manifest: Self = serde_yaml::from_str(yaml).context("Failed to parse ledger config")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_yaml_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("Failed to serialize ledger config")
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!("Unsupported apiVersion '{}', expected '{}'", self.api_version, API_VERSION);
        }
        if self.kind != KIND {
            anyhow::bail!("Unsupported kind '{}', expected '{}'", self.kind, KIND);
        }
        if self.metadata.name.trim().is_empty() {
            anyhow::bail!("metadata.name must not be empty");
        }

        let spec = &self.spec;
        if spec.rate_limit.max_requests == 0 {
            anyhow::bail!("rate_limit.max_requests must be greater than zero");
        }
        for (name, value) in [
            ("rate_limit.window", spec.rate_limit.window),
            ("bundles.retention", spec.bundles.retention),
            ("bundles.certificate_ttl", spec.bundles.certificate_ttl),
            ("bundles.attestation_max_age", spec.bundles.attestation_max_age),
            ("sweeper.interval", spec.sweeper.interval),
        ] {
            if value.is_zero() {
                anyhow::bail!("{} must be non-zero", name);
            }
            if value > MAX_DURATION {
                anyhow::bail!("{} must not exceed 100 years", name);
            }
        }
        for (name, value) in [
            ("signing.capability_key", &spec.signing.capability_key),
            ("signing.receipt_key", &spec.signing.receipt_key),
            ("signing.ledger_key", &spec.signing.ledger_key),
        ] {
            if value.trim().is_empty() {
                anyhow::bail!("{} must not be empty", name);
            }
        }
        if let Some(tenants) = &spec.auth.known_tenants {
            if tenants.iter().any(|t| t.trim().is_empty()) {
                anyhow::bail!("auth.known_tenants must not contain empty names");
            }
        }
        Ok(())
    }
}

/// Convert a configured duration into the `chrono` form used by the domain.
pub fn to_chrono(duration: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(duration).context("duration out of range")
}

/// Resolve a signing key reference into raw key bytes.
pub fn resolve_key_reference(reference: &str) -> Result<Vec<u8>> {
    let bytes = if let Some(var) = reference.strip_prefix("env:") {
        std::env::var(var)
            .with_context(|| format!("Environment variable {} is not set", var))?
            .into_bytes()
    } else if let Some(encoded) = reference.strip_prefix("hex:") {
        hex::decode(encoded).context("Invalid hex key material")?
    } else if let Some(encoded) = reference.strip_prefix("base64:") {
        STANDARD.decode(encoded).context("Invalid base64 key material")?
    } else {
        reference.as_bytes().to_vec()
    };

    if bytes.len() < MIN_KEY_BYTES {
        anyhow::bail!(
            "Signing key must be at least {} bytes (got {})",
            MIN_KEY_BYTES,
            bytes.len()
        );
    }
    Ok(bytes)
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_max_requests() -> u32 {
    100
}

fn default_rate_window() -> Duration {
    Duration::from_secs(15 * 60)
}

fn default_retention() -> Duration {
    Duration::from_secs(90 * 24 * 60 * 60)
}

fn default_certificate_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_attestation_max_age() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

fn default_platform() -> String {
    "software".to_string()
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_capability_key() -> String {
    "env:BASTION_CAPABILITY_KEY".to_string()
}

fn default_receipt_key() -> String {
    "env:BASTION_RECEIPT_KEY".to_string()
}

fn default_ledger_key() -> String {
    "env:BASTION_LEDGER_KEY".to_string()
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}
