// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Request Authentication Outcomes
//!
//! Stable error taxonomy and the outbound error envelope produced when an
//! inbound request fails capability-assertion, access-receipt, tenant or
//! rate-limit checks.
//!
//! ## Categories
//!
//! | Category | Codes | Status |
//! |----------|-------|--------|
//! | input shape | `PF_SIG_MISSING`, `PF_SIG_INVALID`, `ACCESS_RECEIPT_MISSING`, `ACCESS_RECEIPT_INVALID`, `TENANT_NOT_FOUND` | 403 |
//! | temporal | `PF_SIG_EXPIRED`, `ACCESS_RECEIPT_EXPIRED` | 403 |
//! | authenticity | `PF_SIG_INVALID`, `ACCESS_RECEIPT_INVALID` ("invalid signature") | 403 |
//! | capacity | `RATE_LIMIT_EXCEEDED` | 429 |
//! | internal | `INTERNAL_ERROR` | 500 |
//!
//! Authenticity failures never carry more detail than "invalid signature".

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Stable error codes relayed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthErrorCode {
    PfSigMissing,
    PfSigInvalid,
    PfSigExpired,
    AccessReceiptMissing,
    AccessReceiptInvalid,
    AccessReceiptExpired,
    RateLimitExceeded,
    TenantNotFound,
    InternalError,
}

impl AuthErrorCode {
    /// Wire form of the code (e.g. `"PF_SIG_EXPIRED"`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PfSigMissing => "PF_SIG_MISSING",
            Self::PfSigInvalid => "PF_SIG_INVALID",
            Self::PfSigExpired => "PF_SIG_EXPIRED",
            Self::AccessReceiptMissing => "ACCESS_RECEIPT_MISSING",
            Self::AccessReceiptInvalid => "ACCESS_RECEIPT_INVALID",
            Self::AccessReceiptExpired => "ACCESS_RECEIPT_EXPIRED",
            Self::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            Self::TenantNotFound => "TENANT_NOT_FOUND",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// HTTP-equivalent status for the code.
    pub fn status(&self) -> u16 {
        match self {
            Self::RateLimitExceeded => 429,
            Self::InternalError => 500,
            _ => 403,
        }
    }
}

impl std::fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity established by a verified capability assertion.
///
/// Attached to the request for downstream handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalContext {
    pub tenant: String,
    pub principal_id: String,
    pub capabilities: BTreeSet<String>,
}

impl PrincipalContext {
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.contains(capability)
    }
}

/// Rejection produced by the tenant rate limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitRejection {
    pub tenant: String,
    pub limit: u32,
    pub window_seconds: i64,
    pub reset_at: DateTime<Utc>,
}

/// Why an inbound request was refused.
///
/// `Display` is the *internal* description (suitable for logs). Use
/// [`AuthFailure::public_message`] for anything sent to the caller.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthFailure {
    #[error("capability assertion is missing")]
    AssertionMissing,

    #[error("capability assertion is malformed: {0}")]
    AssertionMalformed(String),

    #[error("capability assertion expired at {expires_at}")]
    AssertionExpired { expires_at: DateTime<Utc> },

    #[error("capability assertion signature mismatch")]
    AssertionSignatureInvalid,

    #[error("capability assertion nonce {nonce} was already presented for tenant {tenant}")]
    AssertionReplayed { tenant: String, nonce: String },

    #[error("access receipts are required but missing")]
    ReceiptsMissing,

    #[error("access receipt batch is malformed: {0}")]
    ReceiptBatchMalformed(String),

    #[error("access receipt #{index} is malformed: {reason}")]
    ReceiptMalformed { index: usize, reason: String },

    #[error("access receipt #{index} belongs to tenant {actual}, expected {expected}")]
    ReceiptTenantMismatch {
        index: usize,
        expected: String,
        actual: String,
    },

    #[error("access receipt #{index} expired at {expires_at}")]
    ReceiptExpired {
        index: usize,
        expires_at: DateTime<Utc>,
    },

    #[error("access receipt #{index} signature mismatch")]
    ReceiptSignatureInvalid { index: usize },

    #[error("rate limit exceeded for tenant {}", .0.tenant)]
    RateLimited(RateLimitRejection),

    #[error("tenant {0} is not registered")]
    TenantNotFound(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthFailure {
    pub fn code(&self) -> AuthErrorCode {
        match self {
            Self::AssertionMissing => AuthErrorCode::PfSigMissing,
            Self::AssertionMalformed(_)
            | Self::AssertionSignatureInvalid
            | Self::AssertionReplayed { .. } => AuthErrorCode::PfSigInvalid,
            Self::AssertionExpired { .. } => AuthErrorCode::PfSigExpired,
            Self::ReceiptsMissing => AuthErrorCode::AccessReceiptMissing,
            Self::ReceiptBatchMalformed(_)
            | Self::ReceiptMalformed { .. }
            | Self::ReceiptTenantMismatch { .. }
            | Self::ReceiptSignatureInvalid { .. } => AuthErrorCode::AccessReceiptInvalid,
            Self::ReceiptExpired { .. } => AuthErrorCode::AccessReceiptExpired,
            Self::RateLimited(_) => AuthErrorCode::RateLimitExceeded,
            Self::TenantNotFound(_) => AuthErrorCode::TenantNotFound,
            Self::Internal(_) => AuthErrorCode::InternalError,
        }
    }

    pub fn status(&self) -> u16 {
        self.code().status()
    }

    /// Caller-facing message. Signature failures and internal errors stay opaque.
    pub fn public_message(&self) -> String {
        match self {
            Self::AssertionMissing => "Capability assertion header is required".to_string(),
            Self::AssertionMalformed(reason) => format!("Invalid capability assertion: {reason}"),
            Self::AssertionExpired { .. } => "Capability assertion has expired".to_string(),
            Self::AssertionSignatureInvalid | Self::AssertionReplayed { .. } => {
                "Invalid signature".to_string()
            }
            Self::ReceiptsMissing => "Access receipts are required".to_string(),
            Self::ReceiptBatchMalformed(reason) => format!("Invalid access receipts: {reason}"),
            Self::ReceiptMalformed { reason, .. } => format!("Invalid access receipt: {reason}"),
            Self::ReceiptTenantMismatch { .. } => {
                "Access receipt tenant does not match capability tenant".to_string()
            }
            Self::ReceiptExpired { .. } => "Access receipt has expired".to_string(),
            Self::ReceiptSignatureInvalid { .. } => "Invalid signature".to_string(),
            Self::RateLimited(_) => "Rate limit exceeded".to_string(),
            Self::TenantNotFound(_) => "Tenant not found".to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }

    /// Structured details relayed under `error.details`, if any.
    pub fn details(&self) -> Option<Value> {
        match self {
            Self::AssertionExpired { expires_at } => Some(json!({ "expires_at": expires_at })),
            Self::ReceiptMalformed { index, .. }
            | Self::ReceiptSignatureInvalid { index } => Some(json!({ "receipt_index": index })),
            Self::ReceiptTenantMismatch { index, .. } => Some(json!({ "receipt_index": index })),
            Self::ReceiptExpired { index, expires_at } => Some(json!({
                "receipt_index": index,
                "expires_at": expires_at,
            })),
            Self::RateLimited(rejection) => Some(json!({
                "tenant": rejection.tenant,
                "limit": rejection.limit,
                "window_seconds": rejection.window_seconds,
                "reset_time": rejection.reset_at,
            })),
            Self::TenantNotFound(tenant) => Some(json!({ "tenant": tenant })),
            _ => None,
        }
    }

    /// Build the outbound envelope for this failure.
    pub fn to_envelope(&self, request_id: &str, timestamp: DateTime<Utc>) -> ErrorEnvelope {
        ErrorEnvelope {
            status: self.status(),
            error: ErrorBody {
                code: self.code(),
                message: self.public_message(),
                details: self.details(),
            },
            timestamp,
            request_id: request_id.to_string(),
        }
    }
}

/// `{error: {code, message, details?}, timestamp, request_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(skip)]
    pub status: u16,
    pub error: ErrorBody,
    pub timestamp: DateTime<Utc>,
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: AuthErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}
