// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain events emitted by the ledger.
//!
//! Published on [`crate::infrastructure::event_bus::EventBus`] so audit sinks
//! and operators can follow bundle lifecycle and request rejections live.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::auth::AuthErrorCode;
use crate::domain::safety_case::BundleId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum SafetyCaseEvent {
    BundleCreated {
        bundle_id: BundleId,
        session_id: String,
        tenant: String,
        created_at: DateTime<Utc>,
    },
    BundleVerified {
        bundle_id: BundleId,
        verified_at: DateTime<Utc>,
    },
    BundleVerificationFailed {
        bundle_id: BundleId,
        errors: Vec<String>,
        failed_at: DateTime<Utc>,
    },
    BundlesExpired {
        removed: usize,
        swept_at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AccessEvent {
    RequestRejected {
        request_id: String,
        code: AuthErrorCode,
        #[serde(skip_serializing_if = "Option::is_none")]
        tenant: Option<String>,
        rejected_at: DateTime<Utc>,
    },
}
