// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Bundle Store Interface
//!
//! Persistence contract for the [`SafetyCaseBundle`] aggregate. The in-memory
//! implementation lives in [`crate::infrastructure::repositories`]; a durable
//! backend can replace it behind the same trait.
//!
//! Each method is atomic at store level. No cross-call transaction is offered:
//! a bundle read while it is being purged may be returned once more.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::safety_case::{BundleId, SafetyCaseBundle};

#[async_trait]
pub trait SafetyCaseRepository: Send + Sync {
    /// Insert or replace a bundle.
    async fn save(&self, bundle: &SafetyCaseBundle) -> Result<(), RepositoryError>;

    /// Replace a bundle only if it is still stored; returns whether it was.
    /// A bundle removed by a purge stays removed.
    async fn update(&self, bundle: &SafetyCaseBundle) -> Result<bool, RepositoryError>;

    async fn find_by_id(&self, id: BundleId) -> Result<Option<SafetyCaseBundle>, RepositoryError>;

    /// Bundles for a session, oldest first.
    async fn find_by_session(&self, session_id: &str) -> Result<Vec<SafetyCaseBundle>, RepositoryError>;

    /// Bundles for a tenant, oldest first.
    async fn find_by_tenant(&self, tenant: &str) -> Result<Vec<SafetyCaseBundle>, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<SafetyCaseBundle>, RepositoryError>;

    /// Remove every bundle with `expires_at < now`; returns how many were removed.
    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
