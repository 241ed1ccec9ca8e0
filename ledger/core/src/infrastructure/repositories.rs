// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// In-memory bundle store. Contents are lost on restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::domain::repository::{RepositoryError, SafetyCaseRepository};
use crate::domain::safety_case::{BundleId, SafetyCaseBundle};

#[derive(Clone, Default)]
pub struct InMemorySafetyCaseRepository {
    bundles: Arc<RwLock<HashMap<BundleId, SafetyCaseBundle>>>,
}

impl InMemorySafetyCaseRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn collect_sorted<F>(&self, filter: F) -> Vec<SafetyCaseBundle>
    where
        F: Fn(&SafetyCaseBundle) -> bool,
    {
        let bundles = self.bundles.read();
        let mut matched: Vec<_> = bundles.values().filter(|b| filter(b)).cloned().collect();
        matched.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        matched
    }
}

#[async_trait]
impl SafetyCaseRepository for InMemorySafetyCaseRepository {
    async fn save(&self, bundle: &SafetyCaseBundle) -> Result<(), RepositoryError> {
        self.bundles.write().insert(bundle.id, bundle.clone());
        Ok(())
    }

    async fn update(&self, bundle: &SafetyCaseBundle) -> Result<bool, RepositoryError> {
        match self.bundles.write().get_mut(&bundle.id) {
            Some(stored) => {
                *stored = bundle.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_by_id(&self, id: BundleId) -> Result<Option<SafetyCaseBundle>, RepositoryError> {
        Ok(self.bundles.read().get(&id).cloned())
    }

    async fn find_by_session(&self, session_id: &str) -> Result<Vec<SafetyCaseBundle>, RepositoryError> {
        Ok(self.collect_sorted(|b| b.session_id == session_id))
    }

    async fn find_by_tenant(&self, tenant: &str) -> Result<Vec<SafetyCaseBundle>, RepositoryError> {
        Ok(self.collect_sorted(|b| b.tenant == tenant))
    }

    async fn list_all(&self) -> Result<Vec<SafetyCaseBundle>, RepositoryError> {
        Ok(self.collect_sorted(|_| true))
    }

    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize, RepositoryError> {
        let mut bundles = self.bundles.write();
        let before = bundles.len();
        bundles.retain(|_, bundle| !bundle.is_expired_at(now));
        Ok(before - bundles.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::safety_case::tests::bundle;
    use crate::domain::safety_case::VerificationStatus;

    #[tokio::test]
    async fn test_update_only_touches_existing_bundles() {
        let now = Utc::now();
        let repository = InMemorySafetyCaseRepository::new();
        let mut stored = bundle(now);
        repository.save(&stored).await.unwrap();

        stored.record_failed(vec!["Expired certificates".into()], now);
        assert!(repository.update(&stored).await.unwrap());
        let found = repository.find_by_id(stored.id).await.unwrap().unwrap();
        assert_eq!(found.verification_status, VerificationStatus::Failed);

        let purged = repository
            .remove_expired(stored.expires_at + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(purged, 1);

        assert!(!repository.update(&stored).await.unwrap());
        assert!(repository.find_by_id(stored.id).await.unwrap().is_none());
    }
}
