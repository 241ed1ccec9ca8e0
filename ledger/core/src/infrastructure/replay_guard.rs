// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Nonce replay guard for capability assertions.
//!
//! Remembers each `(tenant, nonce)` pair until the assertion that carried it
//! expires. A pair presented again inside that window is a replay.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

#[derive(Default)]
pub struct NonceReplayGuard {
    seen: DashMap<(String, String), DateTime<Utc>>,
}

impl NonceReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the pair; returns `false` if it is a replay.
    pub fn check_and_record(
        &self,
        tenant: &str,
        nonce: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        match self.seen.entry((tenant.to_string(), nonce.to_string())) {
            Entry::Vacant(vacant) => {
                vacant.insert(expires_at);
                true
            }
            Entry::Occupied(mut occupied) => {
                if *occupied.get() < now {
                    occupied.insert(expires_at);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Forget pairs whose assertion expired before `now`.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.seen.retain(|_, expires_at| {
            let keep = *expires_at >= now;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
