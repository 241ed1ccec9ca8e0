// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tenant Rate Limiter
//!
//! Fixed-window request counter, one window per tenant.
//!
//! ```text
//! no window / now > reset_at  → new window { count: 1, reset_at: now + window }
//! count >= max_requests       → RATE_LIMIT_EXCEEDED (429)
//! otherwise                   → count += 1
//! ```
//!
//! The tenant → window map is a `DashMap`; each check holds the entry's shard
//! lock for its whole read-modify-write, so concurrent requests for the same
//! tenant never lose increments. [`TenantRateLimiter::sweep_at`] drops windows
//! that have already reset, bounding memory to tenants active within one window.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

use crate::domain::auth::RateLimitRejection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::minutes(15),
        }
    }
}

/// Live counter for one tenant. Never leaves this module.
#[derive(Debug, Clone)]
struct RateWindow {
    tenant: String,
    count: u32,
    reset_at: DateTime<Utc>,
}

impl RateWindow {
    fn open(tenant: &str, now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            tenant: tenant.to_string(),
            count: 1,
            // A window reaching past the representable range never resets
            reset_at: now.checked_add_signed(window).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

/// Outcome of an allowed request, for transport-level rate headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

pub struct TenantRateLimiter {
    policy: RateLimitPolicy,
    windows: DashMap<String, RateWindow>,
}

impl TenantRateLimiter {
    pub fn new(policy: RateLimitPolicy) -> Self {
        Self {
            policy,
            windows: DashMap::new(),
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    pub fn check(&self, tenant: &str) -> Result<RateDecision, RateLimitRejection> {
        self.check_at(tenant, Utc::now())
    }

    /// Count one authenticated request for `tenant` at `now`.
    pub fn check_at(
        &self,
        tenant: &str,
        now: DateTime<Utc>,
    ) -> Result<RateDecision, RateLimitRejection> {
        let max = self.policy.max_requests;
        match self.windows.entry(tenant.to_string()) {
            Entry::Vacant(vacant) => {
                let window = vacant.insert(RateWindow::open(tenant, now, self.policy.window));
                Ok(self.decision(window.count, window.reset_at))
            }
            Entry::Occupied(mut occupied) => {
                let window = occupied.get_mut();
                if now > window.reset_at {
                    *window = RateWindow::open(tenant, now, self.policy.window);
                    debug!(tenant, reset_at = %window.reset_at, "Opened new rate window");
                    return Ok(self.decision(window.count, window.reset_at));
                }
                if window.count >= max {
                    warn!(tenant = %window.tenant, limit = max, reset_at = %window.reset_at, "Tenant rate limit exceeded");
                    return Err(RateLimitRejection {
                        tenant: window.tenant.clone(),
                        limit: max,
                        window_seconds: self.policy.window.num_seconds(),
                        reset_at: window.reset_at,
                    });
                }
                window.count += 1;
                Ok(self.decision(window.count, window.reset_at))
            }
        }
    }

    fn decision(&self, count: u32, reset_at: DateTime<Utc>) -> RateDecision {
        RateDecision {
            limit: self.policy.max_requests,
            remaining: self.policy.max_requests.saturating_sub(count),
            reset_at,
        }
    }

    /// Remove windows whose `reset_at` is before `now`. Returns how many were dropped.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut removed = 0;
        self.windows.retain(|_, window| {
            let keep = window.reset_at >= now;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn active_windows(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn limiter() -> TenantRateLimiter {
        TenantRateLimiter::new(RateLimitPolicy::default())
    }

    #[test]
    fn test_hundred_first_request_rejected() {
        let limiter = limiter();
        let now = Utc::now();
        for i in 0..100 {
            let decision = limiter.check_at("acme", now).unwrap();
            assert_eq!(decision.remaining, 99 - i);
        }
        let rejection = limiter.check_at("acme", now).unwrap_err();
        assert_eq!(rejection.tenant, "acme");
        assert_eq!(rejection.limit, 100);
        assert_eq!(rejection.window_seconds, 900);
        assert_eq!(rejection.reset_at, now + Duration::minutes(15));
    }

    #[test]
    fn test_window_resets_just_after_reset_at() {
        let limiter = limiter();
        let start = Utc::now();
        for _ in 0..100 {
            limiter.check_at("acme", start).unwrap();
        }
        let reset_at = start + Duration::minutes(15);

        // at reset_at the old window still applies
        assert!(limiter.check_at("acme", reset_at).is_err());

        let after = reset_at + Duration::milliseconds(1);
        let decision = limiter.check_at("acme", after).unwrap();
        assert_eq!(decision.remaining, 99);
        assert_eq!(decision.reset_at, after + Duration::minutes(15));
    }

    #[test]
    fn test_tenants_are_counted_independently() {
        let limiter = TenantRateLimiter::new(RateLimitPolicy {
            max_requests: 1,
            window: Duration::minutes(1),
        });
        let now = Utc::now();
        assert!(limiter.check_at("acme", now).is_ok());
        assert!(limiter.check_at("acme", now).is_err());
        assert!(limiter.check_at("globex", now).is_ok());
    }

    #[test]
    fn test_sweep_drops_only_reset_windows() {
        let limiter = limiter();
        let now = Utc::now();
        limiter.check_at("old", now - Duration::minutes(20)).unwrap();
        limiter.check_at("live", now).unwrap();
        assert_eq!(limiter.active_windows(), 2);
        assert_eq!(limiter.sweep_at(now), 1);
        assert_eq!(limiter.active_windows(), 1);
        assert_eq!(limiter.sweep_at(now), 0);
    }

    #[test]
    fn test_concurrent_checks_never_exceed_limit() {
        let limiter = Arc::new(limiter());
        let now = Utc::now();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                std::thread::spawn(move || {
                    (0..50).filter(|_| limiter.check_at("acme", now).is_ok()).count()
                })
            })
            .collect();
        let allowed: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(allowed, 100);
    }

    #[test]
    fn test_oversized_window_saturates_instead_of_panicking() {
        let limiter = TenantRateLimiter::new(RateLimitPolicy {
            max_requests: 1,
            window: Duration::days(365 * 1_000_000),
        });
        let decision = limiter.check_at("acme", Utc::now()).unwrap();
        assert_eq!(decision.reset_at, DateTime::<Utc>::MAX_UTC);
        assert!(limiter.check_at("acme", Utc::now()).is_err());
    }
}
