// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod audit_log;
pub mod crypto;
pub mod event_bus;
pub mod export;
pub mod rate_limiter;
pub mod replay_guard;
pub mod repositories;

pub use audit_log::AuditLog;
pub use event_bus::{EventBus, LedgerEvent};
pub use rate_limiter::{RateDecision, RateLimitPolicy, TenantRateLimiter};
pub use replay_guard::NonceReplayGuard;
pub use repositories::InMemorySafetyCaseRepository;
