// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Ledger Sweeper - Background task for expiry housekeeping
//!
//! Each cycle purges expired safety-case bundles, drops rate windows that have
//! already reset and forgets replay-guard nonces whose assertions expired.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Bounds the memory held by the in-process stores

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::safety_case_service::{SafetyCaseError, SafetyCaseService};
use crate::infrastructure::rate_limiter::TenantRateLimiter;
use crate::infrastructure::replay_guard::NonceReplayGuard;

#[derive(Debug, Clone)]
pub struct LedgerSweeperConfig {
    pub interval: Duration,
    pub enabled: bool,
}

impl Default for LedgerSweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub bundles_removed: usize,
    pub rate_windows_removed: usize,
    pub nonces_removed: usize,
}

pub struct LedgerSweeper {
    service: Arc<SafetyCaseService>,
    rate_limiter: Arc<TenantRateLimiter>,
    replay_guard: Option<Arc<NonceReplayGuard>>,
    config: LedgerSweeperConfig,
    shutdown_token: CancellationToken,
}

impl LedgerSweeper {
    pub fn new(
        service: Arc<SafetyCaseService>,
        rate_limiter: Arc<TenantRateLimiter>,
        replay_guard: Option<Arc<NonceReplayGuard>>,
        config: LedgerSweeperConfig,
    ) -> Self {
        Self {
            service,
            rate_limiter,
            replay_guard,
            config,
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Ledger sweeper is disabled");
            return;
        }

        info!(
            interval_seconds = self.config.interval.as_secs(),
            "Starting ledger sweeper background task"
        );

        let mut tick = interval(self.config.interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    debug!("Running ledger sweep cycle");
                    match self.sweep_cycle_at(Utc::now()).await {
                        Ok(report) => {
                            debug!(
                                bundles_removed = report.bundles_removed,
                                rate_windows_removed = report.rate_windows_removed,
                                nonces_removed = report.nonces_removed,
                                "Ledger sweep cycle completed"
                            );
                        }
                        Err(e) => {
                            warn!("Ledger sweep cycle failed: {}", e);
                        }
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping ledger sweeper");
                    break;
                }
            }
        }

        info!("Ledger sweeper background task stopped");
    }

    /// Execute a single sweep cycle
    pub async fn sweep_cycle_at(&self, now: DateTime<Utc>) -> Result<SweepReport, SafetyCaseError> {
        let rate_windows_removed = self.rate_limiter.sweep_at(now);
        let nonces_removed = self
            .replay_guard
            .as_ref()
            .map(|guard| guard.sweep_at(now))
            .unwrap_or(0);
        let bundles_removed = self.service.cleanup_expired_at(now).await?;

        Ok(SweepReport {
            bundles_removed,
            rate_windows_removed,
            nonces_removed,
        })
    }
}
