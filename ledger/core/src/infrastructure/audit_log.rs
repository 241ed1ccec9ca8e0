// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Audit Log - structured tracing sink for ledger events
//
// Drains an EventBus subscription and writes every event as one JSON line on
// the `bastion::audit` tracing target, so operators can route the audit trail
// with an env filter independently of the service logs.

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::infrastructure::event_bus::{EventBus, EventBusError, EventReceiver, LedgerEvent};

pub const AUDIT_TARGET: &str = "bastion::audit";

pub struct AuditLog {
    receiver: EventReceiver,
    shutdown_token: CancellationToken,
}

impl AuditLog {
    /// Subscribes immediately; events published before this call are not seen.
    pub fn new(event_bus: &EventBus) -> Self {
        Self {
            receiver: event_bus.subscribe(),
            shutdown_token: CancellationToken::new(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Run until cancelled or the bus closes. Yields the number of events logged.
    pub fn start(self) -> JoinHandle<u64> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) -> u64 {
        let mut logged = 0u64;
        loop {
            // queued events are drained before a pending shutdown is honoured
            tokio::select! {
                biased;
                next = self.receiver.recv() => match next {
                    Ok(event) => {
                        record(&event);
                        logged += 1;
                    }
                    Err(EventBusError::Lagged(missed)) => {
                        warn!(target: AUDIT_TARGET, missed, "Audit log fell behind, events dropped");
                    }
                    Err(EventBusError::Closed) | Err(EventBusError::Empty) => break,
                },
                _ = self.shutdown_token.cancelled() => break,
            }
        }
        debug!(logged, "Audit log stopped");
        logged
    }
}

fn record(event: &LedgerEvent) {
    match serde_json::to_string(event) {
        Ok(line) => info!(target: AUDIT_TARGET, event = %line, "ledger event"),
        Err(e) => warn!(target: AUDIT_TARGET, error = %e, ?event, "Failed to serialize ledger event"),
    }
}
