// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Event Bus Implementation - Pub/Sub for Ledger Events
//
// In-memory fan-out over a tokio broadcast channel. The audit log (see
// audit_log.rs) subscribes to record bundle lifecycle and request rejections.
// Events published with no subscriber are dropped.

use crate::domain::events::{AccessEvent, SafetyCaseEvent};
use crate::domain::safety_case::BundleId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Unified event type carried on the bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    SafetyCase(SafetyCaseEvent),
    Access(AccessEvent),
}

#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<LedgerEvent>>,
}

impl EventBus {
    /// Capacity is how many events a slow subscriber may fall behind before
    /// it starts losing the oldest ones.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    pub fn publish_safety_case_event(&self, event: SafetyCaseEvent) {
        self.publish(LedgerEvent::SafetyCase(event));
    }

    pub fn publish_access_event(&self, event: AccessEvent) {
        self.publish(LedgerEvent::Access(event));
    }

    fn publish(&self, event: LedgerEvent) {
        debug!(?event, "Publishing ledger event");
        if self.sender.send(event).is_err() {
            debug!("No subscribers listening to event");
        }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Subscribe to lifecycle events of a single bundle.
    pub fn subscribe_bundle(&self, bundle_id: BundleId) -> BundleEventReceiver {
        BundleEventReceiver {
            receiver: self.sender.subscribe(),
            bundle_id,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

fn map_recv_error(err: broadcast::error::RecvError) -> EventBusError {
    match err {
        broadcast::error::RecvError::Closed => EventBusError::Closed,
        broadcast::error::RecvError::Lagged(n) => {
            warn!("Event receiver lagged by {} events", n);
            EventBusError::Lagged(n)
        }
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<LedgerEvent>,
}

impl EventReceiver {
    pub async fn recv(&mut self) -> Result<LedgerEvent, EventBusError> {
        self.receiver.recv().await.map_err(map_recv_error)
    }

    pub fn try_recv(&mut self) -> Result<LedgerEvent, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!("Event receiver lagged by {} events", n);
                EventBusError::Lagged(n)
            }
        })
    }
}

pub struct BundleEventReceiver {
    receiver: broadcast::Receiver<LedgerEvent>,
    bundle_id: BundleId,
}

impl BundleEventReceiver {
    /// Next event about the watched bundle; everything else is skipped.
    pub async fn recv(&mut self) -> Result<SafetyCaseEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(map_recv_error)?;
            if let LedgerEvent::SafetyCase(event) = event {
                if self.matches_bundle(&event) {
                    return Ok(event);
                }
            }
        }
    }

    fn matches_bundle(&self, event: &SafetyCaseEvent) -> bool {
        match event {
            SafetyCaseEvent::BundleCreated { bundle_id, .. }
            | SafetyCaseEvent::BundleVerified { bundle_id, .. }
            | SafetyCaseEvent::BundleVerificationFailed { bundle_id, .. } => {
                *bundle_id == self.bundle_id
            }
            SafetyCaseEvent::BundlesExpired { .. } => false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}
