// ============================================================================
// Event Handler Interface
// Defines the contract for publishing off-chain order book updates
// ============================================================================

use crate::domain::{CancelReason, Order, OrderId};
use crate::numeric::{BaseQuantums, Subticks};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Update emitted by the matching engine for downstream indexers.
/// Content is opaque to the state machine; order within a block is preserved.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OffchainUpdate {
    /// Order (or its residual) now rests on the book
    OrderPlace { order: Order, remaining: BaseQuantums },

    /// Cumulative filled amount of an order changed
    OrderUpdate {
        order_id: OrderId,
        total_filled: BaseQuantums,
    },

    /// Order left the book, or was cancelled before resting
    OrderRemove {
        order_id: OrderId,
        reason: CancelReason,
    },

    /// One maker/taker fill
    Fill {
        taker_order_id: OrderId,
        maker_order_id: OrderId,
        fill_amount: BaseQuantums,
        subticks: Subticks,
    },
}

/// Ordered batch of off-chain updates produced by one operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OffchainUpdates {
    updates: Vec<OffchainUpdate>,
}

impl OffchainUpdates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, update: OffchainUpdate) {
        self.updates.push(update);
    }

    pub fn append(&mut self, mut other: OffchainUpdates) {
        self.updates.append(&mut other.updates);
    }

    pub fn iter(&self) -> impl Iterator<Item = &OffchainUpdate> {
        self.updates.iter()
    }

    pub fn len(&self) -> usize {
        self.updates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    pub fn into_vec(self) -> Vec<OffchainUpdate> {
        self.updates
    }
}

/// Event handler trait for publishing off-chain updates
/// Implementations can forward to indexers, logs, metrics, etc.
pub trait EventHandler: Send + Sync {
    /// Handle one update
    fn on_update(&self, update: &OffchainUpdate);

    /// Batch handler, in order
    fn on_updates(&self, updates: &OffchainUpdates) {
        for update in updates.iter() {
            self.on_update(update);
        }
    }
}

/// No-op event handler for testing
pub struct NoOpEventHandler;

impl EventHandler for NoOpEventHandler {
    fn on_update(&self, _update: &OffchainUpdate) {}
}

/// Logging event handler
pub struct LoggingEventHandler;

impl EventHandler for LoggingEventHandler {
    fn on_update(&self, update: &OffchainUpdate) {
        tracing::debug!("Off-chain update: {:?}", update);
    }
}
