// ============================================================================
// Stateful Order Store
// Long-term order placements and their expiration time slices
// ============================================================================

use crate::domain::{Order, OrderId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A persisted stateful order and the height it was placed at
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LongTermOrderPlacement {
    pub order: Order,
    pub block_height: u32,
}

/// Durable record of stateful orders.
///
/// Time slices index every stateful order id under its good-til-block-time.
/// An id stays indexed after its placement is gone (for example once fully
/// filled) so that the expiration sweep still reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatefulOrderStore {
    placements: BTreeMap<OrderId, LongTermOrderPlacement>,
    time_slices: BTreeMap<DateTime<Utc>, BTreeSet<OrderId>>,
}

impl StatefulOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_long_term_order_placement(&mut self, order: Order, block_height: u32) {
        self.placements.insert(
            order.order_id.clone(),
            LongTermOrderPlacement {
                order,
                block_height,
            },
        );
    }

    pub fn get_long_term_order_placement(&self, order_id: &OrderId) -> Option<&LongTermOrderPlacement> {
        self.placements.get(order_id)
    }

    pub fn does_long_term_order_exist_in_state(&self, order: &Order) -> bool {
        self.placements.contains_key(&order.order_id)
    }

    /// Index `order_id` under its expiration time.
    ///
    /// # Panics
    /// If the id is already indexed under `good_til_block_time`. Duplicate
    /// indexing would make the expiration sweep double-process the order.
    pub fn must_add_order_to_stateful_orders_time_slice(
        &mut self,
        good_til_block_time: DateTime<Utc>,
        order_id: OrderId,
    ) {
        let slice = self.time_slices.entry(good_til_block_time).or_default();
        if !slice.insert(order_id.clone()) {
            panic!(
                "order {} already indexed in stateful time slice {}",
                order_id, good_til_block_time
            );
        }
    }

    pub fn is_indexed(&self, order_id: &OrderId, good_til_block_time: DateTime<Utc>) -> bool {
        self.time_slices
            .get(&good_til_block_time)
            .is_some_and(|slice| slice.contains(order_id))
    }

    /// Drop the placement but keep the time-slice entry.
    pub fn remove_placement(&mut self, order_id: &OrderId) -> Option<LongTermOrderPlacement> {
        self.placements.remove(order_id)
    }

    /// Remove a placement together with its time-slice entry.
    pub fn remove_stateful_order(&mut self, order_id: &OrderId) -> Option<LongTermOrderPlacement> {
        let placement = self.placements.remove(order_id)?;
        if let Some(good_til) = placement.order.good_til_block_time() {
            if let Some(slice) = self.time_slices.get_mut(&good_til) {
                slice.remove(order_id);
                if slice.is_empty() {
                    self.time_slices.remove(&good_til);
                }
            }
        }
        Some(placement)
    }

    /// Sweep every time slice at or before `block_time`, removing the
    /// placements they index. Returns the swept ids in expiration order.
    pub fn remove_expired_stateful_orders(&mut self, block_time: DateTime<Utc>) -> Vec<OrderId> {
        let due: Vec<DateTime<Utc>> = self
            .time_slices
            .range(..=block_time)
            .map(|(time, _)| *time)
            .collect();

        let mut expired = Vec::new();
        for time in due {
            if let Some(slice) = self.time_slices.remove(&time) {
                for order_id in slice {
                    self.placements.remove(&order_id);
                    expired.push(order_id);
                }
            }
        }
        expired
    }

    pub fn placements(&self) -> impl Iterator<Item = &LongTermOrderPlacement> {
        self.placements.values()
    }

    pub fn len(&self) -> usize {
        self.placements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.placements.is_empty()
    }
}
