// ============================================================================
// Order Book Domain Model
// ============================================================================

use super::{ClobPairId, Order, OrderId, Side};
use crate::numeric::{BaseQuantums, Subticks};
use std::collections::{BTreeMap, VecDeque};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Order Book Level
// ============================================================================

/// Price level holding resting order ids in placement (time) order
#[derive(Debug, Clone)]
pub struct OrderBookLevel {
    pub subticks: Subticks,
    orders: VecDeque<OrderId>,
    total_quantums: BaseQuantums,
}

impl OrderBookLevel {
    pub fn new(subticks: Subticks) -> Self {
        Self {
            subticks,
            orders: VecDeque::new(),
            total_quantums: BaseQuantums::ZERO,
        }
    }

    pub fn add_order(&mut self, order_id: OrderId, quantums: BaseQuantums) {
        self.total_quantums =
            BaseQuantums::new(self.total_quantums.value().saturating_add(quantums.value()));
        self.orders.push_back(order_id);
    }

    /// Remove an order and its remaining size. Returns false if not present.
    pub fn remove_order(&mut self, order_id: &OrderId, remaining: BaseQuantums) -> bool {
        match self.orders.iter().position(|id| id == order_id) {
            Some(index) => {
                self.orders.remove(index);
                self.subtract_quantity(remaining);
                true
            },
            None => false,
        }
    }

    pub fn subtract_quantity(&mut self, quantums: BaseQuantums) {
        self.total_quantums = self.total_quantums.saturating_sub(quantums);
    }

    /// Earliest-placed order at this level
    pub fn front(&self) -> Option<&OrderId> {
        self.orders.front()
    }

    pub fn order_ids(&self) -> impl Iterator<Item = &OrderId> {
        self.orders.iter()
    }

    pub fn get_total_quantity(&self) -> BaseQuantums {
        self.total_quantums
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

// ============================================================================
// Order Book Side
// ============================================================================

/// One side of a book (bids or asks), price levels keyed by subticks
#[derive(Debug, Clone)]
pub struct OrderBookSide {
    pub side: Side,
    levels: BTreeMap<Subticks, OrderBookLevel>,
}

impl OrderBookSide {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            levels: BTreeMap::new(),
        }
    }

    pub fn add_order(&mut self, order_id: OrderId, subticks: Subticks, quantums: BaseQuantums) {
        self.levels
            .entry(subticks)
            .or_insert_with(|| OrderBookLevel::new(subticks))
            .add_order(order_id, quantums);
    }

    /// Remove an order, dropping its level if it becomes empty.
    pub fn remove_order(
        &mut self,
        order_id: &OrderId,
        subticks: Subticks,
        remaining: BaseQuantums,
    ) -> bool {
        let Some(level) = self.levels.get_mut(&subticks) else {
            return false;
        };
        let removed = level.remove_order(order_id, remaining);
        if level.is_empty() {
            self.levels.remove(&subticks);
        }
        removed
    }

    pub fn subtract_quantity(&mut self, subticks: Subticks, quantums: BaseQuantums) {
        if let Some(level) = self.levels.get_mut(&subticks) {
            level.subtract_quantity(quantums);
        }
    }

    /// Best level: highest bid or lowest ask
    pub fn best_level(&self) -> Option<&OrderBookLevel> {
        match self.side {
            Side::Buy => self.levels.values().next_back(),
            Side::Sell => self.levels.values().next(),
        }
    }

    pub fn best_price(&self) -> Option<Subticks> {
        self.best_level().map(|level| level.subticks)
    }

    /// Levels from best to worst
    pub fn levels_best_first(&self) -> Box<dyn Iterator<Item = &OrderBookLevel> + '_> {
        match self.side {
            Side::Buy => Box::new(self.levels.values().rev()),
            Side::Sell => Box::new(self.levels.values()),
        }
    }

    /// Get depth at N levels
    pub fn get_depth(&self, num_levels: usize) -> Vec<(Subticks, BaseQuantums)> {
        self.levels_best_first()
            .take(num_levels)
            .map(|level| (level.subticks, level.get_total_quantity()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}

// ============================================================================
// Order Book
// ============================================================================

/// A resting order with its unfilled size
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestingOrder {
    pub order: Order,
    pub remaining: BaseQuantums,
}

/// In-memory book for one clob pair.
///
/// Holds resting orders under price-time priority. Cloning yields an
/// independent scratch copy.
#[derive(Debug, Clone)]
pub struct Orderbook {
    pub clob_pair_id: ClobPairId,
    bids: OrderBookSide,
    asks: OrderBookSide,
    orders: BTreeMap<OrderId, RestingOrder>,
}

impl Orderbook {
    pub fn new(clob_pair_id: ClobPairId) -> Self {
        Self {
            clob_pair_id,
            bids: OrderBookSide::new(Side::Buy),
            asks: OrderBookSide::new(Side::Sell),
            orders: BTreeMap::new(),
        }
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.orders.contains_key(order_id)
    }

    pub fn get(&self, order_id: &OrderId) -> Option<&RestingOrder> {
        self.orders.get(order_id)
    }

    pub fn side(&self, side: Side) -> &OrderBookSide {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut OrderBookSide {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Rest an order at the back of its price level.
    ///
    /// # Panics
    /// If an order with the same id already rests; callers must remove or
    /// reject duplicates first.
    pub fn add_order(&mut self, order: Order, remaining: BaseQuantums) {
        assert!(
            !self.orders.contains_key(&order.order_id),
            "order {} already rests on book {}",
            order.order_id,
            self.clob_pair_id
        );
        let order_id = order.order_id.clone();
        self.side_mut(order.side)
            .add_order(order_id.clone(), order.subticks, remaining);
        self.orders.insert(order_id, RestingOrder { order, remaining });
    }

    pub fn remove_order(&mut self, order_id: &OrderId) -> Option<RestingOrder> {
        let resting = self.orders.remove(order_id)?;
        let removed = self.side_mut(resting.order.side).remove_order(
            order_id,
            resting.order.subticks,
            resting.remaining,
        );
        assert!(removed, "order {} missing from its price level", order_id);
        Some(resting)
    }

    /// Reduce a resting order by a fill, removing it once exhausted.
    /// Returns the order's remaining size, or `None` if it does not rest here.
    pub fn reduce_order(&mut self, order_id: &OrderId, fill: BaseQuantums) -> Option<BaseQuantums> {
        let resting = self.orders.get_mut(order_id)?;
        let filled = fill.min(resting.remaining);
        resting.remaining = resting.remaining.saturating_sub(filled);
        let (side, subticks, remaining) =
            (resting.order.side, resting.order.subticks, resting.remaining);

        self.side_mut(side).subtract_quantity(subticks, filled);
        if remaining.is_zero() {
            self.remove_order(order_id);
        }
        Some(remaining)
    }

    /// Best resting order a taker on `taker_side` would match against next.
    pub fn best_maker(&self, taker_side: Side) -> Option<&RestingOrder> {
        self.side(taker_side.opposite())
            .best_level()
            .and_then(|level| level.front())
            .and_then(|order_id| self.orders.get(order_id))
    }

    /// True if `order` would take liquidity on arrival.
    pub fn would_cross(&self, order: &Order) -> bool {
        self.side(order.side.opposite())
            .best_price()
            .is_some_and(|best| order.crosses(best))
    }

    /// Short-term orders whose good-til-block is below `height`.
    pub fn expired_short_term_orders(&self, height: u32) -> Vec<OrderId> {
        self.orders
            .values()
            .filter(|resting| {
                resting
                    .order
                    .good_til_block()
                    .is_some_and(|good_til| good_til < height)
            })
            .map(|resting| resting.order.order_id.clone())
            .collect()
    }

    pub fn resting_orders(&self) -> impl Iterator<Item = &RestingOrder> {
        self.orders.values()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn snapshot(&self, depth: usize) -> OrderBookSnapshot {
        OrderBookSnapshot::with_depth(
            self.clob_pair_id,
            self.bids.get_depth(depth),
            self.asks.get_depth(depth),
        )
    }
}

// ============================================================================
// Order Book Snapshot
// ============================================================================

/// Immutable snapshot of the order book state
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderBookSnapshot {
    pub clob_pair_id: ClobPairId,
    /// Bid levels (price, quantity), best first
    pub bids: Vec<(Subticks, BaseQuantums)>,
    /// Ask levels (price, quantity), best first
    pub asks: Vec<(Subticks, BaseQuantums)>,
    /// Current spread (ask - bid) in subticks
    pub spread: Option<u64>,
    /// Mid price, rounded down
    pub mid_price: Option<Subticks>,
}

impl OrderBookSnapshot {
    pub fn with_depth(
        clob_pair_id: ClobPairId,
        bids: Vec<(Subticks, BaseQuantums)>,
        asks: Vec<(Subticks, BaseQuantums)>,
    ) -> Self {
        let (spread, mid_price) = match (bids.first(), asks.first()) {
            (Some((bid, _)), Some((ask, _))) => (
                Some(ask.value().saturating_sub(bid.value())),
                Some(Subticks::new(
                    ((bid.value() as u128 + ask.value() as u128) / 2) as u64,
                )),
            ),
            _ => (None, None),
        };

        Self {
            clob_pair_id,
            bids,
            asks,
            spread,
            mid_price,
        }
    }

    pub fn best_bid(&self) -> Option<Subticks> {
        self.bids.first().map(|(price, _)| *price)
    }

    pub fn best_ask(&self) -> Option<Subticks> {
        self.asks.first().map(|(price, _)| *price)
    }

    pub fn total_bid_quantity(&self) -> u64 {
        self.bids.iter().map(|(_, qty)| qty.value()).sum()
    }

    pub fn total_ask_quantity(&self) -> u64 {
        self.asks.iter().map(|(_, qty)| qty.value()).sum()
    }
}
