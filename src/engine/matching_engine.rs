// ============================================================================
// Matching Engine
// CLOB state machine: placement, matching, cancellation and expiration
// ============================================================================

use super::collateral::CollateralizationGate;
use super::fill_amounts::FillAmountStore;
use super::price_time::{reducible_quantums, PriceTimePriority, Taker};
use super::stateful_store::StatefulOrderStore;
use crate::domain::{
    BlockContext, CancelReason, ClobConfig, ClobPair, ClobPairId, ExecMode, GoodTil, MakerFill,
    Order, OrderBookSnapshot, OrderId, OrderStatus, Orderbook, PendingOpenOrder, TimeInForce,
};
use crate::error::{ClobError, ClobResult};
use crate::interfaces::{
    EventHandler, NoOpEventHandler, OffchainUpdate, OffchainUpdates, OraclePrices, PositionLedger,
};
use crate::ledger::LedgerOverlay;
use crate::numeric::BaseQuantums;
use parking_lot::{Mutex, MutexGuard};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Outcome of placing one order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceOrderResult {
    /// Quantums filled by this placement
    pub filled_quantums: BaseQuantums,
    pub status: OrderStatus,
    pub fills: Vec<MakerFill>,
    pub offchain_updates: OffchainUpdates,
}

impl PlaceOrderResult {
    fn unfilled(status: OrderStatus, offchain_updates: OffchainUpdates) -> Self {
        Self {
            filled_quantums: BaseQuantums::ZERO,
            status,
            fills: Vec::new(),
            offchain_updates,
        }
    }
}

/// In-memory CLOB state for every clob pair.
///
/// Cloning yields an independent scratch copy; see [`MatchingEngine::scratch`].
#[derive(Clone)]
pub struct MatchingEngine {
    config: Arc<ClobConfig>,

    /// One book per clob pair
    books: BTreeMap<ClobPairId, Orderbook>,

    /// Cumulative fills per order id
    fill_amounts: FillAmountStore,

    /// Long-term order placements and expiration index
    stateful_orders: StatefulOrderStore,

    /// Receives off-chain updates in commit mode
    event_handler: Arc<dyn EventHandler>,
}

impl MatchingEngine {
    /// Create a new matching engine
    pub fn new(config: ClobConfig, event_handler: Arc<dyn EventHandler>) -> Self {
        let books = config
            .clob_pairs
            .keys()
            .map(|id| (*id, Orderbook::new(*id)))
            .collect();

        Self {
            config: Arc::new(config),
            books,
            fill_amounts: FillAmountStore::new(),
            stateful_orders: StatefulOrderStore::new(),
            event_handler,
        }
    }

    /// Discardable copy of the full engine state that publishes nothing.
    pub fn scratch(&self) -> MatchingEngine {
        let mut copy = self.clone();
        copy.event_handler = Arc::new(NoOpEventHandler);
        copy
    }

    pub fn config(&self) -> &ClobConfig {
        &self.config
    }

    pub fn orderbook(&self, clob_pair_id: ClobPairId) -> Option<&Orderbook> {
        self.books.get(&clob_pair_id)
    }

    pub fn fill_amounts(&self) -> &FillAmountStore {
        &self.fill_amounts
    }

    pub fn stateful_orders(&self) -> &StatefulOrderStore {
        &self.stateful_orders
    }

    /// Get order book snapshot
    pub fn snapshot(&self, clob_pair_id: ClobPairId, depth: usize) -> ClobResult<OrderBookSnapshot> {
        self.books
            .get(&clob_pair_id)
            .map(|book| book.snapshot(depth))
            .ok_or(ClobError::ClobPairNotFound(clob_pair_id))
    }

    pub(crate) fn clob_pair(&self, clob_pair_id: ClobPairId) -> ClobResult<ClobPair> {
        self.config
            .clob_pair(clob_pair_id)
            .cloned()
            .ok_or(ClobError::ClobPairNotFound(clob_pair_id))
    }

    pub(crate) fn book_mut(&mut self, clob_pair_id: ClobPairId) -> ClobResult<&mut Orderbook> {
        self.books
            .get_mut(&clob_pair_id)
            .ok_or(ClobError::ClobPairNotFound(clob_pair_id))
    }

    pub(crate) fn shared_config(&self) -> Arc<ClobConfig> {
        Arc::clone(&self.config)
    }

    /// Disjoint borrows of one book and the fill records.
    pub(crate) fn book_and_fills_mut(
        &mut self,
        clob_pair_id: ClobPairId,
    ) -> ClobResult<(&mut Orderbook, &mut FillAmountStore)> {
        let book = self
            .books
            .get_mut(&clob_pair_id)
            .ok_or(ClobError::ClobPairNotFound(clob_pair_id))?;
        Ok((book, &mut self.fill_amounts))
    }

    pub(crate) fn publish(&self, ctx: &BlockContext, updates: &OffchainUpdates) {
        if ctx.mode == ExecMode::Commit && !updates.is_empty() {
            self.event_handler.on_updates(updates);
        }
    }

    // ========================================================================
    // Placement
    // ========================================================================

    /// Place an order: validate, match against the book, and rest any residual.
    pub fn place_order<L: PositionLedger + ?Sized>(
        &mut self,
        ctx: &BlockContext,
        ledger: &mut L,
        oracle: &dyn OraclePrices,
        order: Order,
    ) -> ClobResult<PlaceOrderResult> {
        let result = self.place_order_internal(ctx, ledger, oracle, order)?;
        self.publish(ctx, &result.offchain_updates);
        Ok(result)
    }

    /// Re-execute placement in replay mode. Identical state and input give
    /// identical fills and status; nothing is published.
    pub fn replay_place_order<L: PositionLedger + ?Sized>(
        &mut self,
        ctx: &BlockContext,
        ledger: &mut L,
        oracle: &dyn OraclePrices,
        order: Order,
    ) -> ClobResult<PlaceOrderResult> {
        self.place_order_internal(&ctx.as_replay(), ledger, oracle, order)
    }

    fn validate_placement(&self, ctx: &BlockContext, order: &Order, clob_pair: &ClobPair) -> ClobResult<bool> {
        order.validate_basic()?;
        if !order.subticks.is_multiple_of(clob_pair.subticks_per_tick) {
            return Err(ClobError::InvalidOrder(format!(
                "subticks {} not a multiple of {}",
                order.subticks, clob_pair.subticks_per_tick
            )));
        }
        if !order.quantums.is_multiple_of(clob_pair.step_base_quantums) {
            return Err(ClobError::InvalidOrder(format!(
                "quantums {} not a multiple of {}",
                order.quantums, clob_pair.step_base_quantums
            )));
        }

        match order.good_til {
            GoodTil::Block(good_til_block) => {
                if good_til_block < ctx.height {
                    return Ok(false);
                }
                let window = self.config.short_block_window;
                if good_til_block > ctx.height.saturating_add(window) {
                    return Err(ClobError::GoodTilBlockExceedsShortBlockWindow {
                        good_til_block,
                        height: ctx.height,
                        window,
                    });
                }
            },
            GoodTil::BlockTime(good_til) => {
                if good_til <= ctx.block_time {
                    return Ok(false);
                }
                let max = ctx.block_time + self.config.max_stateful_order_time_window;
                if good_til > max {
                    return Err(ClobError::GoodTilBlockTimeExceedsStatefulWindow { good_til, max });
                }
            },
        }
        Ok(true)
    }

    fn place_order_internal<L: PositionLedger + ?Sized>(
        &mut self,
        ctx: &BlockContext,
        ledger: &mut L,
        oracle: &dyn OraclePrices,
        order: Order,
    ) -> ClobResult<PlaceOrderResult> {
        let config = self.shared_config();
        let clob_pair = self.clob_pair(order.order_id.clob_pair_id)?;
        let order_id = order.order_id.clone();

        if !self.validate_placement(ctx, &order, &clob_pair)? {
            tracing::debug!(order = %order_id, height = ctx.height, "order already expired");
            return Ok(PlaceOrderResult::unfilled(
                OrderStatus::Expired,
                OffchainUpdates::new(),
            ));
        }

        let filled_before = self.fill_amounts.fill_amount(&order_id);
        if filled_before >= order.quantums {
            return Err(ClobError::OrderFullyFilled(order_id));
        }

        let mut updates = OffchainUpdates::new();
        if order_id.is_stateful() {
            if self.stateful_orders.does_long_term_order_exist_in_state(&order)
                || self.fill_amounts.get(&order_id).is_some()
            {
                return Err(ClobError::StatefulOrderAlreadyExists(order_id));
            }
        } else {
            let book = self.book_mut(clob_pair.id)?;
            if let Some(existing) = book.get(&order_id) {
                if order.good_til_block() <= existing.order.good_til_block() {
                    return Err(ClobError::OrderAlreadyExists(order_id));
                }
                book.remove_order(&order_id);
                updates.push(OffchainUpdate::OrderRemove {
                    order_id: order_id.clone(),
                    reason: CancelReason::Replaced,
                });
            }
        }

        let remaining = order.quantums.checked_sub(filled_before)?;

        if order.time_in_force == TimeInForce::PostOnly && self.book_mut(clob_pair.id)?.would_cross(&order) {
            return Ok(Self::cancelled(order_id, CancelReason::PostOnlyWouldCross, updates));
        }

        if order.reduce_only {
            let position = ledger
                .subaccount(&order_id.subaccount_id)
                .position(clob_pair.perpetual_id);
            if reducible_quantums(position, order.side).is_zero() {
                return Ok(Self::cancelled(
                    order_id,
                    CancelReason::ReduceOnlyWouldIncrease,
                    updates,
                ));
            }
        }

        let taker = Taker {
            subaccount_id: &order.order_id.subaccount_id,
            order_id: Some(&order.order_id),
            side: order.side,
            subticks: order.subticks,
            remaining,
            reduce_only: order.reduce_only,
            fee_ppm: config.fees.taker_fee_ppm,
            check_collateral: true,
            prunable_block_height: order
                .good_til_block()
                .map(|good_til| good_til.saturating_add(config.short_block_window)),
        };

        if order.time_in_force == TimeInForce::FillOrKill {
            let mut book = self.book_mut(clob_pair.id)?.clone();
            let mut fill_amounts = self.fill_amounts.clone();
            let mut overlay = LedgerOverlay::new(&*ledger);
            let trial = PriceTimePriority::new(&config, &clob_pair, &mut overlay, oracle)
                .match_order(&mut book, &mut fill_amounts, &taker)?;
            if trial.filled < remaining || trial.taker_undercollateralized {
                return Ok(Self::cancelled(order_id, CancelReason::FillOrKillNotFilled, updates));
            }
        }

        let outcome = {
            let (book, fill_amounts) = self.book_and_fills_mut(clob_pair.id)?;
            PriceTimePriority::new(&config, &clob_pair, &mut *ledger, oracle)
                .match_order(book, fill_amounts, &taker)?
        };
        self.cleanup_makers(&outcome.removed_makers, &outcome.exhausted_makers);
        updates.append(outcome.offchain_updates);

        let residual = remaining.saturating_sub(outcome.filled);
        let status = if outcome.taker_undercollateralized {
            OrderStatus::Cancelled(CancelReason::Undercollateralized)
        } else if residual.is_zero() {
            OrderStatus::FullyFilled
        } else {
            match order.time_in_force {
                TimeInForce::ImmediateOrCancel => OrderStatus::Cancelled(CancelReason::ImmediateOrCancel),
                TimeInForce::FillOrKill => OrderStatus::Cancelled(CancelReason::FillOrKillNotFilled),
                TimeInForce::GoodTilCancel | TimeInForce::PostOnly => {
                    self.try_rest(ctx, ledger, oracle, &order, residual, &mut updates)?
                },
            }
        };

        if let OrderStatus::Cancelled(reason) = status {
            updates.push(OffchainUpdate::OrderRemove {
                order_id: order_id.clone(),
                reason,
            });
        }
        if order_id.is_stateful() && status != OrderStatus::Open && !outcome.fills.is_empty() {
            // Keep the fill record reachable by the expiration sweep.
            if let Some(good_til) = order.good_til_block_time() {
                self.stateful_orders
                    .must_add_order_to_stateful_orders_time_slice(good_til, order_id.clone());
            }
        }

        tracing::debug!(
            order = %order_id,
            filled = %outcome.filled,
            status = ?status,
            replay = ctx.is_replay(),
            "order placed"
        );

        Ok(PlaceOrderResult {
            filled_quantums: outcome.filled,
            status,
            fills: outcome.fills,
            offchain_updates: updates,
        })
    }

    /// Rest the residual if the owner can carry it at its limit price.
    fn try_rest<L: PositionLedger + ?Sized>(
        &mut self,
        ctx: &BlockContext,
        ledger: &L,
        oracle: &dyn OraclePrices,
        order: &Order,
        residual: BaseQuantums,
        updates: &mut OffchainUpdates,
    ) -> ClobResult<OrderStatus> {
        let clob_pair_id = order.order_id.clob_pair_id;
        let subaccount_id = &order.order_id.subaccount_id;

        // The subaccount's same-side resting orders fill together in the
        // worst case, so the new residual is reserved on top of them.
        let mut reservations: Vec<PendingOpenOrder> = self
            .orderbook(clob_pair_id)
            .ok_or(ClobError::ClobPairNotFound(clob_pair_id))?
            .resting_orders()
            .filter(|resting| {
                &resting.order.order_id.subaccount_id == subaccount_id && resting.order.side == order.side
            })
            .map(|resting| PendingOpenOrder {
                remaining_quantums: resting.remaining,
                is_buy: resting.order.is_buy(),
                subticks: resting.order.subticks,
                clob_pair_id,
            })
            .collect();
        reservations.push(PendingOpenOrder {
            remaining_quantums: residual,
            is_buy: order.is_buy(),
            subticks: order.subticks,
            clob_pair_id,
        });
        let mut pending = BTreeMap::new();
        pending.insert(subaccount_id.clone(), reservations);
        let (collateralized, _) = CollateralizationGate::new(ledger, oracle, &self.config)
            .add_order_to_orderbook_collat_check(clob_pair_id, &pending)?;
        if !collateralized {
            return Ok(OrderStatus::Cancelled(CancelReason::Undercollateralized));
        }

        self.book_mut(clob_pair_id)?.add_order(order.clone(), residual);
        if let Some(good_til) = order.good_til_block_time() {
            self.stateful_orders
                .set_long_term_order_placement(order.clone(), ctx.height);
            self.stateful_orders
                .must_add_order_to_stateful_orders_time_slice(good_til, order.order_id.clone());
        }
        updates.push(OffchainUpdate::OrderPlace {
            order: order.clone(),
            remaining: residual,
        });
        Ok(OrderStatus::Open)
    }

    fn cancelled(order_id: OrderId, reason: CancelReason, mut updates: OffchainUpdates) -> PlaceOrderResult {
        updates.push(OffchainUpdate::OrderRemove { order_id, reason });
        PlaceOrderResult::unfilled(OrderStatus::Cancelled(reason), updates)
    }

    /// Keep the stateful store consistent with makers that left the book.
    pub(crate) fn cleanup_makers(&mut self, removed: &[(OrderId, CancelReason)], exhausted: &[OrderId]) {
        for (order_id, _) in removed {
            if order_id.is_stateful() && self.stateful_orders.remove_stateful_order(order_id).is_some() {
                self.fill_amounts.remove(order_id);
            }
        }
        for order_id in exhausted {
            if order_id.is_stateful() {
                self.stateful_orders.remove_placement(order_id);
            }
        }
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Cancel a resting order.
    pub fn cancel_order(&mut self, ctx: &BlockContext, order_id: &OrderId) -> ClobResult<OffchainUpdates> {
        if order_id.is_stateful() {
            return self.cancel_stateful_order(ctx, order_id);
        }

        self.book_mut(order_id.clob_pair_id)?
            .remove_order(order_id)
            .ok_or_else(|| ClobError::OrderNotFound(order_id.clone()))?;

        let mut updates = OffchainUpdates::new();
        updates.push(OffchainUpdate::OrderRemove {
            order_id: order_id.clone(),
            reason: CancelReason::UserCanceled,
        });
        self.publish(ctx, &updates);
        Ok(updates)
    }

    /// Remove a stateful order from state, the book and the fill records.
    pub fn cancel_stateful_order(&mut self, ctx: &BlockContext, order_id: &OrderId) -> ClobResult<OffchainUpdates> {
        self.stateful_orders
            .remove_stateful_order(order_id)
            .ok_or_else(|| ClobError::OrderNotFound(order_id.clone()))?;
        self.book_mut(order_id.clob_pair_id)?.remove_order(order_id);
        self.fill_amounts.remove(order_id);

        let mut updates = OffchainUpdates::new();
        updates.push(OffchainUpdate::OrderRemove {
            order_id: order_id.clone(),
            reason: CancelReason::UserCanceled,
        });
        self.publish(ctx, &updates);
        Ok(updates)
    }

    // ========================================================================
    // Expiration
    // ========================================================================

    /// Remove resting short-term orders whose good-til-block is below the height.
    pub fn remove_expired_short_term_orders(&mut self, ctx: &BlockContext) -> OffchainUpdates {
        let mut updates = OffchainUpdates::new();
        for book in self.books.values_mut() {
            for order_id in book.expired_short_term_orders(ctx.height) {
                book.remove_order(&order_id);
                updates.push(OffchainUpdate::OrderRemove {
                    order_id,
                    reason: CancelReason::Expired,
                });
            }
        }
        self.publish(ctx, &updates);
        updates
    }

    /// Sweep stateful orders whose good-til-block-time has passed.
    pub fn remove_expired_stateful_orders(&mut self, ctx: &BlockContext) -> Vec<OrderId> {
        let expired = self
            .stateful_orders
            .remove_expired_stateful_orders(ctx.block_time);

        let mut updates = OffchainUpdates::new();
        for order_id in &expired {
            self.fill_amounts.remove(order_id);
            let removed = self
                .books
                .get_mut(&order_id.clob_pair_id)
                .and_then(|book| book.remove_order(order_id));
            if removed.is_some() {
                updates.push(OffchainUpdate::OrderRemove {
                    order_id: order_id.clone(),
                    reason: CancelReason::Expired,
                });
            }
        }
        self.publish(ctx, &updates);
        expired
    }

    /// Drop short-term fill records whose prunable height has been reached.
    pub fn prune_fill_amounts(&mut self, height: u32) -> Vec<OrderId> {
        self.fill_amounts.prune(height)
    }

    /// Run every per-block expiration step at `ctx`.
    pub fn end_block(&mut self, ctx: &BlockContext) {
        let short_term = self.remove_expired_short_term_orders(ctx);
        let stateful = self.remove_expired_stateful_orders(ctx);
        let pruned = self.prune_fill_amounts(ctx.height);
        tracing::debug!(
            height = ctx.height,
            short_term_expired = short_term.len(),
            stateful_expired = stateful.len(),
            fill_records_pruned = pruned.len(),
            "end block"
        );
    }
}

// ============================================================================
// Shared Engine
// ============================================================================

/// Engine handle shared between block phases; the mutex serializes them.
#[derive(Clone)]
pub struct SharedEngine {
    inner: Arc<Mutex<MatchingEngine>>,
}

impl SharedEngine {
    pub fn new(engine: MatchingEngine) -> Self {
        Self {
            inner: Arc::new(Mutex::new(engine)),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, MatchingEngine> {
        self.inner.lock()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut MatchingEngine) -> R) -> R {
        f(&mut self.inner.lock())
    }
}
