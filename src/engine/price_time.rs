// ============================================================================
// Price/Time Priority Matching Algorithm (FIFO)
// Collateral-gated matching of one taker against a clob pair's book
// ============================================================================

use super::collateral::CollateralizationGate;
use super::fill_amounts::FillAmountStore;
use crate::domain::{
    CancelReason, ClobConfig, ClobPair, MakerFill, Orderbook, OrderId, Side, SubaccountId,
    SubaccountUpdate,
};
use crate::error::{ClobError, ClobResult};
use crate::interfaces::{OffchainUpdate, OffchainUpdates, OraclePrices, PositionLedger};
use crate::numeric::{apply_ppm, quote_quantums, BaseQuantums, Subticks};

/// The incoming side of a match.
///
/// Regular orders carry an order id; liquidation takers do not.
#[derive(Debug, Clone)]
pub struct Taker<'o> {
    pub subaccount_id: &'o SubaccountId,
    pub order_id: Option<&'o OrderId>,
    pub side: Side,
    /// Worst price the taker accepts
    pub subticks: Subticks,
    pub remaining: BaseQuantums,
    /// Cap each fill at the remaining reducible position
    pub reduce_only: bool,
    pub fee_ppm: i32,
    pub check_collateral: bool,
    /// Prunable height recorded with the taker's fill amount
    pub prunable_block_height: Option<u32>,
}

impl Taker<'_> {
    fn crosses(&self, maker_subticks: Subticks) -> bool {
        match self.side {
            Side::Buy => self.subticks >= maker_subticks,
            Side::Sell => self.subticks <= maker_subticks,
        }
    }
}

/// Result of matching one taker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    pub fills: Vec<MakerFill>,
    pub filled: BaseQuantums,
    /// Taker failed the collateral check; remaining size must not rest
    pub taker_undercollateralized: bool,
    /// Makers removed without filling (self-trade, collateral eviction)
    pub removed_makers: Vec<(OrderId, CancelReason)>,
    /// Makers whose size was used up by this match
    pub exhausted_makers: Vec<OrderId>,
    pub offchain_updates: OffchainUpdates,
}

/// What one attempted fill did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FillStep {
    Filled,
    MakerEvicted,
    TakerRejected,
}

/// Quantums a reduce-only taker may still trade without growing the position.
pub fn reducible_quantums(position: i128, side: Side) -> BaseQuantums {
    let reducible = match side {
        Side::Buy if position < 0 => position.unsigned_abs(),
        Side::Sell if position > 0 => position.unsigned_abs(),
        _ => 0,
    };
    BaseQuantums::new(u64::try_from(reducible).unwrap_or(u64::MAX))
}

/// Price/Time Priority (FIFO) matching
///
/// The taker repeatedly fills against the earliest order at the best opposite
/// price while prices cross. Every fill is sized at the smaller remaining size
/// and priced at the maker's subticks.
///
/// # Example
/// ```text
/// Asks:  10 @ 5 (A, t=1)
///        10 @ 5 (B, t=2)
///        12 @ 5 (C, t=3)
///
/// Incoming: Buy 10 @ 12
/// Result: 5 with A, then 5 with B; C untouched
/// ```
pub struct PriceTimePriority<'a, L: PositionLedger + ?Sized> {
    config: &'a ClobConfig,
    clob_pair: &'a ClobPair,
    ledger: &'a mut L,
    oracle: &'a dyn OraclePrices,
}

impl<'a, L: PositionLedger + ?Sized> PriceTimePriority<'a, L> {
    pub fn new(
        config: &'a ClobConfig,
        clob_pair: &'a ClobPair,
        ledger: &'a mut L,
        oracle: &'a dyn OraclePrices,
    ) -> Self {
        Self {
            config,
            clob_pair,
            ledger,
            oracle,
        }
    }

    fn prunable_height(&self, book: &Orderbook, maker_id: &OrderId) -> Option<u32> {
        book.get(maker_id)
            .and_then(|resting| resting.order.good_til_block())
            .map(|good_til| good_til.saturating_add(self.config.short_block_window))
    }

    /// Settlement updates for one fill: taker first, then maker.
    fn settlement(
        &self,
        taker: &Taker<'_>,
        maker_subaccount: &SubaccountId,
        fill: BaseQuantums,
        subticks: Subticks,
    ) -> ClobResult<[SubaccountUpdate; 2]> {
        let quote = quote_quantums(fill, subticks, self.clob_pair.quantum_conversion_exponent)?;
        let perpetual_id = self.clob_pair.perpetual_id;
        let taker_fee = apply_ppm(quote, taker.fee_ppm as i64)?;
        let maker_fee = apply_ppm(quote, self.config.fees.maker_fee_ppm as i64)?;

        let taker_quote = if taker.side.is_buy() { -quote } else { quote };
        let taker_update = SubaccountUpdate::new(taker.subaccount_id.clone())
            .with_quote_delta(taker_quote - taker_fee)
            .with_perpetual_delta(perpetual_id, fill.signed(taker.side.is_buy()));
        let maker_update = SubaccountUpdate::new(maker_subaccount.clone())
            .with_quote_delta(-taker_quote - maker_fee)
            .with_perpetual_delta(perpetual_id, fill.signed(!taker.side.is_buy()));

        Ok([taker_update, maker_update])
    }

    /// Attempt one fill of `fill` quantums against `maker_id` at `maker_subticks`.
    ///
    /// Collateral outcomes are decisions: a maker that fails its check (or
    /// whose check cannot be evaluated) is evicted, a taker that fails stops
    /// the match. Nothing is applied unless both sides pass.
    #[allow(clippy::too_many_arguments)]
    fn try_fill(
        &mut self,
        book: &mut Orderbook,
        fill_amounts: &mut FillAmountStore,
        taker: &Taker<'_>,
        maker_id: &OrderId,
        maker_subticks: Subticks,
        fill: BaseQuantums,
        outcome: &mut MatchOutcome,
    ) -> ClobResult<FillStep> {
        let [taker_update, maker_update] =
            match self.settlement(taker, &maker_id.subaccount_id, fill, maker_subticks) {
                Ok(updates) => updates,
                Err(err) => {
                    tracing::warn!(maker = %maker_id, error = %err, "fill cannot be settled");
                    outcome.taker_undercollateralized = true;
                    return Ok(FillStep::TakerRejected);
                },
            };

        let (maker_passed, taker_passed) = {
            let gate = CollateralizationGate::new(&*self.ledger, self.oracle, self.config);
            let passes = |update: &SubaccountUpdate| match gate.check_collateralization(update) {
                Ok(result) => result.is_success(),
                Err(err) => {
                    tracing::warn!(
                        subaccount = %update.subaccount_id,
                        error = %err,
                        "collateral check failed to evaluate"
                    );
                    false
                },
            };
            let maker_passed = passes(&maker_update);
            let taker_passed = !taker.check_collateral || passes(&taker_update);
            (maker_passed, taker_passed)
        };

        if !maker_passed {
            book.remove_order(maker_id);
            tracing::debug!(maker = %maker_id, "evicting undercollateralized maker");
            outcome.offchain_updates.push(OffchainUpdate::OrderRemove {
                order_id: maker_id.clone(),
                reason: CancelReason::Undercollateralized,
            });
            outcome
                .removed_makers
                .push((maker_id.clone(), CancelReason::Undercollateralized));
        }
        if !taker_passed {
            tracing::debug!(taker = %taker.subaccount_id, "taker failed collateral check");
            outcome.taker_undercollateralized = true;
            return Ok(FillStep::TakerRejected);
        }
        if !maker_passed {
            return Ok(FillStep::MakerEvicted);
        }

        if let Err(err) = self.ledger.apply_updates(&[taker_update, maker_update]) {
            tracing::warn!(maker = %maker_id, error = %err, "ledger refused fill settlement");
            outcome.taker_undercollateralized = true;
            return Ok(FillStep::TakerRejected);
        }

        // Cumulative fills never exceed order sizes, so these cannot overflow.
        let maker_prunable = self.prunable_height(book, maker_id);
        let maker_left = book.reduce_order(maker_id, fill).unwrap_or(BaseQuantums::ZERO);
        let maker_total = fill_amounts.add_fill(maker_id, fill, maker_prunable)?;
        if let Some(taker_id) = taker.order_id {
            let taker_total = fill_amounts.add_fill(taker_id, fill, taker.prunable_block_height)?;
            outcome.offchain_updates.push(OffchainUpdate::OrderUpdate {
                order_id: taker_id.clone(),
                total_filled: taker_total,
            });
            outcome.offchain_updates.push(OffchainUpdate::Fill {
                taker_order_id: taker_id.clone(),
                maker_order_id: maker_id.clone(),
                fill_amount: fill,
                subticks: maker_subticks,
            });
        }
        outcome.offchain_updates.push(OffchainUpdate::OrderUpdate {
            order_id: maker_id.clone(),
            total_filled: maker_total,
        });
        tracing::debug!(
            maker = %maker_id,
            fill = %fill,
            subticks = %maker_subticks,
            "matched"
        );

        if maker_left.is_zero() {
            outcome.exhausted_makers.push(maker_id.clone());
        }
        outcome.fills.push(MakerFill {
            maker_order_id: maker_id.clone(),
            fill_amount: fill,
        });
        outcome.filled = outcome.filled.checked_add(fill)?;
        Ok(FillStep::Filled)
    }

    pub fn match_order(
        &mut self,
        book: &mut Orderbook,
        fill_amounts: &mut FillAmountStore,
        taker: &Taker<'_>,
    ) -> ClobResult<MatchOutcome> {
        let mut outcome = MatchOutcome::default();
        let mut remaining = taker.remaining;

        while !remaining.is_zero() {
            let Some(maker) = book.best_maker(taker.side) else {
                break;
            };
            if !taker.crosses(maker.order.subticks) {
                break;
            }
            let maker_id = maker.order.order_id.clone();
            let maker_subticks = maker.order.subticks;
            let maker_remaining = maker.remaining;

            if &maker_id.subaccount_id == taker.subaccount_id {
                book.remove_order(&maker_id);
                tracing::debug!(maker = %maker_id, "removing self-trade maker");
                outcome.offchain_updates.push(OffchainUpdate::OrderRemove {
                    order_id: maker_id.clone(),
                    reason: CancelReason::SelfTrade,
                });
                outcome.removed_makers.push((maker_id, CancelReason::SelfTrade));
                continue;
            }

            let mut fill = remaining.min(maker_remaining);
            if taker.reduce_only {
                fill = fill.min(self.reducible(taker));
                if fill.is_zero() {
                    break;
                }
            }

            match self.try_fill(book, fill_amounts, taker, &maker_id, maker_subticks, fill, &mut outcome)? {
                FillStep::Filled => remaining = remaining.saturating_sub(fill),
                FillStep::MakerEvicted => continue,
                FillStep::TakerRejected => break,
            }
        }

        Ok(outcome)
    }

    /// Apply a proposer's claimed fills for `taker`, in order.
    ///
    /// Each claimed maker must rest on the book, cross the taker's price and
    /// pass its collateral check. Any claim that does not hold is an error;
    /// callers run this on scratch state only.
    pub fn match_claimed(
        &mut self,
        book: &mut Orderbook,
        fill_amounts: &mut FillAmountStore,
        taker: &Taker<'_>,
        claims: &[MakerFill],
    ) -> ClobResult<MatchOutcome> {
        let mut outcome = MatchOutcome::default();
        let mut remaining = taker.remaining;

        for claim in claims {
            let maker_id = &claim.maker_order_id;
            let maker = book
                .get(maker_id)
                .ok_or_else(|| ClobError::OrderNotFound(maker_id.clone()))?;
            let (maker_side, maker_subticks, maker_remaining) =
                (maker.order.side, maker.order.subticks, maker.remaining);

            if maker_side == taker.side || !taker.crosses(maker_subticks) {
                return Err(ClobError::InvalidMatch(format!(
                    "maker {maker_id} at {maker_subticks} does not cross the taker"
                )));
            }
            if &maker_id.subaccount_id == taker.subaccount_id {
                return Err(ClobError::InvalidMatch(format!("maker {maker_id} is the taker")));
            }
            if claim.fill_amount > maker_remaining || claim.fill_amount > remaining {
                return Err(ClobError::InvalidMatch(format!(
                    "fill of {} against {maker_id} exceeds the remaining size",
                    claim.fill_amount
                )));
            }
            if taker.reduce_only && claim.fill_amount > self.reducible(taker) {
                return Err(ClobError::InvalidMatch(format!(
                    "fill of {} against {maker_id} would grow the taker's position",
                    claim.fill_amount
                )));
            }

            match self.try_fill(
                book,
                fill_amounts,
                taker,
                maker_id,
                maker_subticks,
                claim.fill_amount,
                &mut outcome,
            )? {
                FillStep::Filled => remaining = remaining.saturating_sub(claim.fill_amount),
                FillStep::MakerEvicted | FillStep::TakerRejected => {
                    return Err(ClobError::InvalidMatch(format!(
                        "fill against {maker_id} fails collateral checks"
                    )))
                },
            }
        }

        Ok(outcome)
    }

    fn reducible(&self, taker: &Taker<'_>) -> BaseQuantums {
        let position = self
            .ledger
            .subaccount(taker.subaccount_id)
            .position(self.clob_pair.perpetual_id);
        reducible_quantums(position, taker.side)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClobPairId, GoodTil, Order, OrderFlags, TimeInForce};
    use crate::interfaces::PositionReader;
    use crate::ledger::InMemoryLedger;
    use crate::prices::OraclePriceTable;
    use rust_decimal::Decimal;

    fn sub(owner: &str) -> SubaccountId {
        SubaccountId::new(owner, 0)
    }

    fn ask(owner: &str, subticks: u64, quantums: u64) -> Order {
        Order::new(
            OrderId::new(sub(owner), 1, OrderFlags::ShortTerm, ClobPairId(0)),
            Side::Sell,
            BaseQuantums::new(quantums),
            Subticks::new(subticks),
            GoodTil::Block(10),
            TimeInForce::GoodTilCancel,
        )
        .unwrap()
    }

    fn funded_ledger(owners: &[&str]) -> InMemoryLedger {
        let mut ledger = InMemoryLedger::new();
        for owner in owners {
            ledger.deposit(&sub(owner), 1_000_000);
        }
        ledger
    }

    #[test]
    fn test_fills_in_price_then_time_order() {
        let config = ClobConfig::single_market();
        let pair = config.clob_pair(ClobPairId(0)).unwrap().clone();
        let oracle = OraclePriceTable::new().with_price(0, Decimal::from(10));
        let mut ledger = funded_ledger(&["a", "b", "c", "taker"]);
        let mut book = Orderbook::new(ClobPairId(0));
        let mut fills = FillAmountStore::new();

        for (owner, price) in [("a", 10), ("b", 10), ("c", 12)] {
            let order = ask(owner, price, 5);
            book.add_order(order.clone(), order.quantums);
        }

        let taker_sub = sub("taker");
        let taker = Taker {
            subaccount_id: &taker_sub,
            order_id: None,
            side: Side::Buy,
            subticks: Subticks::new(12),
            remaining: BaseQuantums::new(10),
            reduce_only: false,
            fee_ppm: 0,
            check_collateral: true,
            prunable_block_height: None,
        };

        let outcome = PriceTimePriority::new(&config, &pair, &mut ledger, &oracle)
            .match_order(&mut book, &mut fills, &taker)
            .unwrap();

        let makers: Vec<&str> = outcome
            .fills
            .iter()
            .map(|fill| fill.maker_order_id.subaccount_id.owner.as_str())
            .collect();
        assert_eq!(makers, vec!["a", "b"]);
        assert_eq!(outcome.filled, BaseQuantums::new(10));
        assert_eq!(book.len(), 1);
        assert_eq!(ledger.subaccount(&taker_sub).position(0), 10);
        assert_eq!(ledger.subaccount(&taker_sub).quote_balance, 1_000_000 - 100);
    }

    #[test]
    fn test_claimed_fills_checked_against_book() {
        let config = ClobConfig::single_market();
        let pair = config.clob_pair(ClobPairId(0)).unwrap().clone();
        let oracle = OraclePriceTable::new().with_price(0, Decimal::from(10));
        let mut ledger = funded_ledger(&["a", "c", "taker"]);
        let mut book = Orderbook::new(ClobPairId(0));
        let mut fills = FillAmountStore::new();

        for (owner, price) in [("a", 10), ("c", 12)] {
            let order = ask(owner, price, 5);
            book.add_order(order.clone(), order.quantums);
        }

        let taker_sub = sub("taker");
        let taker = Taker {
            subaccount_id: &taker_sub,
            order_id: None,
            side: Side::Buy,
            subticks: Subticks::new(11),
            remaining: BaseQuantums::new(5),
            reduce_only: false,
            fee_ppm: 0,
            check_collateral: true,
            prunable_block_height: None,
        };
        let claim = |owner: &str, quantums| MakerFill {
            maker_order_id: ask(owner, 10, 5).order_id,
            fill_amount: BaseQuantums::new(quantums),
        };

        let mut matcher = PriceTimePriority::new(&config, &pair, &mut ledger, &oracle);
        // not resting
        assert!(matches!(
            matcher.match_claimed(&mut book, &mut fills, &taker, &[claim("b", 1)]),
            Err(ClobError::OrderNotFound(_))
        ));
        // above the taker's limit
        assert!(matches!(
            matcher.match_claimed(&mut book, &mut fills, &taker, &[claim("c", 1)]),
            Err(ClobError::InvalidMatch(_))
        ));
        // larger than the taker
        assert!(matches!(
            matcher.match_claimed(&mut book, &mut fills, &taker, &[claim("a", 6)]),
            Err(ClobError::InvalidMatch(_))
        ));

        let outcome = matcher
            .match_claimed(&mut book, &mut fills, &taker, &[claim("a", 3)])
            .unwrap();
        assert_eq!(outcome.filled, BaseQuantums::new(3));
        assert_eq!(book.get(&ask("a", 10, 5).order_id).unwrap().remaining, BaseQuantums::new(2));
        assert_eq!(ledger.subaccount(&taker_sub).position(0), 3);
    }

    #[test]
    fn test_reducible_quantums() {
        assert_eq!(reducible_quantums(10, Side::Sell), BaseQuantums::new(10));
        assert_eq!(reducible_quantums(10, Side::Buy), BaseQuantums::ZERO);
        assert_eq!(reducible_quantums(-4, Side::Buy), BaseQuantums::new(4));
        assert_eq!(reducible_quantums(0, Side::Sell), BaseQuantums::ZERO);
    }
}
