// ============================================================================
// Liquidation Offsetting
// Closes a liquidated position against the book, then deleverages the rest
// ============================================================================

use super::collateral::CollateralizationGate;
use super::matching_engine::MatchingEngine;
use super::price_time::{reducible_quantums, PriceTimePriority, Taker};
use crate::domain::{
    BlockContext, ClobConfig, ClobMatch, ClobPairId, DeleveragingFill, MakerFill, Side,
    SubaccountId, SubaccountUpdate,
};
use crate::error::{ClobError, ClobResult};
use crate::interfaces::{OffchainUpdates, OraclePrices, PositionLedger};
use crate::numeric::{decimal, BaseQuantums, NumericError, Subticks, ONE_MILLION};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// What an offset achieved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OffsetResult {
    pub liquidated: SubaccountId,
    pub clob_pair_id: ClobPairId,
    pub perpetual_id: u32,
    /// Requested signed change to the liquidated position
    pub delta_total: i128,
    pub book_fills: Vec<MakerFill>,
    pub deleveraging_fills: Vec<DeleveragingFill>,
    /// Signed size neither leg could absorb
    pub delta_quantums_remaining: i128,
    pub offchain_updates: OffchainUpdates,
}

impl OffsetResult {
    /// The matches a proposer would include for this offset.
    pub fn clob_matches(&self) -> Vec<ClobMatch> {
        let mut matches = Vec::new();
        if !self.book_fills.is_empty() {
            matches.push(ClobMatch::MatchPerpetualLiquidation {
                liquidated: self.liquidated.clone(),
                clob_pair_id: self.clob_pair_id,
                perpetual_id: self.perpetual_id,
                total_size: BaseQuantums::from_abs(self.delta_total).unwrap_or(BaseQuantums::ZERO),
                is_buy: self.delta_total > 0,
                fills: self.book_fills.clone(),
            });
        }
        if !self.deleveraging_fills.is_empty() {
            matches.push(ClobMatch::MatchPerpetualDeleveraging {
                liquidated: self.liquidated.clone(),
                perpetual_id: self.perpetual_id,
                fills: self.deleveraging_fills.clone(),
            });
        }
        matches
    }
}

/// Worst subticks a liquidation taker accepts: oracle price moved against
/// the taker by `spread_ppm`, rounded in the taker's favor.
fn liquidation_price_bound(
    oracle_price: Decimal,
    quantum_conversion_exponent: i32,
    spread_ppm: u32,
    side: Side,
) -> ClobResult<Subticks> {
    let spread = i128::from(spread_ppm).min(ONE_MILLION);
    let factor = match side {
        Side::Buy => ONE_MILLION + spread,
        Side::Sell => ONE_MILLION - spread,
    };
    let mut price = decimal::checked_div(
        decimal::checked_mul(oracle_price, decimal::to_decimal(factor)?)?,
        decimal::to_decimal(ONE_MILLION)?,
    )?;
    for _ in 0..quantum_conversion_exponent.unsigned_abs() {
        price = if quantum_conversion_exponent > 0 {
            decimal::checked_div(price, Decimal::TEN)?
        } else {
            decimal::checked_mul(price, Decimal::TEN)?
        };
    }

    let rounded = match side {
        Side::Buy => price.floor(),
        Side::Sell => price.ceil(),
    };
    if rounded <= Decimal::ZERO {
        return Ok(Subticks::new(1));
    }
    Ok(rounded.to_u64().map(Subticks::new).unwrap_or(Subticks::MAX))
}

/// Move `step` of the liquidated position to `counterparty` at the
/// liquidated subaccount's bankruptcy price. Returns the quote paid to the
/// liquidated subaccount.
#[allow(clippy::too_many_arguments)]
fn settle_deleveraging<L: PositionLedger + ?Sized>(
    ledger: &mut L,
    oracle: &dyn OraclePrices,
    config: &ClobConfig,
    oracle_price: Decimal,
    liquidated: &SubaccountId,
    counterparty: &SubaccountId,
    perpetual_id: u32,
    step: i128,
) -> ClobResult<i128> {
    let liquidated_account = ledger.subaccount(liquidated);
    let current = liquidated_account.position(perpetual_id);
    let net_collateral =
        CollateralizationGate::new(&*ledger, oracle, config).net_collateral(&liquidated_account)?;

    // Bankruptcy price: -step * oracle - NC * |step| / |position|
    let notional = decimal::checked_mul(decimal::to_decimal(-step)?, oracle_price)?;
    let share = decimal::checked_div(
        decimal::checked_mul(net_collateral, decimal::to_decimal(step.abs())?)?,
        decimal::to_decimal(current.abs())?,
    )?;
    let quote = decimal::truncate_to_i128(notional - share)?;

    ledger.apply_updates(&[
        SubaccountUpdate::new(liquidated.clone())
            .with_quote_delta(quote)
            .with_perpetual_delta(perpetual_id, step),
        SubaccountUpdate::new(counterparty.clone())
            .with_quote_delta(-quote)
            .with_perpetual_delta(perpetual_id, -step),
    ])?;

    tracing::debug!(
        liquidated = %liquidated,
        counterparty = %counterparty,
        size = step,
        quote,
        "deleveraged"
    );
    Ok(quote)
}

impl MatchingEngine {
    /// Offset `delta_total` of a liquidated subaccount's perpetual position.
    ///
    /// The book leg trades as an immediate-or-cancel, reduce-only taker
    /// bounded by the oracle price ± the liquidation spread. Whatever is left
    /// is offset against subaccounts holding the opposing position, largest
    /// first, at the liquidated subaccount's bankruptcy price.
    pub fn offset_subaccount_perpetual_position<L: PositionLedger + ?Sized>(
        &mut self,
        ctx: &BlockContext,
        ledger: &mut L,
        oracle: &dyn OraclePrices,
        liquidated: &SubaccountId,
        perpetual_id: u32,
        delta_total: i128,
    ) -> ClobResult<OffsetResult> {
        if ctx.is_replay() {
            return Err(ClobError::NotAllowedDuringReplay);
        }

        let config = self.shared_config();
        let clob_pair = config
            .clob_pair_for_perpetual(perpetual_id)
            .cloned()
            .ok_or(ClobError::PerpetualNotFound(perpetual_id))?;

        let position = ledger.subaccount(liquidated).position(perpetual_id);
        if delta_total == 0
            || position == 0
            || delta_total.signum() == position.signum()
            || delta_total.unsigned_abs() > position.unsigned_abs()
        {
            return Err(ClobError::InvalidOffsetDelta {
                delta: delta_total,
                position,
            });
        }

        let oracle_price = oracle
            .oracle_price(perpetual_id)
            .ok_or(ClobError::OraclePriceNotFound(perpetual_id))?;
        let side = if delta_total > 0 { Side::Buy } else { Side::Sell };

        // Book leg
        let taker = Taker {
            subaccount_id: liquidated,
            order_id: None,
            side,
            subticks: liquidation_price_bound(
                oracle_price,
                clob_pair.quantum_conversion_exponent,
                config.max_liquidation_spread_ppm,
                side,
            )?,
            remaining: BaseQuantums::from_abs(delta_total)?,
            reduce_only: true,
            fee_ppm: 0,
            check_collateral: false,
            prunable_block_height: None,
        };
        let outcome = {
            let (book, fill_amounts) = self.book_and_fills_mut(clob_pair.id)?;
            PriceTimePriority::new(&config, &clob_pair, &mut *ledger, oracle)
                .match_order(book, fill_amounts, &taker)?
        };
        self.cleanup_makers(&outcome.removed_makers, &outcome.exhausted_makers);

        let mut remaining = delta_total - outcome.filled.signed(side.is_buy());

        // Deleveraging leg
        let mut candidates: Vec<(SubaccountId, i128)> = ledger
            .subaccounts_with_perpetual_position(perpetual_id)
            .into_iter()
            .filter(|id| id != liquidated)
            .map(|id| {
                let size = ledger.subaccount(&id).position(perpetual_id);
                (id, size)
            })
            .filter(|(_, size)| size.signum() == delta_total.signum())
            .collect();
        candidates.sort_by(|(a_id, a_size), (b_id, b_size)| {
            b_size
                .unsigned_abs()
                .cmp(&a_size.unsigned_abs())
                .then_with(|| a_id.cmp(b_id))
        });

        let mut deleveraging_fills = Vec::new();
        for (counterparty, size) in candidates {
            if remaining == 0 {
                break;
            }
            let amount = remaining.unsigned_abs().min(size.unsigned_abs());
            let step = i128::try_from(amount).map_err(|_| NumericError::Overflow)? * remaining.signum();

            settle_deleveraging(
                ledger,
                oracle,
                &config,
                oracle_price,
                liquidated,
                &counterparty,
                perpetual_id,
                step,
            )?;
            deleveraging_fills.push(DeleveragingFill {
                offsetting_subaccount_id: counterparty,
                fill_amount: BaseQuantums::from_abs(step)?,
            });
            remaining -= step;
        }

        if remaining != 0 {
            tracing::warn!(
                liquidated = %liquidated,
                perpetual_id,
                remaining,
                "position not fully offset"
            );
        }

        let result = OffsetResult {
            liquidated: liquidated.clone(),
            clob_pair_id: clob_pair.id,
            perpetual_id,
            delta_total,
            book_fills: outcome.fills,
            deleveraging_fills,
            delta_quantums_remaining: remaining,
            offchain_updates: outcome.offchain_updates,
        };
        self.publish(ctx, &result.offchain_updates);
        Ok(result)
    }

    /// Apply one proposed liquidation or deleveraging match exactly as
    /// claimed.
    ///
    /// Every claimed fill is checked against current state before it is
    /// applied; the first one that could not have happened fails the whole
    /// match. Fills already applied by then are left in place, so callers
    /// run this on scratch state.
    pub fn process_single_match<L: PositionLedger + ?Sized>(
        &mut self,
        ctx: &BlockContext,
        ledger: &mut L,
        oracle: &dyn OraclePrices,
        clob_match: &ClobMatch,
    ) -> ClobResult<OffchainUpdates> {
        let config = self.shared_config();
        let updates = match clob_match {
            ClobMatch::MatchOrders { taker_order_id, .. } => {
                return Err(ClobError::InvalidMatch(format!(
                    "order match for {taker_order_id} replays through its placement"
                )))
            },
            ClobMatch::MatchPerpetualLiquidation {
                liquidated,
                clob_pair_id,
                perpetual_id,
                total_size,
                is_buy,
                fills,
            } => {
                let clob_pair = config
                    .clob_pair(*clob_pair_id)
                    .cloned()
                    .ok_or(ClobError::ClobPairNotFound(*clob_pair_id))?;
                if clob_pair.perpetual_id != *perpetual_id {
                    return Err(ClobError::InvalidMatch(format!(
                        "perpetual {perpetual_id} is not traded on clob pair {clob_pair_id}"
                    )));
                }
                if !CollateralizationGate::new(&*ledger, oracle, &config).is_liquidatable(liquidated)? {
                    return Err(ClobError::InvalidMatch(format!(
                        "subaccount {liquidated} is not liquidatable"
                    )));
                }

                let side = if *is_buy { Side::Buy } else { Side::Sell };
                let position = ledger.subaccount(liquidated).position(*perpetual_id);
                if *total_size > reducible_quantums(position, side) {
                    return Err(ClobError::InvalidMatch(format!(
                        "liquidation of {total_size} exceeds the position of {liquidated}"
                    )));
                }
                let oracle_price = oracle
                    .oracle_price(*perpetual_id)
                    .ok_or(ClobError::OraclePriceNotFound(*perpetual_id))?;

                let taker = Taker {
                    subaccount_id: liquidated,
                    order_id: None,
                    side,
                    subticks: liquidation_price_bound(
                        oracle_price,
                        clob_pair.quantum_conversion_exponent,
                        config.max_liquidation_spread_ppm,
                        side,
                    )?,
                    remaining: *total_size,
                    reduce_only: true,
                    fee_ppm: 0,
                    check_collateral: false,
                    prunable_block_height: None,
                };
                let outcome = {
                    let (book, fill_amounts) = self.book_and_fills_mut(clob_pair.id)?;
                    PriceTimePriority::new(&config, &clob_pair, &mut *ledger, oracle)
                        .match_claimed(book, fill_amounts, &taker, fills)?
                };
                self.cleanup_makers(&outcome.removed_makers, &outcome.exhausted_makers);
                outcome.offchain_updates
            },
            ClobMatch::MatchPerpetualDeleveraging {
                liquidated,
                perpetual_id,
                fills,
            } => {
                let oracle_price = oracle
                    .oracle_price(*perpetual_id)
                    .ok_or(ClobError::OraclePriceNotFound(*perpetual_id))?;

                for fill in fills {
                    let counterparty = &fill.offsetting_subaccount_id;
                    let amount = i128::from(fill.fill_amount.value());
                    let position = ledger.subaccount(liquidated).position(*perpetual_id);
                    if position == 0 || amount > position.abs() {
                        return Err(ClobError::InvalidMatch(format!(
                            "deleveraging of {} exceeds the position of {liquidated}",
                            fill.fill_amount
                        )));
                    }
                    let step = -position.signum() * amount;

                    let offsetting = ledger.subaccount(counterparty).position(*perpetual_id);
                    if counterparty == liquidated
                        || offsetting.signum() != step.signum()
                        || offsetting.abs() < amount
                    {
                        return Err(ClobError::InvalidMatch(format!(
                            "subaccount {counterparty} cannot offset {} of {liquidated}",
                            fill.fill_amount
                        )));
                    }

                    settle_deleveraging(
                        ledger,
                        oracle,
                        &config,
                        oracle_price,
                        liquidated,
                        counterparty,
                        *perpetual_id,
                        step,
                    )?;
                }
                OffchainUpdates::default()
            },
        };

        self.publish(ctx, &updates);
        Ok(updates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::*;
    use crate::interfaces::PositionReader;

    #[test]
    fn test_price_bound_rounds_for_taker() {
        let price = Decimal::from(100);
        assert_eq!(
            liquidation_price_bound(price, 0, 10_000, Side::Sell).unwrap(),
            Subticks::new(99)
        );
        assert_eq!(
            liquidation_price_bound(price, 0, 15_000, Side::Buy).unwrap(),
            Subticks::new(101)
        );
        assert_eq!(
            liquidation_price_bound(price, 0, 15_000, Side::Sell).unwrap(),
            Subticks::new(99)
        );
        assert_eq!(
            liquidation_price_bound(price, -2, 0, Side::Buy).unwrap(),
            Subticks::new(10_000)
        );
    }

    #[test]
    fn test_book_then_deleveraging() {
        let mut engine = engine();
        let mut ledger = funded_ledger(&["bidder", "short_a", "short_b"]);
        ledger.set_position(&sub("whale"), 0, 10);
        ledger.deposit(&sub("whale"), -980);
        ledger.set_position(&sub("short_a"), 0, -3);
        ledger.set_position(&sub("short_b"), 0, -5);
        let oracle = oracle(100);

        engine
            .place_order(&ctx(1), &mut ledger, &oracle, limit("bidder", 1, Side::Buy, 99, 4))
            .unwrap();

        let result = engine
            .offset_subaccount_perpetual_position(&ctx(1), &mut ledger, &oracle, &sub("whale"), 0, -10)
            .unwrap();

        assert_eq!(result.book_fills.len(), 1);
        assert_eq!(result.book_fills[0].fill_amount, BaseQuantums::new(4));
        assert_eq!(
            result.deleveraging_fills,
            vec![
                DeleveragingFill {
                    offsetting_subaccount_id: sub("short_b"),
                    fill_amount: BaseQuantums::new(5),
                },
                DeleveragingFill {
                    offsetting_subaccount_id: sub("short_a"),
                    fill_amount: BaseQuantums::new(1),
                },
            ]
        );
        assert_eq!(result.delta_quantums_remaining, 0);

        let whale = ledger.subaccount(&sub("whale"));
        assert_eq!(whale.position(0), 0);
        assert_eq!(whale.quote_balance, 0);
        assert_eq!(ledger.subaccount(&sub("short_a")).position(0), -2);
        assert_eq!(ledger.subaccount(&sub("short_b")).position(0), 0);
        assert_eq!(result.clob_matches().len(), 2);
    }

    #[test]
    fn test_deleveraging_tie_break_by_subaccount_id() {
        let mut engine = engine();
        let mut ledger = funded_ledger(&["b_short", "a_short"]);
        ledger.set_position(&sub("whale"), 0, 5);
        ledger.set_position(&sub("b_short"), 0, -5);
        ledger.set_position(&sub("a_short"), 0, -5);
        let oracle = oracle(100);

        let result = engine
            .offset_subaccount_perpetual_position(&ctx(1), &mut ledger, &oracle, &sub("whale"), 0, -5)
            .unwrap();

        assert_eq!(result.deleveraging_fills.len(), 1);
        assert_eq!(result.deleveraging_fills[0].offsetting_subaccount_id, sub("a_short"));
        assert_eq!(ledger.subaccount(&sub("b_short")).position(0), -5);
    }

    #[test]
    fn test_unabsorbed_remainder_reported() {
        let mut engine = engine();
        let mut ledger = funded_ledger(&[]);
        ledger.set_position(&sub("whale"), 0, 5);
        let oracle = oracle(100);

        let result = engine
            .offset_subaccount_perpetual_position(&ctx(1), &mut ledger, &oracle, &sub("whale"), 0, -5)
            .unwrap();
        assert_eq!(result.delta_quantums_remaining, -5);
        assert!(result.clob_matches().is_empty());
    }

    #[test]
    fn test_invalid_delta_rejected() {
        let mut engine = engine();
        let mut ledger = funded_ledger(&[]);
        ledger.set_position(&sub("whale"), 0, 5);
        let oracle = oracle(100);

        for delta in [0, 3, -6] {
            assert_eq!(
                engine.offset_subaccount_perpetual_position(
                    &ctx(1),
                    &mut ledger,
                    &oracle,
                    &sub("whale"),
                    0,
                    delta
                ),
                Err(ClobError::InvalidOffsetDelta { delta, position: 5 })
            );
        }
    }

    #[test]
    fn test_refused_during_replay() {
        let mut engine = engine();
        let mut ledger = funded_ledger(&[]);
        ledger.set_position(&sub("whale"), 0, 5);

        assert_eq!(
            engine.offset_subaccount_perpetual_position(
                &ctx(1).as_replay(),
                &mut ledger,
                &oracle(100),
                &sub("whale"),
                0,
                -5
            ),
            Err(ClobError::NotAllowedDuringReplay)
        );
    }
}
