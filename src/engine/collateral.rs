// ============================================================================
// Collateralization Gate
// Pure margin checks over projected subaccount state
// ============================================================================

use crate::domain::{
    ClobConfig, ClobPairId, PendingOpenOrder, Subaccount, SubaccountId, SubaccountUpdate,
    UpdateResult,
};
use crate::error::{ClobError, ClobResult};
use crate::interfaces::{OraclePrices, PositionReader};
use crate::numeric::{decimal, quote_quantums};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Which margin fraction a requirement is computed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginKind {
    Initial,
    Maintenance,
}

/// Net collateral and margin requirement of one subaccount
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarginSummary {
    pub net_collateral: Decimal,
    pub requirement: Decimal,
}

impl MarginSummary {
    pub fn is_collateralized(&self) -> bool {
        self.net_collateral >= self.requirement
    }
}

/// Read-only view answering "would this leave the subaccount under-margined?"
///
/// Holds no state of its own; every answer is a function of the ledger and
/// oracle prices it borrows.
pub struct CollateralizationGate<'a, R: PositionReader + ?Sized> {
    ledger: &'a R,
    oracle: &'a dyn OraclePrices,
    config: &'a ClobConfig,
}

impl<'a, R: PositionReader + ?Sized> CollateralizationGate<'a, R> {
    pub fn new(ledger: &'a R, oracle: &'a dyn OraclePrices, config: &'a ClobConfig) -> Self {
        Self {
            ledger,
            oracle,
            config,
        }
    }

    fn oracle_price(&self, perpetual_id: u32) -> ClobResult<Decimal> {
        self.oracle
            .oracle_price(perpetual_id)
            .ok_or(ClobError::OraclePriceNotFound(perpetual_id))
    }

    /// Quote balance plus the oracle value of every perpetual position.
    pub fn net_collateral(&self, subaccount: &Subaccount) -> ClobResult<Decimal> {
        let mut total = decimal::to_decimal(subaccount.quote_balance)?;
        for (&perpetual_id, &size) in &subaccount.perpetual_positions {
            let value = decimal::checked_mul(
                decimal::to_decimal(size)?,
                self.oracle_price(perpetual_id)?,
            )?;
            total = decimal::checked_add(total, value)?;
        }
        Ok(total)
    }

    pub fn margin_summary(&self, subaccount: &Subaccount, kind: MarginKind) -> ClobResult<MarginSummary> {
        let mut requirement = Decimal::ZERO;
        for (&perpetual_id, &size) in &subaccount.perpetual_positions {
            let params = self
                .config
                .perpetual(perpetual_id)
                .ok_or(ClobError::PerpetualNotFound(perpetual_id))?;
            let fraction = match kind {
                MarginKind::Initial => params.initial_margin_ppm,
                MarginKind::Maintenance => params.maintenance_margin_ppm,
            };
            let notional = decimal::checked_mul(
                decimal::to_decimal(size.abs())?,
                self.oracle_price(perpetual_id)?,
            )?;
            requirement = decimal::checked_add(requirement, decimal::decimal_ppm(notional, fraction)?)?;
        }

        Ok(MarginSummary {
            net_collateral: self.net_collateral(subaccount)?,
            requirement,
        })
    }

    /// Check a hypothetical update against initial margin.
    pub fn check_collateralization(&self, update: &SubaccountUpdate) -> ClobResult<UpdateResult> {
        let before = self.ledger.subaccount(&update.subaccount_id);
        let mut after = before.clone();
        after.apply(update)?;

        if self.margin_summary(&after, MarginKind::Initial)?.is_collateralized() {
            return Ok(UpdateResult::Success);
        }
        if self.margin_summary(&before, MarginKind::Initial)?.is_collateralized() {
            Ok(UpdateResult::NewlyUndercollateralized)
        } else {
            Ok(UpdateResult::StillUndercollateralized)
        }
    }

    /// Check that each subaccount could carry its pending orders if they
    /// filled completely at their limit prices.
    ///
    /// Returns whether every subaccount passed, and the result per subaccount.
    pub fn add_order_to_orderbook_collat_check(
        &self,
        clob_pair_id: ClobPairId,
        pending: &BTreeMap<SubaccountId, Vec<PendingOpenOrder>>,
    ) -> ClobResult<(bool, BTreeMap<SubaccountId, UpdateResult>)> {
        let clob_pair = self
            .config
            .clob_pair(clob_pair_id)
            .ok_or(ClobError::ClobPairNotFound(clob_pair_id))?;

        let mut all_success = true;
        let mut results = BTreeMap::new();
        for (subaccount_id, orders) in pending {
            let mut update = SubaccountUpdate::new(subaccount_id.clone());
            for order in orders {
                debug_assert_eq!(order.clob_pair_id, clob_pair_id);
                let base = order.remaining_quantums.signed(order.is_buy);
                let quote = quote_quantums(
                    order.remaining_quantums,
                    order.subticks,
                    clob_pair.quantum_conversion_exponent,
                )?;
                update.add_perpetual_delta(clob_pair.perpetual_id, base);
                update.quote_delta += if order.is_buy { -quote } else { quote };
            }

            let result = self.check_collateralization(&update)?;
            all_success &= result.is_success();
            results.insert(subaccount_id.clone(), result);
        }

        Ok((all_success, results))
    }

    /// True if the subaccount's net collateral is below its maintenance requirement.
    pub fn is_liquidatable(&self, subaccount_id: &SubaccountId) -> ClobResult<bool> {
        let subaccount = self.ledger.subaccount(subaccount_id);
        if subaccount.perpetual_positions.is_empty() {
            return Ok(false);
        }
        Ok(!self
            .margin_summary(&subaccount, MarginKind::Maintenance)?
            .is_collateralized())
    }
}
