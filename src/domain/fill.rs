// ============================================================================
// Fill and Match Domain Model
// ============================================================================

use super::{ClobPairId, OrderId, SubaccountId};
use crate::numeric::{BaseQuantums, Subticks};
use std::collections::BTreeSet;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// One maker leg of a match.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MakerFill {
    pub maker_order_id: OrderId,
    pub fill_amount: BaseQuantums,
}

/// One counterparty leg of a deleveraging match.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DeleveragingFill {
    pub offsetting_subaccount_id: SubaccountId,
    pub fill_amount: BaseQuantums,
}

/// A match as carried in a proposed block. Settles atomically.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ClobMatch {
    /// A taker order matched against one or more resting makers
    MatchOrders {
        taker_order_id: OrderId,
        fills: Vec<MakerFill>,
    },
    /// A liquidation taker matched against resting makers
    MatchPerpetualLiquidation {
        liquidated: SubaccountId,
        clob_pair_id: ClobPairId,
        perpetual_id: u32,
        total_size: BaseQuantums,
        is_buy: bool,
        fills: Vec<MakerFill>,
    },
    /// A liquidated position offset directly against other subaccounts
    MatchPerpetualDeleveraging {
        liquidated: SubaccountId,
        perpetual_id: u32,
        fills: Vec<DeleveragingFill>,
    },
}

impl ClobMatch {
    /// Stateless validity: non-empty, positive fills, no duplicate or self counterparties.
    pub fn validate_basic(&self) -> Result<(), String> {
        match self {
            ClobMatch::MatchOrders {
                taker_order_id,
                fills,
            } => {
                if fills.is_empty() {
                    return Err("match must contain at least one fill".into());
                }
                let mut seen = BTreeSet::new();
                for fill in fills {
                    if fill.fill_amount.is_zero() {
                        return Err(format!("fill for {} has zero amount", fill.maker_order_id));
                    }
                    if &fill.maker_order_id == taker_order_id {
                        return Err(format!("taker {} matched against itself", taker_order_id));
                    }
                    if fill.maker_order_id.clob_pair_id != taker_order_id.clob_pair_id {
                        return Err(format!(
                            "maker {} is on a different clob pair than taker {}",
                            fill.maker_order_id, taker_order_id
                        ));
                    }
                    if !seen.insert(&fill.maker_order_id) {
                        return Err(format!("duplicate maker {}", fill.maker_order_id));
                    }
                }
                Ok(())
            },
            ClobMatch::MatchPerpetualLiquidation {
                liquidated,
                clob_pair_id,
                total_size,
                fills,
                ..
            } => {
                if fills.is_empty() {
                    return Err("liquidation must contain at least one fill".into());
                }
                let mut seen = BTreeSet::new();
                let mut filled: u64 = 0;
                for fill in fills {
                    if fill.fill_amount.is_zero() {
                        return Err(format!("fill for {} has zero amount", fill.maker_order_id));
                    }
                    if &fill.maker_order_id.subaccount_id == liquidated {
                        return Err(format!("{} liquidated against itself", liquidated));
                    }
                    if fill.maker_order_id.clob_pair_id != *clob_pair_id {
                        return Err(format!(
                            "maker {} is not on clob pair {}",
                            fill.maker_order_id, clob_pair_id
                        ));
                    }
                    if !seen.insert(&fill.maker_order_id) {
                        return Err(format!("duplicate maker {}", fill.maker_order_id));
                    }
                    filled = filled.saturating_add(fill.fill_amount.value());
                }
                if filled > total_size.value() {
                    return Err(format!(
                        "liquidation fills {} exceed total size {}",
                        filled, total_size
                    ));
                }
                Ok(())
            },
            ClobMatch::MatchPerpetualDeleveraging {
                liquidated, fills, ..
            } => {
                if fills.is_empty() {
                    return Err("deleveraging must contain at least one fill".into());
                }
                let mut seen = BTreeSet::new();
                for fill in fills {
                    if fill.fill_amount.is_zero() {
                        return Err("deleveraging fill has zero amount".into());
                    }
                    if &fill.offsetting_subaccount_id == liquidated {
                        return Err(format!("{} deleveraged against itself", liquidated));
                    }
                    if !seen.insert(&fill.offsetting_subaccount_id) {
                        return Err(format!(
                            "duplicate offsetting subaccount {}",
                            fill.offsetting_subaccount_id
                        ));
                    }
                }
                Ok(())
            },
        }
    }
}

/// Prospective reservation of size used by the collateralization gate
/// before an order is allowed to rest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingOpenOrder {
    pub remaining_quantums: BaseQuantums,
    pub is_buy: bool,
    pub subticks: Subticks,
    pub clob_pair_id: ClobPairId,
}

/// Cumulative fill record for one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderFillAmount {
    pub fill_amount: BaseQuantums,
    /// Height from which a short-term record may be pruned; `None` for
    /// stateful orders, which are pruned by their own expiration
    pub prunable_block_height: Option<u32>,
}
