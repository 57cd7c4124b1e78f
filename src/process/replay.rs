// ============================================================================
// Proposal Replay
// Re-executes proposed operations against scratch state
// ============================================================================

use super::errors::ProposalError;
use super::txs::{Msg, Operation, ProposalTxs};
use crate::domain::{BlockContext, ClobMatch, MakerFill, OrderId};
use crate::engine::MatchingEngine;
use crate::interfaces::{OraclePrices, PositionLedger, TelemetrySink};

pub(crate) const OTHER_TX_REPLAY_FAILED: &str = "process_proposal.replay.other_tx_failed";

/// Counts of what a replay touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub placements: usize,
    pub matches: usize,
    pub liquidation_matches: usize,
    pub preexisting_stateful_orders: usize,
    pub other_msgs: usize,
    pub other_msg_failures: usize,
}

/// Replay a proposal on `engine` and `ledger`, which must be scratch state.
///
/// Each short-term placement is re-run and the match that follows it must
/// list exactly the fills the replay produced. Liquidation and deleveraging
/// matches are applied as claimed, so later placements see their effect.
pub fn replay_proposal<L: PositionLedger + ?Sized>(
    ctx: &BlockContext,
    engine: &mut MatchingEngine,
    ledger: &mut L,
    oracle: &dyn OraclePrices,
    txs: &ProposalTxs,
    telemetry: &dyn TelemetrySink,
) -> Result<ReplaySummary, ProposalError> {
    let ctx = ctx.as_replay();
    let mut summary = ReplaySummary::default();
    let mut unclaimed: Option<(OrderId, Vec<MakerFill>)> = None;

    for operation in &txs.proposed_operations {
        match operation {
            Operation::PlaceShortTermOrder(order) => {
                if let Some((taker, _)) = unclaimed.take() {
                    return Err(ProposalError::ReplayMismatch(format!(
                        "fills of {taker} are not claimed by a match"
                    )));
                }
                let result = engine.replay_place_order(&ctx, ledger, oracle, order.clone())?;
                if !result.fills.is_empty() {
                    unclaimed = Some((order.order_id.clone(), result.fills));
                }
                summary.placements += 1;
            },
            Operation::Match(ClobMatch::MatchOrders {
                taker_order_id,
                fills,
            }) => {
                match unclaimed.take() {
                    Some((taker, replayed)) if &taker == taker_order_id && &replayed == fills => {},
                    Some((taker, replayed)) => {
                        return Err(ProposalError::ReplayMismatch(format!(
                            "match for {taker_order_id} claims {fills:?}, replay of {taker} produced {replayed:?}"
                        )))
                    },
                    None => {
                        return Err(ProposalError::ReplayMismatch(format!(
                            "match for {taker_order_id} does not follow a placement that filled"
                        )))
                    },
                }
                summary.matches += 1;
            },
            Operation::Match(clob_match) => {
                if let Some((taker, _)) = unclaimed.take() {
                    return Err(ProposalError::ReplayMismatch(format!(
                        "fills of {taker} are not claimed by a match"
                    )));
                }
                engine.process_single_match(&ctx, ledger, oracle, clob_match)?;
                summary.liquidation_matches += 1;
            },
            Operation::PreexistingStatefulOrder(order_id) => {
                if engine
                    .stateful_orders()
                    .get_long_term_order_placement(order_id)
                    .is_none()
                {
                    return Err(ProposalError::ReplayMismatch(format!(
                        "stateful order {order_id} does not exist in state"
                    )));
                }
                summary.preexisting_stateful_orders += 1;
            },
        }
    }
    if let Some((taker, _)) = unclaimed {
        return Err(ProposalError::ReplayMismatch(format!(
            "fills of {taker} are not claimed by a match"
        )));
    }

    for (offset, tx) in txs.other_txs.iter().enumerate() {
        for msg in &tx.msgs {
            let outcome = match msg {
                Msg::PlaceOrder { order } => engine
                    .replay_place_order(&ctx, ledger, oracle, order.clone())
                    .map(|_| ()),
                Msg::CancelOrder { order_id, .. } => {
                    engine.cancel_stateful_order(&ctx, order_id).map(|_| ())
                },
                Msg::ProposedOperations { .. } | Msg::UpdateMarketPrices { .. } => Ok(()),
            };
            summary.other_msgs += 1;
            if let Err(err) = outcome {
                // A failing user tx is excluded at delivery; the block stays valid.
                summary.other_msg_failures += 1;
                telemetry.incr_counter(OTHER_TX_REPLAY_FAILED, 1);
                tracing::warn!(tx = offset + 1, error = %err, "other tx failed during replay");
            }
        }
    }

    Ok(summary)
}
