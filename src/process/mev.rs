// ============================================================================
// MEV Metrics
// Per-clob-pair exposure of the proposer's operations, telemetry only
// ============================================================================

use super::txs::Operation;
use crate::domain::{ClobConfig, ClobMatch, ClobPairId};
use crate::interfaces::TelemetrySink;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PairActivity {
    pub placements: u64,
    pub order_matches: u64,
    pub liquidation_matches: u64,
    pub deleveraging_matches: u64,
    /// Base quantums moved by all matches
    pub matched_quantums: u128,
}

/// What the proposer chose to include, grouped by clob pair.
///
/// Recorded only for proposals that passed replay. Replay accepts a match
/// only when its fills equal the replayed fills exactly, so for a recorded
/// proposal the claimed and replayed fills are the same and there is no
/// difference to report. What remains visible is the proposer's choice of
/// which orders and liquidations to include, which these counts describe.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MevMetrics {
    pub pairs: BTreeMap<ClobPairId, PairActivity>,
}

impl MevMetrics {
    pub fn from_operations(config: &ClobConfig, operations: &[Operation]) -> Self {
        let mut metrics = Self::default();
        for operation in operations {
            match operation {
                Operation::PlaceShortTermOrder(order) => {
                    metrics.pair(order.order_id.clob_pair_id).placements += 1;
                },
                Operation::Match(clob_match) => {
                    let clob_pair_id = match clob_match {
                        ClobMatch::MatchOrders { taker_order_id, .. } => Some(taker_order_id.clob_pair_id),
                        ClobMatch::MatchPerpetualLiquidation { clob_pair_id, .. } => Some(*clob_pair_id),
                        ClobMatch::MatchPerpetualDeleveraging { perpetual_id, .. } => config
                            .clob_pair_for_perpetual(*perpetual_id)
                            .map(|pair| pair.id),
                    };
                    let Some(clob_pair_id) = clob_pair_id else {
                        continue;
                    };
                    let activity = metrics.pair(clob_pair_id);
                    match clob_match {
                        ClobMatch::MatchOrders { fills, .. }
                        | ClobMatch::MatchPerpetualLiquidation { fills, .. } => {
                            activity.matched_quantums += fills
                                .iter()
                                .map(|fill| u128::from(fill.fill_amount.value()))
                                .sum::<u128>();
                        },
                        ClobMatch::MatchPerpetualDeleveraging { fills, .. } => {
                            activity.matched_quantums += fills
                                .iter()
                                .map(|fill| u128::from(fill.fill_amount.value()))
                                .sum::<u128>();
                        },
                    }
                    match clob_match {
                        ClobMatch::MatchOrders { .. } => activity.order_matches += 1,
                        ClobMatch::MatchPerpetualLiquidation { .. } => activity.liquidation_matches += 1,
                        ClobMatch::MatchPerpetualDeleveraging { .. } => activity.deleveraging_matches += 1,
                    }
                },
                Operation::PreexistingStatefulOrder(_) => {},
            }
        }
        metrics
    }

    fn pair(&mut self, clob_pair_id: ClobPairId) -> &mut PairActivity {
        self.pairs.entry(clob_pair_id).or_default()
    }

    /// Report as gauges. Never fails and never feeds back into validation.
    pub fn record(&self, telemetry: &dyn TelemetrySink) {
        for (clob_pair_id, activity) in &self.pairs {
            let key = |metric: &str| format!("process_proposal.mev.clob_pair.{clob_pair_id}.{metric}");
            telemetry.set_gauge(&key("placements"), i128::from(activity.placements));
            telemetry.set_gauge(&key("order_matches"), i128::from(activity.order_matches));
            telemetry.set_gauge(&key("liquidation_matches"), i128::from(activity.liquidation_matches));
            telemetry.set_gauge(&key("deleveraging_matches"), i128::from(activity.deleveraging_matches));
            telemetry.set_gauge(
                &key("matched_quantums"),
                i128::try_from(activity.matched_quantums).unwrap_or(i128::MAX),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DeleveragingFill, MakerFill, OrderFlags, OrderId, SubaccountId};
    use crate::interfaces::{ChannelTelemetry, TelemetryEvent};
    use crate::numeric::BaseQuantums;

    fn order_id(owner: &str, clob_pair: u32) -> OrderId {
        OrderId::new(
            SubaccountId::new(owner, 0),
            1,
            OrderFlags::ShortTerm,
            ClobPairId(clob_pair),
        )
    }

    #[test]
    fn test_activity_grouped_by_pair() {
        let config = ClobConfig::two_markets();
        let operations = vec![
            Operation::Match(ClobMatch::MatchOrders {
                taker_order_id: order_id("taker", 0),
                fills: vec![
                    MakerFill {
                        maker_order_id: order_id("a", 0),
                        fill_amount: BaseQuantums::new(10),
                    },
                    MakerFill {
                        maker_order_id: order_id("b", 0),
                        fill_amount: BaseQuantums::new(20),
                    },
                ],
            }),
            Operation::Match(ClobMatch::MatchPerpetualDeleveraging {
                liquidated: SubaccountId::new("whale", 0),
                perpetual_id: 1,
                fills: vec![DeleveragingFill {
                    offsetting_subaccount_id: SubaccountId::new("c", 0),
                    fill_amount: BaseQuantums::new(7),
                }],
            }),
        ];

        let metrics = MevMetrics::from_operations(&config, &operations);
        assert_eq!(metrics.pairs[&ClobPairId(0)].matched_quantums, 30);
        assert_eq!(metrics.pairs[&ClobPairId(0)].order_matches, 1);
        assert_eq!(metrics.pairs[&ClobPairId(1)].deleveraging_matches, 1);
        assert_eq!(metrics.pairs[&ClobPairId(1)].matched_quantums, 7);

        let (telemetry, events) = ChannelTelemetry::bounded(64);
        metrics.record(&telemetry);
        let gauges: Vec<TelemetryEvent> = events.try_iter().collect();
        assert_eq!(gauges.len(), 10);
    }
}
