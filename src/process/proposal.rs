// ============================================================================
// Proposal Handler
// Accept/reject verdict for a proposed block
// ============================================================================

use super::errors::ProposalError;
use super::mev::MevMetrics;
use super::prices::validate_market_prices;
use super::replay::replay_proposal;
use super::round::RoundTracker;
use super::txs::{ProposalTxs, Tx, TxDecoder};
use crate::domain::{BlockContext, ConfigError, ProposalConfig};
use crate::engine::MatchingEngine;
use crate::interfaces::{
    IndexPriceFeed, NoOpTelemetry, OraclePrices, PositionReader, SmoothedPriceUpdater, TelemetrySink,
};
use crate::ledger::LedgerOverlay;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;

const LATENCY: &str = "process_proposal.latency";
const SUCCESS: &str = "process_proposal.success";
const NUM_TXS: &str = "process_proposal.num_txs";
const UPDATE_SMOOTHED_PRICES_ERROR: &str = "process_proposal.update_smoothed_prices.error";

/// A block offered for validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalRequest {
    pub height: u32,
    pub block_time: DateTime<Utc>,
    pub txs: Vec<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProposalStatus {
    Accept,
    Reject,
}

/// Verdict plus an operator-facing diagnostic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalResponse {
    pub status: ProposalStatus,
    pub diagnostic: Option<String>,
}

impl ProposalResponse {
    pub fn accept() -> Self {
        Self {
            status: ProposalStatus::Accept,
            diagnostic: None,
        }
    }

    pub fn reject(error: &ProposalError) -> Self {
        Self {
            status: ProposalStatus::Reject,
            diagnostic: Some(error.to_string()),
        }
    }

    pub fn is_accepted(&self) -> bool {
        self.status == ProposalStatus::Accept
    }
}

/// Validates proposed blocks.
///
/// The handler owns the round counter; everything else it reads is borrowed
/// per call. Replay runs on `engine.scratch()` over a [`LedgerOverlay`], so a
/// verdict never changes authoritative state.
pub struct ProposalHandler<D: TxDecoder> {
    decoder: D,
    config: ProposalConfig,
    index_prices: Arc<dyn IndexPriceFeed>,
    smoothed_prices: Arc<dyn SmoothedPriceUpdater>,
    telemetry: Arc<dyn TelemetrySink>,
    rounds: RoundTracker,
}

impl<D: TxDecoder> ProposalHandler<D> {
    pub fn new(
        decoder: D,
        config: ProposalConfig,
        index_prices: Arc<dyn IndexPriceFeed>,
        smoothed_prices: Arc<dyn SmoothedPriceUpdater>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            decoder,
            config,
            index_prices,
            smoothed_prices,
            telemetry: Arc::new(NoOpTelemetry),
            rounds: RoundTracker::new(),
        })
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn rounds(&self) -> &RoundTracker {
        &self.rounds
    }

    pub fn process_proposal<L: PositionReader + ?Sized>(
        &mut self,
        request: &ProposalRequest,
        engine: &MatchingEngine,
        ledger: &L,
        oracle: &dyn OraclePrices,
    ) -> ProposalResponse {
        let started = Instant::now();
        let round = self.rounds.advance(request.height);
        let ctx = BlockContext::replay(request.height, request.block_time, round);

        // Runs every round, whatever the verdict.
        if let Err(err) = self.smoothed_prices.update_smoothed_prices(&ctx) {
            self.telemetry.incr_counter(UPDATE_SMOOTHED_PRICES_ERROR, 1);
            tracing::error!(height = ctx.height, round, error = %err, "update smoothed prices failed");
        }

        let response = match self.evaluate(&ctx, request, engine, ledger, oracle) {
            Ok(()) => {
                self.telemetry.incr_counter(SUCCESS, 1);
                self.telemetry
                    .set_gauge(NUM_TXS, i128::try_from(request.txs.len()).unwrap_or(i128::MAX));
                tracing::info!(
                    height = ctx.height,
                    round,
                    num_txs = request.txs.len(),
                    "proposal accepted"
                );
                ProposalResponse::accept()
            },
            Err(err) => {
                self.telemetry
                    .incr_counter(&format!("process_proposal.{}.error", err.stage()), 1);
                tracing::error!(
                    height = ctx.height,
                    round,
                    stage = err.stage(),
                    error = %err,
                    "proposal rejected"
                );
                ProposalResponse::reject(&err)
            },
        };

        self.telemetry.measure_latency(LATENCY, started.elapsed());
        response
    }

    fn evaluate<L: PositionReader + ?Sized>(
        &self,
        ctx: &BlockContext,
        request: &ProposalRequest,
        engine: &MatchingEngine,
        ledger: &L,
        oracle: &dyn OraclePrices,
    ) -> Result<(), ProposalError> {
        let txs = request
            .txs
            .iter()
            .enumerate()
            .map(|(index, bytes)| {
                self.decoder
                    .decode(bytes)
                    .map_err(|source| ProposalError::Decode { index, source })
            })
            .collect::<Result<Vec<Tx>, _>>()?;

        let txs = ProposalTxs::from_txs(txs)?;
        txs.validate()?;

        let mut scratch = engine.scratch();
        let mut overlay = LedgerOverlay::new(ledger);
        let summary = replay_proposal(
            ctx,
            &mut scratch,
            &mut overlay,
            oracle,
            &txs,
            &*self.telemetry,
        )?;
        tracing::debug!(?summary, "proposal replayed");

        validate_market_prices(&txs.price_updates, &*self.index_prices, &self.config)?;

        MevMetrics::from_operations(engine.config(), &txs.proposed_operations)
            .record(&*self.telemetry);
        Ok(())
    }
}

#[cfg(all(test, feature = "serde"))]
mod tests {
    use super::*;
    use crate::domain::{ClobMatch, ClobPairId, MakerFill, Side, TimeInForce};
    use crate::engine::testing::*;
    use crate::interfaces::{ChannelTelemetry, PriceError, TelemetryEvent};
    use crate::numeric::BaseQuantums;
    use crate::prices::IndexPriceCache;
    use crate::process::txs::{JsonTxDecoder, MarketPriceUpdate, Msg, Operation};
    use parking_lot::Mutex;

    /// Records the (height, round) of every smoothed-price update
    #[derive(Default)]
    struct RecordingUpdater {
        calls: Mutex<Vec<(u32, u32)>>,
        fail: bool,
    }

    impl SmoothedPriceUpdater for RecordingUpdater {
        fn update_smoothed_prices(&self, ctx: &BlockContext) -> Result<(), PriceError> {
            self.calls.lock().push((ctx.height, ctx.round));
            if self.fail {
                Err(PriceError::UpdateFailed("feed offline".into()))
            } else {
                Ok(())
            }
        }
    }

    fn encode(msgs: Vec<Msg>) -> Vec<u8> {
        JsonTxDecoder::encode(&Tx::new(msgs)).unwrap()
    }

    fn operations(operations: Vec<Operation>) -> Vec<u8> {
        encode(vec![Msg::ProposedOperations { operations }])
    }

    fn prices(price: u64) -> Vec<u8> {
        encode(vec![Msg::UpdateMarketPrices {
            updates: vec![MarketPriceUpdate { market_id: 0, price }],
        }])
    }

    fn request(height: u32, txs: Vec<Vec<u8>>) -> ProposalRequest {
        ProposalRequest {
            height,
            block_time: ctx(height).block_time,
            txs,
        }
    }

    fn handler(updater: Arc<RecordingUpdater>) -> ProposalHandler<JsonTxDecoder> {
        let config = ProposalConfig::default();
        let cache = IndexPriceCache::from_config(&config);
        cache.update(0, 10_000);
        ProposalHandler::new(JsonTxDecoder, config, Arc::new(cache), updater).unwrap()
    }

    #[test]
    fn test_valid_proposal_accepted() {
        let mut engine = engine();
        let mut ledger = funded_ledger(&["seller", "buyer"]);
        let oracle = oracle(100);
        let ask = limit("seller", 1, Side::Sell, 100, 5);
        engine.place_order(&ctx(1), &mut ledger, &oracle, ask.clone()).unwrap();

        let buy = short_term("buyer", 1, Side::Buy, 100, 2, 5, TimeInForce::ImmediateOrCancel);
        let txs = vec![
            operations(vec![
                Operation::PlaceShortTermOrder(buy.clone()),
                Operation::Match(ClobMatch::MatchOrders {
                    taker_order_id: buy.order_id.clone(),
                    fills: vec![MakerFill {
                        maker_order_id: ask.order_id.clone(),
                        fill_amount: BaseQuantums::new(2),
                    }],
                }),
            ]),
            prices(10_050),
        ];

        let (telemetry, events) = ChannelTelemetry::bounded(64);
        let mut handler = handler(Arc::default()).with_telemetry(Arc::new(telemetry));
        let response = handler.process_proposal(&request(2, txs), &engine, &ledger, &oracle);

        assert!(response.is_accepted(), "{:?}", response.diagnostic);
        assert_eq!(
            engine.orderbook(ClobPairId(0)).unwrap().get(&ask.order_id).unwrap().remaining,
            BaseQuantums::new(5)
        );
        let events: Vec<TelemetryEvent> = events.try_iter().collect();
        assert!(events.iter().any(|event| matches!(
            event,
            TelemetryEvent::Latency { key, .. } if key == LATENCY
        )));
    }

    #[test]
    fn test_mev_gauges_recorded_only_after_replay() {
        let mut engine = engine();
        let mut ledger = funded_ledger(&["seller", "buyer"]);
        let oracle = oracle(100);
        let ask = limit("seller", 1, Side::Sell, 100, 5);
        engine.place_order(&ctx(1), &mut ledger, &oracle, ask.clone()).unwrap();

        let buy = short_term("buyer", 1, Side::Buy, 100, 2, 5, TimeInForce::ImmediateOrCancel);
        let claiming = |quantums| {
            vec![
                operations(vec![
                    Operation::PlaceShortTermOrder(buy.clone()),
                    Operation::Match(ClobMatch::MatchOrders {
                        taker_order_id: buy.order_id.clone(),
                        fills: vec![MakerFill {
                            maker_order_id: ask.order_id.clone(),
                            fill_amount: BaseQuantums::new(quantums),
                        }],
                    }),
                ]),
                prices(10_050),
            ]
        };
        let mev_gauges = |events: Vec<TelemetryEvent>| -> Vec<(String, i128)> {
            events
                .into_iter()
                .filter_map(|event| match event {
                    TelemetryEvent::Gauge { key, value } if key.starts_with("process_proposal.mev") => {
                        Some((key, value))
                    },
                    _ => None,
                })
                .collect()
        };

        // The replay fills 2, a claim of 1 never reaches the metrics.
        let (telemetry, events) = ChannelTelemetry::bounded(64);
        let mut rejecting = handler(Arc::default()).with_telemetry(Arc::new(telemetry));
        let response = rejecting.process_proposal(&request(2, claiming(1)), &engine, &ledger, &oracle);
        assert!(!response.is_accepted());
        assert!(mev_gauges(events.try_iter().collect()).is_empty());

        let (telemetry, events) = ChannelTelemetry::bounded(64);
        let mut accepting = handler(Arc::default()).with_telemetry(Arc::new(telemetry));
        let response = accepting.process_proposal(&request(2, claiming(2)), &engine, &ledger, &oracle);
        assert!(response.is_accepted(), "{:?}", response.diagnostic);
        assert!(mev_gauges(events.try_iter().collect())
            .contains(&("process_proposal.mev.clob_pair.0.matched_quantums".to_string(), 2)));
    }

    #[test]
    fn test_misplaced_price_tx_rejected() {
        let engine = engine();
        let ledger = funded_ledger(&[]);
        let mut handler = handler(Arc::default());

        let misplaced = vec![operations(Vec::new()), prices(10_000), encode(vec![])];
        let response = handler.process_proposal(&request(1, misplaced), &engine, &ledger, &oracle(100));
        assert_eq!(response.status, ProposalStatus::Reject);

        let duplicated = vec![operations(Vec::new()), prices(10_000), prices(10_000)];
        let response = handler.process_proposal(&request(1, duplicated), &engine, &ledger, &oracle(100));
        assert_eq!(response.status, ProposalStatus::Reject);
    }

    #[test]
    fn test_undecodable_tx_rejected() {
        let engine = engine();
        let ledger = funded_ledger(&[]);
        let (telemetry, events) = ChannelTelemetry::bounded(16);
        let mut handler = handler(Arc::default()).with_telemetry(Arc::new(telemetry));

        let txs = vec![operations(Vec::new()), b"garbage".to_vec(), prices(10_000)];
        let response = handler.process_proposal(&request(1, txs), &engine, &ledger, &oracle(100));

        assert_eq!(response.status, ProposalStatus::Reject);
        assert!(events.try_iter().any(|event| matches!(
            event,
            TelemetryEvent::Counter { key, .. } if key == "process_proposal.decode.error"
        )));
    }

    #[test]
    fn test_price_outside_band_rejected() {
        let engine = engine();
        let ledger = funded_ledger(&[]);
        let mut handler = handler(Arc::default());

        let txs = vec![operations(Vec::new()), prices(12_000)];
        let response = handler.process_proposal(&request(1, txs), &engine, &ledger, &oracle(100));
        assert_eq!(response.status, ProposalStatus::Reject);
        assert!(response.diagnostic.unwrap().contains("outside the band"));
    }

    #[test]
    fn test_smoothed_update_runs_every_round() {
        let engine = engine();
        let ledger = funded_ledger(&[]);
        let updater = Arc::new(RecordingUpdater {
            fail: true,
            ..Default::default()
        });
        let mut handler = handler(Arc::clone(&updater));

        let good = vec![operations(Vec::new()), prices(10_000)];
        let bad = vec![prices(10_000)];
        let verdicts: Vec<bool> = [(5, &good), (5, &bad), (5, &good), (6, &bad)]
            .into_iter()
            .map(|(height, txs)| {
                handler
                    .process_proposal(&request(height, txs.clone()), &engine, &ledger, &oracle(100))
                    .is_accepted()
            })
            .collect();

        // a failing smoothed-price update never blocks acceptance
        assert_eq!(verdicts, vec![true, false, true, false]);
        assert_eq!(*updater.calls.lock(), vec![(5, 0), (5, 1), (5, 2), (6, 0)]);
    }
}
