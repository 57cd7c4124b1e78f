// ============================================================================
// Matching Engine Benchmarks
// ============================================================================
//
// Benchmark Categories:
// 1. Full Matching - Taker sweeping N resting makers through the engine
// 2. Replay - Same placement against scratch state, as proposal validation does
// 3. Order Book Operations - Snapshot and non-crossing placement
// ============================================================================

use chrono::{TimeZone, Utc};
use clob_engine::prelude::*;
use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use std::hint::black_box;
use std::sync::Arc;

const FUNDS: i128 = 1_000_000_000_000;

fn ctx(height: u32) -> BlockContext {
    BlockContext::commit(height, Utc.timestamp_opt(1_700_000_000 + i64::from(height), 0).unwrap())
}

fn order(owner: &str, client_id: u32, side: Side, subticks: u64, quantums: u64, tif: TimeInForce) -> Order {
    Order::new(
        OrderId::new(SubaccountId::new(owner, 0), client_id, OrderFlags::ShortTerm, ClobPairId(0)),
        side,
        BaseQuantums::new(quantums),
        Subticks::new(subticks),
        GoodTil::Block(10),
        tif,
    )
    .unwrap()
}

/// Engine with `levels` asks starting at 50_000 and `levels` bids below 49_900
fn populated(levels: u64, bids: bool) -> (MatchingEngine, InMemoryLedger, OraclePriceTable) {
    let mut engine = MatchingEngine::new(ClobConfig::single_market(), Arc::new(NoOpEventHandler));
    let mut ledger = InMemoryLedger::new();
    let oracle = OraclePriceTable::new().with_price(0, Decimal::from(50_000));
    ledger.deposit(&SubaccountId::new("taker", 0), FUNDS);

    for i in 0..levels {
        let seller = format!("seller{i}");
        ledger.deposit(&SubaccountId::new(seller.as_str(), 0), FUNDS);
        let ask = order(&seller, 1, Side::Sell, 50_000 + i * 10, 1, TimeInForce::GoodTilCancel);
        engine.place_order(&ctx(1), &mut ledger, &oracle, ask).unwrap();

        if bids {
            let buyer = format!("buyer{i}");
            ledger.deposit(&SubaccountId::new(buyer.as_str(), 0), FUNDS);
            let bid = order(&buyer, 1, Side::Buy, 49_900 - i * 10, 1, TimeInForce::GoodTilCancel);
            engine.place_order(&ctx(1), &mut ledger, &oracle, bid).unwrap();
        }
    }
    (engine, ledger, oracle)
}

// ============================================================================
// Full Matching Engine Benchmarks
// ============================================================================

fn benchmark_price_time_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("price_time_matching");

    for num_orders in [100u64, 1000, 10000] {
        let (engine, ledger, oracle) = populated(num_orders, false);
        group.bench_with_input(BenchmarkId::from_parameter(num_orders), &num_orders, |b, _| {
            b.iter_batched(
                || (engine.clone(), ledger.clone()),
                |(mut engine, mut ledger)| {
                    // crosses the first 6 levels
                    let taker = order("taker", 1, Side::Buy, 50_050, 6, TimeInForce::ImmediateOrCancel);
                    black_box(engine.place_order(&ctx(2), &mut ledger, &oracle, taker))
                },
                BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

// ============================================================================
// Replay Benchmarks
// ============================================================================

fn benchmark_replay_on_scratch(c: &mut Criterion) {
    let (engine, ledger, oracle) = populated(1000, false);

    c.bench_function("replay_place_order_scratch", |b| {
        b.iter(|| {
            let mut scratch = engine.scratch();
            let mut overlay = LedgerOverlay::new(&ledger);
            let taker = order("taker", 1, Side::Buy, 50_050, 6, TimeInForce::ImmediateOrCancel);
            black_box(scratch.replay_place_order(&ctx(2), &mut overlay, &oracle, taker))
        });
    });
}

// ============================================================================
// Order Book Operations Benchmarks
// ============================================================================

fn benchmark_order_book_snapshot(c: &mut Criterion) {
    let (engine, _, _) = populated(100, true);

    c.bench_function("order_book_snapshot", |b| {
        b.iter(|| black_box(engine.snapshot(ClobPairId(0), 10)));
    });
}

fn benchmark_order_submission_no_match(c: &mut Criterion) {
    let (engine, ledger, oracle) = populated(1000, false);

    c.bench_function("order_submission_no_match", |b| {
        b.iter_batched(
            || (engine.clone(), ledger.clone()),
            |(mut engine, mut ledger)| {
                // below every ask, rests on the bid side
                let bid = order("taker", 1, Side::Buy, 49_000, 1, TimeInForce::GoodTilCancel);
                black_box(engine.place_order(&ctx(2), &mut ledger, &oracle, bid))
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    benchmark_price_time_matching,
    benchmark_replay_on_scratch,
    benchmark_order_book_snapshot,
    benchmark_order_submission_no_match,
);
criterion_main!(benches);
