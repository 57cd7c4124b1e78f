// Shared fixtures for engine and proposal tests

use super::MatchingEngine;
use crate::domain::{
    BlockContext, ClobConfig, ClobPairId, GoodTil, Order, OrderFlags, OrderId, Side,
    SubaccountId, TimeInForce,
};
use crate::interfaces::NoOpEventHandler;
use crate::ledger::InMemoryLedger;
use crate::numeric::{BaseQuantums, Subticks};
use crate::prices::OraclePriceTable;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;

pub const FUNDS: i128 = 1_000_000;

pub fn t0() -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000, 0).unwrap()
}

pub fn ctx(height: u32) -> BlockContext {
    BlockContext::commit(height, t0() + Duration::seconds(height as i64))
}

pub fn sub(owner: &str) -> SubaccountId {
    SubaccountId::new(owner, 0)
}

pub fn short_term(
    owner: &str,
    client_id: u32,
    side: Side,
    subticks: u64,
    quantums: u64,
    good_til_block: u32,
    time_in_force: TimeInForce,
) -> Order {
    Order::new(
        OrderId::new(sub(owner), client_id, OrderFlags::ShortTerm, ClobPairId(0)),
        side,
        BaseQuantums::new(quantums),
        Subticks::new(subticks),
        GoodTil::Block(good_til_block),
        time_in_force,
    )
    .unwrap()
}

/// Good-til-cancel short-term order valid through height 10
pub fn limit(owner: &str, client_id: u32, side: Side, subticks: u64, quantums: u64) -> Order {
    short_term(
        owner,
        client_id,
        side,
        subticks,
        quantums,
        10,
        TimeInForce::GoodTilCancel,
    )
}

pub fn stateful(
    owner: &str,
    client_id: u32,
    side: Side,
    subticks: u64,
    quantums: u64,
    good_til: DateTime<Utc>,
) -> Order {
    Order::new(
        OrderId::new(sub(owner), client_id, OrderFlags::LongTerm, ClobPairId(0)),
        side,
        BaseQuantums::new(quantums),
        Subticks::new(subticks),
        GoodTil::BlockTime(good_til),
        TimeInForce::GoodTilCancel,
    )
    .unwrap()
}

pub fn funded_ledger(owners: &[&str]) -> InMemoryLedger {
    let mut ledger = InMemoryLedger::new();
    for owner in owners {
        ledger.deposit(&sub(owner), FUNDS);
    }
    ledger
}

pub fn oracle(price: i64) -> OraclePriceTable {
    OraclePriceTable::new().with_price(0, Decimal::from(price))
}

pub fn engine() -> MatchingEngine {
    MatchingEngine::new(ClobConfig::single_market(), Arc::new(NoOpEventHandler))
}
