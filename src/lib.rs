// ============================================================================
// CLOB Engine Library
// Deterministic order matching and block-proposal validation
// ============================================================================

//! # CLOB Engine
//!
//! The order-matching and block-validation core of a replicated perpetuals
//! exchange. Every validator runs the same code on the same inputs and must
//! reach the same state.
//!
//! ## Features
//!
//! - **Price-time priority matching** gated by per-fill collateral checks
//! - **Short-term and stateful orders** with block-height and block-time expiry
//! - **Liquidation offsetting** against the book, then deleveraging
//! - **Proposal validation** that replays proposed operations on scratch state
//! - **Deterministic state**: ordered maps only, explicit [`BlockContext`](domain::BlockContext)
//!
//! ## Example
//!
//! ```rust
//! use clob_engine::prelude::*;
//! use chrono::Utc;
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! let mut engine = MatchingEngine::new(ClobConfig::single_market(), Arc::new(NoOpEventHandler));
//! let mut ledger = InMemoryLedger::new();
//! let oracle = OraclePriceTable::new().with_price(0, Decimal::from(100));
//!
//! let alice = SubaccountId::new("alice", 0);
//! ledger.deposit(&alice, 1_000_000);
//!
//! let order = Order::new(
//!     OrderId::new(alice, 1, OrderFlags::ShortTerm, ClobPairId(0)),
//!     Side::Buy,
//!     BaseQuantums::new(10),
//!     Subticks::new(100),
//!     GoodTil::Block(5),
//!     TimeInForce::GoodTilCancel,
//! )?;
//!
//! let ctx = BlockContext::commit(1, Utc::now());
//! let result = engine.place_order(&ctx, &mut ledger, &oracle, order)?;
//! assert_eq!(result.status, OrderStatus::Open);
//!
//! let snapshot = engine.snapshot(ClobPairId(0), 10)?;
//! println!("Best bid: {:?}", snapshot.best_bid());
//! # Ok::<(), ClobError>(())
//! ```

pub mod domain;
pub mod engine;
pub mod error;
pub mod interfaces;
pub mod ledger;
pub mod numeric;
pub mod prices;
pub mod process;

// Re-exports for convenience
pub mod prelude {
    pub use crate::domain::{
        BlockContext, CancelReason, ClobConfig, ClobMatch, ClobPair, ClobPairId, ExecMode,
        FeeParams, GoodTil, MakerFill, Order, OrderBookSnapshot, OrderFlags, OrderId,
        OrderStatus, PerpetualParams, ProposalConfig, Side, Subaccount, SubaccountId,
        SubaccountUpdate, TimeInForce,
    };
    pub use crate::engine::{
        create_from_config, MatchingEngine, MatchingEngineBuilder, OffsetResult,
        PlaceOrderResult, SharedEngine,
    };
    pub use crate::error::{ClobError, ClobResult};
    pub use crate::interfaces::{
        EventHandler, IndexPriceFeed, LoggingEventHandler, NoOpEventHandler, NoOpTelemetry,
        OffchainUpdate, OffchainUpdates, OraclePrices, PositionLedger, PositionReader,
        PositionWriter, TelemetrySink,
    };
    pub use crate::ledger::{InMemoryLedger, LedgerOverlay};
    pub use crate::numeric::{BaseQuantums, Subticks};
    pub use crate::prices::{IndexPriceCache, OraclePriceTable, SmoothedPrices};
    pub use crate::process::{ProposalHandler, ProposalRequest, ProposalResponse, ProposalStatus};
}

/// Install a `tracing` subscriber filtered by `filter` (env-filter syntax).
#[cfg(feature = "logging")]
pub fn init_logging(filter: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_new(filter)?)
        .try_init()
}
