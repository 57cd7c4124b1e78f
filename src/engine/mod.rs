// ============================================================================
// Engine Module
// Contains the core CLOB business logic
// ============================================================================

mod collateral;
mod fill_amounts;
mod liquidation;
mod matching_engine;
mod price_time;
mod stateful_store;

pub mod factory;

#[cfg(test)]
pub(crate) mod testing;

pub use collateral::{CollateralizationGate, MarginKind, MarginSummary};
pub use factory::{create_from_config, MatchingEngineBuilder};
pub use fill_amounts::FillAmountStore;
pub use liquidation::OffsetResult;
pub use matching_engine::{MatchingEngine, PlaceOrderResult, SharedEngine};
pub use price_time::{reducible_quantums, MatchOutcome, PriceTimePriority, Taker};
pub use stateful_store::{LongTermOrderPlacement, StatefulOrderStore};
