// ============================================================================
// Price Interfaces
// Oracle prices, local index prices and smoothed-price maintenance
// ============================================================================

use crate::domain::BlockContext;
use rust_decimal::Decimal;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    #[error("timed out after {0:?} waiting for index prices")]
    Timeout(Duration),
    #[error("price update failed: {0}")]
    UpdateFailed(String),
}

/// Consensus oracle prices, in quote quantums per base quantum.
pub trait OraclePrices {
    fn oracle_price(&self, perpetual_id: u32) -> Option<Decimal>;
}

/// Locally observed index price feed.
///
/// This is the only process-local input to proposal validation. Implementations
/// must return within `timeout`.
pub trait IndexPriceFeed: Send + Sync {
    /// `Ok(None)` when the feed has no price for `market_id`.
    fn index_price(&self, market_id: u32, timeout: Duration) -> Result<Option<u64>, PriceError>;
}

/// Best-effort smoothed-price maintenance run once per consensus round.
pub trait SmoothedPriceUpdater: Send + Sync {
    fn update_smoothed_prices(&self, ctx: &BlockContext) -> Result<(), PriceError>;
}
