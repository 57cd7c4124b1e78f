// ============================================================================
// Error Types
// Error taxonomy for the CLOB state machine
// ============================================================================

use crate::domain::{ClobPairId, OrderFlags, OrderId};
use crate::interfaces::LedgerError;
use crate::numeric::NumericError;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors returned by order placement, cancellation and offsetting.
///
/// Collateralization failures are deliberately absent: they are decision inputs
/// reported through [`crate::domain::UpdateResult`] and order statuses.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClobError {
    #[error("order must set exactly one of good_til_block and good_til_block_time")]
    InvalidGoodTil,

    #[error("order flags {flags:?} do not match the order's good-til kind")]
    GoodTilFlagsMismatch { flags: OrderFlags },

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("clob pair {0} not found")]
    ClobPairNotFound(ClobPairId),

    #[error("perpetual {0} not found")]
    PerpetualNotFound(u32),

    #[error("no oracle price for perpetual {0}")]
    OraclePriceNotFound(u32),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("order {0} already exists with an equal or later good-til-block")]
    OrderAlreadyExists(OrderId),

    #[error("stateful order {0} already exists in state")]
    StatefulOrderAlreadyExists(OrderId),

    #[error("order {0} is already fully filled")]
    OrderFullyFilled(OrderId),

    #[error(
        "good-til-block {good_til_block} exceeds short block window (height {height}, window {window})"
    )]
    GoodTilBlockExceedsShortBlockWindow {
        good_til_block: u32,
        height: u32,
        window: u32,
    },

    #[error("good-til-block-time {good_til} exceeds stateful order window ending {max}")]
    GoodTilBlockTimeExceedsStatefulWindow {
        good_til: DateTime<Utc>,
        max: DateTime<Utc>,
    },

    #[error("invalid match: {0}")]
    InvalidMatch(String),

    #[error("operation not allowed while replaying a proposal")]
    NotAllowedDuringReplay,

    #[error("invalid offset delta {delta} for position {position}")]
    InvalidOffsetDelta { delta: i128, position: i128 },

    #[error(transparent)]
    Numeric(#[from] NumericError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Result alias for CLOB operations
pub type ClobResult<T> = Result<T, ClobError>;
