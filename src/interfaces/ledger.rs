// ============================================================================
// Position Ledger Interface
// Narrow read/write capabilities over subaccount balances
// ============================================================================

use crate::domain::{Subaccount, SubaccountId, SubaccountUpdate};
use crate::numeric::NumericError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("balance arithmetic failed for {subaccount_id}: {source}")]
    Arithmetic {
        subaccount_id: SubaccountId,
        source: NumericError,
    },
    #[error("ledger rejected update: {0}")]
    Rejected(String),
}

/// Read side of the position ledger.
///
/// Unknown subaccounts read as empty; the ledger never fails a query.
pub trait PositionReader {
    fn subaccount(&self, id: &SubaccountId) -> Subaccount;

    /// Subaccounts holding a nonzero position in `perpetual_id`, in id order
    fn subaccounts_with_perpetual_position(&self, perpetual_id: u32) -> Vec<SubaccountId>;
}

/// Write side of the position ledger.
pub trait PositionWriter {
    /// Apply all updates or none of them.
    fn apply_updates(&mut self, updates: &[SubaccountUpdate]) -> Result<(), LedgerError>;
}

/// Full ledger capability consumed by the matching engine.
pub trait PositionLedger: PositionReader + PositionWriter {}

impl<T: PositionReader + PositionWriter> PositionLedger for T {}
