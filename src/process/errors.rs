// ============================================================================
// Proposal Errors
// Every reason a validator votes to reject a proposed block
// ============================================================================

use crate::error::ClobError;
use crate::interfaces::PriceError;
use thiserror::Error;

/// Transaction bytes that do not decode
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty transaction bytes")]
    Empty,

    #[error("malformed transaction: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProposalError {
    #[error("failed to decode tx {index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: DecodeError,
    },

    #[error("proposal must contain at least 2 txs, got {count}")]
    TooFewTxs { count: usize },

    #[error("first tx must contain exactly one proposed-operations msg")]
    MissingProposedOperations,

    #[error("last tx must contain exactly one market-price-update msg")]
    MissingPriceUpdates,

    #[error("injected msg in tx {index} must be the only msg of its tx")]
    InjectedTxMustBeAlone { index: usize },

    #[error("injected msg found among other txs at index {index}")]
    MisplacedInjectedMsg { index: usize },

    #[error("tx {index} contains no msgs")]
    EmptyTx { index: usize },

    #[error("invalid msg in tx {index}: {reason}")]
    InvalidMsg { index: usize, reason: String },

    #[error("replay mismatch: {0}")]
    ReplayMismatch(String),

    #[error("replay failed: {0}")]
    Replay(#[from] ClobError),

    #[error("proposed price {proposed} for market {market_id} is outside the band around index price {index}")]
    PriceOutOfBand {
        market_id: u32,
        proposed: u64,
        index: u64,
    },

    #[error("no local index price for market {market_id}")]
    MissingIndexPrice { market_id: u32 },

    #[error(transparent)]
    PriceFeed(#[from] PriceError),
}

impl ProposalError {
    /// Pipeline stage that produced the error, used as a metric label.
    pub fn stage(&self) -> &'static str {
        match self {
            ProposalError::Decode { .. } => "decode",
            ProposalError::TooFewTxs { .. }
            | ProposalError::MissingProposedOperations
            | ProposalError::MissingPriceUpdates
            | ProposalError::InjectedTxMustBeAlone { .. }
            | ProposalError::MisplacedInjectedMsg { .. }
            | ProposalError::EmptyTx { .. } => "structure",
            ProposalError::InvalidMsg { .. } => "validate",
            ProposalError::ReplayMismatch(_) | ProposalError::Replay(_) => "replay",
            ProposalError::PriceOutOfBand { .. }
            | ProposalError::MissingIndexPrice { .. }
            | ProposalError::PriceFeed(_) => "prices",
        }
    }
}
