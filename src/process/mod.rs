// ============================================================================
// Process Module
// Block-proposal validation: decode, layout, replay, price admission
// ============================================================================

mod errors;
mod mev;
mod prices;
mod proposal;
mod replay;
mod round;
pub mod txs;

pub use errors::{DecodeError, ProposalError};
pub use mev::{MevMetrics, PairActivity};
pub use prices::{validate_market_prices, within_band};
pub use proposal::{ProposalHandler, ProposalRequest, ProposalResponse, ProposalStatus};
pub use replay::{replay_proposal, ReplaySummary};
pub use round::RoundTracker;
pub use txs::{MarketPriceUpdate, Msg, Operation, ProposalTxs, Tx, TxDecoder};

#[cfg(feature = "serde")]
pub use txs::JsonTxDecoder;
