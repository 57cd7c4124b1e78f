// ============================================================================
// Proposal Transactions
// Typed transactions, decoding and the structural layout of a proposal
// ============================================================================

use super::errors::{DecodeError, ProposalError};
use crate::domain::{ClobMatch, GoodTil, Order, OrderId};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A proposed index-price update for one market
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MarketPriceUpdate {
    pub market_id: u32,
    pub price: u64,
}

/// One entry of the proposer's operations queue
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Operation {
    PlaceShortTermOrder(Order),
    Match(ClobMatch),
    PreexistingStatefulOrder(OrderId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Msg {
    /// Injected by the proposer as the first tx
    ProposedOperations { operations: Vec<Operation> },
    /// Injected by the proposer as the last tx
    UpdateMarketPrices { updates: Vec<MarketPriceUpdate> },
    PlaceOrder { order: Order },
    CancelOrder { order_id: OrderId, good_til: GoodTil },
}

impl Msg {
    /// Msg kinds only the proposer may add, each at a fixed position.
    pub fn is_injected(&self) -> bool {
        matches!(
            self,
            Msg::ProposedOperations { .. } | Msg::UpdateMarketPrices { .. }
        )
    }

    /// Stateless validity.
    pub fn validate_basic(&self) -> Result<(), String> {
        match self {
            Msg::ProposedOperations { operations } => {
                for (position, operation) in operations.iter().enumerate() {
                    validate_operation(operation)
                        .map_err(|reason| format!("operation {position}: {reason}"))?;
                }
                Ok(())
            },
            Msg::UpdateMarketPrices { updates } => {
                if updates.iter().any(|update| update.price == 0) {
                    return Err("market price must be positive".into());
                }
                if updates
                    .windows(2)
                    .any(|pair| pair[0].market_id >= pair[1].market_id)
                {
                    return Err("market ids must be strictly increasing".into());
                }
                Ok(())
            },
            Msg::PlaceOrder { order } => {
                if order.order_id.is_short_term() {
                    return Err("short-term orders belong in proposed operations".into());
                }
                order.validate_basic().map_err(|err| err.to_string())
            },
            Msg::CancelOrder { order_id, good_til } => {
                if order_id.is_short_term() {
                    return Err("short-term cancels are not included in blocks".into());
                }
                if good_til.expected_flags() != order_id.order_flags {
                    return Err("good-til kind does not match order flags".into());
                }
                Ok(())
            },
        }
    }
}

fn validate_operation(operation: &Operation) -> Result<(), String> {
    match operation {
        Operation::PlaceShortTermOrder(order) => {
            if !order.order_id.is_short_term() {
                return Err(format!("order {} is not short-term", order.order_id));
            }
            order.validate_basic().map_err(|err| err.to_string())
        },
        Operation::Match(clob_match) => clob_match.validate_basic(),
        Operation::PreexistingStatefulOrder(order_id) => {
            if order_id.is_stateful() {
                Ok(())
            } else {
                Err(format!("order {order_id} is not stateful"))
            }
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Tx {
    pub msgs: Vec<Msg>,
}

impl Tx {
    pub fn new(msgs: Vec<Msg>) -> Self {
        Self { msgs }
    }

    fn single(&self) -> Option<&Msg> {
        match self.msgs.as_slice() {
            [msg] => Some(msg),
            _ => None,
        }
    }
}

// ============================================================================
// Decoding
// ============================================================================

/// Turns raw tx bytes into a typed [`Tx`]
pub trait TxDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Tx, DecodeError>;
}

/// JSON wire format
#[cfg(feature = "serde")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonTxDecoder;

#[cfg(feature = "serde")]
impl JsonTxDecoder {
    pub fn encode(tx: &Tx) -> Result<Vec<u8>, DecodeError> {
        serde_json::to_vec(tx).map_err(|err| DecodeError::Malformed(err.to_string()))
    }
}

#[cfg(feature = "serde")]
impl TxDecoder for JsonTxDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<Tx, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        serde_json::from_slice(bytes).map_err(|err| DecodeError::Malformed(err.to_string()))
    }
}

// ============================================================================
// Proposal Layout
// ============================================================================

/// A structurally valid proposal: proposed operations first, price updates
/// last, ordinary txs in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalTxs {
    pub proposed_operations: Vec<Operation>,
    pub price_updates: Vec<MarketPriceUpdate>,
    pub other_txs: Vec<Tx>,
}

impl ProposalTxs {
    /// Enforce the fixed positions of the injected msgs.
    pub fn from_txs(mut txs: Vec<Tx>) -> Result<Self, ProposalError> {
        let count = txs.len();
        if count < 2 {
            return Err(ProposalError::TooFewTxs { count });
        }

        let last = txs.pop().ok_or(ProposalError::TooFewTxs { count })?;
        let first = txs.remove(0);

        let proposed_operations = match first.single() {
            Some(Msg::ProposedOperations { operations }) => operations.clone(),
            _ if first.msgs.len() > 1 && first.msgs.iter().any(Msg::is_injected) => {
                return Err(ProposalError::InjectedTxMustBeAlone { index: 0 })
            },
            _ => return Err(ProposalError::MissingProposedOperations),
        };
        let price_updates = match last.single() {
            Some(Msg::UpdateMarketPrices { updates }) => updates.clone(),
            _ if last.msgs.len() > 1 && last.msgs.iter().any(Msg::is_injected) => {
                return Err(ProposalError::InjectedTxMustBeAlone { index: count - 1 })
            },
            _ => return Err(ProposalError::MissingPriceUpdates),
        };

        for (offset, tx) in txs.iter().enumerate() {
            let index = offset + 1;
            if tx.msgs.is_empty() {
                return Err(ProposalError::EmptyTx { index });
            }
            if tx.msgs.iter().any(Msg::is_injected) {
                return Err(ProposalError::MisplacedInjectedMsg { index });
            }
        }

        Ok(Self {
            proposed_operations,
            price_updates,
            other_txs: txs,
        })
    }

    /// Stateless validity of every msg, in block order.
    pub fn validate(&self) -> Result<(), ProposalError> {
        Msg::ProposedOperations {
            operations: self.proposed_operations.clone(),
        }
        .validate_basic()
        .map_err(|reason| ProposalError::InvalidMsg { index: 0, reason })?;

        for (offset, tx) in self.other_txs.iter().enumerate() {
            for msg in &tx.msgs {
                msg.validate_basic()
                    .map_err(|reason| ProposalError::InvalidMsg {
                        index: offset + 1,
                        reason,
                    })?;
            }
        }

        Msg::UpdateMarketPrices {
            updates: self.price_updates.clone(),
        }
        .validate_basic()
        .map_err(|reason| ProposalError::InvalidMsg {
            index: self.other_txs.len() + 1,
            reason,
        })
    }
}
