// ============================================================================
// Order Domain Model
// ============================================================================

use super::SubaccountId;
use crate::error::{ClobError, ClobResult};
use crate::numeric::{BaseQuantums, Subticks};
use chrono::{DateTime, Utc};
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// ============================================================================
// Value Objects
// ============================================================================

/// Identifier of a trading pair's order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClobPairId(pub u32);

impl fmt::Display for ClobPairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifetime class of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum OrderFlags {
    /// Lives only in the in-memory book, bounded by a block height
    ShortTerm,
    /// Persisted in the stateful order store, bounded by a block time
    LongTerm,
}

/// Unique order identity. Two resting orders never share one.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct OrderId {
    pub subaccount_id: SubaccountId,
    pub client_id: u32,
    pub order_flags: OrderFlags,
    pub clob_pair_id: ClobPairId,
}

impl OrderId {
    pub fn new(
        subaccount_id: SubaccountId,
        client_id: u32,
        order_flags: OrderFlags,
        clob_pair_id: ClobPairId,
    ) -> Self {
        Self {
            subaccount_id,
            client_id,
            order_flags,
            clob_pair_id,
        }
    }

    pub fn is_short_term(&self) -> bool {
        self.order_flags == OrderFlags::ShortTerm
    }

    pub fn is_stateful(&self) -> bool {
        !self.is_short_term()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{:?}:{}",
            self.subaccount_id, self.client_id, self.order_flags, self.clob_pair_id
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn is_buy(&self) -> bool {
        matches!(self, Side::Buy)
    }

    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TimeInForce {
    /// Rests on the book until filled, cancelled or expired
    GoodTilCancel,
    /// Fill what crosses immediately, cancel the remainder
    ImmediateOrCancel,
    /// Rest without taking liquidity; cancelled if it would cross
    PostOnly,
    /// Fill the entire order immediately or nothing at all
    FillOrKill,
}

/// Expiration bound of an order. Exactly one kind is ever present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum GoodTil {
    /// Short-term orders: last block height at which the order may be matched
    Block(u32),
    /// Stateful orders: block time after which the order is expired
    BlockTime(DateTime<Utc>),
}

impl GoodTil {
    /// Build from the two optional wire fields, rejecting both-set and neither-set.
    pub fn from_parts(
        good_til_block: Option<u32>,
        good_til_block_time: Option<DateTime<Utc>>,
    ) -> ClobResult<Self> {
        match (good_til_block, good_til_block_time) {
            (Some(block), None) => Ok(GoodTil::Block(block)),
            (None, Some(time)) => Ok(GoodTil::BlockTime(time)),
            _ => Err(ClobError::InvalidGoodTil),
        }
    }

    pub fn expected_flags(&self) -> OrderFlags {
        match self {
            GoodTil::Block(_) => OrderFlags::ShortTerm,
            GoodTil::BlockTime(_) => OrderFlags::LongTerm,
        }
    }
}

// ============================================================================
// Order Status
// ============================================================================

pub mod state {
    #[cfg(feature = "serde")]
    use serde::{Deserialize, Serialize};

    /// Why an order left (or never reached) the book without filling completely.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub enum CancelReason {
        Undercollateralized,
        ImmediateOrCancel,
        PostOnlyWouldCross,
        FillOrKillNotFilled,
        ReduceOnlyWouldIncrease,
        SelfTrade,
        UserCanceled,
        Replaced,
        Expired,
    }

    /// Result status of placing an order.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
    pub enum OrderStatus {
        /// Residual size rests on the book
        Open,
        FullyFilled,
        Cancelled(CancelReason),
        Expired,
    }

    impl OrderStatus {
        pub fn is_terminal(&self) -> bool {
            !matches!(self, OrderStatus::Open)
        }

        pub fn is_cancelled(&self) -> bool {
            matches!(self, OrderStatus::Cancelled(_))
        }
    }
}

// ============================================================================
// Order Entity
// ============================================================================

/// Immutable order. Cancellation is a separate message, never a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(try_from = "RawOrder", into = "RawOrder")
)]
pub struct Order {
    pub order_id: OrderId,
    pub side: Side,
    pub quantums: BaseQuantums,
    pub subticks: Subticks,
    pub good_til: GoodTil,
    pub time_in_force: TimeInForce,
    pub reduce_only: bool,
    /// Opaque to the matching core
    pub client_metadata: u32,
}

impl Order {
    /// Create a validated order.
    pub fn new(
        order_id: OrderId,
        side: Side,
        quantums: BaseQuantums,
        subticks: Subticks,
        good_til: GoodTil,
        time_in_force: TimeInForce,
    ) -> ClobResult<Self> {
        let order = Self {
            order_id,
            side,
            quantums,
            subticks,
            good_til,
            time_in_force,
            reduce_only: false,
            client_metadata: 0,
        };
        order.validate_basic()?;
        Ok(order)
    }

    /// Create a validated reduce-only order (IOC or FOK only).
    pub fn new_reduce_only(
        order_id: OrderId,
        side: Side,
        quantums: BaseQuantums,
        subticks: Subticks,
        good_til: GoodTil,
        time_in_force: TimeInForce,
    ) -> ClobResult<Self> {
        let order = Self {
            order_id,
            side,
            quantums,
            subticks,
            good_til,
            time_in_force,
            reduce_only: true,
            client_metadata: 0,
        };
        order.validate_basic()?;
        Ok(order)
    }

    pub fn with_client_metadata(mut self, client_metadata: u32) -> Self {
        self.client_metadata = client_metadata;
        self
    }

    /// Stateless validity checks.
    pub fn validate_basic(&self) -> ClobResult<()> {
        if self.quantums.is_zero() {
            return Err(ClobError::InvalidOrder("quantums must be positive".into()));
        }
        if self.subticks == Subticks::ZERO {
            return Err(ClobError::InvalidOrder("subticks must be positive".into()));
        }
        if self.good_til.expected_flags() != self.order_id.order_flags {
            return Err(ClobError::GoodTilFlagsMismatch {
                flags: self.order_id.order_flags,
            });
        }
        if self.reduce_only
            && !matches!(
                self.time_in_force,
                TimeInForce::ImmediateOrCancel | TimeInForce::FillOrKill
            )
        {
            return Err(ClobError::InvalidOrder(
                "reduce-only orders must be immediate-or-cancel or fill-or-kill".into(),
            ));
        }
        if self.order_id.is_stateful()
            && matches!(
                self.time_in_force,
                TimeInForce::ImmediateOrCancel | TimeInForce::FillOrKill
            )
        {
            return Err(ClobError::InvalidOrder(
                "stateful orders cannot be immediate-or-cancel or fill-or-kill".into(),
            ));
        }
        Ok(())
    }

    pub fn is_buy(&self) -> bool {
        self.side.is_buy()
    }

    pub fn good_til_block(&self) -> Option<u32> {
        match self.good_til {
            GoodTil::Block(block) => Some(block),
            GoodTil::BlockTime(_) => None,
        }
    }

    pub fn good_til_block_time(&self) -> Option<DateTime<Utc>> {
        match self.good_til {
            GoodTil::Block(_) => None,
            GoodTil::BlockTime(time) => Some(time),
        }
    }

    /// True if this order, as a taker, is willing to trade at `maker_subticks`.
    pub fn crosses(&self, maker_subticks: Subticks) -> bool {
        match self.side {
            Side::Buy => self.subticks >= maker_subticks,
            Side::Sell => self.subticks <= maker_subticks,
        }
    }
}

// ============================================================================
// Wire Representation
// ============================================================================

/// Wire form of an order with both expiration fields optional.
#[cfg(feature = "serde")]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawOrder {
    pub order_id: OrderId,
    pub side: Side,
    pub quantums: BaseQuantums,
    pub subticks: Subticks,
    #[serde(default)]
    pub good_til_block: Option<u32>,
    #[serde(default)]
    pub good_til_block_time: Option<DateTime<Utc>>,
    pub time_in_force: TimeInForce,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub client_metadata: u32,
}

#[cfg(feature = "serde")]
impl TryFrom<RawOrder> for Order {
    type Error = ClobError;

    fn try_from(raw: RawOrder) -> Result<Self, Self::Error> {
        Ok(Self {
            good_til: GoodTil::from_parts(raw.good_til_block, raw.good_til_block_time)?,
            order_id: raw.order_id,
            side: raw.side,
            quantums: raw.quantums,
            subticks: raw.subticks,
            time_in_force: raw.time_in_force,
            reduce_only: raw.reduce_only,
            client_metadata: raw.client_metadata,
        })
    }
}

#[cfg(feature = "serde")]
impl From<Order> for RawOrder {
    fn from(order: Order) -> Self {
        Self {
            good_til_block: order.good_til_block(),
            good_til_block_time: order.good_til_block_time(),
            order_id: order.order_id,
            side: order.side,
            quantums: order.quantums,
            subticks: order.subticks,
            time_in_force: order.time_in_force,
            reduce_only: order.reduce_only,
            client_metadata: order.client_metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn short_term_id(client_id: u32) -> OrderId {
        OrderId::new(
            SubaccountId::new("alice", 0),
            client_id,
            OrderFlags::ShortTerm,
            ClobPairId(0),
        )
    }

    #[test]
    fn test_order_creation() {
        let order = Order::new(
            short_term_id(1),
            Side::Buy,
            BaseQuantums::new(100),
            Subticks::new(50),
            GoodTil::Block(20),
            TimeInForce::GoodTilCancel,
        )
        .unwrap();

        assert!(order.is_buy());
        assert_eq!(order.good_til_block(), Some(20));
        assert_eq!(order.good_til_block_time(), None);
        assert!(order.crosses(Subticks::new(50)));
        assert!(!order.crosses(Subticks::new(51)));
    }

    #[test]
    fn test_good_til_requires_exactly_one_kind() {
        let time = Utc.timestamp_opt(1_700_000_000, 0).unwrap();

        assert_eq!(GoodTil::from_parts(Some(5), None).unwrap(), GoodTil::Block(5));
        assert_eq!(
            GoodTil::from_parts(None, Some(time)).unwrap(),
            GoodTil::BlockTime(time)
        );
        assert_eq!(
            GoodTil::from_parts(Some(5), Some(time)),
            Err(ClobError::InvalidGoodTil)
        );
        assert_eq!(GoodTil::from_parts(None, None), Err(ClobError::InvalidGoodTil));
    }

    #[test]
    fn test_flags_must_match_good_til_kind() {
        let time = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let result = Order::new(
            short_term_id(1),
            Side::Sell,
            BaseQuantums::new(10),
            Subticks::new(10),
            GoodTil::BlockTime(time),
            TimeInForce::GoodTilCancel,
        );

        assert_eq!(
            result,
            Err(ClobError::GoodTilFlagsMismatch {
                flags: OrderFlags::ShortTerm
            })
        );
    }

    #[test]
    fn test_reduce_only_must_be_immediate() {
        let result = Order::new_reduce_only(
            short_term_id(1),
            Side::Sell,
            BaseQuantums::new(10),
            Subticks::new(10),
            GoodTil::Block(10),
            TimeInForce::GoodTilCancel,
        );
        assert!(matches!(result, Err(ClobError::InvalidOrder(_))));

        let ok = Order::new_reduce_only(
            short_term_id(1),
            Side::Sell,
            BaseQuantums::new(10),
            Subticks::new(10),
            GoodTil::Block(10),
            TimeInForce::ImmediateOrCancel,
        );
        assert!(ok.is_ok());
    }

    #[test]
    fn test_zero_size_rejected() {
        let result = Order::new(
            short_term_id(1),
            Side::Buy,
            BaseQuantums::ZERO,
            Subticks::new(10),
            GoodTil::Block(10),
            TimeInForce::GoodTilCancel,
        );
        assert!(matches!(result, Err(ClobError::InvalidOrder(_))));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_wire_form_rejects_both_expirations() {
        let json = r#"{
            "order_id": {
                "subaccount_id": {"owner": "alice", "number": 0},
                "client_id": 1,
                "order_flags": "ShortTerm",
                "clob_pair_id": 0
            },
            "side": "Buy",
            "quantums": 10,
            "subticks": 10,
            "good_til_block": 5,
            "good_til_block_time": "2024-01-01T00:00:00Z",
            "time_in_force": "GoodTilCancel"
        }"#;

        assert!(serde_json::from_str::<Order>(json).is_err());

        let neither = json.replace(r#""good_til_block": 5,"#, "").replace(
            r#""good_til_block_time": "2024-01-01T00:00:00Z","#,
            "",
        );
        assert!(serde_json::from_str::<Order>(&neither).is_err());
    }

    #[test]
    fn test_status_terminality() {
        use state::{CancelReason, OrderStatus};

        assert!(!OrderStatus::Open.is_terminal());
        assert!(OrderStatus::FullyFilled.is_terminal());
        assert!(OrderStatus::Cancelled(CancelReason::SelfTrade).is_cancelled());
        assert!(OrderStatus::Expired.is_terminal());
    }
}
