// ============================================================================
// Domain Models Module
// Contains all core domain entities and value objects
// ============================================================================

pub mod config;
pub mod context;
pub mod fill;
pub mod order;
pub mod order_book;
pub mod subaccount;

pub use config::{
    ClobConfig, ClobPair, ConfigError, FeeParams, PerpetualParams, ProposalConfig,
};
pub use context::{BlockContext, ExecMode};
pub use fill::{ClobMatch, DeleveragingFill, MakerFill, OrderFillAmount, PendingOpenOrder};
pub use order::{ClobPairId, GoodTil, Order, OrderFlags, OrderId, Side, TimeInForce};
pub use order_book::{OrderBookLevel, OrderBookSide, OrderBookSnapshot, Orderbook, RestingOrder};
pub use subaccount::{Subaccount, SubaccountId, SubaccountUpdate, UpdateResult};

// Re-export order status types
pub use order::state::{CancelReason, OrderStatus};

#[cfg(feature = "serde")]
pub use order::RawOrder;
