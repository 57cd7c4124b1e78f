// ============================================================================
// Interfaces Module
// Contains all trait definitions and contracts
// ============================================================================

mod event_handler;
mod ledger;
mod prices;
mod telemetry;

pub use event_handler::{
    EventHandler, LoggingEventHandler, NoOpEventHandler, OffchainUpdate, OffchainUpdates,
};
pub use ledger::{LedgerError, PositionLedger, PositionReader, PositionWriter};
pub use prices::{IndexPriceFeed, OraclePrices, PriceError, SmoothedPriceUpdater};
pub use telemetry::{
    ChannelTelemetry, LoggingTelemetry, NoOpTelemetry, TelemetryEvent, TelemetrySink,
};
