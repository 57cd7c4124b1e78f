// ============================================================================
// Engine Factory
// Creates matching engines from validated configuration
// ============================================================================

use crate::domain::{ClobConfig, ClobPair, ConfigError, FeeParams, PerpetualParams};
use crate::engine::{MatchingEngine, SharedEngine};
use crate::interfaces::EventHandler;
use std::sync::Arc;

// ============================================================================
// Factory Functions
// ============================================================================

/// Creates a matching engine from configuration
///
/// # Arguments
/// * `config` - Clob pairs, perpetuals, windows and fees
/// * `event_handler` - Receives off-chain updates in commit mode
///
/// # Example
/// ```
/// use clob_engine::prelude::*;
/// use clob_engine::engine::factory::create_from_config;
/// use std::sync::Arc;
///
/// let engine = create_from_config(ClobConfig::two_markets(), Arc::new(NoOpEventHandler)).unwrap();
/// assert!(engine.orderbook(ClobPairId(1)).is_some());
/// ```
pub fn create_from_config(
    config: ClobConfig,
    event_handler: Arc<dyn EventHandler>,
) -> Result<MatchingEngine, ConfigError> {
    config.validate()?;

    tracing::info!(
        clob_pairs = config.clob_pairs.len(),
        perpetuals = config.perpetuals.len(),
        short_block_window = config.short_block_window,
        "creating matching engine"
    );

    Ok(MatchingEngine::new(config, event_handler))
}

// ============================================================================
// Builder Pattern
// ============================================================================

/// Builder for creating matching engines with fluent API
///
/// # Example
/// ```
/// use clob_engine::prelude::*;
/// use clob_engine::engine::factory::MatchingEngineBuilder;
/// use std::sync::Arc;
///
/// let engine = MatchingEngineBuilder::new()
///     .perpetual(PerpetualParams::new(0, 50_000, 30_000))
///     .clob_pair(ClobPair::new(ClobPairId(0), 0).with_subticks_per_tick(10))
///     .short_block_window(20)
///     .build(Arc::new(NoOpEventHandler))
///     .unwrap();
/// assert!(engine.orderbook(ClobPairId(0)).is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct MatchingEngineBuilder {
    config: ClobConfig,
}

impl MatchingEngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration
    pub fn from_config(config: ClobConfig) -> Self {
        Self { config }
    }

    // ========================================================================
    // Markets
    // ========================================================================

    pub fn perpetual(mut self, perpetual: PerpetualParams) -> Self {
        self.config = self.config.with_perpetual(perpetual);
        self
    }

    pub fn clob_pair(mut self, clob_pair: ClobPair) -> Self {
        self.config = self.config.with_clob_pair(clob_pair);
        self
    }

    // ========================================================================
    // Additional Configuration
    // ========================================================================

    pub fn fees(mut self, taker_fee_ppm: i32, maker_fee_ppm: i32) -> Self {
        self.config = self.config.with_fees(FeeParams {
            taker_fee_ppm,
            maker_fee_ppm,
        });
        self
    }

    /// Blocks a short-term order may live past the current height
    pub fn short_block_window(mut self, blocks: u32) -> Self {
        self.config = self.config.with_short_block_window(blocks);
        self
    }

    pub fn max_liquidation_spread_ppm(mut self, ppm: u32) -> Self {
        self.config = self.config.with_max_liquidation_spread_ppm(ppm);
        self
    }

    // ========================================================================
    // Build
    // ========================================================================

    /// Build the matching engine
    pub fn build(self, event_handler: Arc<dyn EventHandler>) -> Result<MatchingEngine, ConfigError> {
        create_from_config(self.config, event_handler)
    }

    /// Build an engine behind a shared handle
    pub fn build_shared(self, event_handler: Arc<dyn EventHandler>) -> Result<SharedEngine, ConfigError> {
        self.build(event_handler).map(SharedEngine::new)
    }

    /// Get the configuration without building (for inspection)
    pub fn get_config(&self) -> &ClobConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ClobPairId;
    use crate::interfaces::NoOpEventHandler;

    #[test]
    fn test_create_from_preset() {
        let engine = create_from_config(ClobConfig::two_markets(), Arc::new(NoOpEventHandler)).unwrap();
        assert!(engine.orderbook(ClobPairId(0)).is_some());
        assert!(engine.orderbook(ClobPairId(1)).is_some());
        assert_eq!(engine.config().fees.taker_fee_ppm, 500);
    }

    #[test]
    fn test_invalid_config_rejected() {
        // clob pair referencing a perpetual that does not exist
        let config = ClobConfig::new().with_clob_pair(ClobPair::new(ClobPairId(0), 7));
        assert!(matches!(
            create_from_config(config, Arc::new(NoOpEventHandler)),
            Err(ConfigError::UnknownPerpetual { .. })
        ));
    }

    #[test]
    fn test_builder_pattern() {
        let builder = MatchingEngineBuilder::new()
            .perpetual(PerpetualParams::new(0, 50_000, 30_000))
            .clob_pair(ClobPair::new(ClobPairId(0), 0).with_step_base_quantums(5))
            .fees(200, -50)
            .max_liquidation_spread_ppm(5_000);

        assert_eq!(builder.get_config().max_liquidation_spread_ppm, 5_000);
        let engine = builder.build(Arc::new(NoOpEventHandler)).unwrap();
        assert_eq!(
            engine.config().clob_pair(ClobPairId(0)).unwrap().step_base_quantums,
            5
        );
    }

    #[test]
    fn test_build_shared() {
        let shared = MatchingEngineBuilder::from_config(ClobConfig::single_market())
            .build_shared(Arc::new(NoOpEventHandler))
            .unwrap();
        assert!(shared.lock().orderbook(ClobPairId(0)).is_some());
    }
}
