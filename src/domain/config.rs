// ============================================================================
// CLOB Configuration
// Protocol parameters for clob pairs, perpetuals, matching and proposals
// ============================================================================

use super::ClobPairId;
use chrono::Duration;
use std::collections::BTreeMap;
use thiserror::Error;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default number of blocks a short-term order may stay valid for.
pub const DEFAULT_SHORT_BLOCK_WINDOW: u32 = 20;

/// Default maximum lifetime of a stateful order, in days.
pub const DEFAULT_STATEFUL_ORDER_WINDOW_DAYS: i64 = 95;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("clob pair {0}: {1}")]
    InvalidClobPair(ClobPairId, String),
    #[error("clob pair {clob_pair_id} references unknown perpetual {perpetual_id}")]
    UnknownPerpetual {
        clob_pair_id: ClobPairId,
        perpetual_id: u32,
    },
    #[error("perpetual {0}: {1}")]
    InvalidPerpetual(u32, String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

// ============================================================================
// Clob Pair / Perpetual Parameters
// ============================================================================

/// Trading pair parameters
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClobPair {
    pub id: ClobPairId,
    /// Perpetual whose position this pair trades
    pub perpetual_id: u32,
    /// Order sizes must be a multiple of this
    pub step_base_quantums: u64,
    /// Order prices must be a multiple of this
    pub subticks_per_tick: u64,
    /// Quote quantums per (base quantum × subtick) is `10^exponent`
    pub quantum_conversion_exponent: i32,
}

impl ClobPair {
    pub fn new(id: ClobPairId, perpetual_id: u32) -> Self {
        Self {
            id,
            perpetual_id,
            step_base_quantums: 1,
            subticks_per_tick: 1,
            quantum_conversion_exponent: 0,
        }
    }

    pub fn with_step_base_quantums(mut self, step: u64) -> Self {
        self.step_base_quantums = step;
        self
    }

    pub fn with_subticks_per_tick(mut self, ticks: u64) -> Self {
        self.subticks_per_tick = ticks;
        self
    }

    pub fn with_quantum_conversion_exponent(mut self, exponent: i32) -> Self {
        self.quantum_conversion_exponent = exponent;
        self
    }
}

/// Margin parameters of a perpetual market
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PerpetualParams {
    pub id: u32,
    /// Initial margin fraction, parts per million
    pub initial_margin_ppm: u32,
    /// Maintenance margin fraction, parts per million
    pub maintenance_margin_ppm: u32,
}

impl PerpetualParams {
    pub fn new(id: u32, initial_margin_ppm: u32, maintenance_margin_ppm: u32) -> Self {
        Self {
            id,
            initial_margin_ppm,
            maintenance_margin_ppm,
        }
    }
}

/// Trading fees, parts per million of quote quantums. Negative maker fees are rebates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FeeParams {
    pub taker_fee_ppm: i32,
    pub maker_fee_ppm: i32,
}

// ============================================================================
// Complete CLOB Configuration
// ============================================================================

#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ClobConfig {
    pub clob_pairs: BTreeMap<ClobPairId, ClobPair>,
    pub perpetuals: BTreeMap<u32, PerpetualParams>,

    /// Short-term orders may not expire later than `height + short_block_window`
    pub short_block_window: u32,

    /// Stateful orders may not expire later than `block_time + window`
    #[cfg_attr(feature = "serde", serde(with = "duration_seconds"))]
    pub max_stateful_order_time_window: Duration,

    pub fees: FeeParams,

    /// Liquidation orders may trade at most this far through the oracle price
    pub max_liquidation_spread_ppm: u32,
}

impl Default for ClobConfig {
    fn default() -> Self {
        Self {
            clob_pairs: BTreeMap::new(),
            perpetuals: BTreeMap::new(),
            short_block_window: DEFAULT_SHORT_BLOCK_WINDOW,
            max_stateful_order_time_window: Duration::days(DEFAULT_STATEFUL_ORDER_WINDOW_DAYS),
            fees: FeeParams::default(),
            max_liquidation_spread_ppm: 10_000,
        }
    }
}

impl ClobConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: Register a perpetual market
    pub fn with_perpetual(mut self, perpetual: PerpetualParams) -> Self {
        self.perpetuals.insert(perpetual.id, perpetual);
        self
    }

    /// Builder method: Register a clob pair
    pub fn with_clob_pair(mut self, clob_pair: ClobPair) -> Self {
        self.clob_pairs.insert(clob_pair.id, clob_pair);
        self
    }

    /// Builder method: Set trading fees
    pub fn with_fees(mut self, fees: FeeParams) -> Self {
        self.fees = fees;
        self
    }

    /// Builder method: Set short-term order block window
    pub fn with_short_block_window(mut self, blocks: u32) -> Self {
        self.short_block_window = blocks;
        self
    }

    /// Builder method: Set maximum liquidation spread
    pub fn with_max_liquidation_spread_ppm(mut self, ppm: u32) -> Self {
        self.max_liquidation_spread_ppm = ppm;
        self
    }

    pub fn clob_pair(&self, id: ClobPairId) -> Option<&ClobPair> {
        self.clob_pairs.get(&id)
    }

    pub fn perpetual(&self, id: u32) -> Option<&PerpetualParams> {
        self.perpetuals.get(&id)
    }

    /// Clob pair trading a given perpetual, lowest id first
    pub fn clob_pair_for_perpetual(&self, perpetual_id: u32) -> Option<&ClobPair> {
        self.clob_pairs
            .values()
            .find(|pair| pair.perpetual_id == perpetual_id)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (id, perpetual) in &self.perpetuals {
            if *id != perpetual.id {
                return Err(ConfigError::InvalidPerpetual(*id, "key does not match id".into()));
            }
            if perpetual.initial_margin_ppm > 1_000_000 {
                return Err(ConfigError::InvalidPerpetual(
                    *id,
                    "initial margin exceeds 100%".into(),
                ));
            }
            if perpetual.maintenance_margin_ppm > perpetual.initial_margin_ppm {
                return Err(ConfigError::InvalidPerpetual(
                    *id,
                    "maintenance margin exceeds initial margin".into(),
                ));
            }
        }

        for (id, pair) in &self.clob_pairs {
            if *id != pair.id {
                return Err(ConfigError::InvalidClobPair(*id, "key does not match id".into()));
            }
            if pair.step_base_quantums == 0 {
                return Err(ConfigError::InvalidClobPair(
                    *id,
                    "step base quantums must be positive".into(),
                ));
            }
            if pair.subticks_per_tick == 0 {
                return Err(ConfigError::InvalidClobPair(
                    *id,
                    "subticks per tick must be positive".into(),
                ));
            }
            if !self.perpetuals.contains_key(&pair.perpetual_id) {
                return Err(ConfigError::UnknownPerpetual {
                    clob_pair_id: *id,
                    perpetual_id: pair.perpetual_id,
                });
            }
        }

        if self.short_block_window == 0 {
            return Err(ConfigError::InvalidParameter(
                "short block window must be positive".into(),
            ));
        }
        if self.max_stateful_order_time_window <= Duration::zero() {
            return Err(ConfigError::InvalidParameter(
                "stateful order window must be positive".into(),
            ));
        }
        if self.max_liquidation_spread_ppm >= 1_000_000 {
            return Err(ConfigError::InvalidParameter(
                "liquidation spread must be below 100%".into(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// Preset Configurations (Factory Methods)
// ============================================================================

impl ClobConfig {
    /// Single perpetual market on clob pair 0 with 5% initial / 3% maintenance margin
    pub fn single_market() -> Self {
        Self::new()
            .with_perpetual(PerpetualParams::new(0, 50_000, 30_000))
            .with_clob_pair(ClobPair::new(ClobPairId(0), 0))
    }

    /// BTC/ETH style two-market setup with fees
    pub fn two_markets() -> Self {
        Self::new()
            .with_perpetual(PerpetualParams::new(0, 50_000, 30_000))
            .with_perpetual(PerpetualParams::new(1, 100_000, 50_000))
            .with_clob_pair(ClobPair::new(ClobPairId(0), 0).with_step_base_quantums(10))
            .with_clob_pair(ClobPair::new(ClobPairId(1), 1).with_subticks_per_tick(10))
            .with_fees(FeeParams {
                taker_fee_ppm: 500,
                maker_fee_ppm: -110,
            })
    }
}

// ============================================================================
// Proposal Validation Configuration
// ============================================================================

/// Parameters of the block-proposal gate's non-deterministic price check
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ProposalConfig {
    /// Maximum distance of a proposed price from the local index price, ppm
    pub price_tolerance_ppm: u32,
    /// Upper bound on waiting for the local index price
    #[cfg_attr(feature = "serde", serde(with = "std_duration_millis"))]
    pub index_price_timeout: std::time::Duration,
    /// Index prices older than this are treated as missing
    #[cfg_attr(feature = "serde", serde(with = "std_duration_millis"))]
    pub max_index_price_age: std::time::Duration,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self {
            price_tolerance_ppm: 10_000,
            index_price_timeout: std::time::Duration::from_millis(50),
            max_index_price_age: std::time::Duration::from_secs(30),
        }
    }
}

impl ProposalConfig {
    pub fn with_price_tolerance_ppm(mut self, ppm: u32) -> Self {
        self.price_tolerance_ppm = ppm;
        self
    }

    pub fn with_index_price_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.index_price_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.price_tolerance_ppm == 0 || self.price_tolerance_ppm >= 1_000_000 {
            return Err(ConfigError::InvalidParameter(
                "price tolerance must be within (0, 100%)".into(),
            ));
        }
        if self.index_price_timeout.is_zero() {
            return Err(ConfigError::InvalidParameter(
                "index price timeout must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(feature = "serde")]
mod duration_seconds {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_seconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        i64::deserialize(deserializer).map(Duration::seconds)
    }
}

#[cfg(feature = "serde")]
mod std_duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
