// ============================================================================
// Prices Module
// Oracle price table, local index price cache and smoothed prices
// ============================================================================

use crate::domain::{BlockContext, ProposalConfig};
use crate::interfaces::{IndexPriceFeed, OraclePrices, PriceError, SmoothedPriceUpdater};
use crate::numeric::ONE_MILLION;
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Oracle Prices
// ============================================================================

/// Consensus oracle prices keyed by perpetual id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OraclePriceTable {
    prices: BTreeMap<u32, Decimal>,
}

impl OraclePriceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_price(mut self, perpetual_id: u32, price: Decimal) -> Self {
        self.set_price(perpetual_id, price);
        self
    }

    pub fn set_price(&mut self, perpetual_id: u32, price: Decimal) {
        self.prices.insert(perpetual_id, price);
    }
}

impl OraclePrices for OraclePriceTable {
    fn oracle_price(&self, perpetual_id: u32) -> Option<Decimal> {
        self.prices.get(&perpetual_id).copied()
    }
}

// ============================================================================
// Index Price Cache
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct IndexPricePoint {
    price: u64,
    updated_at: Instant,
}

/// Latest locally observed index prices, written by a price daemon and read
/// by proposal validation.
pub struct IndexPriceCache {
    inner: RwLock<BTreeMap<u32, IndexPricePoint>>,
    max_age: Duration,
}

impl IndexPriceCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            inner: RwLock::new(BTreeMap::new()),
            max_age,
        }
    }

    /// Cache whose staleness bound follows the proposal configuration
    pub fn from_config(config: &ProposalConfig) -> Self {
        Self::new(config.max_index_price_age)
    }

    pub fn update(&self, market_id: u32, price: u64) {
        self.inner.write().insert(
            market_id,
            IndexPricePoint {
                price,
                updated_at: Instant::now(),
            },
        );
    }

    pub fn remove(&self, market_id: u32) {
        self.inner.write().remove(&market_id);
    }
}

impl IndexPriceFeed for IndexPriceCache {
    fn index_price(&self, market_id: u32, timeout: Duration) -> Result<Option<u64>, PriceError> {
        let prices = self
            .inner
            .try_read_for(timeout)
            .ok_or(PriceError::Timeout(timeout))?;

        Ok(prices.get(&market_id).and_then(|point| {
            if point.updated_at.elapsed() > self.max_age {
                tracing::debug!(market_id, "index price is stale");
                None
            } else {
                Some(point.price)
            }
        }))
    }
}

// ============================================================================
// Smoothed Prices
// ============================================================================

/// Exponentially smoothed index prices, stepped once per consensus round.
pub struct SmoothedPrices {
    feed: Arc<dyn IndexPriceFeed>,
    market_ids: Vec<u32>,
    /// Fraction of the gap to the index price closed per step, ppm
    smoothing_ppm: u32,
    timeout: Duration,
    smoothed: RwLock<BTreeMap<u32, u64>>,
}

impl SmoothedPrices {
    pub fn new(feed: Arc<dyn IndexPriceFeed>, market_ids: Vec<u32>, smoothing_ppm: u32) -> Self {
        Self {
            feed,
            market_ids,
            smoothing_ppm,
            timeout: Duration::from_millis(50),
            smoothed: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn smoothed_price(&self, market_id: u32) -> Option<u64> {
        self.smoothed.read().get(&market_id).copied()
    }

    fn step(previous: u64, index: u64, smoothing_ppm: u32) -> u64 {
        let gap = index as i128 - previous as i128;
        let moved = previous as i128 + gap * smoothing_ppm as i128 / ONE_MILLION;
        moved.clamp(0, u64::MAX as i128) as u64
    }
}

impl SmoothedPriceUpdater for SmoothedPrices {
    fn update_smoothed_prices(&self, ctx: &BlockContext) -> Result<(), PriceError> {
        let mut next = BTreeMap::new();
        for &market_id in &self.market_ids {
            if let Some(index) = self.feed.index_price(market_id, self.timeout)? {
                next.insert(market_id, index);
            }
        }

        let mut smoothed = self.smoothed.write();
        for (market_id, index) in next {
            let value = match smoothed.get(&market_id) {
                Some(&previous) => Self::step(previous, index, self.smoothing_ppm),
                None => index,
            };
            smoothed.insert(market_id, value);
        }
        tracing::trace!(height = ctx.height, round = ctx.round, "smoothed prices updated");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_index_cache_staleness() {
        let cache = IndexPriceCache::new(Duration::ZERO);
        cache.update(1, 100);
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(cache.index_price(1, Duration::from_millis(10)), Ok(None));

        let fresh = IndexPriceCache::new(Duration::from_secs(60));
        fresh.update(1, 100);
        assert_eq!(fresh.index_price(1, Duration::from_millis(10)), Ok(Some(100)));
        assert_eq!(fresh.index_price(2, Duration::from_millis(10)), Ok(None));
    }

    #[test]
    fn test_index_cache_times_out_under_writer() {
        let cache = IndexPriceCache::new(Duration::from_secs(60));
        let _writer = cache.inner.write();
        assert_eq!(
            cache.index_price(1, Duration::from_millis(5)),
            Err(PriceError::Timeout(Duration::from_millis(5)))
        );
    }

    #[test]
    fn test_smoothing_moves_toward_index() {
        let cache = Arc::new(IndexPriceCache::new(Duration::from_secs(60)));
        cache.update(0, 1_000);
        let smoothed = SmoothedPrices::new(cache.clone(), vec![0, 1], 500_000);
        let ctx = BlockContext::commit(1, Utc::now());

        smoothed.update_smoothed_prices(&ctx).unwrap();
        assert_eq!(smoothed.smoothed_price(0), Some(1_000));
        assert_eq!(smoothed.smoothed_price(1), None);

        cache.update(0, 2_000);
        smoothed.update_smoothed_prices(&ctx).unwrap();
        assert_eq!(smoothed.smoothed_price(0), Some(1_500));
    }
}
