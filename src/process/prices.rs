// ============================================================================
// Market Price Admission
// The one validation step that depends on process-local state
// ============================================================================

use super::errors::ProposalError;
use super::txs::MarketPriceUpdate;
use crate::domain::ProposalConfig;
use crate::interfaces::{IndexPriceFeed, PriceError};
use std::time::Instant;

/// True if `proposed` lies within `tolerance_ppm` of `index`.
pub fn within_band(proposed: u64, index: u64, tolerance_ppm: u32) -> bool {
    let distance = u128::from(proposed.abs_diff(index));
    distance * 1_000_000 <= u128::from(index) * u128::from(tolerance_ppm)
}

/// Check every proposed price against the local index price.
///
/// All queries share one deadline of `config.index_price_timeout`; running
/// out of time rejects the proposal.
pub fn validate_market_prices(
    updates: &[MarketPriceUpdate],
    feed: &dyn IndexPriceFeed,
    config: &ProposalConfig,
) -> Result<(), ProposalError> {
    let started = Instant::now();
    for update in updates {
        let remaining = config.index_price_timeout.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            return Err(PriceError::Timeout(config.index_price_timeout).into());
        }

        let index = feed
            .index_price(update.market_id, remaining)?
            .ok_or(ProposalError::MissingIndexPrice {
                market_id: update.market_id,
            })?;
        if !within_band(update.price, index, config.price_tolerance_ppm) {
            return Err(ProposalError::PriceOutOfBand {
                market_id: update.market_id,
                proposed: update.price,
                index,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prices::IndexPriceCache;
    use std::time::Duration;

    fn update(market_id: u32, price: u64) -> MarketPriceUpdate {
        MarketPriceUpdate { market_id, price }
    }

    #[test]
    fn test_band_edges() {
        // 1% of 10_000 is 100
        assert!(within_band(10_100, 10_000, 10_000));
        assert!(within_band(9_900, 10_000, 10_000));
        assert!(!within_band(10_101, 10_000, 10_000));
        assert!(!within_band(1, 0, 10_000));
        assert!(within_band(u64::MAX, u64::MAX, 0));
    }

    #[test]
    fn test_prices_checked_against_cache() {
        let config = ProposalConfig::default();
        let cache = IndexPriceCache::from_config(&config);
        cache.update(0, 10_000);
        cache.update(1, 2_000);

        assert!(validate_market_prices(&[update(0, 10_050), update(1, 2_000)], &cache, &config).is_ok());
        assert_eq!(
            validate_market_prices(&[update(1, 3_000)], &cache, &config),
            Err(ProposalError::PriceOutOfBand {
                market_id: 1,
                proposed: 3_000,
                index: 2_000,
            })
        );
        assert_eq!(
            validate_market_prices(&[update(7, 1)], &cache, &config),
            Err(ProposalError::MissingIndexPrice { market_id: 7 })
        );
    }

    #[test]
    fn test_zero_timeout_rejects() {
        let config = ProposalConfig::default().with_index_price_timeout(Duration::ZERO);
        let cache = IndexPriceCache::from_config(&config);
        cache.update(0, 10_000);
        assert!(matches!(
            validate_market_prices(&[update(0, 10_000)], &cache, &config),
            Err(ProposalError::PriceFeed(PriceError::Timeout(_)))
        ));
    }
}
