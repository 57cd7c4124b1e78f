// ============================================================================
// Order Fill Amounts
// Cumulative filled quantums per order, with height-based pruning
// ============================================================================

use crate::domain::{OrderFillAmount, OrderId};
use crate::numeric::{BaseQuantums, NumericResult};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FillAmountStore {
    records: BTreeMap<OrderId, OrderFillAmount>,
    /// Prunable height -> orders that may become prunable there
    prunable: BTreeMap<u32, BTreeSet<OrderId>>,
}

impl FillAmountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, order_id: &OrderId) -> Option<&OrderFillAmount> {
        self.records.get(order_id)
    }

    /// Filled quantums so far; zero for unknown orders.
    pub fn fill_amount(&self, order_id: &OrderId) -> BaseQuantums {
        self.records
            .get(order_id)
            .map(|record| record.fill_amount)
            .unwrap_or(BaseQuantums::ZERO)
    }

    /// Add a fill and return the new cumulative amount.
    ///
    /// The prunable height only ever moves later, so a replacement order
    /// with a later expiry keeps its record alive.
    pub fn add_fill(
        &mut self,
        order_id: &OrderId,
        fill: BaseQuantums,
        prunable_block_height: Option<u32>,
    ) -> NumericResult<BaseQuantums> {
        let record = self
            .records
            .entry(order_id.clone())
            .or_insert(OrderFillAmount {
                fill_amount: BaseQuantums::ZERO,
                prunable_block_height,
            });
        record.fill_amount = record.fill_amount.checked_add(fill)?;

        if let Some(height) = prunable_block_height {
            let current = record.prunable_block_height.unwrap_or(height).max(height);
            record.prunable_block_height = Some(current);
            self.prunable
                .entry(current)
                .or_default()
                .insert(order_id.clone());
        }

        Ok(record.fill_amount)
    }

    pub fn remove(&mut self, order_id: &OrderId) -> Option<OrderFillAmount> {
        self.records.remove(order_id)
    }

    /// Drop every record whose prunable height is at or below `height`.
    pub fn prune(&mut self, height: u32) -> Vec<OrderId> {
        let due: Vec<u32> = self.prunable.range(..=height).map(|(h, _)| *h).collect();
        let mut pruned = Vec::new();
        for bucket in due {
            let Some(order_ids) = self.prunable.remove(&bucket) else {
                continue;
            };
            for order_id in order_ids {
                let expired = self
                    .records
                    .get(&order_id)
                    .and_then(|record| record.prunable_block_height)
                    .is_some_and(|prunable| prunable <= height);
                if expired {
                    self.records.remove(&order_id);
                    pruned.push(order_id);
                }
            }
        }
        pruned
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClobPairId, OrderFlags, SubaccountId};

    fn id(client_id: u32) -> OrderId {
        OrderId::new(
            SubaccountId::new("alice", 0),
            client_id,
            OrderFlags::ShortTerm,
            ClobPairId(0),
        )
    }

    #[test]
    fn test_fills_accumulate() {
        let mut store = FillAmountStore::new();
        store.add_fill(&id(1), BaseQuantums::new(3), Some(30)).unwrap();
        let total = store.add_fill(&id(1), BaseQuantums::new(4), Some(30)).unwrap();

        assert_eq!(total, BaseQuantums::new(7));
        assert_eq!(store.fill_amount(&id(1)), BaseQuantums::new(7));
        assert_eq!(store.fill_amount(&id(2)), BaseQuantums::ZERO);
    }

    #[test]
    fn test_prune_respects_latest_height() {
        let mut store = FillAmountStore::new();
        store.add_fill(&id(1), BaseQuantums::new(1), Some(10)).unwrap();
        store.add_fill(&id(1), BaseQuantums::new(1), Some(25)).unwrap();
        store.add_fill(&id(2), BaseQuantums::new(1), Some(12)).unwrap();

        assert_eq!(store.prune(15), vec![id(2)]);
        assert_eq!(store.fill_amount(&id(1)), BaseQuantums::new(2));

        assert_eq!(store.prune(25), vec![id(1)]);
        assert!(store.is_empty());
    }

    #[test]
    fn test_stateful_records_never_pruned_by_height() {
        let mut store = FillAmountStore::new();
        store.add_fill(&id(9), BaseQuantums::new(5), None).unwrap();
        assert!(store.prune(u32::MAX).is_empty());
        assert_eq!(store.len(), 1);
    }
}
