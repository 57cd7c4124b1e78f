// ============================================================================
// Ledger Module
// In-memory position ledger and the scratch overlay used for replay
// ============================================================================

use crate::domain::{Subaccount, SubaccountId, SubaccountUpdate};
use crate::interfaces::{LedgerError, PositionReader, PositionWriter};
use std::collections::{BTreeMap, BTreeSet};

/// Apply `updates` to copies of the touched subaccounts, returning them only
/// if every update succeeds.
fn stage_updates<R: PositionReader + ?Sized>(
    reader: &R,
    updates: &[SubaccountUpdate],
) -> Result<BTreeMap<SubaccountId, Subaccount>, LedgerError> {
    let mut staged: BTreeMap<SubaccountId, Subaccount> = BTreeMap::new();
    for update in updates {
        let subaccount = staged
            .entry(update.subaccount_id.clone())
            .or_insert_with(|| reader.subaccount(&update.subaccount_id));
        subaccount
            .apply(update)
            .map_err(|source| LedgerError::Arithmetic {
                subaccount_id: update.subaccount_id.clone(),
                source,
            })?;
    }
    Ok(staged)
}

// ============================================================================
// In-Memory Ledger
// ============================================================================

/// Authoritative subaccount balances held in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryLedger {
    subaccounts: BTreeMap<SubaccountId, Subaccount>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, subaccount: Subaccount) {
        self.subaccounts.insert(subaccount.id.clone(), subaccount);
    }

    /// Credit (or debit) quote quantums.
    pub fn deposit(&mut self, id: &SubaccountId, quote_quantums: i128) {
        let subaccount = self
            .subaccounts
            .entry(id.clone())
            .or_insert_with(|| Subaccount::empty(id.clone()));
        subaccount.quote_balance = subaccount.quote_balance.saturating_add(quote_quantums);
    }

    /// Overwrite a perpetual position. Zero removes it.
    pub fn set_position(&mut self, id: &SubaccountId, perpetual_id: u32, size: i128) {
        let subaccount = self
            .subaccounts
            .entry(id.clone())
            .or_insert_with(|| Subaccount::empty(id.clone()));
        if size == 0 {
            subaccount.perpetual_positions.remove(&perpetual_id);
        } else {
            subaccount.perpetual_positions.insert(perpetual_id, size);
        }
    }

    pub fn len(&self) -> usize {
        self.subaccounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subaccounts.is_empty()
    }
}

impl PositionReader for InMemoryLedger {
    fn subaccount(&self, id: &SubaccountId) -> Subaccount {
        self.subaccounts
            .get(id)
            .cloned()
            .unwrap_or_else(|| Subaccount::empty(id.clone()))
    }

    fn subaccounts_with_perpetual_position(&self, perpetual_id: u32) -> Vec<SubaccountId> {
        self.subaccounts
            .values()
            .filter(|subaccount| subaccount.position(perpetual_id) != 0)
            .map(|subaccount| subaccount.id.clone())
            .collect()
    }
}

impl PositionWriter for InMemoryLedger {
    fn apply_updates(&mut self, updates: &[SubaccountUpdate]) -> Result<(), LedgerError> {
        let staged = stage_updates(self, updates)?;
        self.subaccounts.extend(staged);
        Ok(())
    }
}

// ============================================================================
// Ledger Overlay
// ============================================================================

/// Copy-on-write view over a read-only ledger.
///
/// Writes land in the overlay only; dropping it discards them. Used to replay
/// proposals without touching authoritative balances.
pub struct LedgerOverlay<'a, R: PositionReader + ?Sized> {
    base: &'a R,
    dirty: BTreeMap<SubaccountId, Subaccount>,
}

impl<'a, R: PositionReader + ?Sized> LedgerOverlay<'a, R> {
    pub fn new(base: &'a R) -> Self {
        Self {
            base,
            dirty: BTreeMap::new(),
        }
    }

    /// Subaccounts written through this overlay
    pub fn dirty_subaccounts(&self) -> impl Iterator<Item = &Subaccount> {
        self.dirty.values()
    }
}

impl<R: PositionReader + ?Sized> PositionReader for LedgerOverlay<'_, R> {
    fn subaccount(&self, id: &SubaccountId) -> Subaccount {
        match self.dirty.get(id) {
            Some(subaccount) => subaccount.clone(),
            None => self.base.subaccount(id),
        }
    }

    fn subaccounts_with_perpetual_position(&self, perpetual_id: u32) -> Vec<SubaccountId> {
        let mut ids: BTreeSet<SubaccountId> = self
            .base
            .subaccounts_with_perpetual_position(perpetual_id)
            .into_iter()
            .filter(|id| !self.dirty.contains_key(id))
            .collect();
        ids.extend(
            self.dirty
                .values()
                .filter(|subaccount| subaccount.position(perpetual_id) != 0)
                .map(|subaccount| subaccount.id.clone()),
        );
        ids.into_iter().collect()
    }
}

impl<R: PositionReader + ?Sized> PositionWriter for LedgerOverlay<'_, R> {
    fn apply_updates(&mut self, updates: &[SubaccountUpdate]) -> Result<(), LedgerError> {
        let staged = stage_updates(self, updates)?;
        self.dirty.extend(staged);
        Ok(())
    }
}
