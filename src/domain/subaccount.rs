// ============================================================================
// Subaccount Domain Model
// ============================================================================

use crate::numeric::{NumericError, NumericResult};
use smallvec::SmallVec;
use std::collections::BTreeMap;
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Identity of a margin account: owner address plus subaccount number.
///
/// Ordering is (owner, number) and is relied on wherever subaccounts are
/// iterated or ranked, so it must stay total.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SubaccountId {
    pub owner: String,
    pub number: u32,
}

impl SubaccountId {
    pub fn new(owner: impl Into<String>, number: u32) -> Self {
        Self {
            owner: owner.into(),
            number,
        }
    }
}

impl fmt::Display for SubaccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.number)
    }
}

/// Balances of one subaccount as seen by the matching core.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Subaccount {
    pub id: SubaccountId,
    /// Quote asset balance in quote quantums (may be negative)
    pub quote_balance: i128,
    /// Signed perpetual position sizes in base quantums, keyed by perpetual id
    pub perpetual_positions: BTreeMap<u32, i128>,
}

impl Subaccount {
    pub fn empty(id: SubaccountId) -> Self {
        Self {
            id,
            quote_balance: 0,
            perpetual_positions: BTreeMap::new(),
        }
    }

    pub fn position(&self, perpetual_id: u32) -> i128 {
        self.perpetual_positions
            .get(&perpetual_id)
            .copied()
            .unwrap_or(0)
    }

    /// Apply an update in place. Zero-sized positions are dropped.
    pub fn apply(&mut self, update: &SubaccountUpdate) -> NumericResult<()> {
        self.quote_balance = self
            .quote_balance
            .checked_add(update.quote_delta)
            .ok_or(NumericError::Overflow)?;

        for (perpetual_id, delta) in update.perpetual_deltas.iter() {
            let next = self
                .position(*perpetual_id)
                .checked_add(*delta)
                .ok_or(NumericError::Overflow)?;
            if next == 0 {
                self.perpetual_positions.remove(perpetual_id);
            } else {
                self.perpetual_positions.insert(*perpetual_id, next);
            }
        }

        Ok(())
    }
}

/// Hypothetical or committed change to one subaccount.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SubaccountUpdate {
    pub subaccount_id: SubaccountId,
    pub quote_delta: i128,
    pub perpetual_deltas: SmallVec<[(u32, i128); 2]>,
}

impl SubaccountUpdate {
    pub fn new(subaccount_id: SubaccountId) -> Self {
        Self {
            subaccount_id,
            quote_delta: 0,
            perpetual_deltas: SmallVec::new(),
        }
    }

    pub fn with_quote_delta(mut self, delta: i128) -> Self {
        self.quote_delta += delta;
        self
    }

    pub fn with_perpetual_delta(mut self, perpetual_id: u32, delta: i128) -> Self {
        self.add_perpetual_delta(perpetual_id, delta);
        self
    }

    pub fn add_perpetual_delta(&mut self, perpetual_id: u32, delta: i128) {
        match self
            .perpetual_deltas
            .iter_mut()
            .find(|(id, _)| *id == perpetual_id)
        {
            Some((_, existing)) => *existing += delta,
            None => self.perpetual_deltas.push((perpetual_id, delta)),
        }
    }

    /// Fold another update for the same subaccount into this one.
    pub fn merge(&mut self, other: &SubaccountUpdate) {
        debug_assert_eq!(self.subaccount_id, other.subaccount_id);
        self.quote_delta += other.quote_delta;
        for (perpetual_id, delta) in other.perpetual_deltas.iter() {
            self.add_perpetual_delta(*perpetual_id, *delta);
        }
    }
}

/// Outcome of a collateralization check for one subaccount.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum UpdateResult {
    Success,
    /// Collateralized before the update, undercollateralized after it
    NewlyUndercollateralized,
    /// Undercollateralized both before and after the update
    StillUndercollateralized,
}

impl UpdateResult {
    pub fn is_success(&self) -> bool {
        matches!(self, UpdateResult::Success)
    }
}
