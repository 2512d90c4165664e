//! Per-day, per-validator, per-token incentive totals.
use std::collections::{BTreeMap, BTreeSet};

use alloy_primitives::{Address, U256};
use chrono::NaiveDate;

use crate::validator::Pubkey;

/// Token address to accumulated raw amount.
pub type TokenTotals = BTreeMap<Address, U256>;

/// `date -> validator -> token -> amount`, accumulated in integer units.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IncentiveLedger {
    days: BTreeMap<NaiveDate, BTreeMap<Pubkey, TokenTotals>>,
}

impl IncentiveLedger {
    /// An empty ledger.
    pub const fn new() -> Self {
        Self { days: BTreeMap::new() }
    }

    /// Add `amount` of `token` to the cell for `(date, validator)`.
    pub fn add(&mut self, date: NaiveDate, validator: Pubkey, token: Address, amount: U256) {
        let cell = self
            .days
            .entry(date)
            .or_default()
            .entry(validator)
            .or_default()
            .entry(token)
            .or_insert(U256::ZERO);
        *cell = cell.saturating_add(amount);
    }

    /// Fold another ledger into this one.
    pub fn merge(&mut self, other: Self) {
        for (date, validators) in other.days {
            for (validator, tokens) in validators {
                for (token, amount) in tokens {
                    self.add(date, validator, token, amount);
                }
            }
        }
    }

    /// Totals of one validator on one day.
    pub fn get(&self, date: NaiveDate, validator: &Pubkey) -> Option<&TokenTotals> {
        self.days.get(&date)?.get(validator)
    }

    /// Every token seen anywhere in the ledger.
    pub fn tokens(&self) -> BTreeSet<Address> {
        self.days
            .values()
            .flat_map(|validators| validators.values())
            .flat_map(|tokens| tokens.keys().copied())
            .collect()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}
