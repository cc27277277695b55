//! In-memory balance and portfolio stores.
//!
//! These back the synchronous half of Settlement (C4): every fill debits one
//! balance, credits another, and adjusts two portfolio rows, all before the
//! matcher's call returns. The relational copies are kept current by the
//! write-behind worker in `db::persistence`, not by these stores directly.

use dashmap::DashMap;

use crate::models::{PortfolioKey, ShareType};
use crate::services::matching::types::MatchingError;

pub struct BalanceStore {
    balances: DashMap<i64, i64>,
}

impl BalanceStore {
    pub fn new() -> Self {
        Self {
            balances: DashMap::new(),
        }
    }

    pub fn get(&self, user_id: i64) -> i64 {
        self.balances.get(&user_id).map(|b| *b).unwrap_or(0)
    }

    pub fn credit(&self, user_id: i64, amount: i64) -> i64 {
        let mut entry = self.balances.entry(user_id).or_insert(0);
        *entry += amount;
        *entry
    }

    /// Debit `amount`, refusing to drive the balance negative — a user's
    /// `current_balance` is never negative.
    pub fn debit(&self, user_id: i64, amount: i64) -> Result<i64, MatchingError> {
        let mut entry = self.balances.entry(user_id).or_insert(0);
        if *entry < amount {
            return Err(MatchingError::InsufficientBalance(user_id));
        }
        *entry -= amount;
        Ok(*entry)
    }
}

impl Default for BalanceStore {
    fn default() -> Self {
        Self::new()
    }
}

pub struct PortfolioStore {
    quantities: DashMap<PortfolioKey, i32>,
}

impl PortfolioStore {
    pub fn new() -> Self {
        Self {
            quantities: DashMap::new(),
        }
    }

    pub fn get(&self, key: PortfolioKey) -> i32 {
        self.quantities.get(&key).map(|q| *q).unwrap_or(0)
    }

    pub fn increment(&self, user_id: i64, event_id: i64, share_type: ShareType, quantity: i32) -> i32 {
        let key = PortfolioKey {
            user_id,
            event_id,
            share_type,
        };
        let mut entry = self.quantities.entry(key).or_insert(0);
        *entry += quantity;
        *entry
    }

    /// Decrement is intentionally unclamped: short-selling (selling shares a
    /// user doesn't hold) is not enforced at this layer, so a seller's
    /// portfolio can go negative. See the open-question resolution in
    /// DESIGN.md — this mirrors the behavior being re-architected here.
    pub fn decrement(&self, user_id: i64, event_id: i64, share_type: ShareType, quantity: i32) -> i32 {
        let key = PortfolioKey {
            user_id,
            event_id,
            share_type,
        };
        let mut entry = self.quantities.entry(key).or_insert(0);
        *entry -= quantity;
        *entry
    }

    pub fn set(&self, key: PortfolioKey, quantity: i32) {
        self.quantities.insert(key, quantity);
    }

    /// All rows for `event_id`, used by the resolution drain.
    pub fn entries_for_event(&self, event_id: i64) -> Vec<(PortfolioKey, i32)> {
        self.quantities
            .iter()
            .filter(|e| e.key().event_id == event_id)
            .map(|e| (*e.key(), *e.value()))
            .collect()
    }
}

impl Default for PortfolioStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credit_debit_roundtrip() {
        let store = BalanceStore::new();
        store.credit(1, 100);
        assert_eq!(store.get(1), 100);
        let after = store.debit(1, 40).unwrap();
        assert_eq!(after, 60);
    }

    #[test]
    fn debit_below_zero_is_insufficient_balance() {
        let store = BalanceStore::new();
        store.credit(1, 10);
        let err = store.debit(1, 11).unwrap_err();
        assert!(matches!(err, MatchingError::InsufficientBalance(1)));
    }

    #[test]
    fn portfolio_increment_and_decrement() {
        let store = PortfolioStore::new();
        let q = store.increment(1, 1, ShareType::Yes, 5);
        assert_eq!(q, 5);
        let q = store.decrement(1, 1, ShareType::Yes, 2);
        assert_eq!(q, 3);
    }

    #[test]
    fn decrement_below_zero_is_allowed() {
        let store = PortfolioStore::new();
        let q = store.decrement(1, 1, ShareType::Yes, 3);
        assert_eq!(q, -3);
    }
}
