//! Order Store (C1)
//!
//! The single owner of live order records. Orders rest here from the moment
//! `submit_order` creates them until they reach a terminal state and are
//! handed to the persistence boundary. Callers that mutate a resting order's
//! `filled_quantity`/`status` must already hold that order's price-level
//! queue lock (see `book.rs`); this store only guarantees per-id atomicity,
//! not cross-order ordering.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use dashmap::DashMap;

use crate::models::{Order, OrderStatus};
use crate::services::matching::types::MatchingError;

/// In-memory map of live (non-terminal, or mid-match) orders keyed by id.
pub struct OrderStore {
    orders: DashMap<i64, Order>,
    next_id: AtomicI64,
}

impl OrderStore {
    pub fn new() -> Self {
        Self {
            orders: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    /// Seed the id generator after recovery, so freshly submitted orders
    /// never collide with ids rehydrated from the database.
    pub fn fast_forward_id(&self, at_least: i64) {
        let mut cur = self.next_id.load(Ordering::SeqCst);
        while cur < at_least {
            match self
                .next_id
                .compare_exchange(cur, at_least, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
    }

    pub fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Insert a brand-new order. Panics (a programmer error, not a runtime
    /// one) if the id already exists.
    pub fn put(&self, order: Order) {
        let id = order.id;
        if self.orders.insert(id, order).is_some() {
            panic!("order id {id} inserted twice into the order store");
        }
    }

    pub fn get(&self, id: i64) -> Option<Order> {
        self.orders.get(&id).map(|r| r.clone())
    }

    /// Apply `mutator` to the order's fields, re-deriving `status` from the
    /// resulting `filled_quantity`/`total_quantity` and bumping `updated_at`.
    /// Returns the updated order, or `NotFound` if the id isn't resident.
    pub fn update<F>(&self, id: i64, mutator: F) -> Result<Order, MatchingError>
    where
        F: FnOnce(&mut Order),
    {
        let mut entry = self
            .orders
            .get_mut(&id)
            .ok_or(MatchingError::OrderNotFound(id))?;
        mutator(&mut entry);
        entry.status = OrderStatus::for_fill(entry.filled_quantity, entry.total_quantity);
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    /// Remove a terminal order from the store. Returns it so the caller can
    /// hand it to the persistence boundary.
    pub fn remove(&self, id: i64) -> Option<Order> {
        self.orders.remove(&id).map(|(_, o)| o)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.orders.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }
}

impl Default for OrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Side, ShareType};

    fn sample(id: i64) -> Order {
        let now = Utc::now();
        Order {
            id,
            user_id: 1,
            event_id: 1,
            side: Side::Buy,
            share_type: ShareType::Yes,
            price: 5,
            total_quantity: 10,
            filled_quantity: 0,
            status: OrderStatus::Incomplete,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn put_get_remove_roundtrip() {
        let store = OrderStore::new();
        store.put(sample(1));
        assert!(store.contains(1));
        assert_eq!(store.get(1).unwrap().id, 1);
        let removed = store.remove(1).unwrap();
        assert_eq!(removed.id, 1);
        assert!(store.get(1).is_none());
    }

    #[test]
    fn update_rederives_status() {
        let store = OrderStore::new();
        store.put(sample(1));
        let updated = store
            .update(1, |o| o.filled_quantity = 10)
            .expect("order present");
        assert_eq!(updated.status, OrderStatus::CompletelyFilled);
    }

    #[test]
    fn update_missing_id_is_not_found() {
        let store = OrderStore::new();
        let err = store.update(99, |_| {}).unwrap_err();
        assert!(matches!(err, MatchingError::OrderNotFound(99)));
    }

    #[test]
    fn next_id_is_monotonic_and_fast_forward_moves_only_up() {
        let store = OrderStore::new();
        let a = store.next_id();
        let b = store.next_id();
        assert!(b > a);
        store.fast_forward_id(1000);
        assert_eq!(store.next_id(), 1000);
        store.fast_forward_id(5);
        assert_eq!(store.next_id(), 1001);
    }
}
