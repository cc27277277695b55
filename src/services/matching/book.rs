//! Price-Level Book (C2)
//!
//! One FIFO queue of order ids per fingerprint `(event_id, side, share_type,
//! price)`. Each queue is guarded by its own mutex; there is no global book
//! lock. `acquire` hands back an owned guard the caller can hold across
//! several queue operations (peek/pop/push) — this is the shape the matcher
//! needs to settle a resting order's head without losing the lock between
//! steps. See the lock-ordering rules in the engine module for how callers
//! must sequence acquisitions to stay deadlock-free.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::lock_api::ArcMutexGuard;
use parking_lot::{Mutex, RawMutex};

use crate::models::Fingerprint;

type Queue = Mutex<VecDeque<i64>>;
/// An owned lock guard on one price-level queue. Dropping it releases the
/// queue's mutex; callers should drop it promptly between price-level
/// transitions rather than holding two of these at once.
pub type QueueGuard = ArcMutexGuard<RawMutex, VecDeque<i64>>;

pub struct PriceLevelBook {
    queues: DashMap<Fingerprint, Arc<Queue>>,
}

impl PriceLevelBook {
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
        }
    }

    fn queue_for(&self, fp: Fingerprint) -> Arc<Queue> {
        self.queues
            .entry(fp)
            .or_insert_with(|| Arc::new(Mutex::new(VecDeque::new())))
            .clone()
    }

    /// Block until the queue's lock is held, returning an owned guard.
    pub fn acquire(&self, fp: Fingerprint) -> QueueGuard {
        let queue = self.queue_for(fp);
        Mutex::lock_arc(&queue)
    }

    /// Non-blocking variant used by the retry loop around `LockTimeout`.
    pub fn try_acquire(&self, fp: Fingerprint) -> Option<QueueGuard> {
        let queue = self.queue_for(fp);
        Mutex::try_lock_arc(&queue)
    }

    pub fn push_tail(guard: &mut QueueGuard, order_id: i64) {
        guard.push_back(order_id);
    }

    pub fn peek_head(guard: &QueueGuard) -> Option<i64> {
        guard.front().copied()
    }

    pub fn pop_head(guard: &mut QueueGuard) -> Option<i64> {
        guard.pop_front()
    }

    pub fn is_empty(guard: &QueueGuard) -> bool {
        guard.is_empty()
    }

    /// Remove a specific id from the queue (used by `cancel_order`, which
    /// rarely targets the head). Linear scan.
    pub fn remove_id(guard: &mut QueueGuard, order_id: i64) -> bool {
        if let Some(pos) = guard.iter().position(|&id| id == order_id) {
            guard.remove(pos);
            true
        } else {
            false
        }
    }

    /// Discard all ids in this queue without touching the backing orders.
    /// Only the event-resolution drain should call this.
    pub fn drain(&self, fp: Fingerprint) -> Vec<i64> {
        let mut guard = self.acquire(fp);
        guard.drain(..).collect()
    }

    /// All fingerprints for `event_id` currently tracked, in a stable order
    /// (ascending by price, BUY before SELL, YES before NO) — used by the
    /// projector and by the drain to acquire locks in a canonical order.
    pub fn fingerprints_for_event(&self, event_id: i64) -> Vec<Fingerprint> {
        let mut fps: Vec<Fingerprint> = self
            .queues
            .iter()
            .map(|entry| *entry.key())
            .filter(|fp| fp.event_id == event_id)
            .collect();
        fps.sort_by_key(|fp| (fp.share_type.to_string(), fp.side.to_string(), fp.price));
        fps
    }
}

impl Default for PriceLevelBook {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Side, ShareType};

    fn fp(price: i32, side: Side) -> Fingerprint {
        Fingerprint {
            event_id: 1,
            side,
            share_type: ShareType::Yes,
            price,
        }
    }

    #[test]
    fn push_peek_pop_is_fifo() {
        let book = PriceLevelBook::new();
        let f = fp(5, Side::Buy);
        let mut guard = book.acquire(f);
        PriceLevelBook::push_tail(&mut guard, 1);
        PriceLevelBook::push_tail(&mut guard, 2);
        assert_eq!(PriceLevelBook::peek_head(&guard), Some(1));
        assert_eq!(PriceLevelBook::pop_head(&mut guard), Some(1));
        assert_eq!(PriceLevelBook::peek_head(&guard), Some(2));
    }

    #[test]
    fn remove_id_mid_queue() {
        let book = PriceLevelBook::new();
        let f = fp(5, Side::Sell);
        let mut guard = book.acquire(f);
        PriceLevelBook::push_tail(&mut guard, 1);
        PriceLevelBook::push_tail(&mut guard, 2);
        PriceLevelBook::push_tail(&mut guard, 3);
        assert!(PriceLevelBook::remove_id(&mut guard, 2));
        assert_eq!(guard.iter().copied().collect::<Vec<_>>(), vec![1, 3]);
        assert!(!PriceLevelBook::remove_id(&mut guard, 2));
    }

    #[test]
    fn drain_empties_and_returns_ids() {
        let book = PriceLevelBook::new();
        let f = fp(5, Side::Buy);
        {
            let mut guard = book.acquire(f);
            PriceLevelBook::push_tail(&mut guard, 1);
            PriceLevelBook::push_tail(&mut guard, 2);
        }
        let drained = book.drain(f);
        assert_eq!(drained, vec![1, 2]);
        let guard = book.acquire(f);
        assert!(PriceLevelBook::is_empty(&guard));
    }

    #[test]
    fn fingerprints_for_event_filters_and_sorts() {
        let book = PriceLevelBook::new();
        book.acquire(fp(3, Side::Buy));
        book.acquire(fp(1, Side::Buy));
        book.acquire(Fingerprint {
            event_id: 2,
            side: Side::Buy,
            share_type: ShareType::Yes,
            price: 9,
        });
        let fps = book.fingerprints_for_event(1);
        assert_eq!(fps.len(), 2);
        assert_eq!(fps[0].price, 1);
        assert_eq!(fps[1].price, 3);
    }
}
