//! Matching Engine (C3)
//!
//! `submit_order` is the single entry point for new order flow; `cancel_order`
//! and `resolve_event` are the only other mutators of book state. The engine
//! owns no database handle — settlement and persistence are pushed onto the
//! write-behind path via `EngineEvent` broadcasts, exactly as the component
//! design requires: the matcher's critical path never suspends on I/O.

use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::{error, info, instrument, warn};

use crate::models::{EventStatus, Fingerprint, Order, OrderStatus, Side};
use crate::services::matching::book::{PriceLevelBook, QueueGuard};
use crate::services::matching::order_store::OrderStore;
use crate::services::matching::types::{EngineEvent, MatchingError, OrderResult};
use crate::services::settlement::Settlement;

const EVENT_CHANNEL_CAPACITY: usize = 4096;

pub struct EngineConfig {
    pub lock_timeout: Duration,
    pub lock_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(50),
            lock_retries: 3,
        }
    }
}

pub struct MatchingEngine {
    orders: OrderStore,
    book: PriceLevelBook,
    settlement: Settlement,
    /// In-memory cache of event acceptance state; the durable record lives in
    /// the `events` table. Absent entries are treated as `Ongoing` so a
    /// freshly created event accepts orders without a separate activation
    /// call.
    event_status: DashMap<i64, EventStatus>,
    /// Events the persistence worker has reported a durable-write failure
    /// for, keyed to the reason. A halted event refuses further submissions
    /// until an operator clears it — the in-memory and relational views of
    /// its trades/balances/portfolios can no longer be trusted to agree.
    halted: DashMap<i64, String>,
    events_tx: broadcast::Sender<EngineEvent>,
    config: EngineConfig,
    rejected_submissions: AtomicU32,
}

impl MatchingEngine {
    pub fn new(settlement: Settlement, config: EngineConfig) -> Self {
        let (events_tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            orders: OrderStore::new(),
            book: PriceLevelBook::new(),
            settlement,
            event_status: DashMap::new(),
            halted: DashMap::new(),
            events_tx,
            config,
            rejected_submissions: AtomicU32::new(0),
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EngineEvent> {
        self.events_tx.subscribe()
    }

    fn emit(&self, event: EngineEvent) {
        // No subscribers is not an error: the persistence worker and hub may
        // not have attached yet during early startup/recovery.
        let _ = self.events_tx.send(event);
    }

    pub fn order_store(&self) -> &OrderStore {
        &self.orders
    }

    pub fn settlement(&self) -> &Settlement {
        &self.settlement
    }

    pub fn book(&self) -> &PriceLevelBook {
        &self.book
    }

    pub fn set_event_status(&self, event_id: i64, status: EventStatus) {
        self.event_status.insert(event_id, status);
    }

    pub fn event_status(&self, event_id: i64) -> EventStatus {
        self.event_status
            .get(&event_id)
            .map(|v| *v)
            .unwrap_or(EventStatus::Ongoing)
    }

    fn ensure_accepting(&self, event_id: i64) -> Result<(), MatchingError> {
        if let Some(reason) = self.halted.get(&event_id) {
            return Err(MatchingError::SettlementFailure {
                event_id,
                reason: reason.clone(),
            });
        }
        if self.event_status(event_id) == EventStatus::Completed {
            return Err(MatchingError::EventNotAccepting(event_id));
        }
        Ok(())
    }

    /// Called by the persistence worker when a durable write it considers
    /// load-bearing (a settlement's trade/balance/portfolio rows) fails.
    /// Halts the event: further submissions are refused until an operator
    /// clears the underlying problem and restarts the process.
    pub fn halt_event(&self, event_id: i64, reason: String) {
        error!(event_id, %reason, "halting event after settlement persistence failure");
        self.halted.insert(event_id, reason);
    }

    fn validate(price: i32, total_quantity: i32) -> Result<(), MatchingError> {
        if !(1..=10).contains(&price) {
            return Err(MatchingError::InvalidPrice(price));
        }
        if total_quantity <= 0 {
            return Err(MatchingError::InvalidQuantity(total_quantity));
        }
        Ok(())
    }

    /// Scan opposing prices in improvement order for `order`, returning
    /// the first non-empty fingerprint, or `None` if the book holds no
    /// crossable inventory.
    fn best_queue(&self, event_id: i64, side: Side, share_type: crate::models::ShareType, price: i32) -> Option<Fingerprint> {
        let opposite = side.opposite();
        let prices: Box<dyn Iterator<Item = i32>> = match side {
            Side::Buy => Box::new(1..=price),
            Side::Sell => Box::new((price..=10).rev()),
        };
        for q in prices {
            let fp = Fingerprint {
                event_id,
                side: opposite,
                share_type,
                price: q,
            };
            if let Some(guard) = self.book.try_acquire(fp) {
                if !PriceLevelBook::is_empty(&guard) {
                    return Some(fp);
                }
            }
        }
        None
    }

    /// Acquire `fp` with bounded retry/backoff; surfaces `LockTimeout` once
    /// the retry budget is exhausted.
    fn acquire_with_retry(&self, fp: Fingerprint) -> Result<QueueGuard, MatchingError> {
        let mut attempt = 0;
        loop {
            if let Some(guard) = self.book.try_acquire(fp) {
                return Ok(guard);
            }
            attempt += 1;
            if attempt > self.config.lock_retries {
                warn!(%fp, attempt, "lock acquisition exhausted retry budget");
                return Err(MatchingError::LockTimeout(fp.to_string(), attempt));
            }
            warn!(%fp, attempt, "retrying queue lock acquisition");
            thread::sleep(self.config.lock_timeout);
        }
    }

    /// The single entry point for new order flow. Pre-trade validation
    /// (price/quantity range) happens here; balance/portfolio pre-checks are
    /// the caller's responsibility.
    #[instrument(skip(self), fields(event_id, side = %order_req_side(side), price, total_quantity))]
    pub fn submit_order(
        &self,
        user_id: i64,
        event_id: i64,
        side: Side,
        share_type: crate::models::ShareType,
        price: i32,
        total_quantity: i32,
    ) -> Result<OrderResult, MatchingError> {
        Self::validate(price, total_quantity)?;
        self.ensure_accepting(event_id)?;

        let now = chrono::Utc::now();
        let id = self.orders.next_id();
        let mut taker = Order {
            id,
            user_id,
            event_id,
            side,
            share_type,
            price,
            total_quantity,
            filled_quantity: 0,
            status: OrderStatus::Incomplete,
            created_at: now,
            updated_at: now,
        };
        self.orders.put(taker.clone());
        self.emit(EngineEvent::OrderCreated(taker.clone()));

        let mut trades = Vec::new();

        while taker.filled_quantity < taker.total_quantity {
            let Some(fp) = self.best_queue(event_id, taker.side, taker.share_type, taker.price) else {
                break;
            };

            let mut guard = self.acquire_with_retry(fp)?;

            while !PriceLevelBook::is_empty(&guard) && taker.filled_quantity < taker.total_quantity {
                let maker_id = match PriceLevelBook::peek_head(&guard) {
                    Some(id) => id,
                    None => break,
                };
                let Some(maker) = self.orders.get(maker_id) else {
                    // Maker vanished without being popped: a store/queue
                    // desync, which is an invariant violation.
                    return Err(MatchingError::Internal(format!(
                        "queue head {maker_id} has no backing order"
                    )));
                };

                let quantity = std::cmp::min(maker.remaining(), taker.remaining());
                let record = self
                    .settlement
                    .settle_fill(&maker, &taker, quantity, maker.price)?;

                let maker_after = self
                    .orders
                    .update(maker.id, |o| o.filled_quantity += quantity)?;
                taker.filled_quantity += quantity;
                taker.status = OrderStatus::for_fill(taker.filled_quantity, taker.total_quantity);
                // Sync the taker's own record after every fill, not just once
                // the loop exits: if a later fill errors, the order already
                // reflects everything settled before that error.
                self.orders
                    .update(taker.id, |o| o.filled_quantity = taker.filled_quantity)?;

                trades.push(record.trade.clone());
                self.emit(EngineEvent::Settled(Box::new(record)));

                if maker_after.status.is_terminal() {
                    PriceLevelBook::pop_head(&mut guard);
                    if let Some(terminal) = self.orders.remove(maker_after.id) {
                        info!(order_id = terminal.id, "maker order fully filled");
                        self.emit(EngineEvent::OrderTerminal(terminal));
                    }
                }
            }
            drop(guard);
        }

        let result = if taker.filled_quantity == taker.total_quantity {
            let terminal = self
                .orders
                .remove(taker.id)
                .ok_or_else(|| MatchingError::Internal("taker vanished before terminal removal".into()))?;
            self.emit(EngineEvent::OrderTerminal(terminal));
            OrderResult::FullyFilled {
                order_id: taker.id,
                trades,
            }
        } else {
            let own_fp = Fingerprint {
                event_id,
                side,
                share_type,
                price,
            };
            let mut guard = self.acquire_with_retry(own_fp)?;
            PriceLevelBook::push_tail(&mut guard, taker.id);
            drop(guard);

            if trades.is_empty() {
                OrderResult::Resting { order_id: taker.id }
            } else {
                OrderResult::PartiallyFilled {
                    order_id: taker.id,
                    trades,
                    resting_id: taker.id,
                }
            }
        };

        self.emit(EngineEvent::BookChanged { event_id });
        Ok(result)
    }

    /// Acquire the resting order's own queue lock, remove it by linear scan,
    /// mark it cancelled, and hand it off for persistence.
    #[instrument(skip(self))]
    pub fn cancel_order(&self, order_id: i64, requester_id: i64) -> Result<(), MatchingError> {
        let order = self
            .orders
            .get(order_id)
            .ok_or(MatchingError::OrderNotFound(order_id))?;
        if order.user_id != requester_id {
            return Err(MatchingError::Authorization {
                user_id: requester_id,
                order_id,
            });
        }
        if order.status.is_terminal() {
            return Err(MatchingError::OrderNotFound(order_id));
        }

        let fp = order.fingerprint();
        let mut guard = self.acquire_with_retry(fp)?;
        crate::services::matching::book::PriceLevelBook::remove_id(&mut guard, order_id);
        drop(guard);

        self.orders.update(order_id, |o| o.status = OrderStatus::Cancelled)?;
        if let Some(terminal) = self.orders.remove(order_id) {
            self.emit(EngineEvent::OrderTerminal(terminal));
        }
        self.emit(EngineEvent::BookChanged {
            event_id: order.event_id,
        });
        Ok(())
    }

    pub fn get_order(&self, order_id: i64) -> Option<Order> {
        self.orders.get(order_id)
    }

    /// Reject further submissions, cancel and drain every queue for
    /// `event`, then settle every non-zero portfolio row against the
    /// operator account. Returns the synthetic settlement records so the
    /// caller can persist them.
    #[instrument(skip(self, event))]
    pub fn resolve_event(
        &self,
        event: &crate::models::Event,
        result: crate::models::EventResult,
        operator_user_id: i64,
    ) -> Result<Vec<crate::services::matching::types::SettlementRecord>, MatchingError> {
        self.set_event_status(event.id, EventStatus::Completed);

        for fp in self.book.fingerprints_for_event(event.id) {
            let ids = self.book.drain(fp);
            for id in ids {
                if let Ok(updated) = self.orders.update(id, |o| o.status = OrderStatus::Cancelled) {
                    if let Some(terminal) = self.orders.remove(updated.id) {
                        self.emit(EngineEvent::OrderTerminal(terminal));
                    }
                }
            }
        }

        let records = self.settlement.resolve_drain(event, result, operator_user_id);
        for record in &records {
            self.emit(EngineEvent::Settled(Box::new(record.clone())));
        }
        self.emit(EngineEvent::EventResolved { event_id: event.id });
        info!(event_id = event.id, trades = records.len(), "event resolution drain complete");
        Ok(records)
    }

    /// Rehydrate a non-terminal order recovered from the database straight
    /// into C1 and its queue, without running it through the matcher. Caller
    /// must present orders in ascending id order within each price level to
    /// preserve FIFO.
    pub fn rehydrate(&self, order: Order) -> Result<(), MatchingError> {
        if order.status.is_terminal() {
            return Err(MatchingError::Internal(format!(
                "attempted to rehydrate terminal order {}",
                order.id
            )));
        }
        self.orders.fast_forward_id(order.id + 1);
        let fp = order.fingerprint();
        let id = order.id;
        self.orders.put(order);
        let mut guard = self.acquire_with_retry(fp)?;
        PriceLevelBook::push_tail(&mut guard, id);
        Ok(())
    }

    /// Advance the settlement layer's trade id generator past whatever is
    /// already persisted, mirroring `OrderStore::fast_forward_id` for orders.
    pub fn fast_forward_trade_id(&self, at_least: i64) {
        self.settlement.fast_forward_trade_id(at_least);
    }

    pub fn rejected_submission_count(&self) -> u32 {
        self.rejected_submissions.load(Ordering::Relaxed)
    }

    pub fn note_rejected(&self) {
        self.rejected_submissions.fetch_add(1, Ordering::Relaxed);
    }
}

fn order_req_side(side: Side) -> &'static str {
    match side {
        Side::Buy => "buy",
        Side::Sell => "sell",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ShareType;
    use crate::services::settlement::Settlement;
    use crate::services::stores::{BalanceStore, PortfolioStore};

    fn engine() -> MatchingEngine {
        let balances = BalanceStore::new();
        balances.credit(1, 1_000);
        balances.credit(2, 1_000);
        let portfolios = PortfolioStore::new();
        let settlement = Settlement::new(balances, portfolios);
        MatchingEngine::new(settlement, EngineConfig::default())
    }

    #[test]
    fn resting_order_on_empty_book() {
        let engine = engine();
        let result = engine
            .submit_order(1, 1, Side::Buy, ShareType::Yes, 6, 10)
            .unwrap();
        assert!(matches!(result, OrderResult::Resting { .. }));
        assert!(result.trades().is_empty());
    }

    #[test]
    fn full_cross_against_single_maker() {
        let engine = engine();
        engine
            .submit_order(2, 1, Side::Sell, ShareType::Yes, 4, 10)
            .unwrap();
        let result = engine
            .submit_order(1, 1, Side::Buy, ShareType::Yes, 6, 10)
            .unwrap();
        match result {
            OrderResult::FullyFilled { trades, .. } => {
                assert_eq!(trades.len(), 1);
                assert_eq!(trades[0].price, 4);
                assert_eq!(trades[0].quantity, 10);
            }
            other => panic!("expected FullyFilled, got {other:?}"),
        }
    }

    #[test]
    fn price_improvement_walk_visits_best_price_first() {
        let engine = engine();
        engine
            .submit_order(2, 1, Side::Sell, ShareType::Yes, 3, 4)
            .unwrap();
        engine
            .submit_order(2, 1, Side::Sell, ShareType::Yes, 5, 6)
            .unwrap();
        let result = engine
            .submit_order(1, 1, Side::Buy, ShareType::Yes, 6, 10)
            .unwrap();
        match result {
            OrderResult::FullyFilled { trades, .. } => {
                assert_eq!(trades.len(), 2);
                assert_eq!(trades[0].price, 3);
                assert_eq!(trades[0].quantity, 4);
                assert_eq!(trades[1].price, 5);
                assert_eq!(trades[1].quantity, 6);
            }
            other => panic!("expected FullyFilled, got {other:?}"),
        }
    }

    #[test]
    fn fifo_within_price_level() {
        let engine = engine();
        let a = engine
            .submit_order(2, 1, Side::Sell, ShareType::Yes, 5, 3)
            .unwrap()
            .order_id();
        let b = engine
            .submit_order(2, 1, Side::Sell, ShareType::Yes, 5, 3)
            .unwrap()
            .order_id();
        let result = engine
            .submit_order(1, 1, Side::Buy, ShareType::Yes, 5, 4)
            .unwrap();
        let trades = result.trades();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].seller_order_id, Some(a));
        assert_eq!(trades[0].quantity, 3);
        assert_eq!(trades[1].seller_order_id, Some(b));
        assert_eq!(trades[1].quantity, 1);
        let resting = engine.get_order(b).unwrap();
        assert_eq!(resting.filled_quantity, 1);
    }

    #[test]
    fn partial_residual_rests_for_taker() {
        let engine = engine();
        engine
            .submit_order(2, 1, Side::Sell, ShareType::Yes, 5, 2)
            .unwrap();
        let result = engine
            .submit_order(1, 1, Side::Buy, ShareType::Yes, 5, 5)
            .unwrap();
        match result {
            OrderResult::PartiallyFilled {
                trades,
                resting_id,
                ..
            } => {
                assert_eq!(trades.len(), 1);
                assert_eq!(trades[0].quantity, 2);
                let resting = engine.get_order(resting_id).unwrap();
                assert_eq!(resting.total_quantity, 5);
                assert_eq!(resting.filled_quantity, 2);
            }
            other => panic!("expected PartiallyFilled, got {other:?}"),
        }
    }

    #[test]
    fn rejects_orders_on_completed_event() {
        let engine = engine();
        engine.set_event_status(1, EventStatus::Completed);
        let err = engine
            .submit_order(1, 1, Side::Buy, ShareType::Yes, 5, 1)
            .unwrap_err();
        assert!(matches!(err, MatchingError::EventNotAccepting(1)));
    }

    #[test]
    fn cancel_removes_resting_order() {
        let engine = engine();
        let id = engine
            .submit_order(1, 1, Side::Buy, ShareType::Yes, 6, 10)
            .unwrap()
            .order_id();
        engine.cancel_order(id, 1).unwrap();
        assert!(engine.get_order(id).is_none());
    }

    #[test]
    fn cancel_by_wrong_user_is_unauthorized() {
        let engine = engine();
        let id = engine
            .submit_order(1, 1, Side::Buy, ShareType::Yes, 6, 10)
            .unwrap()
            .order_id();
        let err = engine.cancel_order(id, 99).unwrap_err();
        assert!(matches!(err, MatchingError::Authorization { .. }));
    }

    mod invariants {
        use super::*;
        use proptest::prelude::*;

        const USERS: [i64; 3] = [1, 2, 3];
        const STARTING_BALANCE: i64 = 10_000;

        fn seeded_engine() -> MatchingEngine {
            let balances = BalanceStore::new();
            for u in USERS {
                balances.credit(u, STARTING_BALANCE);
            }
            let portfolios = PortfolioStore::new();
            let settlement = Settlement::new(balances, portfolios);
            MatchingEngine::new(settlement, EngineConfig::default())
        }

        #[derive(Debug, Clone)]
        enum Action {
            Submit {
                user_id: i64,
                side: Side,
                price: i32,
                quantity: i32,
            },
            Cancel {
                // index into the list of ids seen so far, wrapped; avoids
                // needing a valid id to exist for every step.
                pick: usize,
            },
        }

        fn action_strategy() -> impl Strategy<Value = Action> {
            prop_oneof![
                3 => (
                    prop::sample::select(&USERS[..]),
                    prop_oneof![Just(Side::Buy), Just(Side::Sell)],
                    1i32..=10,
                    1i32..=5,
                )
                    .prop_map(|(user_id, side, price, quantity)| Action::Submit {
                        user_id,
                        side,
                        price,
                        quantity,
                    }),
                1 => (0usize..64).prop_map(|pick| Action::Cancel { pick }),
            ]
        }

        /// Every resting order's fields agree with the fingerprint it's
        /// queued under, and no id appears in more than one queue.
        fn assert_book_consistency(engine: &MatchingEngine, event_id: i64) {
            let mut seen = std::collections::HashSet::new();
            for fp in engine.book().fingerprints_for_event(event_id) {
                let guard = engine.book().acquire(fp);
                for id in guard.iter().copied() {
                    assert!(seen.insert(id), "order {id} resident in more than one queue");
                    let order = engine
                        .get_order(id)
                        .unwrap_or_else(|| panic!("queued order {id} missing from the store"));
                    assert_eq!(order.fingerprint(), fp, "order {id} queued under the wrong price level");
                    assert!(order.filled_quantity < order.total_quantity, "order {id} is resting but fully filled");
                    assert!(!order.status.is_terminal(), "terminal order {id} left resting in the book");
                }
            }
        }

        /// `0 <= filled <= total` and `status` matches `filled`/`total`,
        /// for every order still resident in the store.
        fn assert_order_fields_consistent(order: &Order) {
            assert!(order.filled_quantity >= 0);
            assert!(order.filled_quantity <= order.total_quantity);
            assert_eq!(order.status, OrderStatus::for_fill(order.filled_quantity, order.total_quantity));
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            #[test]
            fn invariants_hold_after_quiescence(actions in prop::collection::vec(action_strategy(), 1..40)) {
                let engine = seeded_engine();
                let event_id = 1;
                let mut submitted_ids: Vec<i64> = Vec::new();

                for action in actions {
                    match action {
                        Action::Submit { user_id, side, price, quantity } => {
                            if let Ok(result) = engine.submit_order(user_id, event_id, side, ShareType::Yes, price, quantity) {
                                submitted_ids.push(result.order_id());
                            }
                        }
                        Action::Cancel { pick } => {
                            if submitted_ids.is_empty() {
                                continue;
                            }
                            let id = submitted_ids[pick % submitted_ids.len()];
                            if let Some(order) = engine.get_order(id) {
                                let _ = engine.cancel_order(id, order.user_id);
                            }
                        }
                    }
                }

                // Invariant: no order appears in more than one queue, and
                // every resting order's fields agree with its fingerprint.
                assert_book_consistency(&engine, event_id);

                // Invariant: every order still resident in the store has
                // consistent filled/total/status fields.
                for &id in &submitted_ids {
                    if let Some(order) = engine.get_order(id) {
                        assert_order_fields_consistent(&order);
                    }
                }

                // Invariant: closed-loop cash conservation. No resolution
                // happened, so the sum of balances is unchanged from the
                // starting endowment.
                let total_balance: i64 = USERS.iter().map(|&u| engine.settlement().balances().get(u)).sum();
                prop_assert_eq!(total_balance, STARTING_BALANCE * USERS.len() as i64);
            }
        }
    }
}
