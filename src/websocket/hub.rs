//! Subscription Hub (C7)
//!
//! Keeps a per-event set of live WebSocket subscribers and turns engine
//! broadcasts into fan-out: a `BookChanged` recomputes one projection and
//! pushes it to every subscriber of that event, an `EventResolved` pushes a
//! closing message and drops the event's subscriber set entirely. Each
//! subscriber is an unbounded mpsc sender owned by its connection task, so a
//! slow client can never block the driver loop — a send failure just means
//! the connection is gone and the entry is removed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use tracing::{info, warn};

use crate::services::matching::projector::BookProjector;
use crate::services::matching::{EngineEvent, MatchingEngine};
use crate::websocket::channels::ServerMessage;

pub type Sink = mpsc::UnboundedSender<ServerMessage>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    pub event_id: i64,
    pub subscriber_id: u64,
}

pub struct Hub {
    subscribers: DashMap<i64, DashMap<u64, Sink>>,
    next_id: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn subscribe(&self, event_id: i64, sink: Sink) -> SubscriptionHandle {
        let subscriber_id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .entry(event_id)
            .or_default()
            .insert(subscriber_id, sink);
        SubscriptionHandle {
            event_id,
            subscriber_id,
        }
    }

    pub fn unsubscribe(&self, handle: SubscriptionHandle) {
        if let Some(event_subs) = self.subscribers.get(&handle.event_id) {
            event_subs.remove(&handle.subscriber_id);
        }
    }

    /// Send `message` to every live subscriber of `event_id`, pruning any
    /// whose receiving end has dropped.
    pub fn broadcast(&self, event_id: i64, message: ServerMessage) {
        let Some(event_subs) = self.subscribers.get(&event_id) else {
            return;
        };
        event_subs.retain(|_, sink| sink.send(message.clone()).is_ok());
    }

    /// Tell every subscriber of `event_id` the book is closed and drop the
    /// whole subscriber set; connections unsubscribe themselves once their
    /// sink closes.
    pub fn close_event(&self, event_id: i64) {
        if let Some((_, event_subs)) = self.subscribers.remove(&event_id) {
            for (_, sink) in event_subs.into_iter() {
                let _ = sink.send(ServerMessage::Closed { event_id });
            }
        }
    }

    pub fn subscriber_count(&self, event_id: i64) -> usize {
        self.subscribers.get(&event_id).map(|s| s.len()).unwrap_or(0)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

/// Drives the hub from the engine's broadcast channel. Spawned once at
/// startup; owns the engine and hub handles for the lifetime of the process.
pub fn spawn_driver(engine: Arc<MatchingEngine>, hub: Arc<Hub>) {
    let mut events: broadcast::Receiver<EngineEvent> = engine.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(EngineEvent::BookChanged { event_id }) => {
                    if hub.subscriber_count(event_id) == 0 {
                        continue;
                    }
                    let projector = BookProjector::new(engine.book(), engine.order_store());
                    let snapshot = projector.snapshot(event_id);
                    hub.broadcast(event_id, ServerMessage::update(snapshot));
                }
                Ok(EngineEvent::EventResolved { event_id }) => {
                    info!(event_id, "closing subscriptions for resolved event");
                    hub.close_event(event_id);
                }
                Ok(EngineEvent::OrderTerminal(_)) | Ok(EngineEvent::Settled(_)) => {
                    // Book-level fan-out only; per-order/per-trade updates
                    // aren't part of this protocol.
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscription hub lagged behind engine events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("engine event channel closed, subscription hub driver exiting");
                    break;
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::matching::projector::{MarketSummary, SideDepth};

    fn empty_snapshot(event_id: i64) -> crate::services::matching::projector::BookSnapshot {
        crate::services::matching::projector::BookSnapshot {
            event_id,
            yes: SideDepth {
                bids: vec![],
                asks: vec![],
            },
            no: SideDepth {
                bids: vec![],
                asks: vec![],
            },
            yes_summary: MarketSummary {
                best_bid: None,
                best_ask: None,
                spread: None,
                total_bid_vol: 0,
                total_ask_vol: 0,
            },
            no_summary: MarketSummary {
                best_bid: None,
                best_ask: None,
                spread: None,
                total_bid_vol: 0,
                total_ask_vol: 0,
            },
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_subscriber_and_prunes_dead_ones() {
        let hub = Hub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = hub.subscribe(1, tx);
        assert_eq!(hub.subscriber_count(1), 1);

        hub.broadcast(1, ServerMessage::update(empty_snapshot(1)));
        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, ServerMessage::Update { event_id: 1, .. }));

        drop(rx);
        hub.broadcast(1, ServerMessage::update(empty_snapshot(1)));
        assert_eq!(hub.subscriber_count(1), 0);

        hub.unsubscribe(handle);
    }

    #[tokio::test]
    async fn close_event_notifies_and_clears_subscribers() {
        let hub = Hub::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        hub.subscribe(7, tx);

        hub.close_event(7);
        let msg = rx.recv().await.unwrap();
        assert!(matches!(msg, ServerMessage::Closed { event_id: 7 }));
        assert_eq!(hub.subscriber_count(7), 0);
    }
}
