//! Book Projector (C6)
//!
//! Aggregates C2 queue state into the L2 depth snapshot shape clients
//! subscribe to. Acquires each queue lock it reads one at a time, in
//! ascending fingerprint order (price, then side, then share_type — see
//! `PriceLevelBook::fingerprints_for_event`), so a projection can never
//! deadlock against an in-flight match.

use serde::Serialize;

use crate::models::{Fingerprint, ShareType, Side};
use crate::services::matching::book::PriceLevelBook;
use crate::services::matching::order_store::OrderStore;

#[derive(Debug, Clone, Serialize)]
pub struct DepthLevel {
    pub price: i32,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SideDepth {
    pub bids: Vec<DepthLevel>,
    pub asks: Vec<DepthLevel>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MarketSummary {
    pub best_bid: Option<i32>,
    pub best_ask: Option<i32>,
    pub spread: Option<i32>,
    pub total_bid_vol: i32,
    pub total_ask_vol: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookSnapshot {
    pub event_id: i64,
    pub yes: SideDepth,
    pub no: SideDepth,
    pub yes_summary: MarketSummary,
    pub no_summary: MarketSummary,
}

pub struct BookProjector<'a> {
    book: &'a PriceLevelBook,
    orders: &'a OrderStore,
}

impl<'a> BookProjector<'a> {
    pub fn new(book: &'a PriceLevelBook, orders: &'a OrderStore) -> Self {
        Self { book, orders }
    }

    pub fn snapshot(&self, event_id: i64) -> BookSnapshot {
        BookSnapshot {
            event_id,
            yes: self.side_depth(event_id, ShareType::Yes),
            no: self.side_depth(event_id, ShareType::No),
            yes_summary: self.market_summary(event_id, ShareType::Yes),
            no_summary: self.market_summary(event_id, ShareType::No),
        }
    }

    pub fn depth(&self, event_id: i64, n: usize) -> BookSnapshot {
        let mut snap = self.snapshot(event_id);
        snap.yes.bids.truncate(n);
        snap.yes.asks.truncate(n);
        snap.no.bids.truncate(n);
        snap.no.asks.truncate(n);
        snap
    }

    fn level_quantity(&self, fp: Fingerprint) -> i32 {
        let guard = self.book.acquire(fp);
        guard
            .iter()
            .filter_map(|id| self.orders.get(*id))
            .map(|o| o.remaining())
            .sum()
    }

    fn side_depth(&self, event_id: i64, share_type: ShareType) -> SideDepth {
        let mut bids = Vec::new();
        let mut asks = Vec::new();

        for price in 1..=10 {
            let buy_qty = self.level_quantity(Fingerprint {
                event_id,
                side: Side::Buy,
                share_type,
                price,
            });
            if buy_qty > 0 {
                bids.push(DepthLevel {
                    price,
                    quantity: buy_qty,
                });
            }

            let sell_qty = self.level_quantity(Fingerprint {
                event_id,
                side: Side::Sell,
                share_type,
                price,
            });
            if sell_qty > 0 {
                asks.push(DepthLevel {
                    price,
                    quantity: sell_qty,
                });
            }
        }

        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));
        SideDepth { bids, asks }
    }

    fn market_summary(&self, event_id: i64, share_type: ShareType) -> MarketSummary {
        let depth = self.side_depth(event_id, share_type);
        let best_bid = depth.bids.first().map(|l| l.price);
        let best_ask = depth.asks.first().map(|l| l.price);
        let spread = match (best_bid, best_ask) {
            (Some(b), Some(a)) => Some(a - b),
            _ => None,
        };
        MarketSummary {
            best_bid,
            best_ask,
            spread,
            total_bid_vol: depth.bids.iter().map(|l| l.quantity).sum(),
            total_ask_vol: depth.asks.iter().map(|l| l.quantity).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::matching::book::PriceLevelBook;
    use crate::services::matching::order_store::OrderStore;
    use chrono::Utc;

    fn seed_order(orders: &OrderStore, book: &PriceLevelBook, id: i64, side: Side, price: i32, qty: i32) {
        let now = Utc::now();
        let order = crate::models::Order {
            id,
            user_id: 1,
            event_id: 1,
            side,
            share_type: ShareType::Yes,
            price,
            total_quantity: qty,
            filled_quantity: 0,
            status: crate::models::OrderStatus::Incomplete,
            created_at: now,
            updated_at: now,
        };
        orders.put(order.clone());
        let mut guard = book.acquire(order.fingerprint());
        PriceLevelBook::push_tail(&mut guard, id);
    }

    #[test]
    fn snapshot_omits_empty_levels_and_computes_summary() {
        let orders = OrderStore::new();
        let book = PriceLevelBook::new();
        seed_order(&orders, &book, 1, Side::Buy, 6, 10);
        seed_order(&orders, &book, 2, Side::Sell, 8, 5);

        let projector = BookProjector::new(&book, &orders);
        let snap = projector.snapshot(1);

        assert_eq!(snap.yes.bids.len(), 1);
        assert_eq!(snap.yes.bids[0].price, 6);
        assert_eq!(snap.yes.asks[0].price, 8);
        assert_eq!(snap.yes_summary.best_bid, Some(6));
        assert_eq!(snap.yes_summary.best_ask, Some(8));
        assert_eq!(snap.yes_summary.spread, Some(2));
        assert!(snap.no.bids.is_empty());
    }
}
