//! Settlement (C4)
//!
//! Bundles the four mutations a single fill requires — one trade row, one
//! balance debit, one balance credit, two portfolio adjustments — behind one
//! call so the matcher never observes a partially-applied fill. There is no
//! rollback machinery here: the balance and portfolio stores are plain
//! in-memory maps, so the only failure mode is `InsufficientBalance` on the
//! buyer's debit, which the HTTP layer should already have prevented with a
//! pre-trade check but which this layer still refuses defensively.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::models::{Event, EventResult, Order, PortfolioKey, Side, Trade};
use crate::services::matching::types::{MatchingError, SettlementRecord};
use crate::services::stores::{BalanceStore, PortfolioStore};

pub struct Settlement {
    balances: BalanceStore,
    portfolios: PortfolioStore,
    next_trade_id: AtomicI64,
}

impl Settlement {
    pub fn new(balances: BalanceStore, portfolios: PortfolioStore) -> Self {
        Self {
            balances,
            portfolios,
            next_trade_id: AtomicI64::new(1),
        }
    }

    pub fn fast_forward_trade_id(&self, at_least: i64) {
        let mut cur = self.next_trade_id.load(Ordering::SeqCst);
        while cur < at_least {
            match self.next_trade_id.compare_exchange(
                cur,
                at_least,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => break,
                Err(observed) => cur = observed,
            }
        }
    }

    pub fn balances(&self) -> &BalanceStore {
        &self.balances
    }

    pub fn portfolios(&self) -> &PortfolioStore {
        &self.portfolios
    }

    /// Exactly one trade, one debit, one credit, two portfolio mutations,
    /// for one matched quantity at one price. `maker`/`taker` are snapshots
    /// taken before this fill's quantity was applied to either.
    pub fn settle_fill(
        &self,
        maker: &Order,
        taker: &Order,
        quantity: i32,
        price: i32,
    ) -> Result<SettlementRecord, MatchingError> {
        if maker.side == taker.side {
            return Err(MatchingError::Internal(format!(
                "maker {} and taker {} are both {}; refusing to generate a fill",
                maker.id, taker.id, maker.side
            )));
        }

        let (buyer, seller, buyer_order_id, seller_order_id) = match taker.side {
            Side::Buy => (taker, maker, Some(taker.id), Some(maker.id)),
            Side::Sell => (maker, taker, Some(maker.id), Some(taker.id)),
        };

        let value = quantity as i64 * price as i64;

        let buyer_balance_after = self.balances.debit(buyer.user_id, value)?;
        let seller_balance_after = self.balances.credit(seller.user_id, value);

        let buyer_portfolio_after =
            self.portfolios
                .increment(buyer.user_id, buyer.event_id, buyer.share_type, quantity);
        let seller_portfolio_after =
            self.portfolios
                .decrement(seller.user_id, seller.event_id, seller.share_type, quantity);

        let trade = Trade {
            id: self.next_trade_id.fetch_add(1, Ordering::SeqCst),
            event_id: buyer.event_id,
            price,
            quantity,
            share_type: buyer.share_type,
            buyer_user_id: buyer.user_id,
            seller_user_id: seller.user_id,
            buyer_order_id,
            seller_order_id,
            executed_at: Utc::now(),
        };

        Ok(SettlementRecord {
            trade,
            buyer_user_id: buyer.user_id,
            buyer_balance_after,
            buyer_portfolio_after,
            seller_user_id: seller.user_id,
            seller_balance_after,
            seller_portfolio_after,
        })
    }

    /// For every non-zero portfolio row in `event`, pay out per share and
    /// zero the row. One synthetic trade per row, buyer is the holder,
    /// seller is the operator account that funds the payout; order ids are
    /// null, since neither side traces back to a resting order. The
    /// operator's balance is adjusted without the ordinary
    /// insufficient-balance check — it is the account of last resort for
    /// resolution, not a trading participant.
    pub fn resolve_drain(
        &self,
        event: &Event,
        result: EventResult,
        operator_user_id: i64,
    ) -> Vec<SettlementRecord> {
        let rows = self.portfolios.entries_for_event(event.id);
        let mut records = Vec::with_capacity(rows.len());

        for (key, quantity) in rows {
            if quantity == 0 {
                continue;
            }
            let payout_per_share = result.payout_per_share(key.share_type);
            let value = payout_per_share as i64 * quantity as i64;

            let buyer_user_id = key.user_id;
            let seller_user_id = operator_user_id;
            let buyer_balance_after = self.balances.credit(buyer_user_id, value);
            let seller_balance_after = self.balances.credit(seller_user_id, -value);

            self.portfolios.set(key, 0);
            let seller_portfolio_after = self.portfolios.get(PortfolioKey {
                user_id: seller_user_id,
                event_id: event.id,
                share_type: key.share_type,
            });

            let trade = Trade {
                id: self.next_trade_id.fetch_add(1, Ordering::SeqCst),
                event_id: event.id,
                price: payout_per_share,
                quantity,
                share_type: key.share_type,
                buyer_user_id,
                seller_user_id,
                buyer_order_id: None,
                seller_order_id: None,
                executed_at: Utc::now(),
            };

            records.push(SettlementRecord {
                trade,
                buyer_user_id,
                buyer_balance_after,
                buyer_portfolio_after: 0,
                seller_user_id,
                seller_balance_after,
                seller_portfolio_after,
            });
        }

        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EventStatus, ShareType};
    use chrono::Utc;

    fn order(id: i64, user_id: i64, side: Side) -> Order {
        let now = Utc::now();
        Order {
            id,
            user_id,
            event_id: 1,
            side,
            share_type: ShareType::Yes,
            price: 5,
            total_quantity: 10,
            filled_quantity: 0,
            status: crate::models::OrderStatus::Incomplete,
            created_at: now,
            updated_at: now,
        }
    }

    fn settlement_with_funds() -> Settlement {
        let balances = BalanceStore::new();
        balances.credit(1, 1_000);
        balances.credit(2, 1_000);
        Settlement::new(balances, PortfolioStore::new())
    }

    #[test]
    fn settle_fill_moves_cash_and_shares() {
        let settlement = settlement_with_funds();
        let maker = order(1, 2, Side::Sell);
        let taker = order(2, 1, Side::Buy);
        let record = settlement.settle_fill(&maker, &taker, 4, 5).unwrap();
        assert_eq!(record.trade.value(), 20);
        assert_eq!(settlement.balances().get(1), 980);
        assert_eq!(settlement.balances().get(2), 1_020);
        assert_eq!(
            settlement.portfolios().get(PortfolioKey {
                user_id: 1,
                event_id: 1,
                share_type: ShareType::Yes,
            }),
            4
        );
        assert_eq!(
            settlement.portfolios().get(PortfolioKey {
                user_id: 2,
                event_id: 1,
                share_type: ShareType::Yes,
            }),
            -4
        );
    }

    #[test]
    fn same_side_fill_is_refused() {
        let settlement = settlement_with_funds();
        let maker = order(1, 2, Side::Buy);
        let taker = order(2, 1, Side::Buy);
        let err = settlement.settle_fill(&maker, &taker, 1, 5).unwrap_err();
        assert!(matches!(err, MatchingError::Internal(_)));
    }

    #[test]
    fn resolve_drain_pays_winners_and_zeroes_portfolio() {
        let settlement = settlement_with_funds();
        settlement.portfolios().increment(1, 1, ShareType::Yes, 7);
        let event = Event {
            id: 1,
            status: EventStatus::Completed,
            result: Some(EventResult::Yes),
            created_at: Utc::now(),
            resolved_at: Some(Utc::now()),
        };
        let records = settlement.resolve_drain(&event, EventResult::Yes, 999);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].trade.quantity, 7);
        assert_eq!(records[0].trade.price, 10);
        assert_eq!(settlement.balances().get(1), 1_000 + 70);
        assert_eq!(
            settlement.portfolios().get(PortfolioKey {
                user_id: 1,
                event_id: 1,
                share_type: ShareType::Yes,
            }),
            0
        );
    }
}
