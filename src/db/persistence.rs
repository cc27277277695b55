//! Persistence Boundary (C5)
//!
//! The matcher never touches the database directly: it emits `EngineEvent`s
//! onto a broadcast channel, and this module's background worker is the only
//! thing that turns them into SQL. Mirrors the reference codebase's
//! `start_persistence_worker` — a `tokio::spawn`ed task looping on
//! `broadcast::Receiver::recv`, written through with plain `sqlx::query`.

use std::sync::Arc;

use sqlx::{PgPool, Row};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::models::{Order, OrderStatus};
use crate::services::matching::types::EngineEvent;
use crate::services::matching::MatchingEngine;

pub async fn insert_order(pool: &PgPool, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO orders (id, user_id, event_id, side, share_type, price, total_quantity, filled_quantity, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4::order_side, $5::share_type, $6, $7, $8, $9::order_status, $10, $11)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(order.id)
    .bind(order.user_id)
    .bind(order.event_id)
    .bind(order.side.to_string())
    .bind(order.share_type.to_string())
    .bind(order.price)
    .bind(order.total_quantity)
    .bind(order.filled_quantity)
    .bind(order_status_sql(order.status))
    .bind(order.created_at)
    .bind(order.updated_at)
    .execute(pool)
    .await?;
    Ok(())
}

/// Called on terminal transition, once the order's id is already present
/// from its `insert_order` at submission time.
pub async fn update_order(pool: &PgPool, order: &Order) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE orders
        SET filled_quantity = $1, status = $2::order_status, updated_at = $3
        WHERE id = $4
        "#,
    )
    .bind(order.filled_quantity)
    .bind(order_status_sql(order.status))
    .bind(order.updated_at)
    .bind(order.id)
    .execute(pool)
    .await?;
    Ok(())
}

fn order_status_sql(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Incomplete => "incomplete",
        OrderStatus::PartialFilled => "partial_filled",
        OrderStatus::CompletelyFilled => "completely_filled",
        OrderStatus::Cancelled => "cancelled",
    }
}

/// One atomic write-through of a settlement bundle: the trade row plus the
/// resulting balances and portfolio quantities, in a single transaction so a
/// crash mid-write can never leave trades and balances disagreeing.
pub async fn persist_settlement(
    pool: &PgPool,
    record: &crate::services::matching::types::SettlementRecord,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;
    let trade = &record.trade;

    sqlx::query(
        r#"
        INSERT INTO trades (id, event_id, price, quantity, share_type, buyer_user_id, seller_user_id, buyer_order_id, seller_order_id, executed_at)
        VALUES ($1, $2, $3, $4, $5::share_type, $6, $7, $8, $9, $10)
        ON CONFLICT (id) DO NOTHING
        "#,
    )
    .bind(trade.id)
    .bind(trade.event_id)
    .bind(trade.price)
    .bind(trade.quantity)
    .bind(trade.share_type.to_string())
    .bind(trade.buyer_user_id)
    .bind(trade.seller_user_id)
    .bind(trade.buyer_order_id)
    .bind(trade.seller_order_id)
    .bind(trade.executed_at)
    .execute(&mut *tx)
    .await?;

    sqlx::query("UPDATE users SET current_balance = $1 WHERE id = $2")
        .bind(record.buyer_balance_after)
        .bind(record.buyer_user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("UPDATE users SET current_balance = $1 WHERE id = $2")
        .bind(record.seller_balance_after)
        .bind(record.seller_user_id)
        .execute(&mut *tx)
        .await?;

    upsert_portfolio_tx(
        &mut tx,
        record.buyer_user_id,
        trade.event_id,
        trade.share_type,
        record.buyer_portfolio_after,
    )
    .await?;
    upsert_portfolio_tx(
        &mut tx,
        record.seller_user_id,
        trade.event_id,
        trade.share_type,
        record.seller_portfolio_after,
    )
    .await?;

    tx.commit().await?;
    Ok(())
}

async fn upsert_portfolio_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    user_id: i64,
    event_id: i64,
    share_type: crate::models::ShareType,
    quantity: i32,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO portfolios (user_id, event_id, share_type, quantity)
        VALUES ($1, $2, $3::share_type, $4)
        ON CONFLICT (user_id, event_id, share_type) DO UPDATE SET quantity = EXCLUDED.quantity
        "#,
    )
    .bind(user_id)
    .bind(event_id)
    .bind(share_type.to_string())
    .bind(quantity)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Rehydrate every `INCOMPLETE`/`PARTIAL_FILLED` order, ordered by id
/// ascending so callers can push each straight onto its queue and preserve
/// FIFO within a price level.
pub async fn recover_open_orders(pool: &PgPool) -> Result<Vec<Order>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT id, user_id, event_id, side::text, share_type::text, price, total_quantity, filled_quantity, status::text, created_at, updated_at
        FROM orders
        WHERE status IN ('incomplete', 'partial_filled')
        ORDER BY id ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut orders = Vec::with_capacity(rows.len());
    for row in rows {
        orders.push(Order {
            id: row.try_get("id")?,
            user_id: row.try_get("user_id")?,
            event_id: row.try_get("event_id")?,
            side: parse_side(row.try_get::<String, _>("side")?.as_str()),
            share_type: parse_share_type(row.try_get::<String, _>("share_type")?.as_str()),
            price: row.try_get("price")?,
            total_quantity: row.try_get("total_quantity")?,
            filled_quantity: row.try_get("filled_quantity")?,
            status: parse_status(row.try_get::<String, _>("status")?.as_str()),
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        });
    }
    Ok(orders)
}

fn parse_side(s: &str) -> crate::models::Side {
    match s {
        "buy" => crate::models::Side::Buy,
        _ => crate::models::Side::Sell,
    }
}

fn parse_share_type(s: &str) -> crate::models::ShareType {
    match s {
        "yes" => crate::models::ShareType::Yes,
        _ => crate::models::ShareType::No,
    }
}

fn parse_status(s: &str) -> OrderStatus {
    match s {
        "incomplete" => OrderStatus::Incomplete,
        "partial_filled" => OrderStatus::PartialFilled,
        "completely_filled" => OrderStatus::CompletelyFilled,
        _ => OrderStatus::Cancelled,
    }
}

/// Spawned once at startup; owns the pool for the lifetime of the process.
/// Lagging behind the broadcast channel is logged and accepted — the matcher
/// never waits on this task, and a lagged persistence worker can always
/// re-derive what it missed from the in-memory state on the next event. A
/// failed settlement write halts the affected event through `engine`, since
/// at that point the in-memory and relational views of its trades, balances,
/// and portfolios can no longer be trusted to agree.
pub fn spawn_persistence_worker(
    pool: PgPool,
    mut events: broadcast::Receiver<EngineEvent>,
    engine: Arc<MatchingEngine>,
) {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(EngineEvent::OrderCreated(order)) => {
                    if let Err(e) = insert_order(&pool, &order).await {
                        error!(order_id = order.id, error = %e, "failed to insert order on creation");
                    }
                }
                Ok(EngineEvent::OrderTerminal(order)) => {
                    if let Err(e) = update_order(&pool, &order).await {
                        error!(order_id = order.id, error = %e, "failed to update order on terminal transition");
                    }
                }
                Ok(EngineEvent::Settled(record)) => {
                    if let Err(e) = persist_settlement(&pool, &record).await {
                        error!(trade_id = record.trade.id, error = %e, "failed to persist settlement");
                        engine.halt_event(record.trade.event_id, e.to_string());
                    }
                }
                Ok(EngineEvent::BookChanged { .. }) | Ok(EngineEvent::EventResolved { .. }) => {
                    // Fan-out is the Subscription Hub's concern; this worker
                    // only durably persists.
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "persistence worker lagged behind engine events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("engine event channel closed, persistence worker exiting");
                    break;
                }
            }
        }
    });
}
