use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cache;
mod config;
mod db;
mod models;
mod services;
mod utils;
mod websocket;

use crate::cache::{CacheConfig, CacheManager};
use crate::config::AppConfig;
use crate::db::Database;
use crate::models::EventStatus;
use crate::services::matching::{EngineConfig, MatchingEngine};
use crate::services::settlement::Settlement;
use crate::services::stores::{BalanceStore, PortfolioStore};
use crate::websocket::Hub;

pub struct AppState {
    pub config: AppConfig,
    pub db: Database,
    pub cache: Arc<CacheManager>,
    pub engine: Arc<MatchingEngine>,
    pub hub: Arc<Hub>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prediction_market_matcher=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::load()?;
    tracing::info!("starting prediction market matcher v{}", env!("CARGO_PKG_VERSION"));

    let db = Database::connect_with_pool_size(&config.database_url, config.database_pool_size).await?;
    tracing::info!("database connected");

    let cache_config = CacheConfig::from_env(config.redis_url.clone());
    let cache = Arc::new(CacheManager::connect(cache_config).await);
    if cache.is_available() {
        tracing::info!("cache/pubsub layer connected");
    } else {
        tracing::warn!("cache/pubsub layer disabled, running without Redis fan-out");
    }

    let balances = BalanceStore::new();
    let portfolios = PortfolioStore::new();
    let settlement = Settlement::new(balances, portfolios);
    let engine_config = EngineConfig {
        lock_timeout: config.lock_timeout(),
        lock_retries: config.lock_retries,
    };
    let engine = Arc::new(MatchingEngine::new(settlement, engine_config));

    recover(&db, &engine).await?;

    db::persistence::spawn_persistence_worker(db.pool.clone(), engine.subscribe_events(), engine.clone());
    tracing::info!("persistence worker spawned");

    let hub = Arc::new(Hub::new());
    websocket::hub::spawn_driver(engine.clone(), hub.clone());
    tracing::info!("subscription hub driver spawned");

    let state = Arc::new(AppState {
        config: config.clone(),
        db,
        cache,
        engine,
        hub,
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", api::routes::create_router(state.clone()))
        .nest("/ws", websocket::routes::create_router(state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Rebuild in-memory engine state from the durable store: non-terminal orders
/// straight into C1/C2 in ascending id order (preserving FIFO),
/// completed event statuses so resolved events keep rejecting submissions,
/// and both id counters fast-forwarded past anything already persisted.
async fn recover(db: &Database, engine: &Arc<MatchingEngine>) -> anyhow::Result<()> {
    let open_orders = db::persistence::recover_open_orders(&db.pool).await?;
    let recovered = open_orders.len();
    for order in open_orders {
        engine.rehydrate(order)?;
    }
    tracing::info!(recovered, "recovered open orders into the book");

    let completed_event_ids: Vec<i64> =
        sqlx::query_scalar("SELECT id FROM events WHERE status = 'completed'")
            .fetch_all(&db.pool)
            .await?;
    for event_id in completed_event_ids {
        engine.set_event_status(event_id, EventStatus::Completed);
    }

    let max_order_id: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM orders")
        .fetch_one(&db.pool)
        .await?;
    if let Some(max_id) = max_order_id {
        engine.order_store().fast_forward_id(max_id + 1);
    }

    let max_trade_id: Option<i64> = sqlx::query_scalar("SELECT MAX(id) FROM trades")
        .fetch_one(&db.pool)
        .await?;
    if let Some(max_id) = max_trade_id {
        engine.fast_forward_trade_id(max_id + 1);
    }

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}
