//! Database connection and the write-behind persistence boundary (C5).

pub mod persistence;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Thin wrapper around the Postgres pool, matching the reference codebase's
/// `Database::connect` shape so `main.rs`'s startup sequence needs no
/// restructuring.
pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        Self::connect_with_pool_size(database_url, 10).await
    }

    pub async fn connect_with_pool_size(database_url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }
}
