//! Application configuration.
//!
//! Loaded once at startup via `config` layered over a `.env` file read by
//! `dotenvy`, matching the reference codebase's startup sequence.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_db_pool_size")]
    pub database_pool_size: u32,
    pub redis_url: Option<String>,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    #[serde(default = "default_lock_retries")]
    pub lock_retries: u32,
    /// User id that funds/absorbs resolution payouts.
    pub operator_user_id: i64,
}

fn default_db_pool_size() -> u32 {
    10
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_lock_timeout_ms() -> u64 {
    50
}

fn default_lock_retries() -> u32 {
    3
}

impl AppConfig {
    pub fn load() -> Result<Self, anyhow::Error> {
        // Missing .env is fine in container deployments where the real
        // environment is injected directly.
        let _ = dotenvy::dotenv();

        let cfg = config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?;

        let app_config: AppConfig = cfg.try_deserialize()?;
        Ok(app_config)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_timeout_converts_millis() {
        let cfg = AppConfig {
            database_url: "postgres://localhost/test".into(),
            database_pool_size: 5,
            redis_url: None,
            bind_addr: "0.0.0.0:3000".into(),
            lock_timeout_ms: 75,
            lock_retries: 3,
            operator_user_id: 1,
        };
        assert_eq!(cfg.lock_timeout(), Duration::from_millis(75));
    }
}
