//! Redis-backed cache/fan-out layer.
//!
//! Entirely optional: the matching engine holds no reference to this module.
//! It exists so a second process (or a browser client through `websocket`)
//! can observe book and trade activity via Redis pub/sub instead of an
//! in-process subscription, and degrades gracefully when Redis is absent —
//! `CacheManager::connect` never blocks startup on a missing Redis URL.

pub mod pubsub;
pub mod redis_client;

use std::sync::Arc;

pub use pubsub::{PubSubManager, Publisher, Subscriber, SubscriberConfig, Subscription};
pub use redis_client::{RedisClient, RedisConfig};

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: Option<String>,
}

impl CacheConfig {
    pub fn from_env(redis_url: Option<String>) -> Self {
        Self { redis_url }
    }
}

/// Owns the optional Redis connection and the pub/sub manager built on top
/// of it. `connect` never fails the caller: if Redis is unreachable, the
/// manager is constructed in "unavailable" mode and every publish becomes a
/// no-op, matching the reference codebase's graceful-degradation policy.
pub struct CacheManager {
    pubsub: Option<PubSubManager>,
}

impl CacheManager {
    pub async fn connect(config: CacheConfig) -> Self {
        let Some(url) = config.redis_url else {
            tracing::info!("no redis url configured, cache/pubsub layer disabled");
            return Self { pubsub: None };
        };

        match RedisClient::from_url(&url).await {
            Ok(client) => {
                let redis = Arc::new(client);
                tracing::info!("connected to redis at {}", url);
                Self {
                    pubsub: Some(PubSubManager::new(redis, &url)),
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to connect to redis, continuing without cache/pubsub");
                Self { pubsub: None }
            }
        }
    }

    pub fn is_available(&self) -> bool {
        self.pubsub.is_some()
    }

    pub fn pubsub(&self) -> Option<&PubSubManager> {
        self.pubsub.as_ref()
    }
}
