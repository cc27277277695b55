//! Redis Pub/Sub Module
//!
//! Optional fan-out layer for book updates and trade prints, demoted to a
//! cache/broadcast concern per the design notes — Redis is never the lock or
//! queue medium for the matching engine itself, only an outward channel for
//! processes other than the one holding the in-memory book.

use redis::RedisError;
use serde::Serialize;
use std::sync::Arc;

use super::redis_client::RedisClient;

fn channel_book(event_id: i64) -> String {
    format!("channel:book:{event_id}")
}

fn channel_trades(event_id: i64) -> String {
    format!("channel:trades:{event_id}")
}

/// Pub/Sub publisher for broadcasting messages.
pub struct Publisher {
    redis: Arc<RedisClient>,
}

impl Publisher {
    pub fn new(redis: Arc<RedisClient>) -> Self {
        Self { redis }
    }

    pub async fn publish(&self, channel: &str, message: &str) -> Result<i32, RedisError> {
        self.redis.publish(channel, message.to_string()).await
    }

    pub async fn publish_json<T: Serialize>(&self, channel: &str, message: &T) -> Result<i32, RedisError> {
        let json = serde_json::to_string(message).map_err(|e| {
            RedisError::from((redis::ErrorKind::IoError, "Serialization error", e.to_string()))
        })?;
        self.publish(channel, &json).await
    }

    /// Publish a book snapshot/update for `event_id`.
    pub async fn publish_book<T: Serialize>(&self, event_id: i64, payload: &T) -> Result<i32, RedisError> {
        self.publish_json(&channel_book(event_id), payload).await
    }

    /// Publish a trade print for `event_id`.
    pub async fn publish_trade<T: Serialize>(&self, event_id: i64, trade: &T) -> Result<i32, RedisError> {
        self.publish_json(&channel_trades(event_id), trade).await
    }
}

#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub buffer_size: usize,
    pub auto_reconnect: bool,
    pub reconnect_delay_ms: u64,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            buffer_size: 1024,
            auto_reconnect: true,
            reconnect_delay_ms: 1000,
        }
    }
}

/// Handle for one subscribed channel. The hub (`websocket::hub`) is the
/// primary fan-out path for this single-process build; this subscriber
/// exists for a second process (e.g. an analytics consumer) to observe book
/// and trade activity without talking to the engine directly.
#[derive(Debug)]
pub struct Subscription {
    pub channel: String,
}

pub struct Subscriber {
    redis_url: String,
    config: SubscriberConfig,
}

impl Subscriber {
    pub fn new(redis_url: &str, config: SubscriberConfig) -> Self {
        Self {
            redis_url: redis_url.to_string(),
            config,
        }
    }

    pub fn redis_url(&self) -> &str {
        &self.redis_url
    }

    pub fn config(&self) -> &SubscriberConfig {
        &self.config
    }

    pub fn subscribe(&self, channel: &str) -> Subscription {
        tracing::debug!(channel, "creating pub/sub subscription");
        Subscription {
            channel: channel.to_string(),
        }
    }

    pub fn get_event_channels(event_id: i64) -> Vec<String> {
        vec![channel_book(event_id), channel_trades(event_id)]
    }
}

pub struct PubSubManager {
    publisher: Publisher,
    redis_url: String,
    subscriber_config: SubscriberConfig,
}

impl PubSubManager {
    pub fn new(redis: Arc<RedisClient>, redis_url: &str) -> Self {
        Self {
            publisher: Publisher::new(redis),
            redis_url: redis_url.to_string(),
            subscriber_config: SubscriberConfig::default(),
        }
    }

    pub fn with_config(redis: Arc<RedisClient>, redis_url: &str, subscriber_config: SubscriberConfig) -> Self {
        Self {
            publisher: Publisher::new(redis),
            redis_url: redis_url.to_string(),
            subscriber_config,
        }
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn create_subscriber(&self) -> Subscriber {
        Subscriber::new(&self.redis_url, self.subscriber_config.clone())
    }

    pub fn redis_url(&self) -> &str {
        &self.redis_url
    }

    pub fn book_channel(&self, event_id: i64) -> String {
        channel_book(event_id)
    }

    pub fn trade_channel(&self, event_id: i64) -> String {
        channel_trades(event_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscriber_config_default() {
        let config = SubscriberConfig::default();
        assert_eq!(config.buffer_size, 1024);
        assert!(config.auto_reconnect);
    }

    #[test]
    fn channel_names_are_event_scoped() {
        assert_eq!(channel_book(42), "channel:book:42");
        assert_eq!(channel_trades(42), "channel:trades:42");
        assert_eq!(Subscriber::get_event_channels(42).len(), 2);
    }
}
