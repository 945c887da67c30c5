//! Pub/Sub Bus
//!
//! Cross-process updates arrive over an external bus. The consumer in
//! `pubsub.rs` polls this seam; a real deployment backs it with Redis.

use std::time::Duration;

use async_trait::async_trait;

pub type BusResult<T> = anyhow::Result<T>;

/// One message off the bus.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub channel: String,
    pub payload: Vec<u8>,
}

/// Publish/subscribe transport.
#[async_trait]
pub trait PubSubBus: Send + Sync {
    async fn publish(&self, channel: &str, payload: &[u8]) -> BusResult<()>;

    /// Register interest in a set of channels.
    async fn subscribe(&self, channels: &[String]) -> BusResult<()>;

    /// Next subscribed message, or `None` once `timeout` elapses.
    async fn get_message(&self, timeout: Duration) -> BusResult<Option<BusMessage>>;
}
