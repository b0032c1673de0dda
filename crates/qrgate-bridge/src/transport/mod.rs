//! # Transport Adapter
//!
//! Owns the connection to the pub/sub broker. Outbound messages go through
//! [`Transport::publish`]; inbound messages are pushed into the channel the
//! transport was built with, one [`InboundMessage`] per broker message.
//!
//! Publishes are not buffered across a disconnect. A publish issued while
//! the transport is down fails with [`TransportError::Disconnected`] and
//! the caller logs and drops it.

pub mod memory;
pub mod mqtt;

pub use memory::MemoryTransport;
pub use mqtt::MqttTransport;

use async_trait::async_trait;

use crate::error::TransportError;

/// One message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    /// Full topic the message arrived on.
    pub topic: String,
    /// Raw payload bytes.
    pub payload: Vec<u8>,
}

impl InboundMessage {
    /// Build an inbound message.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// A pub/sub connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Publish a payload with at-least-once intent.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Subscribe to topics. The subscription survives reconnects.
    async fn subscribe(&self, topics: &[String]) -> Result<(), TransportError>;

    /// Whether the broker connection is currently up.
    fn is_connected(&self) -> bool;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}
