//! In-memory transport.
//!
//! Behaves like a broker with a single client: every publish is recorded,
//! and delivered back to the inbound channel when the topic is subscribed.
//! Sensors are simulated with [`MemoryTransport::inject`]. Used by tests
//! and for running the bridge without a broker.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc;

use super::{InboundMessage, Transport};
use crate::error::TransportError;

/// A loopback transport.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    inbound: mpsc::UnboundedSender<InboundMessage>,
    subscriptions: Mutex<HashSet<String>>,
    published: Mutex<Vec<InboundMessage>>,
    connected: AtomicBool,
}

impl MemoryTransport {
    /// A connected transport delivering to `inbound`.
    pub fn new(inbound: mpsc::UnboundedSender<InboundMessage>) -> Self {
        Self {
            inner: Arc::new(Inner {
                inbound,
                subscriptions: Mutex::new(HashSet::new()),
                published: Mutex::new(Vec::new()),
                connected: AtomicBool::new(true),
            }),
        }
    }

    /// Deliver a message as if another client had published it.
    ///
    /// Returns `Ok(false)` when nothing is subscribed to the topic.
    pub fn inject(&self, topic: &str, payload: impl Into<Vec<u8>>) -> Result<bool, TransportError> {
        if !self.inner.subscriptions.lock().contains(topic) {
            return Ok(false);
        }
        self.inner
            .inbound
            .send(InboundMessage::new(topic, payload))
            .map_err(|_| TransportError::HandlerClosed)?;
        Ok(true)
    }

    /// Simulate a connection drop or recovery.
    pub fn set_connected(&self, connected: bool) {
        self.inner.connected.store(connected, Ordering::SeqCst);
    }

    /// Every successful publish, in order.
    pub fn published(&self) -> Vec<InboundMessage> {
        self.inner.published.lock().clone()
    }

    /// JSON bodies published on `topic`, in order.
    pub fn published_json(&self, topic: &str) -> Vec<Value> {
        self.inner
            .published
            .lock()
            .iter()
            .filter(|m| m.topic == topic)
            .filter_map(|m| serde_json::from_slice(&m.payload).ok())
            .collect()
    }

    /// Currently subscribed topics.
    pub fn subscriptions(&self) -> HashSet<String> {
        self.inner.subscriptions.lock().clone()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected {
                topic: topic.to_string(),
            });
        }
        let msg = InboundMessage::new(topic, payload);
        self.inner.published.lock().push(msg.clone());
        if self.inner.subscriptions.lock().contains(topic) {
            // Echo to ourselves like a broker would. A closed handler only
            // means nobody is listening any more.
            let _ = self.inner.inbound.send(msg);
        }
        Ok(())
    }

    async fn subscribe(&self, topics: &[String]) -> Result<(), TransportError> {
        self.inner
            .subscriptions
            .lock()
            .extend(topics.iter().cloned());
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
