//! # Event Fan-out
//!
//! Mirrors every transport event, plus periodic heartbeats, to a dynamic
//! set of observers. Each observer is a bounded channel written with
//! `try_send`: a full or closed channel counts as a failed write and the
//! observer is dropped, so one slow observer never stalls the others or
//! the bridge.
//!
//! Wire format of one event:
//!
//! ```json
//! {"type":"mqtt","topic":"gateA/esp32-01/ui/armed","payload":{"ttl":6000},
//!  "direction":"outbound","time":"2026-01-15T12:00:00.000Z"}
//! {"type":"heartbeat","time":"2026-01-15T12:00:30.000Z"}
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use qrgate_core::Timestamp;

/// Default per-observer buffer.
pub const DEFAULT_OBSERVER_CAPACITY: usize = 64;

/// Shortest heartbeat period; shorter requests are raised to this.
pub const MIN_HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);

/// Opaque observer identifier.
pub type ObserverId = u64;

/// Which way a mirrored message travelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received from the broker.
    Inbound,
    /// Published by the bridge.
    Outbound,
}

/// Kind of fan-out event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A mirrored transport message.
    Mqtt,
    /// A keep-alive tick.
    Heartbeat,
}

/// One event delivered to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanOutEvent {
    /// Event kind.
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Topic of a mirrored message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    /// Payload of a mirrored message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Direction of a mirrored message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    /// RFC 3339 time the event was produced.
    pub time: String,
}

impl FanOutEvent {
    /// A mirrored transport message.
    pub fn mqtt(topic: impl Into<String>, payload: Value, direction: Direction) -> Self {
        Self {
            kind: EventKind::Mqtt,
            topic: Some(topic.into()),
            payload: Some(payload),
            direction: Some(direction),
            time: Timestamp::now().to_rfc3339(),
        }
    }

    /// A heartbeat.
    pub fn heartbeat() -> Self {
        Self {
            kind: EventKind::Heartbeat,
            topic: None,
            payload: None,
            direction: None,
            time: Timestamp::now().to_rfc3339(),
        }
    }

    /// The event as one JSON line.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// A registered observer's receiving end.
#[derive(Debug)]
pub struct Observer {
    /// Identifier to unregister with.
    pub id: ObserverId,
    /// Events for this observer.
    pub events: mpsc::Receiver<FanOutEvent>,
}

/// The observer hub. Cheap to clone; clones share the observer set.
#[derive(Clone)]
pub struct FanOut {
    inner: Arc<Inner>,
}

struct Inner {
    observers: Mutex<HashMap<ObserverId, mpsc::Sender<FanOutEvent>>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl std::fmt::Debug for FanOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanOut")
            .field("observers", &self.observer_count())
            .field("capacity", &self.inner.capacity)
            .finish()
    }
}

impl Default for FanOut {
    fn default() -> Self {
        Self::new(DEFAULT_OBSERVER_CAPACITY)
    }
}

impl FanOut {
    /// A hub whose observers buffer up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                observers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Register an existing sink.
    pub fn register(&self, sink: mpsc::Sender<FanOutEvent>) -> ObserverId {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let count = {
            let mut observers = self.inner.observers.lock();
            observers.insert(id, sink);
            observers.len()
        };
        tracing::debug!(observer_id = id, observers = count, "observer registered");
        id
    }

    /// Create a sink with the hub's capacity and register it.
    pub fn subscribe(&self) -> Observer {
        let (tx, rx) = mpsc::channel(self.inner.capacity);
        Observer {
            id: self.register(tx),
            events: rx,
        }
    }

    /// Remove an observer. Returns whether it was registered.
    pub fn unregister(&self, id: ObserverId) -> bool {
        let removed = self.inner.observers.lock().remove(&id).is_some();
        if removed {
            tracing::debug!(observer_id = id, "observer unregistered");
        }
        removed
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    /// Deliver an event to every observer, dropping any that cannot take
    /// it. Returns the number of observers that received it.
    pub fn broadcast(&self, event: &FanOutEvent) -> usize {
        let mut observers = self.inner.observers.lock();
        let mut failed = Vec::new();
        for (id, sink) in observers.iter() {
            if let Err(e) = sink.try_send(event.clone()) {
                let reason = match e {
                    mpsc::error::TrySendError::Full(_) => "full",
                    mpsc::error::TrySendError::Closed(_) => "closed",
                };
                failed.push((*id, reason));
            }
        }
        for (id, reason) in &failed {
            observers.remove(id);
            tracing::debug!(observer_id = id, reason, "dropping observer");
        }
        observers.len()
    }

    /// Mirror a transport message.
    pub fn mirror(&self, topic: &str, payload: Value, direction: Direction) -> usize {
        self.broadcast(&FanOutEvent::mqtt(topic, payload, direction))
    }

    /// Send a heartbeat every `period` until the task is aborted. The
    /// first heartbeat goes out one period after start. Periods below
    /// [`MIN_HEARTBEAT_PERIOD`] are clamped.
    pub fn spawn_heartbeat(&self, period: Duration) -> JoinHandle<()> {
        let hub = self.clone();
        let period = period.max(MIN_HEARTBEAT_PERIOD);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let delivered = hub.broadcast(&FanOutEvent::heartbeat());
                tracing::trace!(observers = delivered, "heartbeat");
            }
        })
    }
}
