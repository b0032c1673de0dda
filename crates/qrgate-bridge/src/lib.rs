//! # qrgate-bridge -- MQTT Session Bridge
//!
//! Wires the session machine to the outside world:
//!
//! - [`transport`]: the pub/sub adapter ([`Transport`] trait, an MQTT
//!   implementation over `rumqttc`, and an in-memory one).
//! - [`bridge`]: the actor task that owns the session machine and drains a
//!   single mailbox of inbound messages, timer firings and issuance
//!   outcomes.
//! - [`fanout`]: the observer hub that mirrors every transport event and
//!   periodic heartbeats to connected observers.
//! - [`config`]: environment configuration.
//! - [`metrics`]: Prometheus counters for the bridge.
//!
//! ## Data Flow
//!
//! ```text
//! sensor ─▶ Transport ─▶ mailbox ─▶ SessionMachine ─▶ Transport ─▶ UI
//!                           ▲              │
//!              timers ──────┤              └──▶ IssuanceGateway (spawned)
//!              issuance ────┘
//!
//! every inbound and outbound message ─▶ FanOut ─▶ observers
//! ```

pub mod bridge;
pub mod config;
pub mod error;
pub mod fanout;
pub mod metrics;
pub mod transport;

pub use bridge::{Bridge, BridgeEvent, BridgeHandle, TokioScheduler};
pub use config::{BridgeConfig, ConfigError};
pub use error::TransportError;
pub use fanout::{Direction, FanOut, FanOutEvent, Observer, ObserverId};
pub use metrics::BridgeMetrics;
pub use transport::{InboundMessage, MemoryTransport, MqttTransport, Transport};
