//! MQTT 3.1.1 transport over `rumqttc`.
//!
//! A background task drives the `rumqttc` event loop. It tracks the
//! connection state, re-subscribes on every `CONNACK`, forwards every
//! incoming `PUBLISH` to the inbound channel, and sleeps for a fixed
//! backoff after each connection error before polling again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{InboundMessage, Transport};
use crate::config::{BridgeConfig, ConfigError};
use crate::error::TransportError;

/// Delay between reconnect attempts.
pub const RECONNECT_BACKOFF: Duration = Duration::from_millis(1000);
/// MQTT keep-alive interval.
pub const KEEP_ALIVE: Duration = Duration::from_secs(60);
/// Capacity of the client request queue.
const REQUEST_CAPACITY: usize = 64;

/// A broker connection.
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    subscriptions: Arc<Mutex<Vec<String>>>,
}

impl std::fmt::Debug for MqttTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttTransport")
            .field("connected", &self.is_connected())
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish()
    }
}

impl MqttTransport {
    /// Connect to the broker in `config` and start the event loop task.
    ///
    /// Returns immediately; the connection is established in the
    /// background and retried until it succeeds.
    pub fn start(
        config: &BridgeConfig,
        inbound: mpsc::UnboundedSender<InboundMessage>,
    ) -> Result<(Self, JoinHandle<()>), ConfigError> {
        let (host, port) = config.mqtt_endpoint()?;
        let mut options = MqttOptions::new(config.client_id(), host.clone(), port);
        options.set_keep_alive(KEEP_ALIVE);
        let password = config
            .mqtt_password
            .as_ref()
            .map(|p| p.as_str().to_string())
            .unwrap_or_default();
        options.set_credentials(config.mqtt_username.clone(), password);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let transport = Self {
            client,
            connected: Arc::new(AtomicBool::new(false)),
            subscriptions: Arc::new(Mutex::new(Vec::new())),
        };

        tracing::info!(%host, port, client_id = %config.client_id(), "starting MQTT transport");
        let link = Link {
            connected: transport.connected.clone(),
            subscriptions: transport.subscriptions.clone(),
            inbound,
        };
        let task = tokio::spawn(drive(eventloop, transport.client.clone(), link));
        Ok((transport, task))
    }
}

/// What the event loop does after handling one poll result.
#[derive(Debug, PartialEq, Eq)]
enum Step {
    /// Poll again.
    Continue,
    /// Connected: subscribe to these topics, then poll again.
    Resubscribe(Vec<String>),
    /// Connection error: wait, then poll again.
    Backoff(Duration),
    /// Nobody consumes inbound messages any more.
    Stop,
}

/// Connection state shared between the event loop and the transport.
struct Link {
    connected: Arc<AtomicBool>,
    subscriptions: Arc<Mutex<Vec<String>>>,
    inbound: mpsc::UnboundedSender<InboundMessage>,
}

impl Link {
    fn on_poll(&self, polled: Result<Event, ConnectionError>) -> Step {
        match polled {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                self.connected.store(true, Ordering::SeqCst);
                let topics = self.subscriptions.lock().clone();
                tracing::info!(topics = topics.len(), "MQTT connected");
                Step::Resubscribe(topics)
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let msg = InboundMessage::new(publish.topic.clone(), publish.payload.to_vec());
                if self.inbound.send(msg).is_err() {
                    tracing::info!("inbound handler closed, stopping MQTT event loop");
                    self.connected.store(false, Ordering::SeqCst);
                    return Step::Stop;
                }
                Step::Continue
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                tracing::debug!(pkid = ack.pkid, "MQTT subscribed");
                Step::Continue
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                self.connected.store(false, Ordering::SeqCst);
                tracing::warn!("MQTT broker sent disconnect");
                Step::Continue
            }
            Ok(_) => Step::Continue,
            Err(e) => {
                if self.connected.swap(false, Ordering::SeqCst) {
                    tracing::warn!(error = %e, "MQTT connection lost, reconnecting");
                } else {
                    tracing::debug!(error = %e, "MQTT reconnect attempt failed");
                }
                Step::Backoff(RECONNECT_BACKOFF)
            }
        }
    }
}

async fn drive(mut eventloop: EventLoop, client: AsyncClient, link: Link) {
    loop {
        match link.on_poll(eventloop.poll().await) {
            Step::Continue => {}
            Step::Resubscribe(topics) => {
                for topic in topics {
                    if let Err(e) = client.try_subscribe(topic.clone(), QoS::AtLeastOnce) {
                        tracing::warn!(%topic, error = %e, "MQTT re-subscribe failed");
                    }
                }
            }
            Step::Backoff(delay) => tokio::time::sleep(delay).await,
            Step::Stop => return,
        }
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::Disconnected {
                topic: topic.to_string(),
            });
        }
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|e| TransportError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(&self, topics: &[String]) -> Result<(), TransportError> {
        {
            let mut subs = self.subscriptions.lock();
            for topic in topics {
                if !subs.contains(topic) {
                    subs.push(topic.clone());
                }
            }
        }
        // Not yet connected: the CONNACK handler subscribes everything.
        if !self.is_connected() {
            return Ok(());
        }
        for topic in topics {
            self.client
                .subscribe(topic.as_str(), QoS::AtLeastOnce)
                .await
                .map_err(|e| TransportError::Subscribe {
                    topic: topic.clone(),
                    reason: e.to_string(),
                })?;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "mqtt"
    }
}
