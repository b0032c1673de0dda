//! # Bridge Actor
//!
//! One task owns the [`SessionMachine`] and processes events one at a
//! time: broker messages from the transport, and [`BridgeEvent`]s from its
//! mailbox (timer firings, issuance outcomes, cancel requests). Nothing
//! else touches the session, so a timer firing can never interleave with a
//! thumb event mid-transition.
//!
//! Expiry timers are tokio tasks that sleep for the TTL and post
//! [`BridgeEvent::TimerFired`]; their abort handles live on the session.
//! Issuance runs in its own task and its outcome rejoins the mailbox as
//! [`BridgeEvent::IssuanceCompleted`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};

use qrgate_core::payload::parse_json_lenient;
use qrgate_core::{
    Channel, ChannelRegistry, Credential, Outbound, PresencePayload, SessionId, ThumbPayload,
};
use qrgate_issuer_client::IssuanceGateway;
use qrgate_state::{ExpiryScheduler, IssuanceTicket, Phase, SessionMachine, Transition};

use crate::fanout::{Direction, FanOut};
use crate::metrics::BridgeMetrics;
use crate::transport::{InboundMessage, Transport};

/// Reason used when the bridge shuts down with a session open.
const REASON_SHUTDOWN: &str = "shutdown";

/// An event for the bridge actor.
#[derive(Debug)]
pub enum BridgeEvent {
    /// A session's expiry timer elapsed.
    TimerFired(SessionId),
    /// An issuance call finished.
    IssuanceCompleted {
        /// The session the call was made for.
        session_id: SessionId,
        /// The credential, or the message to report.
        result: Result<Credential, String>,
    },
    /// Tear down the current session.
    Cancel {
        /// Reason reported to the UI.
        reason: String,
        /// Publish nothing.
        silent: bool,
    },
    /// Stop the actor after a silent teardown.
    Shutdown,
}

// ── Timers ───────────────────────────────────────────────────────────

/// Expiry timers as tokio tasks posting into the bridge mailbox.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    mailbox: mpsc::UnboundedSender<BridgeEvent>,
}

impl ExpiryScheduler for TokioScheduler {
    type Handle = AbortHandle;

    fn schedule(&mut self, session_id: SessionId, ttl: Duration) -> AbortHandle {
        let mailbox = self.mailbox.clone();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            // The actor is gone if this fails; nothing left to expire.
            let _ = mailbox.send(BridgeEvent::TimerFired(session_id));
        })
        .abort_handle()
    }

    fn cancel(&mut self, handle: AbortHandle) {
        handle.abort();
    }
}

// ── Handle ───────────────────────────────────────────────────────────

/// Sends requests to a running bridge.
#[derive(Debug, Clone)]
pub struct BridgeHandle {
    mailbox: mpsc::UnboundedSender<BridgeEvent>,
}

impl BridgeHandle {
    /// Cancel the current session. Returns `false` if the bridge stopped.
    pub fn cancel(&self, reason: impl Into<String>, silent: bool) -> bool {
        self.mailbox
            .send(BridgeEvent::Cancel {
                reason: reason.into(),
                silent,
            })
            .is_ok()
    }

    /// Ask the bridge to stop.
    pub fn shutdown(&self) -> bool {
        self.mailbox.send(BridgeEvent::Shutdown).is_ok()
    }
}

// ── Bridge ───────────────────────────────────────────────────────────

/// The session bridge for one site/device pair.
pub struct Bridge {
    registry: ChannelRegistry,
    machine: SessionMachine<TokioScheduler>,
    transport: Arc<dyn Transport>,
    issuer: Arc<dyn IssuanceGateway>,
    fanout: FanOut,
    metrics: Option<BridgeMetrics>,
    mailbox_tx: mpsc::UnboundedSender<BridgeEvent>,
    mailbox: mpsc::UnboundedReceiver<BridgeEvent>,
    inbound: mpsc::UnboundedReceiver<InboundMessage>,
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("registry", &self.registry)
            .field("machine", &self.machine)
            .field("transport", &self.transport.name())
            .field("issuer", &self.issuer.name())
            .field("fanout", &self.fanout)
            .finish()
    }
}

impl Bridge {
    /// Build a bridge.
    ///
    /// `inbound` must be the receiving end of the channel the transport
    /// delivers broker messages to.
    pub fn new(
        registry: ChannelRegistry,
        session_ttl: Duration,
        transport: Arc<dyn Transport>,
        inbound: mpsc::UnboundedReceiver<InboundMessage>,
        issuer: Arc<dyn IssuanceGateway>,
        fanout: FanOut,
    ) -> Self {
        let (mailbox_tx, mailbox) = mpsc::unbounded_channel();
        let scheduler = TokioScheduler {
            mailbox: mailbox_tx.clone(),
        };
        let machine = SessionMachine::new(
            registry.site().clone(),
            registry.device().clone(),
            session_ttl,
            scheduler,
        );
        Self {
            registry,
            machine,
            transport,
            issuer,
            fanout,
            metrics: None,
            mailbox_tx,
            mailbox,
            inbound,
        }
    }

    /// Record counters into `metrics`.
    pub fn with_metrics(mut self, metrics: BridgeMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// A handle for sending requests to this bridge.
    pub fn handle(&self) -> BridgeHandle {
        BridgeHandle {
            mailbox: self.mailbox_tx.clone(),
        }
    }

    /// Current session phase.
    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    /// Run the bridge on a new task.
    pub fn spawn(self) -> (BridgeHandle, JoinHandle<()>) {
        let handle = self.handle();
        (handle, tokio::spawn(self.run()))
    }

    /// Subscribe to every channel and process events until shut down.
    pub async fn run(mut self) {
        let topics: Vec<String> = self
            .registry
            .topics()
            .into_iter()
            .map(|(_, topic)| topic)
            .collect();
        match self.transport.subscribe(&topics).await {
            Ok(()) => tracing::info!(
                transport = self.transport.name(),
                topics = ?topics,
                "bridge subscribed"
            ),
            Err(e) => tracing::warn!(error = %e, "subscribe failed, will retry on reconnect"),
        }

        loop {
            tokio::select! {
                Some(event) = self.mailbox.recv() => {
                    if !self.handle_event(event).await {
                        break;
                    }
                }
                Some(msg) = self.inbound.recv() => self.on_inbound(msg).await,
                else => break,
            }
        }
        tracing::info!("bridge stopped");
    }

    async fn handle_event(&mut self, event: BridgeEvent) -> bool {
        match event {
            BridgeEvent::TimerFired(session_id) => {
                let transition = self.machine.on_timer_fired(session_id);
                if !transition.outbound.is_empty() {
                    self.count_session_event("ttl_expired");
                }
                self.apply(transition).await;
            }
            BridgeEvent::IssuanceCompleted { session_id, result } => {
                self.count_session_event(if result.is_ok() {
                    "issued"
                } else {
                    "issuance_failed"
                });
                let transition = self.machine.on_issuance_complete(session_id, result);
                self.apply(transition).await;
            }
            BridgeEvent::Cancel { reason, silent } => {
                let was_open = self.machine.phase() != Phase::Idle;
                let transition = self.machine.cancel(&reason, silent);
                if was_open && publishes_cancel(&transition) {
                    self.count_session_event("cancelled");
                }
                self.apply(transition).await;
            }
            BridgeEvent::Shutdown => {
                let transition = self.machine.cancel(REASON_SHUTDOWN, true);
                self.apply(transition).await;
                return false;
            }
        }
        true
    }

    async fn on_inbound(&mut self, msg: InboundMessage) {
        let channel = match self.registry.channel_for(&msg.topic) {
            Ok(channel) => channel,
            Err(e) => {
                tracing::warn!(topic = %msg.topic, error = %e, "message on unknown topic");
                return;
            }
        };
        if let Some(m) = &self.metrics {
            m.record_inbound(channel);
        }

        match channel {
            Channel::Presence => {
                let parsed = PresencePayload::parse(&msg.payload);
                self.note_malformed(channel, &msg.topic, parsed.malformed_reason());
                let presence = parsed.into_value();

                let mut mirrored = parse_json_lenient(&msg.payload);
                match &mut mirrored {
                    Value::Object(map) => {
                        map.insert("present".to_string(), Value::Bool(presence.present));
                    }
                    other => *other = serde_json::json!({ "present": presence.present }),
                }
                self.fanout.mirror(&msg.topic, mirrored, Direction::Inbound);

                tracing::info!(
                    topic = %msg.topic,
                    present = presence.present,
                    distance = ?presence.distance,
                    "presence"
                );
                let was_open = self.machine.phase() != Phase::Idle;
                let transition = self.machine.on_presence(&presence);
                if transition
                    .outbound
                    .iter()
                    .any(|m| matches!(m, Outbound::Armed(_)))
                {
                    self.count_session_event("armed");
                } else if was_open && publishes_cancel(&transition) {
                    self.count_session_event("no_presence");
                }
                self.apply(transition).await;
            }
            Channel::Thumb => {
                let parsed = ThumbPayload::parse(&msg.payload);
                self.note_malformed(channel, &msg.topic, parsed.malformed_reason());
                self.fanout.mirror(
                    &msg.topic,
                    parse_json_lenient(&msg.payload),
                    Direction::Inbound,
                );
                let thumb = parsed.into_value();
                let transition = self.machine.on_thumb(&thumb);
                self.apply(transition).await;
            }
            Channel::Armed | Channel::Cancel | Channel::SessionStatus => {
                let payload = parse_json_lenient(&msg.payload);
                tracing::debug!(topic = %msg.topic, %payload, "echo");
                self.fanout.mirror(&msg.topic, payload, Direction::Inbound);
            }
        }
    }

    async fn apply(&mut self, transition: Transition) {
        for msg in transition.outbound {
            self.publish(msg).await;
        }
        if let (Some(rejection), Some(m)) = (&transition.rejected, &self.metrics) {
            m.record_rejection(rejection);
        }
        if let Some(ticket) = transition.issuance {
            self.dispatch(ticket);
        }
    }

    /// Publish one message and mirror it to observers. The mirror happens
    /// even when the publish is dropped.
    async fn publish(&self, msg: Outbound) {
        let channel = msg.channel();
        let topic = self.registry.topic(channel);
        let body = msg.to_json();

        let published = match self
            .transport
            .publish(&topic, body.to_string().into_bytes())
            .await
        {
            Ok(()) => {
                tracing::debug!(%topic, payload = %body, "published");
                true
            }
            Err(e) => {
                tracing::warn!(%topic, error = %e, "publish failed");
                false
            }
        };
        if let Some(m) = &self.metrics {
            m.record_outbound(channel, published);
        }
        self.fanout.mirror(&topic, body, Direction::Outbound);
    }

    fn dispatch(&self, ticket: IssuanceTicket) {
        let issuer = Arc::clone(&self.issuer);
        let mailbox = self.mailbox_tx.clone();
        let metrics = self.metrics.clone();
        tracing::info!(
            session_id = %ticket.session_id,
            issuer = issuer.name(),
            "dispatching issuance"
        );
        tokio::spawn(async move {
            let started = Instant::now();
            let result = issuer.issue(&ticket.context).await.map_err(|e| {
                tracing::warn!(session_id = %ticket.session_id, error = %e, "issuance call failed");
                e.user_message()
            });
            if let Some(m) = &metrics {
                m.record_issuance(result.is_ok(), started.elapsed().as_secs_f64());
            }
            let _ = mailbox.send(BridgeEvent::IssuanceCompleted {
                session_id: ticket.session_id,
                result,
            });
        });
    }

    fn note_malformed(&self, channel: Channel, topic: &str, reason: Option<&str>) {
        if let Some(reason) = reason {
            tracing::warn!(%topic, reason, "malformed payload, using defaults");
            if let Some(m) = &self.metrics {
                m.record_malformed(channel);
            }
        }
    }

    fn count_session_event(&self, event: &str) {
        if let Some(m) = &self.metrics {
            m.record_session_event(event);
        }
    }
}

fn publishes_cancel(transition: &Transition) -> bool {
    transition
        .outbound
        .iter()
        .any(|m| matches!(m, Outbound::Cancel(_)))
}
