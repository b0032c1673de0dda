//! # Prometheus Metrics
//!
//! Bridge counters backed by a `prometheus` registry. Message and session
//! counters are pushed by the bridge actor as events happen; the observer
//! and connection gauges are set on each `/metrics` scrape.

use std::sync::Arc;

use prometheus::core::Collector;
use prometheus::{
    Encoder, Gauge, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};

use qrgate_core::Channel;
use qrgate_state::Rejection;

/// Shared metrics state.
#[derive(Clone)]
pub struct BridgeMetrics {
    inner: Arc<Inner>,
}

struct Inner {
    registry: Registry,

    // -- Pushed by the bridge actor --
    inbound_messages_total: IntCounterVec,
    outbound_messages_total: IntCounterVec,
    malformed_payloads_total: IntCounterVec,
    session_events_total: IntCounterVec,
    rejections_total: IntCounterVec,
    issuance_duration_seconds: HistogramVec,

    // -- Set on scrape --
    observers: Gauge,
    transport_connected: Gauge,
}

impl std::fmt::Debug for BridgeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeMetrics")
            .field("inbound", &self.inbound_total())
            .field("outbound", &self.outbound_total())
            .finish()
    }
}

impl BridgeMetrics {
    /// Create a metrics instance with a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let inbound_messages_total = IntCounterVec::new(
            Opts::new("qrgate_inbound_messages_total", "Messages received by channel"),
            &["channel"],
        )?;
        let outbound_messages_total = IntCounterVec::new(
            Opts::new(
                "qrgate_outbound_messages_total",
                "Messages published by channel and result",
            ),
            &["channel", "result"],
        )?;
        let malformed_payloads_total = IntCounterVec::new(
            Opts::new(
                "qrgate_malformed_payloads_total",
                "Sensor payloads that had to be defaulted",
            ),
            &["channel"],
        )?;
        let session_events_total = IntCounterVec::new(
            Opts::new("qrgate_session_events_total", "Session lifecycle events"),
            &["event"],
        )?;
        let rejections_total = IntCounterVec::new(
            Opts::new(
                "qrgate_rejections_total",
                "Thumb holds ignored because of session state",
            ),
            &["reason"],
        )?;
        let issuance_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "qrgate_issuance_duration_seconds",
                "Credential issuance call duration in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["result"],
        )?;
        let observers = Gauge::new("qrgate_observers", "Connected fan-out observers")?;
        let transport_connected = Gauge::new(
            "qrgate_transport_connected",
            "Whether the broker connection is up (1=up, 0=down)",
        )?;

        registry.register(Box::new(inbound_messages_total.clone()))?;
        registry.register(Box::new(outbound_messages_total.clone()))?;
        registry.register(Box::new(malformed_payloads_total.clone()))?;
        registry.register(Box::new(session_events_total.clone()))?;
        registry.register(Box::new(rejections_total.clone()))?;
        registry.register(Box::new(issuance_duration_seconds.clone()))?;
        registry.register(Box::new(observers.clone()))?;
        registry.register(Box::new(transport_connected.clone()))?;

        Ok(Self {
            inner: Arc::new(Inner {
                registry,
                inbound_messages_total,
                outbound_messages_total,
                malformed_payloads_total,
                session_events_total,
                rejections_total,
                issuance_duration_seconds,
                observers,
                transport_connected,
            }),
        })
    }

    pub(crate) fn record_inbound(&self, channel: Channel) {
        self.inner
            .inbound_messages_total
            .with_label_values(&[channel.name()])
            .inc();
    }

    pub(crate) fn record_outbound(&self, channel: Channel, published: bool) {
        let result = if published { "published" } else { "dropped" };
        self.inner
            .outbound_messages_total
            .with_label_values(&[channel.name(), result])
            .inc();
    }

    pub(crate) fn record_malformed(&self, channel: Channel) {
        self.inner
            .malformed_payloads_total
            .with_label_values(&[channel.name()])
            .inc();
    }

    pub(crate) fn record_session_event(&self, event: &str) {
        self.inner
            .session_events_total
            .with_label_values(&[event])
            .inc();
    }

    pub(crate) fn record_rejection(&self, rejection: &Rejection) {
        let reason = match rejection {
            Rejection::NotArmed => "not_armed",
            Rejection::PresenceNotConfirmed { .. } => "presence_not_confirmed",
            Rejection::AlreadyIssuing { .. } => "already_issuing",
        };
        self.inner.rejections_total.with_label_values(&[reason]).inc();
    }

    pub(crate) fn record_issuance(&self, success: bool, duration_secs: f64) {
        let result = if success { "success" } else { "failure" };
        self.inner
            .issuance_duration_seconds
            .with_label_values(&[result])
            .observe(duration_secs);
    }

    /// Set the scrape-time gauges.
    pub fn set_gauges(&self, observers: usize, transport_connected: bool) {
        self.inner.observers.set(observers as f64);
        self.inner
            .transport_connected
            .set(if transport_connected { 1.0 } else { 0.0 });
    }

    /// Total inbound messages across channels.
    pub fn inbound_total(&self) -> u64 {
        sum(&self.inner.inbound_messages_total)
    }

    /// Total outbound messages across channels and results.
    pub fn outbound_total(&self) -> u64 {
        sum(&self.inner.outbound_messages_total)
    }

    /// Count for one session event.
    pub fn session_events(&self, event: &str) -> u64 {
        self.inner
            .session_events_total
            .with_label_values(&[event])
            .get()
    }

    /// Total rejections across reasons.
    pub fn rejections_total(&self) -> u64 {
        sum(&self.inner.rejections_total)
    }

    /// Gather all metrics and encode to Prometheus text format.
    pub fn gather_and_encode(&self) -> Result<String, String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| format!("failed to encode metrics: {e}"))?;
        String::from_utf8(buffer).map_err(|e| format!("metrics encoding produced invalid UTF-8: {e}"))
    }
}

fn sum(counter: &IntCounterVec) -> u64 {
    let mut total = 0u64;
    for mf in &counter.collect() {
        for m in mf.get_metric() {
            total += m.get_counter().get_value() as u64;
        }
    }
    total
}
