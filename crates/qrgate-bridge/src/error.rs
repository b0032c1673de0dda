//! Transport error types.

/// Errors from the pub/sub transport. None of them is fatal: the MQTT
/// event loop reconnects on its own, and a failed publish is logged and
/// dropped.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The transport is not connected; the publish was dropped.
    #[error("transport disconnected, dropped publish to {topic}")]
    Disconnected {
        /// Target topic.
        topic: String,
    },
    /// The client rejected a publish request.
    #[error("publish to {topic} failed: {reason}")]
    Publish {
        /// Target topic.
        topic: String,
        /// Client error.
        reason: String,
    },
    /// The client rejected a subscribe request.
    #[error("subscribe to {topic} failed: {reason}")]
    Subscribe {
        /// Topic filter.
        topic: String,
        /// Client error.
        reason: String,
    },
    /// The inbound handler has gone away.
    #[error("inbound handler closed")]
    HandlerClosed,
}
