//! # Outbound Messages
//!
//! Every message the bridge publishes, bound to the channel it goes out on.
//! Optional fields are omitted from the JSON rather than sent as `null`, so
//! the UI can test for presence with a plain property check.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::channel::Channel;
use crate::temporal::Timestamp;

/// `ui/armed` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmedPayload {
    /// Session window in milliseconds.
    pub ttl: u64,
}

/// `ui/cancel` payload.
///
/// Either a plain teardown reason, or the outcome of an issuance attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CancelPayload {
    /// Issuance finished, successfully or not.
    Outcome {
        /// Whether a credential was issued.
        success: bool,
        /// Identifier of the issued credential.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        qr_id: Option<String>,
        /// Error message from the issuance backend.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// The session was torn down without issuance.
    Reason {
        /// Why the session ended.
        reason: String,
    },
}

/// Session status values shown by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusKind {
    /// A session window was opened.
    Armed,
    /// The presence sensor fired.
    SensorDetected,
    /// A completed thumb hold was accepted.
    ThumbDetected,
    /// A credential was issued.
    QrGenerated,
    /// No session is open.
    Idle,
}

impl std::fmt::Display for StatusKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Armed => "armed",
            Self::SensorDetected => "sensor_detected",
            Self::ThumbDetected => "thumb_detected",
            Self::QrGenerated => "qr_generated",
            Self::Idle => "idle",
        };
        f.write_str(s)
    }
}

/// `ui/session_status` payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatusPayload {
    /// The status being reported.
    pub status: StatusKind,
    /// Session window in milliseconds (armed only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// The issued credential (qr_generated only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qr_data: Option<Value>,
    /// Why the session went idle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl SessionStatusPayload {
    /// A status with no optional fields, stamped now.
    pub fn new(status: StatusKind) -> Self {
        Self {
            status,
            ttl: None,
            qr_data: None,
            reason: None,
            timestamp: Timestamp::now().epoch_millis(),
        }
    }

    /// Attach the session window.
    pub fn with_ttl(mut self, ttl_ms: u64) -> Self {
        self.ttl = Some(ttl_ms);
        self
    }

    /// Attach the issued credential.
    pub fn with_qr_data(mut self, data: Value) -> Self {
        self.qr_data = Some(data);
        self
    }

    /// Attach the idle reason.
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// A message ready to publish.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// Published on [`Channel::Armed`].
    Armed(ArmedPayload),
    /// Published on [`Channel::Cancel`].
    Cancel(CancelPayload),
    /// Published on [`Channel::SessionStatus`].
    Status(SessionStatusPayload),
}

impl Outbound {
    /// The channel this message is published on.
    pub fn channel(&self) -> Channel {
        match self {
            Self::Armed(_) => Channel::Armed,
            Self::Cancel(_) => Channel::Cancel,
            Self::Status(_) => Channel::SessionStatus,
        }
    }

    /// The JSON body.
    pub fn to_json(&self) -> Value {
        let result = match self {
            Self::Armed(p) => serde_json::to_value(p),
            Self::Cancel(p) => serde_json::to_value(p),
            Self::Status(p) => serde_json::to_value(p),
        };
        // These types contain only strings, integers, bools and JSON values.
        result.unwrap_or(Value::Null)
    }

    /// The status kind, for session status messages.
    pub fn status(&self) -> Option<StatusKind> {
        match self {
            Self::Status(p) => Some(p.status),
            _ => None,
        }
    }
}
