//! # Issuance Credential Types
//!
//! The request context sent to the credential-issuance backend and the
//! credential it returns. The backend is an external collaborator; these
//! types only fix the shape the bridge relies on.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identity::{DeviceId, SessionId, SiteId};

/// Who asked for a credential, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuanceContext {
    /// Originating component, always `"mqtt-bridge"` for the bridge.
    pub via: String,
    /// Site the gate is installed at.
    pub site: SiteId,
    /// Device that produced the detections.
    pub device_id: DeviceId,
    /// Trigger condition, `"sensor_and_thumb"` for a completed session.
    pub trigger: String,
    /// The session that earned the credential.
    pub session_id: SessionId,
}

impl IssuanceContext {
    /// Build the context for a session that saw presence and a completed hold.
    pub fn for_session(site: SiteId, device_id: DeviceId, session_id: SessionId) -> Self {
        Self {
            via: "mqtt-bridge".to_string(),
            site,
            device_id,
            trigger: "sensor_and_thumb".to_string(),
            session_id,
        }
    }
}

/// A one-time credential returned by the issuance backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// Backend record identifier; absent for credentials minted offline.
    pub id: Option<String>,
    /// The full credential object, forwarded to the UI as `qr_data`.
    pub data: Value,
}

impl Credential {
    /// Build a credential from the backend's `qr` object.
    ///
    /// The record id may be a string or a number depending on the backend
    /// table; numbers are rendered in decimal.
    pub fn from_qr_object(data: Value) -> Self {
        let id = match data.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        };
        Self { id, data }
    }
}
