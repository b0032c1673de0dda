//! # Identity Newtypes
//!
//! Identifiers used by the check-in bridge. Each identifier is a distinct
//! type, so you cannot pass a [`DeviceId`] where a [`SiteId`] is expected.
//!
//! ## Validation
//!
//! [`SiteId`] and [`DeviceId`] become MQTT topic levels, so they are
//! validated at construction time: non-empty, trimmed, and free of the
//! topic separator and wildcard characters. [`SessionId`] is UUID-based and
//! always valid by construction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Characters that would break a topic level.
const RESERVED: [char; 3] = ['/', '+', '#'];

fn is_valid_level(s: &str) -> bool {
    !s.is_empty() && s.trim() == s && !s.contains(RESERVED)
}

/// The physical site a gate is installed at (first topic level).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteId(String);

impl SiteId {
    /// Create a site identifier, rejecting empty or topic-unsafe values.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        if is_valid_level(&s) {
            Ok(Self(s))
        } else {
            Err(ValidationError::InvalidSiteId(s))
        }
    }

    /// Access the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SiteId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The sensor device a bridge instance serves (second topic level).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a device identifier, rejecting empty or topic-unsafe values.
    pub fn new(s: impl Into<String>) -> Result<Self, ValidationError> {
        let s = s.into();
        if is_valid_level(&s) {
            Ok(Self(s))
        } else {
            Err(ValidationError::InvalidDeviceId(s))
        }
    }

    /// Access the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one armed session window.
///
/// Timer firings and issuance results carry the session id they were
/// created for, so a result that arrives after the session was replaced
/// can be recognized as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    /// Create a new random session identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn site_id_accepts_plain_level() {
        let site = SiteId::new("gateA").unwrap();
        assert_eq!(site.as_str(), "gateA");
        assert_eq!(site.to_string(), "gateA");
    }

    #[test]
    fn site_id_rejects_empty() {
        assert_eq!(
            SiteId::new(""),
            Err(ValidationError::InvalidSiteId(String::new()))
        );
    }

    #[test]
    fn site_id_rejects_separator_and_wildcards() {
        assert!(SiteId::new("gate/A").is_err());
        assert!(SiteId::new("gate+").is_err());
        assert!(SiteId::new("#").is_err());
    }

    #[test]
    fn device_id_rejects_surrounding_whitespace() {
        assert!(DeviceId::new(" esp32-01").is_err());
        assert!(DeviceId::new("esp32-01 ").is_err());
        assert!(DeviceId::new("esp32-01").is_ok());
    }

    #[test]
    fn session_ids_are_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn session_id_displays_as_uuid() {
        let id = SessionId::new();
        let uuid = Uuid::parse_str(&id.to_string()).unwrap();
        assert_eq!(uuid.get_version_num(), 4);
    }
}
