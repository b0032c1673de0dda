//! # Channel Registry
//!
//! The five logical channels the bridge speaks on, and the fixed mapping
//! from each channel to its topic string for one site/device pair:
//!
//! | Channel | Topic suffix | Direction |
//! |---|---|---|
//! | [`Channel::Presence`] | `event/presence` | sensor → bridge |
//! | [`Channel::Thumb`] | `ui/thumb` | sensor → bridge |
//! | [`Channel::Armed`] | `ui/armed` | bridge → UI |
//! | [`Channel::Cancel`] | `ui/cancel` | bridge → UI |
//! | [`Channel::SessionStatus`] | `ui/session_status` | bridge → UI |
//!
//! Topics are `{site}/{device}/{suffix}`. The registry is built once at
//! start-up and never mutated.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::identity::{DeviceId, SiteId};

/// A logical event channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Presence sensor detections.
    Presence,
    /// Thumb-hold gesture progress and completion.
    Thumb,
    /// Session armed notifications.
    Armed,
    /// Session cancellation and issuance outcome.
    Cancel,
    /// Session status transitions for the UI.
    SessionStatus,
}

impl Channel {
    /// All channels, in subscription order.
    pub const ALL: [Channel; 5] = [
        Channel::Presence,
        Channel::Thumb,
        Channel::SessionStatus,
        Channel::Armed,
        Channel::Cancel,
    ];

    /// The logical event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Presence => "presence",
            Self::Thumb => "thumb",
            Self::Armed => "armed",
            Self::Cancel => "cancel",
            Self::SessionStatus => "session_status",
        }
    }

    /// The topic suffix appended after `{site}/{device}/`.
    pub fn topic_suffix(&self) -> &'static str {
        match self {
            Self::Presence => "event/presence",
            Self::Thumb => "ui/thumb",
            Self::Armed => "ui/armed",
            Self::Cancel => "ui/cancel",
            Self::SessionStatus => "ui/session_status",
        }
    }

}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed channel → topic mapping for one site/device pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRegistry {
    site: SiteId,
    device: DeviceId,
    prefix: String,
}

impl ChannelRegistry {
    /// Build the registry for a site/device pair.
    pub fn new(site: SiteId, device: DeviceId) -> Self {
        let prefix = format!("{site}/{device}/");
        Self {
            site,
            device,
            prefix,
        }
    }

    /// The site this registry serves.
    pub fn site(&self) -> &SiteId {
        &self.site
    }

    /// The device this registry serves.
    pub fn device(&self) -> &DeviceId {
        &self.device
    }

    /// The full topic string for a channel.
    pub fn topic(&self, channel: Channel) -> String {
        format!("{}{}", self.prefix, channel.topic_suffix())
    }

    /// Resolve a topic string back to its channel.
    pub fn channel_for(&self, topic: &str) -> Result<Channel, ValidationError> {
        topic
            .strip_prefix(&self.prefix)
            .and_then(|suffix| Channel::ALL.into_iter().find(|c| c.topic_suffix() == suffix))
            .ok_or_else(|| ValidationError::UnknownTopic(topic.to_string()))
    }

    /// All topics, in subscription order.
    pub fn topics(&self) -> Vec<(Channel, String)> {
        Channel::ALL.into_iter().map(|c| (c, self.topic(c))).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ChannelRegistry {
        ChannelRegistry::new(
            SiteId::new("gateA").unwrap(),
            DeviceId::new("esp32-01").unwrap(),
        )
    }

    #[test]
    fn topics_follow_site_device_layout() {
        let reg = registry();
        assert_eq!(reg.topic(Channel::Presence), "gateA/esp32-01/event/presence");
        assert_eq!(reg.topic(Channel::Thumb), "gateA/esp32-01/ui/thumb");
        assert_eq!(reg.topic(Channel::Armed), "gateA/esp32-01/ui/armed");
        assert_eq!(reg.topic(Channel::Cancel), "gateA/esp32-01/ui/cancel");
        assert_eq!(
            reg.topic(Channel::SessionStatus),
            "gateA/esp32-01/ui/session_status"
        );
    }

    #[test]
    fn reverse_lookup_covers_every_channel() {
        let reg = registry();
        for (channel, topic) in reg.topics() {
            assert_eq!(reg.channel_for(&topic).unwrap(), channel);
        }
    }

    #[test]
    fn reverse_lookup_rejects_foreign_device() {
        let reg = registry();
        let err = reg.channel_for("gateA/esp32-02/ui/thumb").unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownTopic("gateA/esp32-02/ui/thumb".into())
        );
    }

    #[test]
    fn reverse_lookup_rejects_unknown_suffix() {
        let reg = registry();
        assert!(reg.channel_for("gateA/esp32-01/ui/other").is_err());
        assert!(reg.channel_for("gateA/esp32-01/").is_err());
    }

    #[test]
    fn channel_serializes_snake_case() {
        let json = serde_json::to_string(&Channel::SessionStatus).unwrap();
        assert_eq!(json, "\"session_status\"");
    }
}
