//! Bridge configuration.
//!
//! Read once at start-up from the environment. Invalid URLs and identifiers
//! are start-up errors; numeric settings that fail to parse fall back to
//! their defaults.

use std::time::Duration;

use url::Url;
use zeroize::Zeroizing;

use qrgate_core::{ChannelRegistry, DeviceId, SiteId, ValidationError};
use qrgate_issuer_client::IssuerConfig;

/// Default session window.
pub const DEFAULT_SESSION_TTL_MS: u64 = 6000;
/// Default observer heartbeat period.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 30;
/// Default MQTT port when the URL has none.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Configuration for one bridge instance.
///
/// Custom `Debug` implementation redacts the MQTT password.
#[derive(Clone)]
pub struct BridgeConfig {
    /// Site the gate is installed at.
    pub site: SiteId,
    /// Sensor device this bridge serves.
    pub device_id: DeviceId,
    /// Broker URL, `mqtt://` or `tcp://`.
    pub mqtt_url: Url,
    /// Broker username.
    pub mqtt_username: String,
    /// Broker password, if the broker requires one.
    pub mqtt_password: Option<Zeroizing<String>>,
    /// Session window.
    pub session_ttl: Duration,
    /// Period of observer heartbeats.
    pub heartbeat_interval: Duration,
    /// Port of the observer HTTP endpoint.
    pub port: u16,
    /// Issuance backend settings.
    pub issuer: IssuerConfig,
}

impl std::fmt::Debug for BridgeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeConfig")
            .field("site", &self.site)
            .field("device_id", &self.device_id)
            .field("mqtt_url", &self.mqtt_url.as_str())
            .field("mqtt_username", &self.mqtt_username)
            .field(
                "mqtt_password",
                &self.mqtt_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("session_ttl", &self.session_ttl)
            .field("heartbeat_interval", &self.heartbeat_interval)
            .field("port", &self.port)
            .field("issuer", &self.issuer)
            .finish()
    }
}

impl BridgeConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `SITE` (default: `gateA`)
    /// - `DEVICE_ID` (default: `esp32-01`)
    /// - `MQTT_URL` (default: `mqtt://127.0.0.1:1883`)
    /// - `MQTT_USER_SERVER` (default: `server`)
    /// - `MQTT_PASS_SERVER` (no default)
    /// - `SESSION_TTL_MS` (default: 6000; zero or non-numeric uses the default)
    /// - `HEARTBEAT_SECS` (default: 30)
    /// - `PORT` (default: 9000)
    /// - `ISSUER_URL`, `ISSUER_TIMEOUT_SECS`, `QR_OFFLINE_MODE`, see
    ///   [`IssuerConfig::from_env`]
    pub fn from_env() -> Result<Self, ConfigError> {
        let site = SiteId::new(env_or("SITE", "gateA"))?;
        let device_id = DeviceId::new(env_or("DEVICE_ID", "esp32-01"))?;
        let mqtt_url = parse_mqtt_url(&env_or("MQTT_URL", "mqtt://127.0.0.1:1883"))?;

        Ok(Self {
            site,
            device_id,
            mqtt_url,
            mqtt_username: env_or("MQTT_USER_SERVER", "server"),
            mqtt_password: std::env::var("MQTT_PASS_SERVER")
                .ok()
                .filter(|p| !p.is_empty())
                .map(Zeroizing::new),
            session_ttl: Duration::from_millis(parse_positive(
                std::env::var("SESSION_TTL_MS").ok().as_deref(),
                DEFAULT_SESSION_TTL_MS,
            )),
            heartbeat_interval: Duration::from_secs(parse_positive(
                std::env::var("HEARTBEAT_SECS").ok().as_deref(),
                DEFAULT_HEARTBEAT_SECS,
            )),
            port: std::env::var("PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(9000),
            issuer: IssuerConfig::from_env()?,
        })
    }

    /// Defaults for a site/device pair, pointing at a local broker and
    /// issuer.
    pub fn local(site: SiteId, device_id: DeviceId) -> Result<Self, ConfigError> {
        Ok(Self {
            site,
            device_id,
            mqtt_url: parse_mqtt_url("mqtt://127.0.0.1:1883")?,
            mqtt_username: "server".to_string(),
            mqtt_password: None,
            session_ttl: Duration::from_millis(DEFAULT_SESSION_TTL_MS),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
            port: 9000,
            issuer: IssuerConfig::local_mock("http://127.0.0.1:9000")?,
        })
    }

    /// The topic registry for this site/device pair.
    pub fn registry(&self) -> ChannelRegistry {
        ChannelRegistry::new(self.site.clone(), self.device_id.clone())
    }

    /// MQTT client id, unique per site/device pair.
    pub fn client_id(&self) -> String {
        format!("qrgate-bridge-{}-{}", self.site, self.device_id)
    }

    /// Broker host and port.
    pub fn mqtt_endpoint(&self) -> Result<(String, u16), ConfigError> {
        let host = self
            .mqtt_url
            .host_str()
            .ok_or_else(|| ConfigError::InvalidUrl("MQTT_URL".into(), "missing host".into()))?;
        Ok((
            host.to_string(),
            self.mqtt_url.port().unwrap_or(DEFAULT_MQTT_PORT),
        ))
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

fn parse_mqtt_url(raw: &str) -> Result<Url, ConfigError> {
    let url =
        Url::parse(raw).map_err(|e| ConfigError::InvalidUrl("MQTT_URL".into(), e.to_string()))?;
    match url.scheme() {
        "mqtt" | "tcp" => {}
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(
            "MQTT_URL".into(),
            "missing host".into(),
        ));
    }
    Ok(url)
}

/// Parse a positive integer, falling back to `default` for anything else.
fn parse_positive(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|&n| n > 0)
        .unwrap_or(default)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A URL variable did not parse.
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
    /// The broker URL scheme is not supported.
    #[error("unsupported MQTT URL scheme `{0}`, expected mqtt or tcp")]
    UnsupportedScheme(String),
    /// Site or device identifier is not a valid topic level.
    #[error(transparent)]
    Identifier(#[from] ValidationError),
    /// Issuer settings are invalid.
    #[error("issuer configuration: {0}")]
    Issuer(#[from] qrgate_issuer_client::ConfigError),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BridgeConfig {
        BridgeConfig::local(
            SiteId::new("gateA").unwrap(),
            DeviceId::new("esp32-01").unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn ttl_falls_back_on_garbage_and_zero() {
        assert_eq!(parse_positive(None, 6000), 6000);
        assert_eq!(parse_positive(Some("abc"), 6000), 6000);
        assert_eq!(parse_positive(Some("0"), 6000), 6000);
        assert_eq!(parse_positive(Some("-5"), 6000), 6000);
        assert_eq!(parse_positive(Some(" 2500 "), 6000), 2500);
    }

    #[test]
    fn mqtt_url_schemes() {
        assert!(parse_mqtt_url("mqtt://broker.local:1884").is_ok());
        assert!(parse_mqtt_url("tcp://10.0.0.2").is_ok());
        assert!(matches!(
            parse_mqtt_url("http://broker.local"),
            Err(ConfigError::UnsupportedScheme(s)) if s == "http"
        ));
        assert!(matches!(
            parse_mqtt_url("not a url"),
            Err(ConfigError::InvalidUrl(..))
        ));
    }

    #[test]
    fn endpoint_defaults_port() {
        let mut cfg = config();
        assert_eq!(cfg.mqtt_endpoint().unwrap(), ("127.0.0.1".to_string(), 1883));
        cfg.mqtt_url = parse_mqtt_url("mqtt://broker.local").unwrap();
        assert_eq!(cfg.mqtt_endpoint().unwrap(), ("broker.local".to_string(), 1883));
    }

    #[test]
    fn debug_redacts_password() {
        let mut cfg = config();
        cfg.mqtt_password = Some(Zeroizing::new("hunter2".to_string()));
        let rendered = format!("{cfg:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn registry_and_client_id_follow_identity() {
        let cfg = config();
        assert_eq!(cfg.client_id(), "qrgate-bridge-gateA-esp32-01");
        assert_eq!(
            cfg.registry().topic(qrgate_core::Channel::Presence),
            "gateA/esp32-01/event/presence"
        );
    }

    #[test]
    fn local_defaults() {
        let cfg = config();
        assert_eq!(cfg.session_ttl, Duration::from_millis(6000));
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
        assert!(cfg.mqtt_password.is_none());
    }
}
