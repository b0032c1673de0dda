//! Issuer configuration.
//!
//! Points the HTTP issuer at the `qr-create` endpoint, or switches to
//! local offline issuance.

use url::Url;

/// Default `qr-create` endpoint, served next to the bridge.
pub const DEFAULT_ISSUER_URL: &str = "http://127.0.0.1:9000/api/qr-create";

/// Configuration for the issuance gateway.
#[derive(Debug, Clone)]
pub struct IssuerConfig {
    /// Full URL of the `qr-create` endpoint.
    pub issuer_url: Url,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Mint credentials locally instead of calling the backend.
    pub offline: bool,
}

impl IssuerConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `ISSUER_URL` (default: `http://127.0.0.1:9000/api/qr-create`)
    /// - `ISSUER_TIMEOUT_SECS` (default: 10)
    /// - `QR_OFFLINE_MODE` (`1` enables offline issuance)
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            issuer_url: env_url("ISSUER_URL", DEFAULT_ISSUER_URL)?,
            timeout_secs: std::env::var("ISSUER_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|&secs| secs > 0)
                .unwrap_or(10),
            offline: std::env::var("QR_OFFLINE_MODE").is_ok_and(|v| v == "1"),
        })
    }

    /// Configuration for a mock server at `base` (for testing).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if `base` joined with the
    /// `qr-create` path is not a valid URL.
    pub fn local_mock(base: &str) -> Result<Self, ConfigError> {
        let raw = format!("{}/api/qr-create", base.trim_end_matches('/'));
        let issuer_url = Url::parse(&raw)
            .map_err(|e| ConfigError::InvalidUrl("ISSUER_URL".to_string(), e.to_string()))?;
        Ok(Self {
            issuer_url,
            timeout_secs: 5,
            offline: false,
        })
    }
}

fn env_url(var: &str, default: &str) -> Result<Url, ConfigError> {
    let raw = std::env::var(var).unwrap_or_else(|_| default.to_string());
    Url::parse(&raw).map_err(|e| ConfigError::InvalidUrl(var.to_string(), e.to_string()))
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A URL variable did not parse.
    #[error("invalid URL for {0}: {1}")]
    InvalidUrl(String, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_mock_appends_path() {
        let cfg = IssuerConfig::local_mock("http://127.0.0.1:9100/").unwrap();
        assert_eq!(cfg.issuer_url.as_str(), "http://127.0.0.1:9100/api/qr-create");
        assert_eq!(cfg.timeout_secs, 5);
        assert!(!cfg.offline);
    }

    #[test]
    fn env_url_uses_default_when_var_absent() {
        let url = env_url("QRGATE_NONEXISTENT_VAR_4411", DEFAULT_ISSUER_URL).unwrap();
        assert_eq!(url.as_str(), DEFAULT_ISSUER_URL);
    }

    #[test]
    fn env_url_rejects_invalid_url() {
        std::env::set_var("QRGATE_TEST_BAD_ISSUER_URL", "not a url");
        let result = env_url("QRGATE_TEST_BAD_ISSUER_URL", DEFAULT_ISSUER_URL);
        std::env::remove_var("QRGATE_TEST_BAD_ISSUER_URL");
        assert!(matches!(result, Err(ConfigError::InvalidUrl(var, _)) if var == "QRGATE_TEST_BAD_ISSUER_URL"));
    }
}
