//! # qrgate-issuer-client -- Credential issuance for the QR gate bridge
//!
//! The bridge asks for exactly one credential per completed session through
//! the [`IssuanceGateway`] trait. Two implementations are provided:
//!
//! - [`HttpIssuer`] posts the [`IssuanceContext`] to the `qr-create`
//!   backend and returns the `qr` object it answers with.
//! - [`OfflineIssuer`] mints a short code locally, for sites where the
//!   backend is unreachable.
//!
//! Neither implementation retries. Creating a credential is not
//! idempotent, so a failed call is reported once and the session ends.

pub mod config;
pub mod error;
pub mod http;
pub mod offline;

pub use config::{ConfigError, IssuerConfig};
pub use error::IssuanceError;
pub use http::HttpIssuer;
pub use offline::OfflineIssuer;

use std::sync::Arc;

use async_trait::async_trait;
use qrgate_core::{Credential, IssuanceContext};

/// Issues one-time credentials.
#[async_trait]
pub trait IssuanceGateway: Send + Sync {
    /// Issue a credential for the given context.
    async fn issue(&self, context: &IssuanceContext) -> Result<Credential, IssuanceError>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Build the gateway selected by configuration.
pub fn from_config(config: &IssuerConfig) -> Result<Arc<dyn IssuanceGateway>, IssuanceError> {
    if config.offline {
        tracing::warn!("offline mode enabled, credentials are minted locally");
        Ok(Arc::new(OfflineIssuer::new()))
    } else {
        Ok(Arc::new(HttpIssuer::new(config)?))
    }
}
