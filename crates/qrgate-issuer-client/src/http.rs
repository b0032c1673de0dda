//! HTTP issuer for the `qr-create` backend.
//!
//! | Method | Path | Body |
//! |--------|------|------|
//! | POST | `{issuer_url}` | [`IssuanceContext`] as JSON |
//!
//! The backend answers `{ok: true, qr: {...}}` on success and
//! `{ok: false, error}` (usually with a 500) on failure.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use qrgate_core::{Credential, IssuanceContext};

use crate::config::IssuerConfig;
use crate::error::{IssuanceError, CREATE_FAILED};
use crate::IssuanceGateway;

/// Response body of `qr-create`. Every field is optional so that error
/// pages and partial bodies still yield a usable failure message.
#[derive(Debug, Default, Deserialize)]
struct CreateResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    qr: Option<Value>,
    #[serde(default)]
    error: Option<String>,
}

/// Issues credentials by calling the `qr-create` backend.
#[derive(Debug, Clone)]
pub struct HttpIssuer {
    http: reqwest::Client,
    url: Url,
}

impl HttpIssuer {
    /// Create an issuer from configuration.
    pub fn new(config: &IssuerConfig) -> Result<Self, IssuanceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| IssuanceError::Http {
                endpoint: "client_init".into(),
                source: e,
            })?;
        Ok(Self {
            http,
            url: config.issuer_url.clone(),
        })
    }

    /// The endpoint this issuer posts to.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl IssuanceGateway for HttpIssuer {
    async fn issue(&self, context: &IssuanceContext) -> Result<Credential, IssuanceError> {
        let endpoint = format!("POST {}", self.url.path());

        let resp = self
            .http
            .post(self.url.clone())
            .json(context)
            .send()
            .await
            .map_err(|e| IssuanceError::Http {
                endpoint: endpoint.clone(),
                source: e,
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body: CreateResponse = resp.json().await.unwrap_or_default();
            return Err(IssuanceError::Rejected {
                endpoint,
                status: status.as_u16(),
                message: body.error.unwrap_or_else(|| CREATE_FAILED.to_string()),
            });
        }

        let body: CreateResponse =
            resp.json()
                .await
                .map_err(|e| IssuanceError::Deserialization {
                    endpoint: endpoint.clone(),
                    source: e,
                })?;

        match body.qr {
            Some(qr) if body.ok && qr.is_object() => {
                tracing::debug!(
                    session_id = %context.session_id,
                    status = status.as_u16(),
                    "qr-create succeeded"
                );
                Ok(Credential::from_qr_object(qr))
            }
            _ => Err(IssuanceError::Rejected {
                endpoint,
                status: status.as_u16(),
                message: body.error.unwrap_or_else(|| CREATE_FAILED.to_string()),
            }),
        }
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
