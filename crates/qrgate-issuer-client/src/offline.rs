//! Local issuer used when the backend is unreachable.
//!
//! Credentials minted here are not persisted anywhere. They carry
//! `offline: true` so the scanning side can tell them apart.

use async_trait::async_trait;
use rand::Rng;
use serde_json::{json, Value};

use qrgate_core::{Credential, IssuanceContext, Timestamp};

use crate::error::IssuanceError;
use crate::IssuanceGateway;

/// Length of an offline code.
pub const CODE_LEN: usize = 12;

const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Mints uppercase alphanumeric codes locally.
#[derive(Debug, Clone, Default)]
pub struct OfflineIssuer;

impl OfflineIssuer {
    /// Create an offline issuer.
    pub fn new() -> Self {
        Self
    }
}

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CODE_LEN)
        .map(|_| char::from(CHARSET[rng.gen_range(0..CHARSET.len())]))
        .collect()
}

#[async_trait]
impl IssuanceGateway for OfflineIssuer {
    async fn issue(&self, context: &IssuanceContext) -> Result<Credential, IssuanceError> {
        let code = generate_code();
        tracing::info!(session_id = %context.session_id, code = %code, "minted offline credential");
        Ok(Credential {
            id: None,
            data: json!({
                "id": Value::Null,
                "uuid": code,
                "user_agent": Value::Null,
                "created_at": Timestamp::now().to_rfc3339(),
                "payload": code,
                "offline": true,
                "reason": "offline_mode",
            }),
        })
    }

    fn name(&self) -> &'static str {
        "offline"
    }
}
