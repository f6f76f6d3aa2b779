//! Messaging gateway boundary.
//!
//! Everything the rest of the crate knows about the gateway's wire format lives
//! here: the provisioning request, the QR payload shape and the mapping of the
//! connection-state responses onto [`ConnectionState`].

pub mod evolution;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use evolution::EvolutionClient;

/// Errors from the gateway HTTP surface
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request timed out: {0}")]
    Timeout(String),

    #[error("gateway unreachable: {0}")]
    Unreachable(String),

    /// The gateway answered, but not with a success status
    #[error("gateway returned HTTP {status}")]
    Rejected { status: u16, body: Value },

    #[error("invalid gateway response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Timeout(err.to_string())
        } else if err.is_decode() {
            GatewayError::InvalidResponse(err.to_string())
        } else {
            GatewayError::Unreachable(err.to_string())
        }
    }
}

/// Operations the connection lifecycle needs from the gateway
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Look up an instance by name. `Ok(None)` when the gateway knows no such instance.
    async fn fetch_instance(&self, name: &str) -> Result<Option<Value>, GatewayError>;

    /// Raw connection-state payload for an instance
    async fn connection_state(&self, name: &str) -> Result<Value, GatewayError>;

    /// Create an instance; returns the gateway's response body
    async fn create_instance(&self, request: &CreateInstanceRequest) -> Result<Value, GatewayError>;
}

/// Connection state reported by the gateway, reduced to what the lifecycle cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    /// Anything else; carries the raw state string when one was reported
    NotOpen(Option<String>),
}

impl ConnectionState {
    /// Normalize a connection-state payload.
    ///
    /// Gateway versions disagree on where the state lives, so three shapes are
    /// accepted as proof of an open connection:
    /// `{"state": "open"}`, `{"instance": {"state": "open"}}` and
    /// `{"status": "connected"}`. Any other shape is not open.
    pub fn from_payload(payload: &Value) -> Self {
        let top_state = payload.get("state").and_then(Value::as_str);
        let instance_state = payload
            .get("instance")
            .and_then(|instance| instance.get("state"))
            .and_then(Value::as_str);
        let status = payload.get("status").and_then(Value::as_str);

        if top_state == Some("open") || instance_state == Some("open") || status == Some("connected") {
            return ConnectionState::Open;
        }

        let observed = top_state.or(instance_state).or(status).map(str::to_string);
        ConnectionState::NotOpen(observed)
    }

    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

/// Scannable code handed out while an instance awaits pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrPayload {
    /// Image as base64, usually a `data:image/png;base64,` URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pairing_code: Option<String>,
}

impl QrPayload {
    /// Accepts either the object form or a bare base64 string
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(QrPayload {
                base64: Some(s.clone()),
                code: None,
                pairing_code: None,
            }),
            Value::Object(map) => {
                let field = |key: &str| {
                    map.get(key)
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                };
                let qr = QrPayload {
                    base64: field("base64"),
                    code: field("code"),
                    pairing_code: field("pairingCode"),
                };
                if qr.base64.is_none() && qr.code.is_none() && qr.pairing_code.is_none() {
                    None
                } else {
                    Some(qr)
                }
            }
            _ => None,
        }
    }

    /// Pull the `qrcode` member out of a gateway response body
    pub fn from_response(body: &Value) -> Option<Self> {
        body.get("qrcode").and_then(Self::from_value)
    }
}

/// Body of `POST /instance/create`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceRequest {
    pub instance_name: String,
    pub qrcode: bool,
    pub integration: String,
    pub reject_call: bool,
    pub groups_ignore: bool,
    pub always_online: bool,
    pub read_messages: bool,
    pub read_status: bool,
    pub sync_full_history: bool,
    pub webhook: WebhookRegistration,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRegistration {
    pub url: String,
    pub by_events: bool,
    pub base64: bool,
    pub events: Vec<String>,
}

/// Events every instance reports to the webhook receiver
pub const WEBHOOK_EVENTS: [&str; 4] = [
    "CONNECTION_UPDATE",
    "LOGOUT_INSTANCE",
    "MESSAGES_UPSERT",
    "REMOVE_INSTANCE",
];

impl CreateInstanceRequest {
    /// Fixed provisioning options: calls rejected, groups ignored, no history sync
    pub fn whatsapp(instance_name: &str, webhook_url: &str) -> Self {
        Self {
            instance_name: instance_name.to_string(),
            qrcode: true,
            integration: "WHATSAPP-BAILEYS".to_string(),
            reject_call: true,
            groups_ignore: true,
            always_online: false,
            read_messages: false,
            read_status: false,
            sync_full_history: false,
            webhook: WebhookRegistration {
                url: webhook_url.to_string(),
                by_events: false,
                base64: true,
                events: WEBHOOK_EVENTS.iter().map(|e| e.to_string()).collect(),
            },
        }
    }
}
