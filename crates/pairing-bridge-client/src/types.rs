//! Bridge API types.

use serde::{Deserialize, Serialize};

/// Request to stand up a provider session in a working directory.
#[derive(Debug, Clone, Serialize)]
pub struct OpenSessionRequest {
    pub id: String,
    pub workdir: String,
    pub browser: String,
}

/// Response after opening a session.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenSessionResponse {
    /// Whether the credential store already holds a registered identity
    #[serde(default)]
    pub registered: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairingCodeRequest {
    pub number: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PairingCodeResponse {
    pub code: String,
}

/// Outgoing message request.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    pub to: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quoted: Option<String>,
}

/// Send message response.
#[derive(Debug, Clone, Deserialize)]
pub struct SendMessageResponse {
    pub message_id: String,
}

/// Connection state change reported by the bridge.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BridgeEvent {
    /// The connection authenticated; `user_id` is the session's own identity.
    Open { user_id: String },
    /// The connection closed, optionally with the provider's status code.
    Close {
        #[serde(default)]
        status_code: Option<u16>,
    },
}

impl BridgeEvent {
    /// Whether this event ends the connection.
    pub fn is_close(&self) -> bool {
        matches!(self, BridgeEvent::Close { .. })
    }
}
