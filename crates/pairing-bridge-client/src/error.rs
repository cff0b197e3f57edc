//! Bridge client errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

impl BridgeError {
    /// HTTP status reported by the bridge, if the error came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            BridgeError::Api { status, .. } => Some(*status),
            BridgeError::SessionNotFound(_) => Some(404),
            _ => None,
        }
    }
}
