//! Error types for the pairing broker.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Broker error types.
///
/// Only the variants raised before a pairing code is returned ever reach an
/// HTTP caller; the rest are logged by the session driver.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Phone number is required")]
    MissingPhoneNumber,

    #[error("Invalid phone number format")]
    InvalidPhoneNumber(String),

    #[error("Service currently unavailable: {0}")]
    ProviderInit(String),

    #[error("Failed to generate code: {0}")]
    PairingRequest(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Connection closed with retryable status {0:?}")]
    RetryableDisconnect(Option<u16>),

    #[error("Connection closed with terminal status {0:?}")]
    TerminalDisconnect(Option<u16>),

    #[error("Pairing window expired before authentication")]
    PairingTimeout,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body.
///
/// `code` carries the human-readable message, matching the success body's
/// field name so clients read one key either way.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub error: String,
}

impl BrokerError {
    fn status_and_kind(&self) -> (StatusCode, &'static str) {
        match self {
            BrokerError::MissingPhoneNumber => (StatusCode::BAD_REQUEST, "MISSING_PHONE_NUMBER"),
            BrokerError::InvalidPhoneNumber(_) => (StatusCode::BAD_REQUEST, "INVALID_PHONE_NUMBER"),
            BrokerError::ProviderInit(_) => (StatusCode::INTERNAL_SERVER_ERROR, "PROVIDER_INIT_ERROR"),
            BrokerError::PairingRequest(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "PAIRING_REQUEST_ERROR")
            }
            BrokerError::Delivery(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DELIVERY_ERROR"),
            BrokerError::RetryableDisconnect(_) => {
                (StatusCode::SERVICE_UNAVAILABLE, "RETRYABLE_DISCONNECT")
            }
            BrokerError::TerminalDisconnect(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "TERMINAL_DISCONNECT")
            }
            BrokerError::PairingTimeout => (StatusCode::GATEWAY_TIMEOUT, "PAIRING_TIMEOUT"),
            BrokerError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "STORAGE_ERROR"),
            BrokerError::RateLimitExceeded => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMIT_EXCEEDED"),
            BrokerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Message shown to HTTP callers. Provider details stay in the logs.
    fn public_message(&self) -> String {
        match self {
            BrokerError::ProviderInit(_) => "Service Currently Unavailable".to_string(),
            BrokerError::PairingRequest(_) => "Failed to generate code. Try again.".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let (status, kind) = self.status_and_kind();

        let body = ErrorResponse {
            code: self.public_message(),
            error: kind.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<std::io::Error> for BrokerError {
    fn from(e: std::io::Error) -> Self {
        BrokerError::Storage(e.to_string())
    }
}
