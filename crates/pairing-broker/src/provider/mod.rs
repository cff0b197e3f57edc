//! The external session provider seam.
//!
//! The provider owns the pairing handshake, the credential store and the
//! transport. The broker only asks it for a connection per session, reads the
//! events it emits and sends messages through it.

mod bridge;

pub use bridge::BridgeProvider;

use crate::session::SessionId;
use async_trait::async_trait;
use pairing_bridge_client::BridgeError;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Provider errors.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Send failed: {0}")]
    SendFailed(String),
}

/// What the provider needs to initialize a session's state.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub id: SessionId,
    /// Directory the provider keeps its credential store in
    pub workdir: PathBuf,
}

/// Connection state change, in the order the provider emitted it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Authenticated; `user_id` addresses the session's own account.
    Opened { user_id: String },
    /// Closed, with the provider's status code when it gave one.
    Closed { status_code: Option<u16> },
}

/// Identifier of a sent message, used to quote it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageId(pub String);

/// An open provider connection.
///
/// Dropping `events` tells the provider nobody is listening any more; events
/// emitted after that are discarded.
pub struct Connection {
    pub handle: Arc<dyn ProviderHandle>,
    pub events: mpsc::Receiver<ConnectionEvent>,
}

/// Creates provider connections.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Initialize provider state in the session's working directory and
    /// open a connection backed by it.
    async fn connect(&self, ctx: &SessionContext) -> Result<Connection, ProviderError>;
}

/// Operations on an open connection.
#[async_trait]
pub trait ProviderHandle: Send + Sync {
    /// Whether the credential store already holds a linked identity.
    fn is_registered(&self) -> bool;

    /// Request a pairing code for `number` (digits only).
    async fn request_pairing_code(&self, number: &str) -> Result<String, ProviderError>;

    async fn send_message(
        &self,
        to: &str,
        text: &str,
        quoted: Option<&MessageId>,
    ) -> Result<MessageId, ProviderError>;

    async fn close(&self) -> Result<(), ProviderError>;
}
