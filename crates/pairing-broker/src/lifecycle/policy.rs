//! Disconnect classification and lifecycle timings.

use std::time::Duration;

/// Logged out from the linked device.
pub const STATUS_LOGGED_OUT: u16 = 401;
/// Account forbidden from linking.
pub const STATUS_FORBIDDEN: u16 = 403;
/// Multi-device protocol mismatch.
pub const STATUS_MULTIDEVICE_MISMATCH: u16 = 411;
/// Another connection replaced this one.
pub const STATUS_CONNECTION_REPLACED: u16 = 440;
/// The provider wants a fresh connection, typically right after pairing.
pub const STATUS_RESTART_REQUIRED: u16 = 515;

const TERMINAL_STATUS_CODES: [u16; 4] = [
    STATUS_LOGGED_OUT,
    STATUS_FORBIDDEN,
    STATUS_MULTIDEVICE_MISMATCH,
    STATUS_CONNECTION_REPLACED,
];

/// What to do after a connection closes before delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectAction {
    /// Reconnect with the same session after the backoff.
    Retry,
    /// The status is unrecoverable.
    Terminal,
    /// Retryable, but the retry ceiling is reached.
    Exhausted,
}

/// Classifies provider close codes.
///
/// Codes that mean the link itself is gone are terminal; everything else,
/// including a missing code, is retried up to `max_retries` times.
#[derive(Debug, Clone, Copy)]
pub struct DisconnectPolicy {
    max_retries: u32,
}

impl DisconnectPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self { max_retries }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn is_terminal(status_code: Option<u16>) -> bool {
        status_code.is_some_and(|code| TERMINAL_STATUS_CODES.contains(&code))
    }

    /// Decide for a close with `status_code` after `retries` reconnects.
    pub fn classify(&self, status_code: Option<u16>, retries: u32) -> DisconnectAction {
        if Self::is_terminal(status_code) {
            DisconnectAction::Terminal
        } else if retries >= self.max_retries {
            DisconnectAction::Exhausted
        } else {
            DisconnectAction::Retry
        }
    }
}

/// Fixed delays of the session lifecycle.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleTimings {
    /// Wait after connecting before asking for a pairing code
    pub code_request_delay: Duration,
    /// Wait after the connection opens before reading the credential artifact
    pub settle_delay: Duration,
    /// Wait before reconnecting after a retryable close
    pub retry_backoff: Duration,
    /// Wait after delivery before removing the working directory
    pub cleanup_grace: Duration,
    /// Longest a session may wait for authentication
    pub pairing_timeout: Duration,
}

impl LifecycleTimings {
    pub fn with_pairing_timeout(mut self, pairing_timeout: Duration) -> Self {
        self.pairing_timeout = pairing_timeout;
        self
    }
}

impl Default for LifecycleTimings {
    fn default() -> Self {
        Self {
            code_request_delay: Duration::from_millis(1500),
            settle_delay: Duration::from_secs(5),
            retry_backoff: Duration::from_secs(10),
            cleanup_grace: Duration::from_millis(100),
            pairing_timeout: Duration::from_secs(5 * 60),
        }
    }
}
