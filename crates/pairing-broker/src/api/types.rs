//! API request and response types.

use crate::session::StateCounts;
use serde::{Deserialize, Serialize};

/// Query string of `GET /code`.
#[derive(Debug, Deserialize)]
pub struct CodeQuery {
    /// Phone number in any common notation; non-digits are ignored
    pub number: Option<String>,
}

/// Response carrying the pairing code.
#[derive(Debug, Serialize)]
pub struct CodeResponse {
    pub code: String,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    /// RFC 3339 timestamp
    pub timestamp: String,
    /// Seconds since startup
    pub uptime: u64,
    pub active_sessions: usize,
    /// Live sessions per lifecycle state
    pub sessions: StateCounts,
}
