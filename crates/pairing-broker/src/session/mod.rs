//! Sessions: identifiers, lifecycle state, working directories.

mod registry;
mod store;
mod sweeper;

pub use registry::{SessionRegistry, StateCounts};
pub use store::{SessionStore, StoreEntry, CREDENTIAL_FILE};
pub use sweeper::{spawn_sweeper, Clock, SessionSweeper, SystemClock};

use crate::phone::PhoneNumber;
use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Length of generated session identifiers.
pub const SESSION_ID_LEN: usize = 10;

/// Opaque random session identifier (ASCII alphanumeric).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a fresh identifier.
    pub fn generate() -> Self {
        let id = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SESSION_ID_LEN)
            .map(char::from)
            .collect();
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    /// Pairing code requested, awaiting provider confirmation
    Pending,
    /// Provider reports an authenticated connection
    Open,
    /// Credential sent to the destination
    Delivered,
    /// Terminal error
    Failed,
    /// Connection closed before completion, awaiting a retry
    Closed,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Delivered | LifecycleState::Failed)
    }
}

/// One provisioning attempt, bound to one working directory.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub phone_number: PhoneNumber,
    pub workdir: PathBuf,
    pub state: LifecycleState,
    /// Reconnects performed after retryable disconnects
    pub retries: u32,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: SessionId, phone_number: PhoneNumber, workdir: PathBuf) -> Self {
        Self {
            id,
            phone_number,
            workdir,
            state: LifecycleState::Pending,
            retries: 0,
            created_at: Utc::now(),
        }
    }

    /// Move to `next`. Terminal states are sticky.
    pub fn transition(&mut self, next: LifecycleState) {
        if !self.state.is_terminal() {
            self.state = next;
        }
    }
}
