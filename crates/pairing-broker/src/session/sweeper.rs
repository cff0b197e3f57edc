//! Background removal of stale working directories.
//!
//! Catches sessions whose driver never reached a terminal state, e.g. after a
//! crash or a provider that went silent.

use super::SessionStore;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing::{debug, error, info, warn};

/// Source of the current time, injectable for tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Periodically removes working directories older than `max_age`.
pub struct SessionSweeper {
    store: SessionStore,
    interval: Duration,
    max_age: Duration,
    clock: Arc<dyn Clock>,
}

impl SessionSweeper {
    pub fn new(store: SessionStore, interval: Duration, max_age: Duration) -> Self {
        Self::with_clock(store, interval, max_age, Arc::new(SystemClock))
    }

    pub fn with_clock(
        store: SessionStore,
        interval: Duration,
        max_age: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            interval,
            max_age,
            clock,
        }
    }

    /// Run a single sweep. Returns the ids of removed directories.
    pub async fn sweep_once(&self) -> Vec<String> {
        let entries = match self.store.entries().await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Failed to list session directories: {}", e);
                return Vec::new();
            }
        };

        let now = self.clock.now();
        let mut removed = Vec::new();

        for entry in entries {
            // Modification times in the future count as fresh
            let age = now.duration_since(entry.modified).unwrap_or_default();
            if age <= self.max_age {
                continue;
            }

            match self.store.remove_entry(&entry).await {
                Ok(()) => {
                    info!(session_id = %entry.id, ?age, "Removed stale session directory");
                    removed.push(entry.id);
                }
                Err(e) => {
                    warn!(session_id = %entry.id, "Failed to remove stale directory: {}", e);
                }
            }
        }

        removed
    }

    /// Run the sweeper as a background task.
    ///
    /// This will run indefinitely, sleeping between sweep cycles.
    pub async fn run(&self) {
        info!(
            "Starting session sweeper, interval: {:?}, max_age: {:?}",
            self.interval, self.max_age
        );

        loop {
            tokio::time::sleep(self.interval).await;

            let removed = self.sweep_once().await;
            if removed.is_empty() {
                debug!("No stale sessions this cycle");
            } else {
                info!("Sweep cycle complete: {} directories removed", removed.len());
            }
        }
    }
}

/// Spawn the sweeper as a background task.
pub fn spawn_sweeper(sweeper: SessionSweeper) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        sweeper.run().await;
    })
}
