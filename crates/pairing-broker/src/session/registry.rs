//! Process-wide bookkeeping for sessions.

use super::{LifecycleState, SessionId};
use crate::provider::ProviderHandle;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    completed: HashSet<SessionId>,
    handles: HashMap<SessionId, Arc<dyn ProviderHandle>>,
    states: HashMap<SessionId, LifecycleState>,
}

/// Number of live sessions in each lifecycle state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub pending: usize,
    pub open: usize,
    pub delivered: usize,
    pub failed: usize,
    pub closed: usize,
}

/// Completed-session set, lifecycle states and open provider handles.
///
/// Used for at-most-once delivery checks, for reporting, and for closing
/// connections on shutdown; never for coordination between sessions.
/// Entries live until [`SessionRegistry::forget`] is called for the session.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a session complete. Returns `true` only for the first caller.
    pub async fn mark_complete(&self, id: &SessionId) -> bool {
        self.inner.write().await.completed.insert(id.clone())
    }

    pub async fn is_complete(&self, id: &SessionId) -> bool {
        self.inner.read().await.completed.contains(id)
    }

    /// Track the open connection for a session, replacing any previous one.
    pub async fn register(&self, id: &SessionId, handle: Arc<dyn ProviderHandle>) {
        self.inner.write().await.handles.insert(id.clone(), handle);
    }

    pub async fn unregister(&self, id: &SessionId) -> Option<Arc<dyn ProviderHandle>> {
        self.inner.write().await.handles.remove(id)
    }

    /// Record the current lifecycle state of a session.
    pub async fn set_state(&self, id: &SessionId, state: LifecycleState) {
        self.inner.write().await.states.insert(id.clone(), state);
    }

    pub async fn state(&self, id: &SessionId) -> Option<LifecycleState> {
        self.inner.read().await.states.get(id).copied()
    }

    pub async fn state_counts(&self) -> StateCounts {
        let inner = self.inner.read().await;
        let mut counts = StateCounts::default();
        for state in inner.states.values() {
            match state {
                LifecycleState::Pending => counts.pending += 1,
                LifecycleState::Open => counts.open += 1,
                LifecycleState::Delivered => counts.delivered += 1,
                LifecycleState::Failed => counts.failed += 1,
                LifecycleState::Closed => counts.closed += 1,
            }
        }
        counts
    }

    /// Drop everything held for a session once its driver has finished.
    pub async fn forget(&self, id: &SessionId) {
        let mut inner = self.inner.write().await;
        inner.completed.remove(id);
        inner.handles.remove(id);
        inner.states.remove(id);
    }

    /// Sessions tracked for any reason.
    pub async fn tracked_count(&self) -> usize {
        let inner = self.inner.read().await;
        let mut ids: HashSet<&SessionId> = inner.completed.iter().collect();
        ids.extend(inner.handles.keys());
        ids.extend(inner.states.keys());
        ids.len()
    }

    /// Number of sessions with an open connection.
    pub async fn active_count(&self) -> usize {
        self.inner.read().await.handles.len()
    }

    /// Take every open handle, leaving none registered.
    pub async fn drain_handles(&self) -> Vec<(SessionId, Arc<dyn ProviderHandle>)> {
        self.inner.write().await.handles.drain().collect()
    }
}
