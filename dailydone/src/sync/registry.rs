//! Registry of independent sync scopes sharing one API client.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use super::filter::{FilterScope, VisiblePage};
use super::{ListSource, ScopeId, SyncConfig, SyncError, SyncSession};
use crate::http::ApiClient;

/// Keeps one [`SyncSession`] per registered scope.
///
/// Scopes share the API client and nothing else: each has its own list,
/// timer, failure count and cancellation token.
pub struct TaskSynchronizer<A: ApiClient> {
    api: Arc<A>,
    sessions: Mutex<HashMap<ScopeId, SyncSession<A>>>,
}

impl<A: ApiClient> TaskSynchronizer<A> {
    #[must_use]
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Starts a session for `source` and returns its id.
    pub fn start(&self, label: &str, source: ListSource, config: SyncConfig) -> ScopeId {
        let session = SyncSession::start(label, Arc::clone(&self.api), source, config);
        let id = session.id();
        self.sessions.lock().insert(id, session);
        id
    }

    /// The session registered under `id`.
    #[must_use]
    pub fn session(&self, id: &ScopeId) -> Option<SyncSession<A>> {
        self.sessions.lock().get(id).cloned()
    }

    /// Ids of all registered scopes.
    #[must_use]
    pub fn scopes(&self) -> Vec<ScopeId> {
        self.sessions.lock().keys().copied().collect()
    }

    /// Stops and unregisters a scope. Returns `false` if it was unknown.
    pub fn stop(&self, id: &ScopeId) -> bool {
        let Some(session) = self.sessions.lock().remove(id) else {
            return false;
        };
        session.stop();
        true
    }

    /// Stops and unregisters every scope.
    pub fn stop_all(&self) {
        let sessions: Vec<_> = self.sessions.lock().drain().map(|(_, s)| s).collect();
        tracing::debug!(count = sessions.len(), "stopping all sync scopes");
        for session in sessions {
            session.stop();
        }
    }

    /// The visible page of a scope.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownScope`] if `id` is not registered.
    pub fn visible_page(&self, id: &ScopeId, scope: &FilterScope) -> Result<VisiblePage, SyncError> {
        self.session(id)
            .map(|session| session.visible_page(scope))
            .ok_or(SyncError::UnknownScope(*id))
    }

    /// Manually refreshes a scope.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::UnknownScope`] if `id` is not registered, or the
    /// session's refresh error.
    pub async fn refresh(&self, id: &ScopeId) -> Result<usize, SyncError> {
        let session = self.session(id).ok_or(SyncError::UnknownScope(*id))?;
        session.refresh().await
    }

    /// Forwards a visibility change to every scope.
    pub fn set_foreground(&self, visible: bool) {
        let sessions: Vec<_> = self.sessions.lock().values().cloned().collect();
        for session in sessions {
            session.set_foreground(visible);
        }
    }
}

impl<A: ApiClient> Drop for TaskSynchronizer<A> {
    fn drop(&mut self) {
        self.stop_all();
    }
}
