//! Per-scope sync session.
//!
//! The session state lives behind a `parking_lot` mutex that is never held
//! across an `.await`. Fetches run on their own spawned task and are shared
//! through a [`Shared`] future, so every caller that asks for a fetch while
//! one is outstanding waits on the same request. The poll loop and fetch
//! tasks only hold weak references; dropping the last [`SyncSession`] handle
//! cancels everything.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dailydone_proto::normalize::normalize_task_list;
use dailydone_proto::task::{Task, TaskId};
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::filter::{self, FilterScope, VisiblePage};
use super::{ListSource, PollHealth, Reconcile, ScopeId, SyncConfig, SyncError, SyncSnapshot};
use crate::http::{ApiClient, HttpError, ParsedBody};

/// Outcome of one fetch: the number of errands now cached.
type FetchOutcome = Result<usize, SyncError>;

type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

struct SessionState {
    full_set: Vec<Task>,
    last_error: Option<HttpError>,
    consecutive_failures: u32,
    in_flight: Option<SharedFetch>,
    poll_handle: Option<JoinHandle<()>>,
    health: PollHealth,
    last_success_at: Option<DateTime<Utc>>,
    foreground: bool,
}

struct SessionInner<A> {
    id: ScopeId,
    label: String,
    api: Arc<A>,
    source: ListSource,
    config: SyncConfig,
    cancel: CancellationToken,
    state: Mutex<SessionState>,
}

/// Handle to a polling errand list.
///
/// Cloning is cheap and every clone sees the same list. Dropping the last
/// clone stops polling and cancels any outstanding fetch.
pub struct SyncSession<A> {
    inner: Arc<SessionInner<A>>,
}

impl<A> Clone for SyncSession<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<A: ApiClient> SyncSession<A> {
    /// Starts polling `source`: one fetch right away, then one every
    /// `config.poll_interval`. A zero interval or threshold is clamped (see
    /// [`SyncConfig::clamped`]).
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        label: impl Into<String>,
        api: Arc<A>,
        source: ListSource,
        config: SyncConfig,
    ) -> Self {
        let config = config.clamped();
        let inner = Arc::new(SessionInner {
            id: ScopeId::new(),
            label: label.into(),
            api,
            source,
            config,
            cancel: CancellationToken::new(),
            state: Mutex::new(SessionState {
                full_set: Vec::new(),
                last_error: None,
                consecutive_failures: 0,
                in_flight: None,
                poll_handle: None,
                health: PollHealth::Polling,
                last_success_at: None,
                foreground: true,
            }),
        });
        tracing::info!(
            scope = %inner.id,
            label = %inner.label,
            path = %inner.source.path,
            interval_ms = inner.config.poll_interval.as_millis(),
            "sync session started"
        );
        let session = Self { inner };
        session.arm();
        let _ = session.inner.begin_fetch(false);
        session
    }

    /// The scope id.
    #[must_use]
    pub fn id(&self) -> ScopeId {
        self.inner.id
    }

    /// The label given at start.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.inner.label
    }

    /// The backend list this session polls.
    #[must_use]
    pub fn source(&self) -> &ListSource {
        &self.inner.source
    }

    /// Fetches now, joining the outstanding fetch if there is one.
    ///
    /// Works while polling is halted but does not re-arm the timer.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Http`] if the fetch failed (the cached list is
    /// kept) or [`SyncError::Cancelled`] if the session is stopped.
    pub async fn refresh(&self) -> Result<usize, SyncError> {
        match self.inner.begin_fetch(true) {
            Some(fetch) => fetch.await,
            None => Err(SyncError::Cancelled),
        }
    }

    /// Calls `on_poll` once per poll interval until `shutdown` resolves or
    /// polling stops, and returns the health at that point.
    ///
    /// `shutdown` is polled across iterations, so a signal that arrives
    /// mid-interval ends the watch right away.
    pub async fn watch<F>(&self, shutdown: impl Future<Output = ()>, mut on_poll: F) -> PollHealth
    where
        F: FnMut(&Self),
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                () = tokio::time::sleep(self.inner.config.poll_interval) => {}
            }
            if self.inner.state.lock().health != PollHealth::Polling {
                break;
            }
            on_poll(self);
        }
        self.inner.state.lock().health
    }

    /// Clears the failure count, re-arms the timer and fetches right away.
    ///
    /// Does nothing on a stopped session.
    pub fn resume(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.health == PollHealth::Stopped {
                tracing::debug!(scope = %self.inner.id, "resume on stopped session ignored");
                return;
            }
            state.consecutive_failures = 0;
            state.health = PollHealth::Polling;
        }
        tracing::info!(scope = %self.inner.id, "polling resumed");
        self.arm();
        let _ = self.inner.begin_fetch(false);
    }

    /// Stops polling, cancels any outstanding fetch and drops the cached
    /// list. Completions that arrive later are discarded.
    pub fn stop(&self) {
        self.inner.cancel.cancel();
        let mut state = self.inner.state.lock();
        if state.health == PollHealth::Stopped {
            return;
        }
        if let Some(handle) = state.poll_handle.take() {
            handle.abort();
        }
        state.health = PollHealth::Stopped;
        state.in_flight = None;
        state.full_set.clear();
        state.last_error = None;
        state.consecutive_failures = 0;
        tracing::info!(scope = %self.inner.id, "sync session stopped");
    }

    /// Records whether the view is visible. Becoming visible while polling
    /// triggers one fetch unless one is already outstanding.
    pub fn set_foreground(&self, visible: bool) {
        let refresh = {
            let mut state = self.inner.state.lock();
            let was_visible = std::mem::replace(&mut state.foreground, visible);
            visible && !was_visible && state.health == PollHealth::Polling
        };
        if refresh {
            tracing::debug!(scope = %self.inner.id, "view visible again, refreshing");
            let _ = self.inner.begin_fetch(false);
        }
    }

    /// Filters, sorts and paginates the cached list.
    #[must_use]
    pub fn visible_page(&self, scope: &FilterScope) -> VisiblePage {
        filter::visible_page(&self.inner.state.lock().full_set, scope)
    }

    /// A copy of the cached full set, in backend order.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.inner.state.lock().full_set.clone()
    }

    /// A copy of one cached errand.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.inner
            .state
            .lock()
            .full_set
            .iter()
            .find(|t| &t.id == id)
            .cloned()
    }

    /// Removes an errand from the cached list. Returns `true` if it was
    /// present.
    pub fn remove(&self, id: &TaskId) -> bool {
        let mut state = self.inner.state.lock();
        let before = state.full_set.len();
        state.full_set.retain(|t| &t.id != id);
        state.full_set.len() != before
    }

    /// Edits a cached errand in place. Returns `true` if it was present.
    pub fn patch(&self, id: &TaskId, edit: impl FnOnce(&mut Task)) -> bool {
        let mut state = self.inner.state.lock();
        match state.full_set.iter_mut().find(|t| &t.id == id) {
            Some(task) => {
                edit(task);
                true
            }
            None => false,
        }
    }

    /// Applies an action's reconciliation hint. Returns `true` if the
    /// cached list changed.
    pub fn reconcile(&self, reconcile: &Reconcile) -> bool {
        let changed = match reconcile {
            Reconcile::None => false,
            Reconcile::SetStatus(id, status) => self.patch(id, |t| t.set_status(*status)),
            Reconcile::Remove(id) => self.remove(id),
        };
        tracing::debug!(scope = %self.inner.id, ?reconcile, changed, "reconciled");
        changed
    }

    /// Current bookkeeping.
    #[must_use]
    pub fn snapshot(&self) -> SyncSnapshot {
        let state = self.inner.state.lock();
        SyncSnapshot {
            task_count: state.full_set.len(),
            last_error: state.last_error.clone(),
            consecutive_failures: state.consecutive_failures,
            is_fetch_in_flight: state.in_flight.is_some(),
            health: state.health,
            last_success_at: state.last_success_at,
        }
    }

    /// Spawns a fresh poll loop, replacing any previous one.
    fn arm(&self) {
        let handle = tokio::spawn(poll_loop(
            Arc::downgrade(&self.inner),
            self.inner.cancel.clone(),
            self.inner.config.poll_interval,
        ));
        let mut state = self.inner.state.lock();
        if state.health != PollHealth::Polling {
            handle.abort();
            return;
        }
        if let Some(previous) = state.poll_handle.replace(handle) {
            previous.abort();
        }
    }
}

impl<A: ApiClient> SessionInner<A> {
    /// Returns the fetch to wait on.
    ///
    /// With an outstanding fetch, `join` decides between sharing it and
    /// skipping (`None`). The in-flight slot is set under the lock before
    /// the request is spawned. Returns `None` on a stopped session.
    fn begin_fetch(self: &Arc<Self>, join: bool) -> Option<SharedFetch> {
        let fetch = {
            let mut state = self.state.lock();
            if state.health == PollHealth::Stopped {
                return None;
            }
            if let Some(outstanding) = &state.in_flight {
                if join {
                    return Some(outstanding.clone());
                }
                tracing::debug!(scope = %self.id, "fetch already in flight, tick skipped");
                return None;
            }
            let fetch = run_fetch(
                Arc::downgrade(self),
                Arc::clone(&self.api),
                self.source.clone(),
                self.cancel.clone(),
            )
            .boxed()
            .shared();
            state.in_flight = Some(fetch.clone());
            fetch
        };
        // Driven on its own task so it completes even if every waiter goes away.
        tokio::spawn(fetch.clone());
        Some(fetch)
    }

    /// Writes a fetch result into the state.
    fn finish_fetch(&self, result: Result<ParsedBody, SyncError>) -> FetchOutcome {
        let mut state = self.state.lock();
        state.in_flight = None;
        if state.health == PollHealth::Stopped || self.cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        match result {
            Ok(body) => {
                let tasks = match body {
                    ParsedBody::Empty => Vec::new(),
                    ParsedBody::Json(value) => normalize_task_list(&value),
                };
                let count = tasks.len();
                state.full_set = tasks;
                state.last_error = None;
                state.consecutive_failures = 0;
                state.last_success_at = Some(Utc::now());
                tracing::debug!(scope = %self.id, count, "errand list refreshed");
                Ok(count)
            }
            Err(SyncError::Http(err)) => {
                state.consecutive_failures += 1;
                state.last_error = Some(err.clone());
                let failures = state.consecutive_failures;
                tracing::warn!(scope = %self.id, failures, err = %err, "errand list fetch failed");

                let halt = err == HttpError::Unauthenticated
                    || failures >= self.config.failure_threshold;
                if halt && state.health == PollHealth::Polling {
                    state.health = PollHealth::Halted;
                    if let Some(handle) = state.poll_handle.take() {
                        handle.abort();
                    }
                    tracing::warn!(scope = %self.id, failures, "polling halted");
                }
                Err(SyncError::Http(err))
            }
            Err(other) => Err(other),
        }
    }
}

impl<A> Drop for SessionInner<A> {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.state.get_mut().poll_handle.take() {
            handle.abort();
        }
    }
}

/// One list request, raced against the session's cancellation token.
async fn run_fetch<A: ApiClient>(
    session: Weak<SessionInner<A>>,
    api: Arc<A>,
    source: ListSource,
    cancel: CancellationToken,
) -> FetchOutcome {
    let result = tokio::select! {
        () = cancel.cancelled() => Err(SyncError::Cancelled),
        response = api.request(&source.path, source.request_options()) => {
            response.map_err(SyncError::from)
        }
    };
    match session.upgrade() {
        Some(session) => session.finish_fetch(result),
        None => Err(SyncError::Cancelled),
    }
}

/// Ticks every `period`, starting one period from now, until cancelled or
/// halted.
async fn poll_loop<A: ApiClient>(
    session: Weak<SessionInner<A>>,
    cancel: CancellationToken,
    period: Duration,
) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(session) = session.upgrade() else {
            break;
        };
        if session.state.lock().health != PollHealth::Polling {
            break;
        }
        let _ = session.begin_fetch(false);
    }
}
