//! List synchronization.
//!
//! A [`SyncSession`] owns the authoritative in-memory errand list for one
//! scope (available errands, a helper's errands, a poster's errands). It
//! polls the backend on an interval, never runs two fetches at once, stops
//! polling after repeated failures, and derives filtered pages without going
//! back to the network. [`TaskSynchronizer`] keeps several scopes side by
//! side.

pub mod filter;
pub mod registry;
pub mod session;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dailydone_proto::task::{TaskId, TaskStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::http::{HttpError, RequestOptions};

pub use filter::{FilterScope, SortKey, VisiblePage};
pub use registry::TaskSynchronizer;
pub use session::SyncSession;

/// Default time between polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Consecutive failures after which polling halts.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Shortest poll interval a session will run with.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Unique identifier for a registered sync scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(Uuid);

impl ScopeId {
    /// Generates a new time-ordered scope id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors surfaced by sync sessions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// The list fetch failed.
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The session was stopped before the fetch completed.
    #[error("sync session stopped")]
    Cancelled,

    /// No session is registered under this id.
    #[error("unknown sync scope {0}")]
    UnknownScope(ScopeId),
}

/// Which backend list a session polls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListSource {
    /// Backend path, relative to the API base URL.
    pub path: String,
    /// Query pairs sent with every fetch.
    pub query: Vec<(String, String)>,
}

impl ListSource {
    /// A source polling `path` with no query.
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    /// Adds a query pair sent with every fetch.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// GET options carrying this source's query.
    #[must_use]
    pub fn request_options(&self) -> RequestOptions {
        self.query
            .iter()
            .fold(RequestOptions::get(), |options, (k, v)| {
                options.with_query(k.as_str(), v.as_str())
            })
    }
}

/// Polling behaviour of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Time between polls.
    pub poll_interval: Duration,
    /// Consecutive failures after which polling halts.
    pub failure_threshold: u32,
}

impl SyncConfig {
    /// Raises a zero interval to [`MIN_POLL_INTERVAL`] and a zero threshold
    /// to one.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            poll_interval: self.poll_interval.max(MIN_POLL_INTERVAL),
            failure_threshold: self.failure_threshold.max(1),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }
}

/// Whether a session is still polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollHealth {
    /// The timer is armed.
    Polling,
    /// Polling stopped after repeated failures or a missing token; only a
    /// manual refresh or [`SyncSession::resume`] fetches again.
    Halted,
    /// The session was stopped and holds no data.
    Stopped,
}

/// Point-in-time view of a session's bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSnapshot {
    /// Number of errands in the cached full set.
    pub task_count: usize,
    /// Error of the most recent failed fetch, cleared on success.
    pub last_error: Option<HttpError>,
    /// Failed fetches since the last success.
    pub consecutive_failures: u32,
    /// Whether a fetch is outstanding.
    pub is_fetch_in_flight: bool,
    /// Polling state.
    pub health: PollHealth,
    /// When the last successful fetch landed.
    pub last_success_at: Option<DateTime<Utc>>,
}

/// Cache update that brings a session in line with a completed action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconcile {
    /// Nothing to change locally.
    None,
    /// Set the errand's status.
    SetStatus(TaskId, TaskStatus),
    /// Drop the errand from the list.
    Remove(TaskId),
}
