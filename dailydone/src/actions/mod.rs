//! Errand actions: accept, cancel, complete and rate.
//!
//! Every action is a single backend call through the [`ApiClient`]. At most
//! one action runs per target at a time; a second request for the same
//! target fails fast with [`ActionError::Reentrant`]. A successful action
//! returns the [`Reconcile`] hint a view applies to its sync session; the
//! coordinator itself never touches cached lists.
//!
//! [`ApiClient`]: crate::http::ApiClient

pub mod coordinator;

use std::fmt;

use dailydone_proto::task::TaskId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::{HttpError, Method};
use crate::sync::Reconcile;

pub use coordinator::{ActionCoordinator, CompletionTarget};

/// Highest accepted rating.
pub const MAX_RATING: i64 = 5;

/// Query parameter carrying the errand id.
pub const ERRAND_ID_PARAM: &str = "errandId";

/// Query parameter carrying a user id.
pub const USER_ID_PARAM: &str = "userId";

/// Errors that can occur while running an action.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    /// The backend call failed.
    #[error(transparent)]
    Http(#[from] HttpError),
    /// An identifier the endpoint needs could not be resolved.
    #[error("missing identifier: {0}")]
    MissingIdentifiers(&'static str),
    /// Another action on the same target has not finished.
    #[error("an action on {0} is already in progress")]
    Reentrant(ActionTarget),
    /// Ratings run from 0 to 5.
    #[error("rating must be between 0 and 5, got {0}")]
    InvalidRating(i64),
}

impl ActionError {
    /// A message suitable for showing to the user.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Http(err) => err.user_message(),
            Self::MissingIdentifiers(_) => {
                "This errand is missing details needed for that action. Refresh and try again."
                    .to_string()
            }
            Self::Reentrant(_) => "Still working on your last request.".to_string(),
            Self::InvalidRating(_) => "Pick a rating from 0 to 5.".to_string(),
        }
    }
}

/// What an action is applied to; the unit of re-entrancy.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ActionTarget {
    /// An errand, for accept, cancel and complete.
    Errand(TaskId),
    /// A user profile, for ratings.
    Profile(String),
}

impl fmt::Display for ActionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Errand(id) => write!(f, "errand {id}"),
            Self::Profile(id) => write!(f, "profile {id}"),
        }
    }
}

/// The four actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Accept,
    Cancel,
    Complete,
    Rate,
}

impl ActionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Cancel => "cancel",
            Self::Complete => "complete",
            Self::Rate => "rate",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verb and path of one action endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// HTTP verb.
    pub method: Method,
    /// Path relative to the API base URL.
    pub path: String,
}

impl Endpoint {
    /// An endpoint sending `method` to `path`.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
        }
    }
}

/// Where each action is sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEndpoints {
    /// Accept an errand (`POST errands/accept`).
    pub accept: Endpoint,
    /// Cancel an errand (`DELETE errands/cancel`).
    pub cancel: Endpoint,
    /// Complete an errand (`POST errands/complete`).
    pub complete: Endpoint,
    /// Rate a counterparty (`POST ratings`).
    pub rate: Endpoint,
}

impl Default for ActionEndpoints {
    fn default() -> Self {
        Self {
            accept: Endpoint::new(Method::Post, "errands/accept"),
            cancel: Endpoint::new(Method::Delete, "errands/cancel"),
            complete: Endpoint::new(Method::Post, "errands/complete"),
            rate: Endpoint::new(Method::Post, "ratings"),
        }
    }
}

impl ActionEndpoints {
    #[must_use]
    pub const fn get(&self, kind: ActionKind) -> &Endpoint {
        match kind {
            ActionKind::Accept => &self.accept,
            ActionKind::Cancel => &self.cancel,
            ActionKind::Complete => &self.complete,
            ActionKind::Rate => &self.rate,
        }
    }
}

/// Result of a successful action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Which action ran.
    pub kind: ActionKind,
    /// How cached lists should change to reflect it.
    pub reconcile: Reconcile,
}
