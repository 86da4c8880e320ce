//! Errand view model for DailyDone.
//!
//! Defines the fixed internal shape every backend record is normalized into
//! (see [`crate::normalize`]), the closed [`TaskStatus`] set with its alias
//! table, and the counterparty [`Profile`] / [`Assignment`] types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque errand identifier as issued by the backend.
///
/// Numeric backend ids are stringified during normalization. An empty id
/// means the record carried none of the known id fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a task identifier from its string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the string form of this identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` if the backend supplied no usable id.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Lifecycle status of an errand.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Posted and waiting for a helper.
    #[default]
    Pending,
    /// A helper has taken the errand but not started it.
    Accepted,
    /// The helper is working on it.
    Ongoing,
    /// Done.
    Completed,
    /// Withdrawn by either side.
    Cancelled,
}

/// Backend status strings and the canonical status each maps to.
///
/// Keys are compared after trimming and lowercasing. Anything not listed
/// here resolves to [`TaskStatus::Pending`].
pub const STATUS_ALIASES: &[(&str, TaskStatus)] = &[
    ("pending", TaskStatus::Pending),
    ("available", TaskStatus::Pending),
    ("open", TaskStatus::Pending),
    ("posted", TaskStatus::Pending),
    ("new", TaskStatus::Pending),
    ("accepted", TaskStatus::Accepted),
    ("assigned", TaskStatus::Accepted),
    ("ongoing", TaskStatus::Ongoing),
    ("in_progress", TaskStatus::Ongoing),
    ("in-progress", TaskStatus::Ongoing),
    ("in progress", TaskStatus::Ongoing),
    ("inprogress", TaskStatus::Ongoing),
    ("started", TaskStatus::Ongoing),
    ("active", TaskStatus::Ongoing),
    ("completed", TaskStatus::Completed),
    ("complete", TaskStatus::Completed),
    ("done", TaskStatus::Completed),
    ("finished", TaskStatus::Completed),
    ("cancelled", TaskStatus::Cancelled),
    ("canceled", TaskStatus::Cancelled),
];

/// Error returned when a status string is not in [`STATUS_ALIASES`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown task status: {0}")]
pub struct UnknownStatus(pub String);

impl TaskStatus {
    /// All canonical statuses, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Accepted,
        Self::Ongoing,
        Self::Completed,
        Self::Cancelled,
    ];

    /// Looks up a backend status string in the alias table.
    ///
    /// Returns `None` for unrecognised values; the normalizer turns that
    /// into [`TaskStatus::Pending`].
    #[must_use]
    pub fn from_alias(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase();
        STATUS_ALIASES
            .iter()
            .find(|(alias, _)| *alias == key)
            .map(|(_, status)| *status)
    }

    /// Canonical lowercase key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Ongoing => "ongoing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` once the errand can no longer change.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_alias(s).ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// Errand category as shown in filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Backend category id, when the record carried one.
    pub id: Option<String>,
    /// Display name; empty when unknown.
    pub name: String,
}

/// Where the helper picks the errand up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Free-form address text; empty when unknown.
    pub address: String,
    /// Latitude in degrees, only when within `-90..=90`.
    pub latitude: Option<f64>,
    /// Longitude in degrees, only when within `-180..=180`.
    pub longitude: Option<f64>,
}

impl Location {
    /// Returns both coordinates when the backend supplied a usable pair.
    #[must_use]
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        Some((self.latitude?, self.longitude?))
    }
}

/// Contact card of a counterparty (poster or helper).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    /// Backend user id.
    pub id: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Phone number as entered.
    pub phone: Option<String>,
    /// Email address.
    pub email: Option<String>,
    /// Home or contact address.
    pub address: Option<String>,
}

impl Profile {
    /// Returns `true` if the profile carries any contact detail (name,
    /// phone, email or address).
    ///
    /// The id alone does not count: an id without details is exactly the
    /// "assigned, profile not loaded yet" case.
    #[must_use]
    pub const fn has_contact_details(&self) -> bool {
        self.name.is_some()
            || self.phone.is_some()
            || self.email.is_some()
            || self.address.is_some()
    }

    /// Returns `true` if no field is populated.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.id.is_none() && !self.has_contact_details()
    }
}

/// Helper side of an errand.
///
/// The backend links the helper id before it populates the nested helper
/// profile, so "assigned but no contact details yet" is its own state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Assignment {
    /// No helper linked.
    #[default]
    Unassigned,
    /// Helper id known, profile not populated yet.
    ProfilePending {
        /// The linked helper's user id.
        helper_id: String,
    },
    /// Helper linked with contact details.
    Assigned(Profile),
}

impl Assignment {
    /// The linked helper id, if any.
    #[must_use]
    pub fn helper_id(&self) -> Option<&str> {
        match self {
            Self::Unassigned => None,
            Self::ProfilePending { helper_id } => Some(helper_id),
            Self::Assigned(profile) => profile.id.as_deref(),
        }
    }

    /// Returns `true` unless the errand has no helper at all.
    #[must_use]
    pub const fn is_assigned(&self) -> bool {
        !matches!(self, Self::Unassigned)
    }
}

/// Normalized errand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Backend identifier.
    pub id: TaskId,
    /// What needs doing.
    pub description: String,
    /// Category.
    pub category: Category,
    /// Offered price, never negative.
    pub price: f64,
    /// When the errand was posted.
    pub created_at: Option<DateTime<Utc>>,
    /// When the errand last changed.
    pub updated_at: Option<DateTime<Utc>>,
    /// Urgency label as sent by the backend (e.g. `"high"`).
    pub urgency: Option<String>,
    /// Pickup location.
    pub pickup: Location,
    /// Canonical status.
    pub status: TaskStatus,
    /// The user who posted the errand.
    pub poster: Profile,
    /// The helper, if any.
    pub assignment: Assignment,
}

impl Task {
    /// The linked helper id, if any.
    #[must_use]
    pub fn assignee_id(&self) -> Option<&str> {
        self.assignment.helper_id()
    }

    /// The helper's profile, once the backend has populated it.
    #[must_use]
    pub const fn helper(&self) -> Option<&Profile> {
        match &self.assignment {
            Assignment::Assigned(profile) => Some(profile),
            _ => None,
        }
    }

    /// Sets the status, keeping the assignment invariant: the helper link
    /// is only ever dropped when the errand is cancelled.
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        if status == TaskStatus::Cancelled {
            self.assignment = Assignment::Unassigned;
        }
    }
}
