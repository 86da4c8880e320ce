//! Normalization of backend errand records into [`Task`].
//!
//! The backend is inconsistent about record shape: ids arrive as `id` or
//! `_id` or `errandId`, counterparties as nested objects under several names
//! or as flattened top-level fields, prices as numbers or strings. Every
//! field is therefore resolved through an ordered [`Extractor`] chain,
//! evaluated left to right, first non-empty candidate wins. The chains are
//! plain data so they can be inspected and tested on their own.
//!
//! Everything here is total: any JSON value produces a well-formed [`Task`].

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

use crate::task::{Assignment, Category, Location, Profile, Task, TaskId, TaskStatus};

/// One way of pulling a text field out of a raw record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extractor {
    /// Scalar (string or number) at a key path.
    Path(&'static [&'static str]),
    /// `firstName` and `lastName` of the object at a key path, joined.
    FullName(&'static [&'static str]),
}

impl Extractor {
    /// Returns the trimmed, non-empty text this extractor finds, if any.
    #[must_use]
    pub fn extract(&self, raw: &Value) -> Option<String> {
        match self {
            Self::Path(path) => lookup(raw, path).and_then(scalar_text),
            Self::FullName(path) => {
                let obj = lookup(raw, path)?;
                let first = field_text(obj, &["firstName", "first_name"]);
                let last = field_text(obj, &["lastName", "last_name"]);
                match (first, last) {
                    (Some(f), Some(l)) => Some(format!("{f} {l}")),
                    (one, other) => one.or(other),
                }
            }
        }
    }

    /// Returns the raw value at this extractor's path.
    ///
    /// [`Extractor::FullName`] has no single value and always yields `None`.
    #[must_use]
    pub fn value<'a>(&self, raw: &'a Value) -> Option<&'a Value> {
        match self {
            Self::Path(path) => lookup(raw, path).filter(|v| !v.is_null()),
            Self::FullName(_) => None,
        }
    }
}

/// Runs a chain and returns the first non-empty text.
#[must_use]
pub fn first_non_empty(raw: &Value, chain: &[Extractor]) -> Option<String> {
    chain.iter().find_map(|extractor| extractor.extract(raw))
}

/// Extractor chains for one counterparty profile.
#[derive(Debug, Clone, Copy)]
pub struct ProfileChains {
    /// User id.
    pub id: &'static [Extractor],
    /// Display name.
    pub name: &'static [Extractor],
    /// Phone number.
    pub phone: &'static [Extractor],
    /// Email.
    pub email: &'static [Extractor],
    /// Address.
    pub address: &'static [Extractor],
}

impl ProfileChains {
    /// Resolves every field independently.
    #[must_use]
    pub fn resolve(&self, raw: &Value) -> Profile {
        Profile {
            id: first_non_empty(raw, self.id),
            name: first_non_empty(raw, self.name),
            phone: first_non_empty(raw, self.phone),
            email: first_non_empty(raw, self.email),
            address: first_non_empty(raw, self.address),
        }
    }
}

use Extractor::{FullName, Path};

/// Task id.
pub const TASK_ID: &[Extractor] = &[
    Path(&["id"]),
    Path(&["_id"]),
    Path(&["errandId"]),
    Path(&["errand_id"]),
    Path(&["taskId"]),
    Path(&["task_id"]),
    Path(&["errand", "id"]),
    Path(&["errand", "_id"]),
];

/// Description text.
pub const DESCRIPTION: &[Extractor] = &[
    Path(&["description"]),
    Path(&["details"]),
    Path(&["errandDescription"]),
    Path(&["title"]),
];

/// Category display name: object shape first, then flat strings.
pub const CATEGORY_NAME: &[Extractor] = &[
    Path(&["category", "name"]),
    Path(&["category", "title"]),
    Path(&["category", "categoryName"]),
    Path(&["category"]),
    Path(&["categoryName"]),
    Path(&["category_name"]),
];

/// Category id.
pub const CATEGORY_ID: &[Extractor] = &[
    Path(&["category", "id"]),
    Path(&["category", "_id"]),
    Path(&["categoryId"]),
    Path(&["category_id"]),
];

/// Status string, mapped through [`crate::task::STATUS_ALIASES`].
pub const STATUS: &[Extractor] = &[
    Path(&["status"]),
    Path(&["errandStatus"]),
    Path(&["state"]),
    Path(&["task_status"]),
];

/// Price-like amounts.
pub const PRICE: &[Extractor] = &[
    Path(&["price"]),
    Path(&["amount"]),
    Path(&["budget"]),
    Path(&["fee"]),
    Path(&["reward"]),
];

/// Creation timestamp.
pub const CREATED_AT: &[Extractor] = &[
    Path(&["createdAt"]),
    Path(&["created_at"]),
    Path(&["dateCreated"]),
    Path(&["postedAt"]),
];

/// Last-update timestamp.
pub const UPDATED_AT: &[Extractor] = &[
    Path(&["updatedAt"]),
    Path(&["updated_at"]),
    Path(&["dateUpdated"]),
];

/// Urgency label.
pub const URGENCY: &[Extractor] = &[
    Path(&["urgency"]),
    Path(&["urgencyLevel"]),
    Path(&["priority"]),
];

/// Pickup address: object shape first, then flat strings.
pub const PICKUP_ADDRESS: &[Extractor] = &[
    Path(&["pickupLocation", "addressText"]),
    Path(&["pickupLocation", "address"]),
    Path(&["pickupLocation", "name"]),
    Path(&["pickupLocation"]),
    Path(&["pickup_location"]),
    Path(&["location", "address"]),
    Path(&["location"]),
    Path(&["pickupAddress"]),
    Path(&["address"]),
];

/// Pickup latitude.
pub const PICKUP_LATITUDE: &[Extractor] = &[
    Path(&["pickupLocation", "latitude"]),
    Path(&["pickupLocation", "lat"]),
    Path(&["location", "latitude"]),
    Path(&["location", "lat"]),
    Path(&["latitude"]),
    Path(&["lat"]),
];

/// Pickup longitude.
pub const PICKUP_LONGITUDE: &[Extractor] = &[
    Path(&["pickupLocation", "longitude"]),
    Path(&["pickupLocation", "lng"]),
    Path(&["pickupLocation", "lon"]),
    Path(&["location", "longitude"]),
    Path(&["location", "lng"]),
    Path(&["longitude"]),
    Path(&["lng"]),
];

/// The errand's poster: `poster` object, then `user`/`postedBy`/`createdBy`,
/// then flattened top-level fields.
pub const POSTER: ProfileChains = ProfileChains {
    id: &[
        Path(&["poster", "id"]),
        Path(&["poster", "_id"]),
        Path(&["user", "id"]),
        Path(&["user", "_id"]),
        Path(&["postedBy", "id"]),
        Path(&["postedBy", "_id"]),
        Path(&["createdBy", "id"]),
        Path(&["createdBy", "_id"]),
        Path(&["posterId"]),
        Path(&["userId"]),
        Path(&["poster_id"]),
        Path(&["user_id"]),
        Path(&["postedBy"]),
        Path(&["createdBy"]),
    ],
    name: &[
        Path(&["poster", "name"]),
        Path(&["poster", "fullName"]),
        FullName(&["poster"]),
        Path(&["user", "name"]),
        Path(&["user", "fullName"]),
        FullName(&["user"]),
        Path(&["postedBy", "name"]),
        Path(&["posterName"]),
        Path(&["userName"]),
        Path(&["poster_name"]),
    ],
    phone: &[
        Path(&["poster", "phone"]),
        Path(&["poster", "phoneNumber"]),
        Path(&["user", "phone"]),
        Path(&["user", "phoneNumber"]),
        Path(&["postedBy", "phone"]),
        Path(&["posterPhone"]),
        Path(&["userPhone"]),
    ],
    email: &[
        Path(&["poster", "email"]),
        Path(&["user", "email"]),
        Path(&["postedBy", "email"]),
        Path(&["posterEmail"]),
        Path(&["userEmail"]),
    ],
    address: &[
        Path(&["poster", "address"]),
        Path(&["user", "address"]),
        Path(&["posterAddress"]),
        Path(&["userAddress"]),
    ],
};

/// The helper: `helper` object, then `assignee`/`acceptedBy`, then flattened
/// fields. Scalar `helper`/`assignee`/`acceptedBy` values are taken as ids.
pub const HELPER: ProfileChains = ProfileChains {
    id: &[
        Path(&["helper", "id"]),
        Path(&["helper", "_id"]),
        Path(&["assignee", "id"]),
        Path(&["assignee", "_id"]),
        Path(&["acceptedBy", "id"]),
        Path(&["acceptedBy", "_id"]),
        Path(&["helperId"]),
        Path(&["assigneeId"]),
        Path(&["helper_id"]),
        Path(&["helper"]),
        Path(&["assignee"]),
        Path(&["acceptedBy"]),
    ],
    name: &[
        Path(&["helper", "name"]),
        Path(&["helper", "fullName"]),
        FullName(&["helper"]),
        Path(&["assignee", "name"]),
        FullName(&["assignee"]),
        Path(&["acceptedBy", "name"]),
        Path(&["helperName"]),
        Path(&["assigneeName"]),
    ],
    phone: &[
        Path(&["helper", "phone"]),
        Path(&["helper", "phoneNumber"]),
        Path(&["assignee", "phone"]),
        Path(&["acceptedBy", "phone"]),
        Path(&["helperPhone"]),
    ],
    email: &[
        Path(&["helper", "email"]),
        Path(&["assignee", "email"]),
        Path(&["acceptedBy", "email"]),
        Path(&["helperEmail"]),
    ],
    address: &[
        Path(&["helper", "address"]),
        Path(&["assignee", "address"]),
        Path(&["helperAddress"]),
    ],
};

/// Keys a list endpoint may wrap its array in.
const LIST_KEYS: &[&str] = &["data", "errands", "tasks", "results", "items"];

/// Normalizes one raw record. Never fails.
#[must_use]
pub fn normalize_task(raw: &Value) -> Task {
    Task {
        id: task_id_of(raw).unwrap_or_default(),
        description: first_non_empty(raw, DESCRIPTION).unwrap_or_default(),
        category: Category {
            id: first_non_empty(raw, CATEGORY_ID),
            name: first_non_empty(raw, CATEGORY_NAME).unwrap_or_default(),
        },
        price: first_amount(raw, PRICE),
        created_at: first_timestamp(raw, CREATED_AT),
        updated_at: first_timestamp(raw, UPDATED_AT),
        urgency: first_non_empty(raw, URGENCY),
        pickup: Location {
            address: first_non_empty(raw, PICKUP_ADDRESS).unwrap_or_default(),
            latitude: first_coordinate(raw, PICKUP_LATITUDE, 90.0),
            longitude: first_coordinate(raw, PICKUP_LONGITUDE, 180.0),
        },
        status: resolve_status(raw),
        poster: POSTER.resolve(raw),
        assignment: resolve_assignment(raw),
    }
}

/// Normalizes a list response: a bare array or an object envelope such as
/// `{"data": [...]}` or `{"data": {"errands": [...]}}`.
///
/// Unknown envelopes yield an empty list. Entries that are not objects are
/// skipped.
#[must_use]
pub fn normalize_task_list(raw: &Value) -> Vec<Task> {
    let Some(items) = list_items(raw, 2) else {
        tracing::warn!(shape = shape_of(raw), "unrecognised errand list envelope");
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            if item.is_object() {
                Some(normalize_task(item))
            } else {
                tracing::debug!(shape = shape_of(item), "skipping non-object list entry");
                None
            }
        })
        .collect()
}

/// Finds the raw record with the given id in a list response.
///
/// Accepts the same envelopes as [`normalize_task_list`].
#[must_use]
pub fn find_raw_record<'a>(raw: &'a Value, id: &TaskId) -> Option<&'a Value> {
    list_items(raw, 2)?
        .iter()
        .find(|item| item.is_object() && task_id_of(item).as_ref() == Some(id))
}

/// Task id of a raw record, if any id field is present.
#[must_use]
pub fn task_id_of(raw: &Value) -> Option<TaskId> {
    first_non_empty(raw, TASK_ID).map(TaskId::new)
}

/// Poster user id of a raw record.
#[must_use]
pub fn poster_id_of(raw: &Value) -> Option<String> {
    first_non_empty(raw, POSTER.id)
}

/// Maps the status chain through the alias table.
fn resolve_status(raw: &Value) -> TaskStatus {
    let Some(text) = first_non_empty(raw, STATUS) else {
        return TaskStatus::Pending;
    };
    TaskStatus::from_alias(&text).unwrap_or_else(|| {
        tracing::warn!(raw_status = %text, "unrecognised errand status, treating as pending");
        TaskStatus::Pending
    })
}

/// Splits the helper into the three assignment states.
fn resolve_assignment(raw: &Value) -> Assignment {
    let profile = HELPER.resolve(raw);
    if profile.has_contact_details() {
        return Assignment::Assigned(profile);
    }
    match profile.id {
        Some(helper_id) => Assignment::ProfilePending { helper_id },
        None => Assignment::Unassigned,
    }
}

/// First amount in the chain that parses; negative or non-finite becomes 0.
fn first_amount(raw: &Value, chain: &[Extractor]) -> f64 {
    chain
        .iter()
        .filter_map(|e| e.value(raw))
        .find_map(coerce_number)
        .filter(|n| n.is_finite() && *n >= 0.0)
        .unwrap_or(0.0)
}

/// First coordinate in the chain, kept only within `-limit..=limit`.
fn first_coordinate(raw: &Value, chain: &[Extractor], limit: f64) -> Option<f64> {
    chain
        .iter()
        .filter_map(|e| e.value(raw))
        .find_map(coerce_number)
        .filter(|n| n.is_finite() && n.abs() <= limit)
}

fn first_timestamp(raw: &Value, chain: &[Extractor]) -> Option<DateTime<Utc>> {
    chain
        .iter()
        .filter_map(|e| e.value(raw))
        .find_map(parse_timestamp)
}

/// Safe numeric parse: JSON numbers as-is, strings by their leading number
/// once currency symbols and thousands separators are stripped.
#[must_use]
pub fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_leading_number(s),
        _ => None,
    }
}

fn parse_leading_number(s: &str) -> Option<f64> {
    let cleaned: String = s
        .trim()
        .chars()
        .filter(|c| !matches!(c, ',' | '_' | ' '))
        .skip_while(|c| !(c.is_ascii_digit() || matches!(c, '-' | '+' | '.')))
        .collect();

    let mut end = 0;
    let mut seen_dot = false;
    for (i, c) in cleaned.char_indices() {
        let ok = c.is_ascii_digit()
            || (i == 0 && matches!(c, '-' | '+'))
            || (c == '.' && !std::mem::replace(&mut seen_dot, true));
        if !ok {
            break;
        }
        end = i + c.len_utf8();
    }
    cleaned[..end].parse::<f64>().ok()
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS`, bare dates and epoch millis.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => n.as_i64().and_then(DateTime::<Utc>::from_timestamp_millis),
        Value::String(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
                        .ok()
                        .map(|naive| naive.and_utc())
                })
                .or_else(|| {
                    NaiveDate::parse_from_str(s, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                        .map(|naive| naive.and_utc())
                })
                .or_else(|| {
                    s.parse::<i64>()
                        .ok()
                        .and_then(DateTime::<Utc>::from_timestamp_millis)
                })
        }
        _ => None,
    }
}

fn list_items(raw: &Value, depth: u8) -> Option<&Vec<Value>> {
    match raw {
        Value::Array(items) => Some(items),
        Value::Object(map) if depth > 0 => LIST_KEYS
            .iter()
            .filter_map(|key| map.get(*key))
            .find_map(|inner| list_items(inner, depth - 1)),
        _ => None,
    }
}

fn lookup<'a>(raw: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(raw, |value, key| value.get(*key))
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_text(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| obj.get(*key))
        .find_map(scalar_text)
}

const fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
