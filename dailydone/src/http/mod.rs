//! HTTP client adapter for the `DailyDone` REST backend.
//!
//! Defines the [`ApiClient`] trait every backend call goes through, the
//! [`TokenProvider`] seam for bearer tokens, and the typed [`HttpError`]
//! taxonomy. Concrete implementations:
//! - [`client::HttpClient`]: `reqwest`-backed client with timeouts
//! - [`scripted::ScriptedApi`]: in-process client serving queued responses,
//!   for tests

pub mod client;
pub mod scripted;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(15_000);

/// How many characters of a response body are kept for diagnostics.
pub const BODY_EXCERPT_CHARS: usize = 200;

/// Errors produced by the HTTP adapter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HttpError {
    /// No bearer token is available; nothing was sent.
    #[error("not signed in: no bearer token available")]
    Unauthenticated,

    /// Transport-level failure (DNS, connect, reset, TLS).
    #[error("network error: {0}")]
    Network(String),

    /// The request did not complete within the timeout.
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    /// The backend answered with a non-2xx status.
    #[error("server returned HTTP {status}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// First characters of the response body.
        body_excerpt: String,
    },

    /// The body was non-empty but not JSON.
    #[error("response body is not valid JSON: {excerpt}")]
    BadResponseBody {
        /// First characters of the raw body.
        excerpt: String,
    },

    /// The request could not be built (bad base URL, path or header).
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl HttpError {
    /// Returns `true` when the user has to sign in (again).
    #[must_use]
    pub const fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            Self::Unauthenticated | Self::Status { status: 401 | 403, .. }
        )
    }

    /// Returns `true` for failures a later retry may clear.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// A message suitable for showing to the user.
    ///
    /// For 4xx answers the backend's own `message`/`error` field is used when
    /// the body excerpt carries one.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthenticated => "Please sign in to continue.".to_string(),
            Self::Status {
                status: 401 | 403, ..
            } => "Your session has expired. Please sign in again.".to_string(),
            Self::Status {
                status,
                body_excerpt,
            } => {
                if (400..500).contains(status) {
                    if let Some(message) = server_message(body_excerpt) {
                        return message;
                    }
                }
                match status {
                    404 => "This errand is no longer available.",
                    409 => "Someone else already updated this errand.",
                    429 => "Too many requests. Please wait a moment and try again.",
                    500..=599 => "DailyDone is having trouble right now. Please try again shortly.",
                    _ => "The request could not be completed.",
                }
                .to_string()
            }
            Self::Timeout(_) => "The server took too long to respond. Please try again.".to_string(),
            Self::Network(_) => {
                "Could not reach DailyDone. Check your connection and try again.".to_string()
            }
            Self::BadResponseBody { .. } => "The server sent an unexpected response.".to_string(),
            Self::InvalidRequest(_) => "The request could not be prepared.".to_string(),
        }
    }
}

/// Pulls a human-readable message out of a JSON error body.
fn server_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    ["message", "error", "detail"]
        .iter()
        .filter_map(|key| value.get(*key)?.as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(String::from)
}

/// HTTP verbs the backend uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    #[default]
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `PATCH`
    Patch,
    /// `DELETE`
    Delete,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        })
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    /// HTTP verb.
    pub method: Method,
    /// Query pairs, appended in order.
    pub query: Vec<(String, String)>,
    /// Extra headers for this request.
    pub headers: Vec<(String, String)>,
    /// JSON body.
    pub body: Option<Value>,
    /// Overrides the client's default timeout.
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Options for the given verb.
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            method,
            ..Self::default()
        }
    }

    /// `GET` with no extras.
    #[must_use]
    pub fn get() -> Self {
        Self::new(Method::Get)
    }

    /// `POST` with no extras.
    #[must_use]
    pub fn post() -> Self {
        Self::new(Method::Post)
    }

    /// `DELETE` with no extras.
    #[must_use]
    pub fn delete() -> Self {
        Self::new(Method::Delete)
    }

    /// Appends a query pair.
    #[must_use]
    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Adds a header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets a JSON body.
    #[must_use]
    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Sets a timeout for this request only.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Value of a query parameter, if present.
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A successfully parsed response body.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedBody {
    /// Empty or whitespace-only body.
    Empty,
    /// Parsed JSON.
    Json(Value),
}

impl ParsedBody {
    /// The JSON value, with an empty body as `null`.
    #[must_use]
    pub fn into_json(self) -> Value {
        match self {
            Self::Empty => Value::Null,
            Self::Json(value) => value,
        }
    }
}

/// Parses a response body: empty stays empty, anything else must be JSON.
///
/// # Errors
///
/// Returns [`HttpError::BadResponseBody`] with a body excerpt if the text is
/// not valid JSON.
pub fn parse_body(text: &str) -> Result<ParsedBody, HttpError> {
    if text.trim().is_empty() {
        return Ok(ParsedBody::Empty);
    }
    serde_json::from_str(text)
        .map(ParsedBody::Json)
        .map_err(|_| HttpError::BadResponseBody {
            excerpt: excerpt(text),
        })
}

/// First [`BODY_EXCERPT_CHARS`] characters of a body.
#[must_use]
pub fn excerpt(text: &str) -> String {
    text.chars().take(BODY_EXCERPT_CHARS).collect()
}

/// Async client for the REST backend.
///
/// Implementations attach authentication, enforce timeouts and classify
/// failures into [`HttpError`]. They never touch shared application state.
pub trait ApiClient: Send + Sync + 'static {
    /// Performs one request against `path` (relative to the backend base).
    fn request(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> impl std::future::Future<Output = Result<ParsedBody, HttpError>> + Send;
}

/// Source of the bearer token for authenticated calls.
pub trait TokenProvider: Send + Sync {
    /// The current token, or `None` when signed out.
    fn token(&self) -> Option<String>;
}

impl<T: TokenProvider + ?Sized> TokenProvider for Arc<T> {
    fn token(&self) -> Option<String> {
        (**self).token()
    }
}

/// Returns the provider's token unless it is missing or blank.
pub fn bearer_token<P: TokenProvider + ?Sized>(provider: &P) -> Option<String> {
    provider
        .token()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// A token fixed at construction time.
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    /// A provider that always returns `token`.
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// A provider that is always signed out.
    #[must_use]
    pub const fn none() -> Self {
        Self(None)
    }
}

impl TokenProvider for StaticToken {
    fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// A token that changes on sign-in and sign-out.
#[derive(Debug, Default)]
pub struct SharedToken {
    inner: RwLock<Option<String>>,
}

impl SharedToken {
    /// Starts signed out.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new token.
    pub fn sign_in(&self, token: impl Into<String>) {
        *self.inner.write() = Some(token.into());
    }

    /// Forgets the token.
    pub fn sign_out(&self) {
        *self.inner.write() = None;
    }
}

impl TokenProvider for SharedToken {
    fn token(&self) -> Option<String> {
        self.inner.read().clone()
    }
}
