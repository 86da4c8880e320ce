//! Scripted API client for testing.
//!
//! [`ScriptedApi`] answers requests from per-path queues instead of the
//! network, records every call it receives, and can hold each response back
//! for a fixed delay so tests can observe overlapping requests.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;

use super::{ApiClient, HttpError, ParsedBody, RequestOptions};

/// A scripted answer: a parsed body or an adapter error.
pub type ScriptedResponse = Result<ParsedBody, HttpError>;

/// One request as seen by [`ScriptedApi`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Path as passed to [`ApiClient::request`].
    pub path: String,
    /// Options as passed to [`ApiClient::request`].
    pub options: RequestOptions,
}

/// In-process [`ApiClient`] serving queued responses.
///
/// For each path, queued responses are served first in order; once the
/// queue is empty the path's fallback (see [`ScriptedApi::set_fallback`])
/// is repeated. Paths with neither answer with a network error.
#[derive(Debug, Default)]
pub struct ScriptedApi {
    /// Per-path one-shot responses.
    queued: Mutex<HashMap<String, VecDeque<ScriptedResponse>>>,
    /// Per-path repeated responses.
    fallback: Mutex<HashMap<String, ScriptedResponse>>,
    /// Every request received, in arrival order.
    calls: Mutex<Vec<RecordedCall>>,
    /// Delay applied before each response.
    delay: Option<Duration>,
}

impl ScriptedApi {
    /// An empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds every response back for `delay`.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues a one-shot response for `path`.
    pub fn push(&self, path: &str, response: ScriptedResponse) {
        self.queued
            .lock()
            .entry(normalize(path))
            .or_default()
            .push_back(response);
    }

    /// Queues a one-shot JSON response for `path`.
    pub fn push_json(&self, path: &str, body: Value) {
        self.push(path, Ok(ParsedBody::Json(body)));
    }

    /// Sets the response repeated for `path` once its queue is drained.
    pub fn set_fallback(&self, path: &str, response: ScriptedResponse) {
        self.fallback.lock().insert(normalize(path), response);
    }

    /// All calls received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Number of calls received for `path`.
    #[must_use]
    pub fn call_count(&self, path: &str) -> usize {
        let path = normalize(path);
        self.calls.lock().iter().filter(|c| c.path == path).count()
    }

    fn next_response(&self, path: &str) -> ScriptedResponse {
        if let Some(response) = self
            .queued
            .lock()
            .get_mut(path)
            .and_then(VecDeque::pop_front)
        {
            return response;
        }
        self.fallback.lock().get(path).cloned().unwrap_or_else(|| {
            Err(HttpError::Network(format!("no scripted response for {path}")))
        })
    }
}

impl ApiClient for ScriptedApi {
    async fn request(&self, path: &str, options: RequestOptions) -> Result<ParsedBody, HttpError> {
        let path = normalize(path);
        self.calls.lock().push(RecordedCall {
            path: path.clone(),
            options,
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next_response(&path)
    }
}

/// Paths are matched without a leading slash.
fn normalize(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}
