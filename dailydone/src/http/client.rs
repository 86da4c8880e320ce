//! `reqwest`-backed [`ApiClient`].
//!
//! Resolves paths against a base URL, attaches the bearer token and JSON
//! accept header, and enforces a timeout around the whole exchange (send
//! plus body read). The body is read as text and only parsed as JSON when
//! non-empty, so `204 No Content` answers come back as [`ParsedBody::Empty`].

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::ACCEPT;
use url::Url;

use super::{
    ApiClient, DEFAULT_TIMEOUT, HttpError, Method, ParsedBody, RequestOptions, TokenProvider,
    bearer_token, excerpt, parse_body,
};

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Patch => Self::PATCH,
            Method::Delete => Self::DELETE,
        }
    }
}

/// HTTP client for the `DailyDone` backend.
///
/// Cheap to share behind an [`Arc`]; the inner `reqwest::Client` pools
/// connections.
pub struct HttpClient {
    /// Underlying connection pool.
    client: reqwest::Client,
    /// Base URL, always ending in `/` so relative joins keep its path.
    base_url: Url,
    /// Bearer token source.
    tokens: Arc<dyn TokenProvider>,
    /// Timeout used when a request does not set its own.
    timeout: Duration,
    /// Headers sent with every request.
    default_headers: Vec<(String, String)>,
}

impl HttpClient {
    /// Creates a client for the backend at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::InvalidRequest`] if `base_url` is not an absolute
    /// URL.
    pub fn new(base_url: &str, tokens: Arc<dyn TokenProvider>) -> Result<Self, HttpError> {
        let mut base_url = Url::parse(base_url)
            .map_err(|e| HttpError::InvalidRequest(format!("base url {base_url:?}: {e}")))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| HttpError::InvalidRequest(format!("http client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            tokens,
            timeout: DEFAULT_TIMEOUT,
            default_headers: Vec::new(),
        })
    }

    /// Sets the default per-request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Adds a header sent with every request.
    #[must_use]
    pub fn with_default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// The base URL requests are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Resolves a backend path against the base URL.
    ///
    /// # Errors
    ///
    /// Returns [`HttpError::InvalidRequest`] if the path cannot be joined.
    pub fn endpoint(&self, path: &str) -> Result<Url, HttpError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| HttpError::InvalidRequest(format!("path {path:?}: {e}")))
    }
}

impl ApiClient for HttpClient {
    async fn request(&self, path: &str, options: RequestOptions) -> Result<ParsedBody, HttpError> {
        let Some(token) = bearer_token(self.tokens.as_ref()) else {
            tracing::debug!(path, "no bearer token, request not sent");
            return Err(HttpError::Unauthenticated);
        };

        let url = self.endpoint(path)?;
        let timeout = options.timeout.unwrap_or(self.timeout);
        let method = options.method;

        let mut builder = self
            .client
            .request(method.into(), url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json");
        for (name, value) in self.default_headers.iter().chain(&options.headers) {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }
        if let Some(body) = &options.body {
            builder = builder.json(body);
        }

        let exchange = async move {
            let response = builder.send().await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, text))
        };

        let (status, text) = tokio::time::timeout(timeout, exchange)
            .await
            .map_err(|_| {
                tracing::warn!(%method, path, timeout_ms = timeout.as_millis(), "request timed out");
                HttpError::Timeout(timeout)
            })?
            .map_err(|e| {
                tracing::warn!(%method, path, err = %e, "request failed");
                classify(&e)
            })?;

        if !status.is_success() {
            tracing::debug!(%method, path, status = status.as_u16(), "non-success status");
            return Err(HttpError::Status {
                status: status.as_u16(),
                body_excerpt: excerpt(&text),
            });
        }

        parse_body(&text).inspect_err(|_| {
            tracing::warn!(%method, path, "response body is not JSON");
        })
    }
}

/// Maps a `reqwest` failure onto the adapter taxonomy.
fn classify(err: &reqwest::Error) -> HttpError {
    if err.is_builder() {
        HttpError::InvalidRequest(err.to_string())
    } else {
        HttpError::Network(err.to_string())
    }
}
