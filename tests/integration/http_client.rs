#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Integration tests for the reqwest-backed HTTP adapter.
//!
//! Runs [`HttpClient`] against an in-process axum backend and checks:
//! - bearer token and JSON accept headers on every request
//! - empty bodies, JSON bodies and non-JSON bodies
//! - status errors with body excerpts and server messages
//! - timeouts distinct from network errors
//! - no request at all without a token

mod fake_backend;

use std::sync::Arc;
use std::time::Duration;

use dailydone::http::client::HttpClient;
use dailydone::http::{
    ApiClient, HttpError, ParsedBody, RequestOptions, SharedToken, StaticToken, TokenProvider,
};
use fake_backend::{FakeBackend, Reply};
use serde_json::json;

fn client(backend: &FakeBackend, tokens: Arc<dyn TokenProvider>) -> HttpClient {
    HttpClient::new(&backend.base_url, tokens).unwrap()
}

#[tokio::test]
async fn sends_bearer_token_and_parses_json() {
    let backend = FakeBackend::start().await;
    backend.reply("errands/available", Reply::json(&json!([{ "_id": "T1" }])));
    let api = client(&backend, Arc::new(StaticToken::new("tok-123")));

    let body = api
        .request(
            "errands/available",
            RequestOptions::get().with_query("category", "pet care"),
        )
        .await
        .unwrap();

    assert_eq!(body, ParsedBody::Json(json!([{ "_id": "T1" }])));
    let seen = &backend.requests()[0];
    assert_eq!(seen.method, "GET");
    assert_eq!(seen.authorization.as_deref(), Some("Bearer tok-123"));
    assert_eq!(seen.accept.as_deref(), Some("application/json"));
    assert_eq!(seen.query.get("category").map(String::as_str), Some("pet care"));
}

#[tokio::test]
async fn empty_body_is_empty() {
    let backend = FakeBackend::start().await;
    backend.reply("errands/accept", Reply::empty());
    let api = client(&backend, Arc::new(StaticToken::new("t")));

    let body = api
        .request("errands/accept", RequestOptions::post())
        .await
        .unwrap();
    assert_eq!(body, ParsedBody::Empty);
}

#[tokio::test]
async fn non_json_body_is_bad_response() {
    let backend = FakeBackend::start().await;
    backend.reply("errands/available", Reply::raw(200, "<html>maintenance</html>"));
    let api = client(&backend, Arc::new(StaticToken::new("t")));

    let err = api
        .request("errands/available", RequestOptions::get())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        HttpError::BadResponseBody {
            excerpt: "<html>maintenance</html>".to_string()
        }
    );
}

#[tokio::test]
async fn non_success_status_carries_excerpt() {
    let backend = FakeBackend::start().await;
    backend.reply("errands/available", Reply::raw(503, "upstream down"));
    let api = client(&backend, Arc::new(StaticToken::new("t")));

    let err = api
        .request("errands/available", RequestOptions::get())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        HttpError::Status {
            status: 503,
            body_excerpt: "upstream down".to_string()
        }
    );
    assert!(err.is_transient());
    assert!(!err.is_auth_failure());
}

#[tokio::test]
async fn client_error_uses_server_message() {
    let backend = FakeBackend::start().await;
    backend.reply(
        "errands/accept",
        Reply::raw(409, r#"{"message":"Errand already accepted"}"#),
    );
    let api = client(&backend, Arc::new(StaticToken::new("t")));

    let err = api
        .request("errands/accept", RequestOptions::post())
        .await
        .unwrap_err();
    assert_eq!(err.user_message(), "Errand already accepted");
}

#[tokio::test]
async fn forbidden_is_auth_failure() {
    let backend = FakeBackend::start().await;
    backend.reply("errands/helper", Reply::raw(403, ""));
    let api = client(&backend, Arc::new(StaticToken::new("expired")));

    let err = api
        .request("errands/helper", RequestOptions::get())
        .await
        .unwrap_err();
    assert!(err.is_auth_failure());
}

#[tokio::test]
async fn slow_backend_times_out() {
    let backend = FakeBackend::start().await;
    backend.reply(
        "errands/available",
        Reply::json(&json!([])).delayed(Duration::from_secs(5)),
    );
    let api = client(&backend, Arc::new(StaticToken::new("t")))
        .with_timeout(Duration::from_millis(200));

    let err = api
        .request("errands/available", RequestOptions::get())
        .await
        .unwrap_err();
    assert_eq!(err, HttpError::Timeout(Duration::from_millis(200)));
}

#[tokio::test]
async fn per_request_timeout_overrides_client_default() {
    let backend = FakeBackend::start().await;
    backend.reply(
        "errands/available",
        Reply::json(&json!([])).delayed(Duration::from_secs(5)),
    );
    let api = client(&backend, Arc::new(StaticToken::new("t")));

    let err = api
        .request(
            "errands/available",
            RequestOptions::get().with_timeout(Duration::from_millis(100)),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HttpError::Timeout(_)));
}

#[tokio::test]
async fn no_token_means_no_request() {
    let backend = FakeBackend::start().await;
    backend.reply("errands/available", Reply::json(&json!([])));
    let api = client(&backend, Arc::new(StaticToken::none()));

    let err = api
        .request("errands/available", RequestOptions::get())
        .await
        .unwrap_err();
    assert_eq!(err, HttpError::Unauthenticated);
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn shared_token_follows_sign_in_and_out() {
    let backend = FakeBackend::start().await;
    backend.reply("errands/available", Reply::json(&json!([])));
    let tokens = Arc::new(SharedToken::new());
    let api = client(&backend, tokens.clone());

    assert_eq!(
        api.request("errands/available", RequestOptions::get()).await,
        Err(HttpError::Unauthenticated)
    );
    tokens.sign_in("fresh");
    assert!(api.request("errands/available", RequestOptions::get()).await.is_ok());
    tokens.sign_out();
    assert_eq!(
        api.request("errands/available", RequestOptions::get()).await,
        Err(HttpError::Unauthenticated)
    );
    assert_eq!(backend.request_count("errands/available"), 1);
}

#[tokio::test]
async fn json_body_and_default_headers_reach_backend() {
    let backend = FakeBackend::start().await;
    backend.reply("ratings", Reply::json(&json!({ "ok": true })));
    let api = client(&backend, Arc::new(StaticToken::new("t")))
        .with_default_header("X-Client", "dailydone-tests");

    api.request(
        "/ratings",
        RequestOptions::post()
            .with_query("userId", "U1")
            .with_json(json!({ "rating": 5 })),
    )
    .await
    .unwrap();

    let seen = &backend.requests()[0];
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.path, "ratings");
    assert_eq!(seen.body, Some(json!({ "rating": 5 })));
}
