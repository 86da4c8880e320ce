#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc
)]

//! Integration tests for errand actions over HTTP.
//!
//! Drives [`ActionCoordinator`] against the in-process backend and checks
//! what reaches the wire: method, path, `errandId`/`userId` query pairs,
//! bearer token and rating body. Also covers re-entrancy while a request is
//! outstanding and the messages shown for backend rejections.

mod fake_backend;

use std::sync::Arc;
use std::time::Duration;

use dailydone::actions::{
    ActionCoordinator, ActionEndpoints, ActionError, ActionKind, ActionTarget, CompletionTarget,
    Endpoint,
};
use dailydone::http::client::HttpClient;
use dailydone::http::{HttpError, Method, StaticToken};
use dailydone::sync::Reconcile;
use dailydone_proto::normalize::find_raw_record;
use dailydone_proto::task::{TaskId, TaskStatus};
use fake_backend::{FakeBackend, Reply};
use serde_json::json;

fn coordinator(backend: &FakeBackend) -> ActionCoordinator<HttpClient> {
    let api = HttpClient::new(&backend.base_url, Arc::new(StaticToken::new("tok"))).unwrap();
    ActionCoordinator::new(Arc::new(api))
}

#[tokio::test]
async fn accept_posts_errand_id_with_bearer() {
    let backend = FakeBackend::start().await;
    backend.reply("errands/accept", Reply::empty());
    let actions = coordinator(&backend);

    let outcome = actions.accept(&TaskId::new("T1")).await.unwrap();

    assert_eq!(outcome.kind, ActionKind::Accept);
    assert_eq!(
        outcome.reconcile,
        Reconcile::SetStatus(TaskId::new("T1"), TaskStatus::Accepted)
    );
    let seen = &backend.requests()[0];
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.path, "errands/accept");
    assert_eq!(seen.query.get("errandId").map(String::as_str), Some("T1"));
    assert_eq!(seen.authorization.as_deref(), Some("Bearer tok"));
}

#[tokio::test]
async fn cancel_sends_delete() {
    let backend = FakeBackend::start().await;
    backend.reply("errands/cancel", Reply::json(&json!({ "message": "cancelled" })));
    let actions = coordinator(&backend);

    let outcome = actions.cancel(&TaskId::new("T9")).await.unwrap();

    assert_eq!(
        outcome.reconcile,
        Reconcile::SetStatus(TaskId::new("T9"), TaskStatus::Cancelled)
    );
    let seen = &backend.requests()[0];
    assert_eq!(seen.method, "DELETE");
    assert_eq!(seen.query.get("errandId").map(String::as_str), Some("T9"));
}

#[tokio::test]
async fn complete_takes_poster_from_raw_record() {
    let backend = FakeBackend::start().await;
    backend.reply("errands/complete", Reply::empty());
    let actions = coordinator(&backend);
    let listing = json!({ "data": { "errands": [
        { "_id": "T1", "postedBy": { "_id": "P7" } },
        { "_id": "T2", "postedBy": { "_id": "P8" } }
    ] } });
    let raw = find_raw_record(&listing, &TaskId::new("T2")).unwrap();

    let outcome = actions
        .complete(CompletionTarget::from_raw(raw))
        .await
        .unwrap();

    assert_eq!(
        outcome.reconcile,
        Reconcile::SetStatus(TaskId::new("T2"), TaskStatus::Completed)
    );
    let seen = &backend.requests()[0];
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.query.get("errandId").map(String::as_str), Some("T2"));
    assert_eq!(seen.query.get("userId").map(String::as_str), Some("P8"));
}

#[tokio::test]
async fn complete_without_poster_sends_nothing() {
    let backend = FakeBackend::start().await;
    backend.reply("errands/complete", Reply::empty());
    let actions = coordinator(&backend);
    let raw = json!({ "_id": "T1" });

    let err = actions
        .complete(CompletionTarget::from_raw(&raw))
        .await
        .unwrap_err();

    assert_eq!(err, ActionError::MissingIdentifiers("poster id"));
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn rate_sends_body_and_user_id() {
    let backend = FakeBackend::start().await;
    backend.reply("ratings", Reply::json(&json!({ "ok": true })));
    let actions = coordinator(&backend);

    let outcome = actions.rate("U42", 4).await.unwrap();

    assert_eq!(outcome.reconcile, Reconcile::None);
    let seen = &backend.requests()[0];
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.path, "ratings");
    assert_eq!(seen.query.get("userId").map(String::as_str), Some("U42"));
    assert_eq!(seen.body, Some(json!({ "rating": 4 })));
}

#[tokio::test]
async fn second_action_on_busy_errand_is_refused() {
    let backend = FakeBackend::start().await;
    backend.reply(
        "errands/accept",
        Reply::empty().delayed(Duration::from_millis(300)),
    );
    backend.reply("errands/cancel", Reply::empty());
    let actions = coordinator(&backend);
    let id = TaskId::new("T1");

    let (accepted, cancelled) = tokio::join!(actions.accept(&id), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let busy = actions.is_busy(&ActionTarget::Errand(id.clone()));
        (busy, actions.cancel(&id).await)
    });

    assert!(accepted.is_ok());
    let (busy, cancelled) = cancelled;
    assert!(busy);
    assert_eq!(
        cancelled.unwrap_err(),
        ActionError::Reentrant(ActionTarget::Errand(id.clone()))
    );
    assert_eq!(backend.request_count("errands/cancel"), 0);
    assert!(!actions.is_busy(&ActionTarget::Errand(id)));
}

#[tokio::test]
async fn conflict_surfaces_server_message() {
    let backend = FakeBackend::start().await;
    backend.reply(
        "errands/accept",
        Reply::raw(409, r#"{"message":"Errand already accepted"}"#),
    );
    let actions = coordinator(&backend);

    let err = actions.accept(&TaskId::new("T1")).await.unwrap_err();

    assert!(matches!(
        err,
        ActionError::Http(HttpError::Status { status: 409, .. })
    ));
    assert_eq!(err.user_message(), "Errand already accepted");
    assert!(!actions.is_busy(&ActionTarget::Errand(TaskId::new("T1"))));
}

#[tokio::test]
async fn signed_out_action_never_reaches_backend() {
    let backend = FakeBackend::start().await;
    backend.reply("errands/accept", Reply::empty());
    let api = HttpClient::new(&backend.base_url, Arc::new(StaticToken::none())).unwrap();
    let actions = ActionCoordinator::new(Arc::new(api));

    let err = actions.accept(&TaskId::new("T1")).await.unwrap_err();

    assert_eq!(err, ActionError::Http(HttpError::Unauthenticated));
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn custom_endpoints_are_honoured() {
    let backend = FakeBackend::start().await;
    backend.reply("v2/errands/take", Reply::empty());
    let api = HttpClient::new(&backend.base_url, Arc::new(StaticToken::new("tok"))).unwrap();
    let endpoints = ActionEndpoints {
        accept: Endpoint::new(Method::Put, "v2/errands/take"),
        ..ActionEndpoints::default()
    };
    let actions = ActionCoordinator::with_endpoints(Arc::new(api), endpoints);

    actions.accept(&TaskId::new("T3")).await.unwrap();

    let seen = &backend.requests()[0];
    assert_eq!(seen.method, "PUT");
    assert_eq!(seen.path, "v2/errands/take");
}
