#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::doc_markdown,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::future_not_send
)]

//! Integration tests for list synchronization.
//!
//! Timer-driven tests run on a paused tokio clock against the scripted API
//! client; the end-to-end test goes over real HTTP to an in-process backend.
//! Covers:
//! - single-flight fetches (concurrent refreshes, ticks during a fetch)
//! - halting after consecutive failures while keeping the last good list
//! - page clamping and fuzzy category filtering over a synced list
//! - optimistic reconciliation after an action, then convergence on poll

mod fake_backend;

use std::sync::Arc;
use std::time::Duration;

use dailydone::actions::ActionCoordinator;
use dailydone::http::client::HttpClient;
use dailydone::http::scripted::ScriptedApi;
use dailydone::http::{HttpError, ParsedBody, StaticToken};
use dailydone::sync::{
    FilterScope, ListSource, PollHealth, Reconcile, SortKey, SyncConfig, SyncError, SyncSession,
    TaskSynchronizer,
};
use dailydone_proto::task::{TaskId, TaskStatus};
use fake_backend::{FakeBackend, Reply};
use serde_json::{Value, json};

const AVAILABLE: &str = "errands/available";

fn config(interval: Duration) -> SyncConfig {
    SyncConfig {
        poll_interval: interval,
        failure_threshold: 5,
    }
}

fn errand(id: &str, status: &str, category: &str) -> Value {
    json!({
        "_id": id,
        "description": format!("errand {id}"),
        "status": status,
        "category": { "name": category },
        "price": 10,
    })
}

fn network_error() -> HttpError {
    HttpError::Network("connection reset".to_string())
}

// =============================================================================
// Single-flight
// =============================================================================

#[tokio::test(start_paused = true)]
async fn concurrent_refreshes_share_one_request() {
    let api = Arc::new(ScriptedApi::new().with_delay(Duration::from_secs(1)));
    api.set_fallback(AVAILABLE, Ok(ParsedBody::Json(json!([errand("T1", "pending", "Grocery")]))));
    let session = SyncSession::start(
        "available",
        api.clone(),
        ListSource::new(AVAILABLE),
        config(Duration::from_secs(60)),
    );

    let (first, second) = tokio::join!(session.refresh(), session.refresh());

    assert_eq!(first, Ok(1));
    assert_eq!(second, Ok(1));
    assert_eq!(api.call_count(AVAILABLE), 1);
}

#[tokio::test(start_paused = true)]
async fn ticks_during_a_fetch_are_skipped() {
    let api = Arc::new(ScriptedApi::new().with_delay(Duration::from_millis(3_500)));
    api.set_fallback(AVAILABLE, Ok(ParsedBody::Json(json!([]))));
    let _session = SyncSession::start(
        "available",
        api.clone(),
        ListSource::new(AVAILABLE),
        config(Duration::from_secs(1)),
    );

    // Ticks at 1s, 2s and 3s land while the first fetch is still out.
    tokio::time::sleep(Duration::from_millis(3_900)).await;
    assert_eq!(api.call_count(AVAILABLE), 1);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(api.call_count(AVAILABLE), 2);
}

// =============================================================================
// Failure threshold
// =============================================================================

#[tokio::test(start_paused = true)]
async fn polling_halts_after_five_failures_and_keeps_list() {
    let api = Arc::new(ScriptedApi::new());
    api.push_json(
        AVAILABLE,
        json!([errand("T1", "pending", "Grocery"), errand("T2", "pending", "Laundry")]),
    );
    api.set_fallback(AVAILABLE, Err(network_error()));
    let session = SyncSession::start(
        "available",
        api.clone(),
        ListSource::new(AVAILABLE),
        config(Duration::from_secs(1)),
    );

    tokio::time::sleep(Duration::from_secs(30)).await;

    // One success, then exactly five failures; the sixth tick never fires.
    assert_eq!(api.call_count(AVAILABLE), 6);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.health, PollHealth::Halted);
    assert_eq!(snapshot.consecutive_failures, 5);
    assert_eq!(snapshot.task_count, 2);
    assert_eq!(snapshot.last_error, Some(network_error()));
    assert_eq!(session.visible_page(&FilterScope::new()).total_matches, 2);
}

#[tokio::test(start_paused = true)]
async fn manual_refresh_while_halted_does_not_rearm() {
    let api = Arc::new(ScriptedApi::new());
    api.set_fallback(AVAILABLE, Err(network_error()));
    let session = SyncSession::start(
        "available",
        api.clone(),
        ListSource::new(AVAILABLE),
        config(Duration::from_secs(1)),
    );
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.call_count(AVAILABLE), 5);

    api.set_fallback(AVAILABLE, Ok(ParsedBody::Json(json!([errand("T1", "pending", "x")]))));
    assert_eq!(session.refresh().await, Ok(1));
    assert_eq!(session.snapshot().consecutive_failures, 0);

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(api.call_count(AVAILABLE), 6);
    assert_eq!(session.snapshot().health, PollHealth::Halted);
}

#[tokio::test(start_paused = true)]
async fn resume_rearms_polling() {
    let api = Arc::new(ScriptedApi::new());
    api.set_fallback(AVAILABLE, Err(network_error()));
    let session = SyncSession::start(
        "available",
        api.clone(),
        ListSource::new(AVAILABLE),
        config(Duration::from_secs(1)),
    );
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(session.snapshot().health, PollHealth::Halted);

    api.set_fallback(AVAILABLE, Ok(ParsedBody::Json(json!([]))));
    session.resume();
    tokio::time::sleep(Duration::from_millis(3_500)).await;

    // Immediate fetch on resume plus ticks at 1s, 2s and 3s.
    assert_eq!(api.call_count(AVAILABLE), 5 + 4);
    let snapshot = session.snapshot();
    assert_eq!(snapshot.health, PollHealth::Polling);
    assert_eq!(snapshot.consecutive_failures, 0);
    assert!(snapshot.last_error.is_none());
}

// =============================================================================
// Visible page derivation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn page_past_the_end_shows_last_page() {
    let api = Arc::new(ScriptedApi::new());
    let records: Vec<Value> = (1..=7)
        .map(|i| errand(&format!("T{i}"), "pending", "Grocery"))
        .collect();
    api.push_json(AVAILABLE, Value::Array(records));
    let session = SyncSession::start(
        "available",
        api,
        ListSource::new(AVAILABLE),
        config(Duration::from_secs(60)),
    );
    session.refresh().await.unwrap();

    let scope = FilterScope::new()
        .with_page_size(3)
        .with_sort(SortKey::AsReceived);
    let last = session.visible_page(&scope.clone().with_page(3));
    let beyond = session.visible_page(&scope.with_page(10));

    assert_eq!(beyond.items, last.items);
    assert_eq!(beyond.page, 3);
    assert!(beyond.page_corrected);
    assert_eq!(beyond.items.len(), 1);
    assert_eq!(beyond.items[0].id, TaskId::new("T7"));
}

#[tokio::test(start_paused = true)]
async fn category_filter_is_tolerant() {
    let api = Arc::new(ScriptedApi::new());
    api.push_json(
        AVAILABLE,
        json!([
            errand("T1", "pending", "Pet Care"),
            errand("T2", "pending", "Grocery"),
            errand("T3", "pending", "PETCARE")
        ]),
    );
    let session = SyncSession::start(
        "available",
        api,
        ListSource::new(AVAILABLE),
        config(Duration::from_secs(60)),
    );
    session.refresh().await.unwrap();

    let scope = FilterScope::new()
        .with_category("pet-care")
        .with_sort(SortKey::AsReceived);
    let ids: Vec<String> = session
        .visible_page(&scope)
        .items
        .iter()
        .map(|t| t.id.to_string())
        .collect();
    assert_eq!(ids, ["T1", "T3"]);

    let grocery = session.visible_page(&FilterScope::new().with_category("Grocery"));
    assert_eq!(grocery.total_matches, 1);
}

// =============================================================================
// Reconciliation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn accept_reconciles_before_next_poll_and_converges() {
    let api = Arc::new(ScriptedApi::new());
    api.push_json(AVAILABLE, json!([errand("T1", "pending", "Grocery")]));
    api.set_fallback(AVAILABLE, Ok(ParsedBody::Json(json!([errand("T1", "accepted", "Grocery")]))));
    api.set_fallback("errands/accept", Ok(ParsedBody::Empty));
    let session = SyncSession::start(
        "available",
        api.clone(),
        ListSource::new(AVAILABLE),
        config(Duration::from_secs(60)),
    );
    session.refresh().await.unwrap();
    let coordinator = ActionCoordinator::new(api.clone());

    let outcome = coordinator.accept(&TaskId::new("T1")).await.unwrap();
    assert!(session.reconcile(&outcome.reconcile));

    let accepted = FilterScope::new().with_status(TaskStatus::Accepted);
    let page = session.visible_page(&accepted);
    assert_eq!(page.total_matches, 1);
    assert_eq!(api.call_count(AVAILABLE), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(api.call_count(AVAILABLE), 2);
    assert_eq!(session.visible_page(&accepted).total_matches, 1);
}

#[tokio::test(start_paused = true)]
async fn cancel_reconcile_clears_assignment() {
    let api = Arc::new(ScriptedApi::new());
    api.push_json(
        AVAILABLE,
        json!([{ "_id": "T1", "status": "accepted", "helperId": "H1" }]),
    );
    let session = SyncSession::start(
        "helper",
        api,
        ListSource::new(AVAILABLE),
        config(Duration::from_secs(60)),
    );
    session.refresh().await.unwrap();
    let id = TaskId::new("T1");
    assert_eq!(session.task(&id).unwrap().assignee_id(), Some("H1"));

    assert!(session.reconcile(&Reconcile::SetStatus(id.clone(), TaskStatus::Completed)));
    assert_eq!(session.task(&id).unwrap().assignee_id(), Some("H1"));

    assert!(session.reconcile(&Reconcile::SetStatus(id.clone(), TaskStatus::Cancelled)));
    assert_eq!(session.task(&id).unwrap().assignee_id(), None);

    assert!(session.reconcile(&Reconcile::Remove(id.clone())));
    assert!(session.task(&id).is_none());
}

// =============================================================================
// Lifecycle
// =============================================================================

#[tokio::test(start_paused = true)]
async fn dropping_last_handle_stops_polling() {
    let api = Arc::new(ScriptedApi::new());
    api.set_fallback(AVAILABLE, Ok(ParsedBody::Json(json!([]))));
    let session = SyncSession::start(
        "available",
        api.clone(),
        ListSource::new(AVAILABLE),
        config(Duration::from_secs(1)),
    );
    session.refresh().await.unwrap();
    drop(session);

    let calls = api.call_count(AVAILABLE);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(api.call_count(AVAILABLE), calls);
}

#[tokio::test(start_paused = true)]
async fn registry_stop_all_ends_every_scope() {
    let api = Arc::new(ScriptedApi::new());
    api.set_fallback(AVAILABLE, Ok(ParsedBody::Json(json!([]))));
    api.set_fallback("errands/helper", Ok(ParsedBody::Json(json!([]))));
    let sync = TaskSynchronizer::new(api.clone());
    let a = sync.start("available", ListSource::new(AVAILABLE), config(Duration::from_secs(1)));
    let h = sync.start(
        "helper",
        ListSource::new("errands/helper"),
        config(Duration::from_secs(1)),
    );
    let session = sync.session(&a).unwrap();
    tokio::time::sleep(Duration::from_millis(2_500)).await;

    sync.stop_all();
    let calls = api.calls().len();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(api.calls().len(), calls);
    assert_eq!(session.snapshot().health, PollHealth::Stopped);
    assert_eq!(session.refresh().await, Err(SyncError::Cancelled));
    assert_eq!(sync.refresh(&h).await, Err(SyncError::UnknownScope(h)));
}

// =============================================================================
// End to end over HTTP
// =============================================================================

#[tokio::test]
async fn available_errand_with_string_price_end_to_end() {
    let backend = FakeBackend::start().await;
    backend.reply(
        AVAILABLE,
        Reply::json(&json!({ "data": [{
            "_id": "T1",
            "description": "Pick up dry cleaning",
            "status": "available",
            "price": "250",
            "category": "Laundry",
            "poster": { "_id": "P1", "firstName": "Ama", "lastName": "Owusu" }
        }] })),
    );
    backend.reply("errands/accept", Reply::empty());

    let api = Arc::new(
        HttpClient::new(&backend.base_url, Arc::new(StaticToken::new("tok"))).unwrap(),
    );
    let session = SyncSession::start(
        "available",
        api.clone(),
        ListSource::new(AVAILABLE),
        config(Duration::from_secs(60)),
    );
    assert_eq!(session.refresh().await, Ok(1));

    let page = session.visible_page(&FilterScope::new());
    let task = &page.items[0];
    assert_eq!(task.id, TaskId::new("T1"));
    assert_eq!(task.status, TaskStatus::Pending);
    assert!((task.price - 250.0).abs() < f64::EPSILON);
    assert_eq!(task.poster.name.as_deref(), Some("Ama Owusu"));
    assert_eq!(
        session
            .visible_page(&FilterScope::new().with_status(TaskStatus::Pending))
            .total_matches,
        1
    );

    let coordinator = ActionCoordinator::new(api);
    let outcome = coordinator.accept(&task.id).await.unwrap();
    session.reconcile(&outcome.reconcile);

    let accept = backend
        .requests()
        .into_iter()
        .find(|r| r.path == "errands/accept")
        .unwrap();
    assert_eq!(accept.method, "POST");
    assert_eq!(accept.query.get("errandId").map(String::as_str), Some("T1"));
    assert_eq!(accept.authorization.as_deref(), Some("Bearer tok"));
    assert_eq!(
        session.task(&TaskId::new("T1")).unwrap().status,
        TaskStatus::Accepted
    );
    session.stop();
}
