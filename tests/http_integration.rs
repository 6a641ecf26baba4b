//! HTTP surface integration tests
//!
//! Requests go through the full router with `tower::ServiceExt::oneshot`,
//! so middleware and error mapping are exercised as in production.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use pollcast::config::Settings;
use pollcast::connection_manager::{Channel, ChannelHub};
use pollcast::server::{create_app, AppState};
use pollcast::store::{MemoryEventStore, PollOption, PollRecord};

const API_KEY: &str = "test-key";

fn setup() -> (Router, AppState, PollRecord) {
    let store = Arc::new(MemoryEventStore::new());
    let poll = PollRecord {
        id: Uuid::new_v4(),
        title: "Lunch?".to_string(),
        created_at: Utc::now() - Duration::minutes(10),
        expires_at: None,
        options: vec![
            PollOption {
                id: Uuid::new_v4(),
                label: "Pizza".to_string(),
            },
            PollOption {
                id: Uuid::new_v4(),
                label: "Sushi".to_string(),
            },
        ],
    };
    store.insert_poll(poll.clone());
    store
        .record_vote(poll.id, poll.options[0].id, Utc::now() - Duration::minutes(5))
        .unwrap();

    let mut settings = Settings::default();
    settings.api.key = Some(API_KEY.to_string());
    let state = AppState::new(settings, store);
    (create_app(state.clone()), state, poll)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn publish(poll_id: Uuid, key: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/polls/{}/events", poll_id))
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header("X-API-Key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn test_health_reports_store_backend() {
    let (app, _, _) = setup();
    let (status, body) = send(app, get("/health")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"]["backend"], "memory");
    assert_eq!(body["connections"]["total"], 0);
}

#[tokio::test]
async fn test_timeseries_returns_labelled_series() {
    let (app, _, poll) = setup();
    let uri = format!("/api/polls/{}/timeseries?points=10&metric=count", poll.id);
    let (status, body) = send(app, get(&uri)).await;

    assert_eq!(status, StatusCode::OK);
    let series = body["series"].as_array().unwrap();
    assert_eq!(series.len(), 2);
    assert_eq!(series[0]["label"], "Pizza");
    assert_eq!(series[0]["data"].as_array().unwrap().len(), 10);
    assert_eq!(series[0]["data"][9]["y"], 1.0);
    assert_eq!(
        body["meta"]["optionIdToLabel"][poll.options[1].id.to_string()],
        "Sushi"
    );
}

#[tokio::test]
async fn test_timeseries_rejects_bad_parameters() {
    let (app, _, poll) = setup();

    let cases = [
        format!("/api/polls/{}/timeseries?points=5", poll.id),
        format!("/api/polls/{}/timeseries?points=201", poll.id),
        format!("/api/polls/{}/timeseries?window=30", poll.id),
        format!("/api/polls/{}/timeseries?metric=ratio", poll.id),
        format!("/api/polls/{}/timeseries?from=not-a-date", poll.id),
        "/api/polls/not-a-uuid/timeseries".to_string(),
    ];

    for uri in cases {
        let (status, body) = send(app.clone(), get(&uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR", "{uri}");
    }
}

#[tokio::test]
async fn test_timeseries_unknown_poll_is_404() {
    let (app, _, _) = setup();
    let uri = format!("/api/polls/{}/timeseries", Uuid::new_v4());
    let (status, body) = send(app, get(&uri)).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_publish_requires_api_key() {
    let (app, _, poll) = setup();
    let event = json!({"type": "poll_deleted", "poll_id": poll.id});

    let (status, _) = send(app.clone(), publish(poll.id, None, &event)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(app, publish(poll.id, Some("wrong"), &event)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_publish_relays_to_poll_and_global_subscribers() {
    let (app, state, poll) = setup();
    let (poll_tx, mut poll_rx) = mpsc::channel(8);
    let (global_tx, mut global_rx) = mpsc::channel(8);
    state
        .registry
        .subscribe(Channel::poll(poll.id.to_string()), poll_tx)
        .unwrap();
    state.registry.subscribe(Channel::Global, global_tx).unwrap();

    let event = json!({"type": "bookmark_update", "poll_id": poll.id, "bookmark_count": 3});
    let (status, body) = send(app, publish(poll.id, Some(API_KEY), &event)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["event_type"], "bookmark_update");
    assert_eq!(body["delivered"], 2);

    for rx in [&mut poll_rx, &mut global_rx] {
        let msg = rx.try_recv().unwrap();
        let received: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(received["bookmark_count"], 3);
    }
}

#[tokio::test]
async fn test_publish_rejects_mismatched_poll_id() {
    let (app, _, poll) = setup();
    let event = json!({"type": "poll_deleted", "poll_id": Uuid::new_v4()});
    let (status, body) = send(app, publish(poll.id, Some(API_KEY), &event)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn test_channel_endpoints() {
    let (app, state, poll) = setup();
    let (tx, _rx) = mpsc::channel(8);
    state
        .registry
        .subscribe(Channel::poll(poll.id.to_string()), tx)
        .unwrap();

    let (status, body) = send(app.clone(), get("/api/v1/channels")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.to_string().contains(&poll.id.to_string()));

    let uri = format!("/api/v1/channels/{}", poll.id);
    let (status, body) = send(app.clone(), get(&uri)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["subscriber_count"], 1);

    let (status, _) = send(app, get("/api/v1/channels/nobody-here")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_non_numeric_query_is_json_validation_error() {
    let (app, _, poll) = setup();

    for query in ["points=abc", "window=-1"] {
        let uri = format!("/api/polls/{}/timeseries?{}", poll.id, query);
        let (status, body) = send(app.clone(), get(&uri)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{query}");
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR", "{query}");
    }
}

#[tokio::test]
async fn test_oversized_publish_body_is_rejected() {
    let (app, _, poll) = setup();
    let event = json!({
        "type": "poll_deleted",
        "poll_id": poll.id,
        "padding": "x".repeat(128 * 1024),
    });

    let (status, _) = send(app, publish(poll.id, Some(API_KEY), &event)).await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}
