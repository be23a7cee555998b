// SPDX-License-Identifier: MIT

//! Integration tests for webhook handling: the subscription handshake and
//! event delivery, including convergence with the pull-sync path.

mod common;

use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use common::{connect_user, create_test_app, run_payload, session_token, FakeStrava};
use serde_json::json;
use tower::ServiceExt;

const LOOKBACK: Duration = Duration::from_secs(30 * 24 * 60 * 60);

fn event_body(object_type: &str, aspect_type: &str, object_id: u64, owner_id: u64) -> Body {
    let event = json!({
        "object_type": object_type,
        "object_id": object_id,
        "aspect_type": aspect_type,
        "owner_id": owner_id,
        "subscription_id": 12345,
        "event_time": 1_700_000_000,
    });
    Body::from(serde_json::to_string(&event).unwrap())
}

fn post_event(body: Body) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .body(body)
        .unwrap()
}

#[tokio::test]
async fn test_handshake_echoes_challenge_exactly() {
    let (app, _) = create_test_app(FakeStrava::with_valid_token("valid-token")).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/webhook?hub.mode=subscribe&hub.challenge=abc123&hub.verify_token=test_verify_token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["hub.challenge"], "abc123");
}

#[tokio::test]
async fn test_handshake_rejects_wrong_token() {
    let (app, _) = create_test_app(FakeStrava::with_valid_token("valid-token")).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/webhook?hub.mode=subscribe&hub.challenge=abc123&hub.verify_token=wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_handshake_rejects_wrong_mode() {
    let (app, _) = create_test_app(FakeStrava::with_valid_token("valid-token")).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/webhook?hub.mode=unsubscribe&hub.challenge=abc123&hub.verify_token=test_verify_token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_activity_create_event_ingests_activity() {
    let fake = FakeStrava::with_valid_token("valid-token");
    fake.push_activity(run_payload(7001));
    let (app, state) = create_test_app(fake).await;

    connect_user(&state.db, "user-a", 42, "valid-token").await;

    let response = app
        .oneshot(post_event(event_body("activity", "create", 7001, 42)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = state.db.get_activities_for_user("user-a", 50).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].external_id, "7001");
    assert_eq!(stored[0].source, "webhook");
}

#[tokio::test]
async fn test_webhook_then_sync_converges_on_one_record() {
    let fake = FakeStrava::with_valid_token("valid-token");
    fake.push_activity(run_payload(7101));
    let (app, state) = create_test_app(fake).await;

    connect_user(&state.db, "user-a", 42, "valid-token").await;

    // Webhook first.
    let response = app
        .oneshot(post_event(event_body("activity", "create", 7101, 42)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Then a pull sync observes the same activity.
    let outcome = state.sync.sync("user-a", LOOKBACK, "manual").await.unwrap();
    assert_eq!(outcome.created, 0);
    assert_eq!(outcome.skipped_duplicate, 1);

    let stored = state.db.get_activities_for_user("user-a", 50).await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn test_sync_then_webhook_converges_on_one_record() {
    let fake = FakeStrava::with_valid_token("valid-token");
    fake.push_activity(run_payload(7201));
    let (app, state) = create_test_app(fake).await;

    connect_user(&state.db, "user-a", 42, "valid-token").await;

    let outcome = state.sync.sync("user-a", LOOKBACK, "manual").await.unwrap();
    assert_eq!(outcome.created, 1);

    // Redelivery of the equivalent webhook event is a silent no-op.
    let response = app
        .oneshot(post_event(event_body("activity", "create", 7201, 42)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = state.db.get_activities_for_user("user-a", 50).await.unwrap();
    assert_eq!(stored.len(), 1);
}

#[tokio::test]
async fn test_unknown_owner_still_acknowledged() {
    let (app, state) = create_test_app(FakeStrava::with_valid_token("valid-token")).await;

    let response = app
        .oneshot(post_event(event_body("activity", "create", 7301, 999_999)))
        .await
        .unwrap();

    // The event is for an account not connected through this engine:
    // acknowledged and dropped, never bounced back to the provider.
    assert_eq!(response.status(), StatusCode::OK);
    let stored = state.db.get_activities_for_user("user-a", 50).await.unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
async fn test_non_activity_events_acknowledged_and_dropped() {
    let fake = FakeStrava::with_valid_token("valid-token");
    fake.push_activity(run_payload(7401));
    let (app, state) = create_test_app(fake).await;

    connect_user(&state.db, "user-a", 42, "valid-token").await;

    for (object_type, aspect_type) in [
        ("athlete", "update"),
        ("activity", "update"),
        ("activity", "delete"),
    ] {
        let response = app
            .clone()
            .oneshot(post_event(event_body(object_type, aspect_type, 7401, 42)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let stored = state.db.get_activities_for_user("user-a", 50).await.unwrap();
    assert!(stored.is_empty());
}

#[tokio::test]
async fn test_unrecognized_event_shape_still_acknowledged() {
    let (app, _) = create_test_app(FakeStrava::with_valid_token("valid-token")).await;

    let response = app
        .oneshot(post_event(Body::from(r#"{"surprise": true}"#)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_manual_sync_requires_session() {
    let (app, _) = create_test_app(FakeStrava::with_valid_token("valid-token")).await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/sync")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_manual_sync_returns_outcome_json() {
    let fake = FakeStrava::with_valid_token("valid-token");
    fake.push_activity(run_payload(7501));
    let mut yoga = run_payload(7502);
    yoga["sport_type"] = json!("Yoga");
    fake.push_activity(yoga);
    let (app, state) = create_test_app(fake).await;

    connect_user(&state.db, "user-a", 42, "valid-token").await;
    let token = session_token(&state.config, "user-a");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/sync")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["created"], 1);
    assert_eq!(json["skipped_unsupported_type"], 1);
    assert_eq!(json["per_item_errors"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_manual_sync_without_connection_is_404() {
    let (app, state) = create_test_app(FakeStrava::with_valid_token("valid-token")).await;
    let token = session_token(&state.config, "user-z");

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/sync")
                .header("authorization", format!("Bearer {}", token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
