// SPDX-License-Identifier: MIT

//! Webhook routes for provider push events.
//!
//! The provider calls these endpoints directly, outside any user session.
//! Delivered events carry no signature of their own, only the handshake
//! uses the shared verify token; events are therefore treated as hints,
//! and the activity is re-fetched with the owner's credential before
//! anything is stored.

use crate::services::sync::ItemOutcome;
use crate::AppState;
use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook", get(verify).post(handle_event))
}

/// Subscription verification query params.
#[derive(Deserialize)]
struct VerifyParams {
    #[serde(rename = "hub.mode")]
    mode: String,
    #[serde(rename = "hub.challenge")]
    challenge: String,
    #[serde(rename = "hub.verify_token")]
    verify_token: String,
}

/// Verification response.
#[derive(Serialize, Default)]
struct VerifyResponse {
    #[serde(rename = "hub.challenge")]
    challenge: String,
}

/// Subscription handshake (GET). Side-effect-free and idempotent: the
/// provider may call it repeatedly during subscription setup. Echoes the
/// challenge unchanged on a token match, 403 otherwise.
async fn verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> impl IntoResponse {
    if params.mode == "subscribe" && params.verify_token == state.config.webhook_verify_token {
        tracing::info!("Webhook subscription verified");
        (
            StatusCode::OK,
            Json(VerifyResponse {
                challenge: params.challenge,
            }),
        )
    } else {
        tracing::warn!(
            mode = %params.mode,
            "Webhook verification failed: invalid token"
        );
        (StatusCode::FORBIDDEN, Json(VerifyResponse::default()))
    }
}

/// Provider webhook event payload.
#[derive(Deserialize, Debug)]
struct WebhookEvent {
    object_type: String, // "activity" or "athlete"
    object_id: u64,
    aspect_type: String, // "create", "update", "delete"
    owner_id: u64,
    #[serde(default)]
    subscription_id: u64,
}

/// Handle incoming webhook events (POST).
///
/// Always returns 200 once the body is parsed, whatever happens
/// internally: a non-2xx answer would make the provider redeliver with
/// backoff and amplify a transient local problem into a retry storm.
/// Internal failures are logged, not surfaced.
async fn handle_event(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> (StatusCode, &'static str) {
    let event: WebhookEvent = match serde_json::from_value(payload) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!(error = %e, "Failed to parse webhook event");
            return (StatusCode::OK, "EVENT_RECEIVED");
        }
    };

    tracing::info!(
        object_type = %event.object_type,
        object_id = event.object_id,
        aspect_type = %event.aspect_type,
        owner_id = event.owner_id,
        subscription_id = event.subscription_id,
        "Webhook event received"
    );

    // Only activity creation triggers work; every other combination is
    // acknowledged and dropped.
    if event.object_type != "activity" || event.aspect_type != "create" {
        tracing::debug!(
            object_type = %event.object_type,
            aspect_type = %event.aspect_type,
            "Ignoring unhandled event type"
        );
        return (StatusCode::OK, "EVENT_RECEIVED");
    }

    match state
        .sync
        .process_webhook_activity(event.owner_id, event.object_id)
        .await
    {
        Ok(ItemOutcome::Created) => {
            tracing::info!(
                activity_id = event.object_id,
                owner_id = event.owner_id,
                "Webhook activity ingested"
            );
        }
        Ok(ItemOutcome::Duplicate) => {
            // The steady-state outcome when the pull sync saw it first.
            tracing::debug!(activity_id = event.object_id, "Webhook activity already stored");
        }
        Ok(ItemOutcome::Unsupported) => {
            tracing::debug!(activity_id = event.object_id, "Webhook activity type unsupported");
        }
        Ok(ItemOutcome::Failed(msg)) => {
            tracing::error!(
                activity_id = event.object_id,
                error = %msg,
                "Webhook activity ingest failed"
            );
        }
        Err(e) => {
            // Unresolvable owner, refresh failure, provider errors: the
            // event is dropped, never bounced back to the provider.
            tracing::warn!(
                activity_id = event.object_id,
                owner_id = event.owner_id,
                error = %e,
                "Webhook event dropped"
            );
        }
    }

    (StatusCode::OK, "EVENT_RECEIVED")
}
