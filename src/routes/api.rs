// SPDX-License-Identifier: MIT

//! API routes for authenticated users.
//!
//! The manual sync trigger returns the full `SyncOutcome` so a caller can
//! show "synced N, skipped M, failed on these items" rather than a bare
//! success flag. The activities listing is the read surface every other
//! feature consumes; nothing outside this subsystem writes records with a
//! provider-originated external id.

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::models::{ActivityRecord, SyncOutcome};
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MAX_ACTIVITY_LIMIT: u32 = 200;

/// API routes (require authentication; the middleware is applied in
/// routes/mod.rs).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/sync", post(trigger_sync))
        .route("/api/activities", get(get_activities))
        .route("/api/connection", get(get_connection))
}

/// Manual sync trigger: pull the default (long) lookback window.
async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SyncOutcome>> {
    tracing::info!(user_id = %user.user_id, "Manual sync requested");

    let outcome = state
        .sync
        .sync(&user.user_id, state.config.manual_lookback, "manual")
        .await?;

    Ok(Json(outcome))
}

#[derive(Deserialize)]
struct ActivitiesQuery {
    #[serde(default = "default_limit")]
    limit: u32,
}

fn default_limit() -> u32 {
    50
}

#[derive(Serialize)]
struct ActivitiesResponse {
    activities: Vec<ActivityRecord>,
}

/// List the user's synced activities, newest first.
async fn get_activities(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ActivitiesQuery>,
) -> Result<Json<ActivitiesResponse>> {
    let limit = params.limit.min(MAX_ACTIVITY_LIMIT);
    let activities = state
        .db
        .get_activities_for_user(&user.user_id, limit)
        .await?;

    Ok(Json(ActivitiesResponse { activities }))
}

#[derive(Serialize)]
struct ConnectionStatus {
    connected: bool,
    athlete_id: Option<u64>,
    reconnect_required: bool,
}

/// Report the user's provider connection state (drives the "reconnect
/// required" prompt in the frontend).
async fn get_connection(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ConnectionStatus>> {
    let status = match state.db.get_connection(&user.user_id).await? {
        Some(conn) => ConnectionStatus {
            connected: true,
            athlete_id: Some(conn.athlete_id),
            reconnect_required: conn.reconnect_required,
        },
        None => ConnectionStatus {
            connected: false,
            athlete_id: None,
            reconnect_required: false,
        },
    };

    Ok(Json(status))
}
