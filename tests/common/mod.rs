// SPDX-License-Identifier: MIT

//! Shared test fixtures: an in-memory store, a fake Strava API served on
//! an ephemeral local port, and helpers to wire the engine against it.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Form, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use trainlink::config::Config;
use trainlink::db::Db;
use trainlink::models::Connection;
use trainlink::services::{StravaClient, SyncOrchestrator, TokenService};
use trainlink::AppState;

/// Mutable state backing the fake provider.
#[derive(Default)]
pub struct FakeStrava {
    /// Raw activity payloads served by list/get endpoints.
    pub activities: Mutex<Vec<serde_json::Value>>,
    /// Access tokens the fake accepts as valid bearers.
    pub valid_tokens: Mutex<HashSet<String>>,
    /// Number of refresh-grant calls observed.
    pub refresh_count: AtomicU32,
    /// Bearer tokens seen by the list endpoint, in order.
    pub list_tokens_seen: Mutex<Vec<String>>,
    /// When true, activity endpoints answer 429.
    pub rate_limited: std::sync::atomic::AtomicBool,
    /// Artificial latency for activity endpoints, for overlap tests.
    pub latency_ms: AtomicU64,
}

impl FakeStrava {
    pub fn with_valid_token(token: &str) -> Arc<Self> {
        let fake = Self::default();
        fake.valid_tokens.lock().unwrap().insert(token.to_string());
        Arc::new(fake)
    }

    pub fn push_activity(&self, activity: serde_json::Value) {
        self.activities.lock().unwrap().push(activity);
    }
}

#[derive(Deserialize)]
struct TokenForm {
    grant_type: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

async fn token_endpoint(
    State(fake): State<Arc<FakeStrava>>,
    Form(form): Form<TokenForm>,
) -> impl IntoResponse {
    let expires_at = chrono::Utc::now().timestamp() + 6 * 60 * 60;

    match form.grant_type.as_str() {
        "refresh_token" => {
            let n = fake.refresh_count.fetch_add(1, Ordering::SeqCst) + 1;
            if form.refresh_token.as_deref() == Some("bad-refresh") {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"message": "Bad Request", "errors": [{"code": "invalid_grant"}]})),
                );
            }
            let access = format!("refreshed-token-{}", n);
            fake.valid_tokens.lock().unwrap().insert(access.clone());
            (
                StatusCode::OK,
                Json(json!({
                    "access_token": access,
                    "refresh_token": format!("refreshed-refresh-{}", n),
                    "expires_at": expires_at,
                })),
            )
        }
        "authorization_code" => {
            if form.code.as_deref() == Some("bad-code") {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"message": "Bad Request", "errors": [{"code": "invalid"}]})),
                );
            }
            fake.valid_tokens
                .lock()
                .unwrap()
                .insert("exchanged-token".to_string());
            (
                StatusCode::OK,
                Json(json!({
                    "access_token": "exchanged-token",
                    "refresh_token": "exchanged-refresh",
                    "expires_at": expires_at,
                    "athlete": {"id": 77_001},
                })),
            )
        }
        other => (
            StatusCode::BAD_REQUEST,
            Json(json!({"message": format!("unknown grant type {}", other)})),
        ),
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.to_string())
}

async fn check_auth(fake: &FakeStrava, headers: &HeaderMap) -> Result<String, StatusCode> {
    let latency = fake.latency_ms.load(Ordering::SeqCst);
    if latency > 0 {
        tokio::time::sleep(std::time::Duration::from_millis(latency)).await;
    }
    if fake.rate_limited.load(Ordering::SeqCst) {
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }
    let token = bearer_token(headers).ok_or(StatusCode::UNAUTHORIZED)?;
    if fake.valid_tokens.lock().unwrap().contains(&token) {
        Ok(token)
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

#[derive(Deserialize)]
struct ListParams {
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    per_page: Option<u32>,
}

async fn list_activities(
    State(fake): State<Arc<FakeStrava>>,
    Query(params): Query<ListParams>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let token = check_auth(&fake, &headers).await?;
    fake.list_tokens_seen.lock().unwrap().push(token);
    let page = params.page.unwrap_or(1).max(1) as usize;
    let per_page = params.per_page.unwrap_or(30) as usize;
    let slice: Vec<serde_json::Value> = fake
        .activities
        .lock()
        .unwrap()
        .iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .cloned()
        .collect();
    Ok(Json(serde_json::Value::Array(slice)))
}

async fn get_activity(
    State(fake): State<Arc<FakeStrava>>,
    headers: HeaderMap,
    Path(id): Path<u64>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    check_auth(&fake, &headers).await?;
    let activities = fake.activities.lock().unwrap();
    activities
        .iter()
        .find(|a| a.get("id").and_then(|v| v.as_u64()) == Some(id))
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// Serve the fake provider on an ephemeral port; returns its base URL.
pub async fn spawn_fake_strava(fake: Arc<FakeStrava>) -> String {
    let router = Router::new()
        .route("/oauth/token", post(token_endpoint))
        .route("/api/v3/athlete/activities", get(list_activities))
        .route("/api/v3/activities/{id}", get(get_activity))
        .with_state(fake);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind fake provider listener");
    let addr = listener.local_addr().expect("listener has no local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("fake provider server failed");
    });

    format!("http://{}", addr)
}

/// Build the full engine (memory store + client pointed at the fake).
pub fn build_engine(base_url: &str, config: &Config) -> (Db, TokenService, SyncOrchestrator) {
    let db = Db::new_memory();
    let client = StravaClient::new(
        config.strava_client_id.clone(),
        config.strava_client_secret.clone(),
        config.http_timeout,
    )
    .with_urls(
        format!("{}/api/v3", base_url),
        format!("{}/oauth/token", base_url),
    );

    let refresh_locks = Arc::new(dashmap::DashMap::new());
    let tokens = TokenService::new(client.clone(), db.clone(), refresh_locks);
    let sync = SyncOrchestrator::new(client, tokens.clone(), db.clone(), config.list_page_size);

    (db, tokens, sync)
}

/// Build a test app wired against the fake provider.
pub async fn create_test_app(fake: Arc<FakeStrava>) -> (axum::Router, Arc<AppState>) {
    let config = Config::test_default();
    let base_url = spawn_fake_strava(fake).await;
    let (db, tokens, sync) = build_engine(&base_url, &config);

    let state = Arc::new(AppState {
        config,
        db,
        tokens,
        sync,
    });

    (trainlink::routes::create_router(state.clone()), state)
}

/// Insert a connection whose access token is valid long past the refresh
/// buffer.
pub async fn connect_user(db: &Db, user_id: &str, athlete_id: u64, access_token: &str) {
    let conn = Connection {
        user_id: user_id.to_string(),
        athlete_id,
        access_token: access_token.to_string(),
        refresh_token: "fresh-refresh".to_string(),
        expires_at: chrono::Utc::now().timestamp() + 6 * 60 * 60,
        reconnect_required: false,
        updated_at: chrono::Utc::now().to_rfc3339(),
    };
    db.upsert_connection(&conn).await.expect("store connection");
}

/// A well-formed provider activity payload.
pub fn run_payload(id: u64) -> serde_json::Value {
    json!({
        "id": id,
        "name": format!("Run {}", id),
        "sport_type": "Run",
        "start_date": "2026-08-30T06:15:00Z",
        "moving_time": 1800,
        "distance": 6000.0,
        "total_elevation_gain": 42.0,
        "average_heartrate": 151.0,
        "max_heartrate": 175.0,
    })
}

/// Mint a session JWT for requests to protected routes.
pub fn session_token(config: &Config, user_id: &str) -> String {
    trainlink::middleware::auth::create_jwt(user_id, &config.jwt_signing_key)
        .expect("mint session jwt")
}
