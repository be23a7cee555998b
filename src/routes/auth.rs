// SPDX-License-Identifier: MIT

//! Provider OAuth connection routes.
//!
//! `/auth/strava` starts the redirect flow for the signed-in user; the
//! callback exchanges the code and stores the connection. The `state`
//! parameter is HMAC-signed and carries the initiating user id, so a
//! callback can only bind a provider grant to the session that started
//! the flow.

use axum::{
    extract::{Extension, Query, State},
    response::Redirect,
    routing::get,
    Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{AppError, Result};
use crate::middleware::auth::{create_jwt, AuthUser, SESSION_COOKIE};
use crate::AppState;

type HmacSha256 = Hmac<Sha256>;

/// How long a signed state parameter stays acceptable.
const STATE_MAX_AGE_SECS: u64 = 10 * 60;

/// Public auth routes (the provider redirects here outside any session).
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/strava/callback", get(auth_callback))
        .route("/auth/logout", get(logout))
}

/// Session-protected routes (starting a connection requires knowing who
/// is connecting).
pub fn connect_routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/strava", get(auth_start))
}

/// Build the signed state payload: `user_id|ts_hex|sig_hex`.
fn sign_state(user_id: &str, key: &[u8]) -> Result<String> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("System time error: {}", e)))?
        .as_secs();

    let payload = format!("{}|{:x}", user_id, timestamp);
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("HMAC init failed: {}", e)))?;
    mac.update(payload.as_bytes());
    let signature = mac.finalize().into_bytes();

    Ok(format!("{}|{}", payload, hex::encode(signature)))
}

/// Verify a state parameter and recover the user id, or None if the
/// signature is bad or the state is stale.
fn verify_state(state: &str, key: &[u8]) -> Option<String> {
    let mut parts = state.rsplitn(2, '|');
    let sig_hex = parts.next()?;
    let payload = parts.next()?;

    let mut mac = HmacSha256::new_from_slice(key).ok()?;
    mac.update(payload.as_bytes());
    mac.verify_slice(&hex::decode(sig_hex).ok()?).ok()?;

    let mut fields = payload.rsplitn(2, '|');
    let ts_hex = fields.next()?;
    let user_id = fields.next()?;

    let issued = u64::from_str_radix(ts_hex, 16).ok()?;
    let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?.as_secs();
    if now.saturating_sub(issued) > STATE_MAX_AGE_SECS {
        return None;
    }

    Some(user_id.to_string())
}

/// Start the OAuth flow - redirect to provider authorization.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    headers: axum::http::HeaderMap,
) -> Result<Redirect> {
    let oauth_state = sign_state(&user.user_id, &state.config.oauth_state_key)?;

    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost:8080");
    let scheme = if host.contains("localhost") || host.contains("127.0.0.1") {
        "http"
    } else {
        "https"
    };
    let callback_url = format!("{}://{}/auth/strava/callback", scheme, host);

    let auth_url = format!(
        "https://www.strava.com/oauth/authorize?\
         client_id={}&\
         redirect_uri={}&\
         response_type=code&\
         scope=activity:read_all&\
         state={}",
        state.config.strava_client_id,
        urlencoding::encode(&callback_url),
        urlencoding::encode(&oauth_state),
    );

    tracing::info!(
        user_id = %user.user_id,
        "Starting provider OAuth flow"
    );

    Ok(Redirect::temporary(&auth_url))
}

#[derive(Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    state: String,
    #[serde(default)]
    error: Option<String>,
}

/// OAuth callback - exchange code for tokens, store the connection.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Query(params): Query<CallbackParams>,
) -> Result<(CookieJar, Redirect)> {
    let frontend_url = &state.config.frontend_url;

    if let Some(error) = params.error {
        tracing::warn!(error = %error, "OAuth error from provider");
        let redirect = format!("{}?error={}", frontend_url, urlencoding::encode(&error));
        return Ok((jar, Redirect::temporary(&redirect)));
    }

    let user_id = verify_state(&params.state, &state.config.oauth_state_key)
        .ok_or_else(|| AppError::BadRequest("Invalid or expired state parameter".to_string()))?;

    let code = params
        .code
        .ok_or_else(|| AppError::BadRequest("Missing authorization code".to_string()))?;

    let conn = state.tokens.connect_user(&user_id, &code).await?;

    tracing::info!(
        user_id = %user_id,
        athlete_id = conn.athlete_id,
        "OAuth connection complete"
    );

    let token = create_jwt(&user_id, &state.config.jwt_signing_key)?;
    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::days(30))
        .build();

    let redirect = format!("{}?connected=strava", frontend_url);
    Ok((jar.add(cookie), Redirect::temporary(&redirect)))
}

/// Clear the session cookie.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, Redirect) {
    let jar = jar.remove(Cookie::build((SESSION_COOKIE, "")).path("/").build());
    (jar, Redirect::temporary(&state.config.frontend_url))
}
