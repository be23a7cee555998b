// SPDX-License-Identifier: MIT

//! Strava API client.
//!
//! Thin typed wrapper over the provider HTTP API:
//! - Token exchange and refresh
//! - Activity listing (paginated, bounded by an `after` instant)
//! - Single activity fetch (webhook path)
//!
//! Failure classes are kept distinct so callers can react correctly:
//! 429 surfaces as `RateLimited` (defer, do not mark the account broken),
//! 401 as `ProviderAuth` (refresh or reconnect), transport errors as
//! `Transient` (bounded retry here, handled by `retry::retry_transient`).

use serde::Deserialize;

use crate::error::AppError;
use crate::retry::{retry_transient, RetryConfig};

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    base_url: String,
    token_url: String,
    client_id: String,
    client_secret: String,
    retry: RetryConfig,
}

impl StravaClient {
    /// Create a new client with OAuth credentials. Every outbound request
    /// carries the given timeout; a timed-out call is a transient failure
    /// for that one item or account, never a fatal error.
    pub fn new(
        client_id: String,
        client_secret: String,
        timeout: std::time::Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: "https://www.strava.com/api/v3".to_string(),
            token_url: "https://www.strava.com/oauth/token".to_string(),
            client_id,
            client_secret,
            retry: RetryConfig::default(),
        }
    }

    /// Point the client at a different API host (tests, staging).
    pub fn with_urls(mut self, base_url: String, token_url: String) -> Self {
        self.base_url = base_url;
        self.token_url = token_url;
        self
    }

    /// Exchange an authorization code for tokens (initial connection).
    pub async fn exchange_code(&self, code: &str) -> Result<TokenExchangeResponse, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(classify_transport)?;

        check_response_json(response).await
    }

    /// Refresh an expired access token. The returned refresh token
    /// replaces the old one (Strava rotates refresh tokens).
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(classify_transport)?;

        check_response_json(response).await
    }

    /// List activities with start time >= `after` (unix seconds).
    ///
    /// Items are returned raw so one malformed element cannot poison the
    /// whole batch; the orchestrator decodes them one by one.
    pub async fn list_activities(
        &self,
        access_token: &str,
        after: i64,
        page: u32,
        per_page: u32,
    ) -> Result<Vec<serde_json::Value>, AppError> {
        let url = format!("{}/athlete/activities", self.base_url);

        retry_transient(&self.retry, || async {
            let response = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .query(&[
                    ("after", after.to_string()),
                    ("page", page.to_string()),
                    ("per_page", per_page.to_string()),
                ])
                .send()
                .await
                .map_err(classify_transport)?;

            check_response_json(response).await
        })
        .await
    }

    /// Get a detailed activity by ID (webhook ingestion path).
    pub async fn get_activity(
        &self,
        access_token: &str,
        activity_id: u64,
    ) -> Result<StravaActivity, AppError> {
        let url = format!("{}/activities/{}", self.base_url, activity_id);

        retry_transient(&self.retry, || async {
            let response = self
                .http
                .get(&url)
                .bearer_auth(access_token)
                .send()
                .await
                .map_err(classify_transport)?;

            check_response_json(response).await
        })
        .await
    }
}

/// Map reqwest transport errors onto the retryable `Transient` class.
fn classify_transport(e: reqwest::Error) -> AppError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        AppError::Transient(e.to_string())
    } else {
        AppError::StravaApi(e.to_string())
    }
}

/// Check response status and parse the JSON body.
async fn check_response_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
) -> Result<T, AppError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 429 {
            tracing::warn!("Strava rate limit hit (429)");
            return Err(AppError::RateLimited);
        }

        if status.as_u16() == 401 || body.contains("invalid_grant") {
            return Err(AppError::ProviderAuth(format!("HTTP {}: {}", status, body)));
        }

        return Err(AppError::StravaApi(format!("HTTP {}: {}", status, body)));
    }

    response
        .json()
        .await
        .map_err(|e| AppError::StravaApi(format!("JSON parse error: {}", e)))
}

/// Token refresh response from Strava.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
}

/// Token exchange response (includes athlete info).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenExchangeResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub athlete: StravaAthlete,
}

/// Athlete info from OAuth token exchange.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaAthlete {
    pub id: u64,
}

/// Activity as represented by the provider, prior to normalization.
///
/// Measurement fields are lenient (`Option`/default) so a sparse payload
/// still decodes; the mapper decides what is semantically acceptable.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivity {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    pub sport_type: String,
    pub start_date: Option<String>,
    #[serde(default)]
    pub moving_time: i64,
    #[serde(default)]
    pub distance: f64,
    pub total_elevation_gain: Option<f64>,
    pub average_heartrate: Option<f64>,
    pub max_heartrate: Option<f64>,
    pub calories: Option<f64>,
}
