// SPDX-License-Identifier: MIT

//! Application configuration loaded from environment variables.
//!
//! Loaded once at startup; the sweep parameters are part of the config so
//! tests can run the scheduler logic with short, synchronous policies.

use std::env;
use std::time::Duration;

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Strava OAuth client ID (public)
    pub strava_client_id: String,
    /// Strava OAuth client secret
    pub strava_client_secret: String,
    /// Webhook subscription verification token
    pub webhook_verify_token: String,
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Key used to HMAC-sign the OAuth state parameter
    pub oauth_state_key: Vec<u8>,
    /// Frontend URL for OAuth redirects
    pub frontend_url: String,
    /// GCP project ID (Firestore)
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,

    // --- Sync engine tuning ---
    /// Interval between scheduler sweeps
    pub sweep_interval: Duration,
    /// Lookback window for scheduled incremental syncs
    pub sweep_lookback: Duration,
    /// Lookback window for manual/user-triggered syncs
    pub manual_lookback: Duration,
    /// Timeout for every outbound provider request
    pub http_timeout: Duration,
    /// Page size for provider list-activities calls
    pub list_page_size: u32,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            strava_client_id: env::var("STRAVA_CLIENT_ID")
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_ID"))?,
            strava_client_secret: env::var("STRAVA_CLIENT_SECRET")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("STRAVA_CLIENT_SECRET"))?,
            webhook_verify_token: env::var("WEBHOOK_VERIFY_TOKEN")
                .map(|v| v.trim().to_string())
                .map_err(|_| ConfigError::Missing("WEBHOOK_VERIFY_TOKEN"))?,
            jwt_signing_key: env::var("JWT_SIGNING_KEY")
                .map_err(|_| ConfigError::Missing("JWT_SIGNING_KEY"))?
                .into_bytes(),
            oauth_state_key: env::var("OAUTH_STATE_KEY")
                .map_err(|_| ConfigError::Missing("OAUTH_STATE_KEY"))?
                .into_bytes(),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .unwrap_or(8080),

            sweep_interval: Duration::from_secs(env_u64("SWEEP_INTERVAL_SECS", 30 * 60)),
            sweep_lookback: Duration::from_secs(env_u64("SWEEP_LOOKBACK_SECS", 2 * 60 * 60)),
            manual_lookback: Duration::from_secs(env_u64(
                "MANUAL_LOOKBACK_SECS",
                30 * 24 * 60 * 60,
            )),
            http_timeout: Duration::from_secs(env_u64("HTTP_TIMEOUT_SECS", 20)),
            list_page_size: env::var("LIST_PAGE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(100),
        })
    }

    /// Default config for testing only.
    pub fn test_default() -> Self {
        Self {
            strava_client_id: "test_client_id".to_string(),
            strava_client_secret: "test_secret".to_string(),
            webhook_verify_token: "test_verify_token".to_string(),
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            oauth_state_key: b"test_state_key_32_bytes_minimum".to_vec(),
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            sweep_interval: Duration::from_secs(30 * 60),
            sweep_lookback: Duration::from_secs(2 * 60 * 60),
            manual_lookback: Duration::from_secs(30 * 24 * 60 * 60),
            http_timeout: Duration::from_secs(5),
            list_page_size: 100,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_from_env() {
        env::set_var("STRAVA_CLIENT_ID", "test_id");
        env::set_var("STRAVA_CLIENT_SECRET", "test_secret");
        env::set_var("WEBHOOK_VERIFY_TOKEN", "test_verify");
        env::set_var("JWT_SIGNING_KEY", "test_jwt_key_32_bytes_minimum!!");
        env::set_var("OAUTH_STATE_KEY", "test_state_key_32_bytes_minimum");

        let config = Config::from_env().expect("Config should load");

        assert_eq!(config.strava_client_id, "test_id");
        assert_eq!(config.strava_client_secret, "test_secret");
        assert_eq!(config.port, 8080);
        assert_eq!(config.sweep_interval, Duration::from_secs(1800));
        assert_eq!(config.sweep_lookback, Duration::from_secs(7200));
    }

    #[test]
    fn test_default_lookbacks() {
        let config = Config::test_default();
        // Scheduled sweeps look back much less than manual syncs.
        assert!(config.sweep_lookback < config.manual_lookback);
    }
}
