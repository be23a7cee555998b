// SPDX-License-Identifier: MIT

//! Token lifecycle management.
//!
//! Guarantees every provider call runs with a token that is valid for at
//! least the safety buffer. Refreshing only after expiry risks a token
//! that dies mid-request, so refresh happens proactively whenever less
//! than an hour of validity remains.

use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::db::Db;
use crate::error::AppError;
use crate::models::Connection;
use crate::services::strava::StravaClient;

/// Safety buffer before expiry at which a refresh is triggered (1 hour).
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 60 * 60;

/// Per-user mutexes to serialize refresh operations within this process.
pub type RefreshLocks = Arc<DashMap<String, Arc<Mutex<()>>>>;

/// Decide whether a token with the given expiry must be refreshed now.
///
/// Pure so the buffer rule is independently testable.
pub fn needs_refresh(expires_at: i64, now: i64) -> bool {
    expires_at - now <= TOKEN_REFRESH_MARGIN_SECS
}

/// Manages credential validity for all connected accounts.
#[derive(Clone)]
pub struct TokenService {
    client: StravaClient,
    db: Db,
    refresh_locks: RefreshLocks,
}

impl TokenService {
    pub fn new(client: StravaClient, db: Db, refresh_locks: RefreshLocks) -> Self {
        Self {
            client,
            db,
            refresh_locks,
        }
    }

    /// Return a connection whose access token is valid for at least the
    /// safety buffer, refreshing and persisting first if necessary.
    ///
    /// A successful refresh is persisted immediately, before control
    /// returns to the caller: refresh tokens rotate, so a refreshed
    /// credential must never be discarded even if the caller's overall
    /// operation later fails.
    pub async fn ensure_valid(&self, conn: Connection) -> Result<Connection, AppError> {
        let now = Utc::now().timestamp();
        if !needs_refresh(conn.expires_at, now) {
            return Ok(conn);
        }

        // Serialize refreshes for this user within the process. Refresh is
        // not required to be mutually exclusive across processes, only
        // individually safe: the response persisted last is itself valid.
        let lock = self
            .refresh_locks
            .entry(conn.user_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Re-load after acquiring the lock; a concurrent task may already
        // have refreshed and persisted a fresh credential. The clock is
        // re-read too: the wait for the lock can be arbitrarily long.
        let conn = self
            .db
            .get_connection(&conn.user_id)
            .await?
            .ok_or_else(|| AppError::NotConnected(conn.user_id.clone()))?;
        if !needs_refresh(conn.expires_at, Utc::now().timestamp()) {
            return Ok(conn);
        }

        tracing::info!(user_id = %conn.user_id, "Access token expiring, refreshing");

        let refreshed = match self.client.refresh_token(&conn.refresh_token).await {
            Ok(t) => t,
            // Rate limits and transport errors are transient conditions,
            // not evidence of a revoked grant; surface them unchanged so
            // the scheduler defers instead of flagging the account.
            Err(e @ AppError::RateLimited) | Err(e @ AppError::Transient(_)) => return Err(e),
            Err(e) => {
                let mut broken = conn.clone();
                broken.reconnect_required = true;
                broken.updated_at = Utc::now().to_rfc3339();
                if let Err(persist_err) = self.db.upsert_connection(&broken).await {
                    tracing::warn!(
                        user_id = %conn.user_id,
                        error = %persist_err,
                        "Failed to flag connection for reconnect"
                    );
                }
                tracing::warn!(user_id = %conn.user_id, error = %e, "Token refresh failed");
                return Err(AppError::CredentialRefreshFailed(e.to_string()));
            }
        };

        let updated = Connection {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token,
            expires_at: refreshed.expires_at,
            reconnect_required: false,
            updated_at: Utc::now().to_rfc3339(),
            ..conn
        };
        self.db.upsert_connection(&updated).await?;

        tracing::info!(user_id = %updated.user_id, "Token refreshed and persisted");
        Ok(updated)
    }

    /// Exchange an authorization code and store the resulting connection
    /// (initial OAuth connection; also clears any reconnect flag).
    pub async fn connect_user(&self, user_id: &str, code: &str) -> Result<Connection, AppError> {
        let exchanged = self.client.exchange_code(code).await?;

        let conn = Connection {
            user_id: user_id.to_string(),
            athlete_id: exchanged.athlete.id,
            access_token: exchanged.access_token,
            refresh_token: exchanged.refresh_token,
            expires_at: exchanged.expires_at,
            reconnect_required: false,
            updated_at: Utc::now().to_rfc3339(),
        };
        self.db.upsert_connection(&conn).await?;

        tracing::info!(
            user_id = %conn.user_id,
            athlete_id = conn.athlete_id,
            "Provider connection stored"
        );
        Ok(conn)
    }
}
