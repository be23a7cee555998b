// SPDX-License-Identifier: MIT

//! Sync orchestration.
//!
//! Pulls a window of provider activities for one account, de-duplicates
//! against stored records, maps and persists the new ones, and reports a
//! per-account `SyncOutcome`. The per-item loop body is shared with the
//! webhook pipeline (a batch of size one), which is what guarantees a
//! given external activity lands at most once no matter which path saw it
//! first.

use std::time::Duration;

use chrono::Utc;

use crate::db::Db;
use crate::error::AppError;
use crate::models::{ItemError, SyncOutcome};
use crate::services::mapper::{map_activity, MapSkip};
use crate::services::strava::{StravaActivity, StravaClient};
use crate::services::tokens::TokenService;

/// Result of ingesting a single external activity. Never an `Err`: per
/// item failures are data, not exceptions, so partial failure stays a
/// normal reportable outcome.
#[derive(Debug)]
pub enum ItemOutcome {
    Created,
    Duplicate,
    Unsupported,
    Failed(String),
}

/// Orchestrates pull syncs and the shared ingest path.
#[derive(Clone)]
pub struct SyncOrchestrator {
    client: StravaClient,
    tokens: TokenService,
    db: Db,
    page_size: u32,
}

impl SyncOrchestrator {
    pub fn new(client: StravaClient, tokens: TokenService, db: Db, page_size: u32) -> Self {
        Self {
            client,
            tokens,
            db,
            page_size,
        }
    }

    /// Pull-sync one account over the given lookback window.
    ///
    /// Fails fast only on the two account-level conditions (`NotConnected`
    /// and `CredentialRefreshFailed`, plus rate limiting / transport
    /// failure of the list call itself); everything per item is collected
    /// into the outcome and never aborts the batch.
    pub async fn sync(
        &self,
        user_id: &str,
        lookback: Duration,
        source: &str,
    ) -> Result<SyncOutcome, AppError> {
        let conn = self
            .db
            .get_connection(user_id)
            .await?
            .ok_or_else(|| AppError::NotConnected(user_id.to_string()))?;

        // A stale token must never reach the list call.
        let conn = self.tokens.ensure_valid(conn).await?;

        let after = Utc::now().timestamp() - lookback.as_secs() as i64;
        let mut outcome = SyncOutcome::default();
        let mut page = 1u32;

        loop {
            let batch = self
                .client
                .list_activities(&conn.access_token, after, page, self.page_size)
                .await?;
            let batch_len = batch.len();

            for raw in &batch {
                self.ingest_raw(user_id, raw, source, &mut outcome).await;
            }

            if batch_len < self.page_size as usize {
                break;
            }
            page += 1;
        }

        tracing::info!(
            user_id,
            source,
            created = outcome.created,
            skipped_duplicate = outcome.skipped_duplicate,
            skipped_unsupported = outcome.skipped_unsupported_type,
            errors = outcome.per_item_errors.len(),
            "Sync complete"
        );
        Ok(outcome)
    }

    /// Decode one raw list element and feed it through the ingest path,
    /// folding the result into the outcome. Malformed payloads become per
    /// item errors keyed by whatever id can be salvaged.
    async fn ingest_raw(
        &self,
        user_id: &str,
        raw: &serde_json::Value,
        source: &str,
        outcome: &mut SyncOutcome,
    ) {
        let external: StravaActivity = match serde_json::from_value(raw.clone()) {
            Ok(a) => a,
            Err(e) => {
                outcome.per_item_errors.push(ItemError {
                    external_id: raw_external_id(raw),
                    message: format!("malformed activity payload: {}", e),
                });
                return;
            }
        };

        match self.ingest_one(user_id, &external, source).await {
            ItemOutcome::Created => outcome.created += 1,
            ItemOutcome::Duplicate => outcome.skipped_duplicate += 1,
            ItemOutcome::Unsupported => outcome.skipped_unsupported_type += 1,
            ItemOutcome::Failed(message) => outcome.per_item_errors.push(ItemError {
                external_id: external.id.to_string(),
                message,
            }),
        }
    }

    /// The shared dedup -> map -> persist sequence for one activity.
    ///
    /// The dedup check runs per item even within one batch (upstream can
    /// return the same id twice), and is re-verified by the store at
    /// persist time: losing that race surfaces as `Duplicate`, not as an
    /// error, which makes concurrent syncs of one account safe by
    /// construction.
    pub async fn ingest_one(
        &self,
        user_id: &str,
        external: &StravaActivity,
        source: &str,
    ) -> ItemOutcome {
        let external_id = external.id.to_string();

        match self.db.activity_exists(user_id, &external_id).await {
            Ok(true) => return ItemOutcome::Duplicate,
            Ok(false) => {}
            Err(e) => return ItemOutcome::Failed(e.to_string()),
        }

        let record = match map_activity(external, user_id, source) {
            Ok(r) => r,
            Err(MapSkip::Unsupported) => return ItemOutcome::Unsupported,
            Err(MapSkip::Invalid(msg)) => return ItemOutcome::Failed(msg),
        };

        match self.db.insert_activity_if_absent(&record).await {
            Ok(true) => {
                tracing::debug!(
                    user_id,
                    external_id = %external_id,
                    kind = ?record.kind,
                    "Activity record created"
                );
                ItemOutcome::Created
            }
            Ok(false) => ItemOutcome::Duplicate,
            Err(e) => ItemOutcome::Failed(e.to_string()),
        }
    }

    /// Webhook ingestion for one "activity created" event: resolve the
    /// owning account, validate its credential, fetch the single activity
    /// and run it through the identical ingest path.
    pub async fn process_webhook_activity(
        &self,
        athlete_id: u64,
        activity_id: u64,
    ) -> Result<ItemOutcome, AppError> {
        let conn = self
            .db
            .find_connection_by_athlete(athlete_id)
            .await?
            .ok_or_else(|| AppError::NotConnected(format!("athlete {}", athlete_id)))?;

        let conn = self.tokens.ensure_valid(conn).await?;
        let external = self
            .client
            .get_activity(&conn.access_token, activity_id)
            .await?;

        Ok(self.ingest_one(&conn.user_id, &external, "webhook").await)
    }
}

/// Best-effort external id for error reporting on undecodable payloads.
fn raw_external_id(raw: &serde_json::Value) -> String {
    match raw.get("id") {
        Some(serde_json::Value::Number(n)) => n.to_string(),
        Some(serde_json::Value::String(s)) => s.clone(),
        _ => "unknown".to_string(),
    }
}
