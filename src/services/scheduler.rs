// SPDX-License-Identifier: MIT

//! Background sweep scheduler.
//!
//! A fixed-interval sweep over every connected account: validate the
//! credential, then run a short-lookback incremental sync to catch
//! anything the webhook missed. One account's failure never halts the
//! sweep, and a sweep that is still running when the next tick fires
//! causes that tick to be skipped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng as _;

use crate::db::Db;
use crate::error::AppError;
use crate::services::sync::SyncOrchestrator;

/// Injectable sweep policy so tests can drive the sweep synchronously
/// with no real timers.
#[derive(Debug, Clone)]
pub struct SweepPolicy {
    /// Time between sweep starts
    pub interval: Duration,
    /// Lookback window for each account's incremental sync
    pub lookback: Duration,
    /// Random startup delay spread, to avoid synchronized herds when
    /// several instances restart together
    pub jitter: Duration,
}

/// Counters for one sweep, for logging and tests.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub accounts: u32,
    pub synced: u32,
    pub skipped_reconnect: u32,
    pub deferred_rate_limit: u32,
    pub failed: u32,
    /// True when the sweep was skipped because another was in flight.
    pub skipped_overlap: bool,
}

/// Recurring sweep over all connected accounts.
pub struct Scheduler {
    db: Db,
    sync: SyncOrchestrator,
    policy: SweepPolicy,
    running: AtomicBool,
}

impl Scheduler {
    pub fn new(db: Db, sync: SyncOrchestrator, policy: SweepPolicy) -> Self {
        Self {
            db,
            sync,
            policy,
            running: AtomicBool::new(false),
        }
    }

    /// Run one sweep across every account, isolating per-account failures.
    ///
    /// Callable directly (tests run it synchronously); the spawned loop
    /// calls it on every tick.
    pub async fn run_sweep(&self) -> SweepSummary {
        // Reentrancy guard: overlapping sweeps are skipped, not queued.
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!("Previous sweep still running, skipping this tick");
            return SweepSummary {
                skipped_overlap: true,
                ..SweepSummary::default()
            };
        }

        let summary = self.sweep_accounts().await;
        self.running.store(false, Ordering::SeqCst);

        tracing::info!(
            accounts = summary.accounts,
            synced = summary.synced,
            skipped_reconnect = summary.skipped_reconnect,
            deferred_rate_limit = summary.deferred_rate_limit,
            failed = summary.failed,
            "Sweep complete"
        );
        summary
    }

    async fn sweep_accounts(&self) -> SweepSummary {
        let mut summary = SweepSummary::default();

        let connections = match self.db.list_connections().await {
            Ok(c) => c,
            Err(e) => {
                tracing::error!(error = %e, "Failed to enumerate connections for sweep");
                return summary;
            }
        };

        for conn in connections {
            summary.accounts += 1;

            // Accounts flagged for reconnect stay parked until the user
            // re-authorizes; retrying a revoked grant is pointless.
            if conn.reconnect_required {
                tracing::debug!(user_id = %conn.user_id, "Skipping account pending reconnect");
                summary.skipped_reconnect += 1;
                continue;
            }

            match self
                .sync
                .sync(&conn.user_id, self.policy.lookback, "sweep")
                .await
            {
                Ok(outcome) => {
                    summary.synced += 1;
                    if !outcome.per_item_errors.is_empty() {
                        tracing::warn!(
                            user_id = %conn.user_id,
                            errors = outcome.per_item_errors.len(),
                            "Sweep sync finished with item errors"
                        );
                    }
                }
                Err(AppError::RateLimited) => {
                    tracing::warn!(
                        user_id = %conn.user_id,
                        "Rate limited during sweep, deferring account to next tick"
                    );
                    summary.deferred_rate_limit += 1;
                }
                Err(e) => {
                    // Includes CredentialRefreshFailed (the reconnect flag
                    // is persisted by the token service) and transient
                    // failures that exhausted their retries.
                    tracing::error!(user_id = %conn.user_id, error = %e, "Sweep sync failed");
                    summary.failed += 1;
                }
            }
        }

        summary
    }

    /// Spawn the recurring sweep loop.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let jitter_ms = if self.policy.jitter.is_zero() {
                0
            } else {
                rand::thread_rng().gen_range(0..self.policy.jitter.as_millis() as u64)
            };
            tracing::info!(
                interval_secs = self.policy.interval.as_secs(),
                lookback_secs = self.policy.lookback.as_secs(),
                jitter_ms,
                "Sweep scheduler started"
            );
            tokio::time::sleep(Duration::from_millis(jitter_ms)).await;

            let mut ticker = tokio::time::interval(self.policy.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                self.run_sweep().await;
            }
        })
    }
}
