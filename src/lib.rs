// SPDX-License-Identifier: MIT

//! Trainlink sync engine: keeps local activity records in step with a
//! user's account on an external fitness platform.
//!
//! Two ingestion paths feed one idempotent persist path: a pull sync
//! (manual trigger or the scheduled sweep) and provider webhook pushes.
//! Both converge on the same dedup -> map -> persist sequence, keyed by
//! (owner, external activity id).

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod retry;
pub mod routes;
pub mod services;

use config::Config;
use db::Db;
use services::{SyncOrchestrator, TokenService};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub db: Db,
    pub tokens: TokenService,
    pub sync: SyncOrchestrator,
}
