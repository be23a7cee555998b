// SPDX-License-Identifier: MIT

//! Services module - business logic layer.

pub mod mapper;
pub mod scheduler;
pub mod strava;
pub mod sync;
pub mod tokens;

pub use scheduler::{Scheduler, SweepPolicy};
pub use strava::StravaClient;
pub use sync::SyncOrchestrator;
pub use tokens::TokenService;
