// SPDX-License-Identifier: MIT

//! Data models for the sync engine.

pub mod activity;
pub mod connection;

pub use activity::{ActivityKind, ActivityRecord, ItemError, SyncOutcome};
pub use connection::Connection;
