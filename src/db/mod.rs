// SPDX-License-Identifier: MIT

//! Database layer (Firestore in production, in-memory for tests).

pub mod store;

pub use store::Db;

/// Collection names as constants.
pub mod collections {
    pub const CONNECTIONS: &str = "connections";
    pub const ACTIVITIES: &str = "activities";
}
