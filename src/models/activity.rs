// SPDX-License-Identifier: MIT

//! Normalized activity record and per-sync outcome reporting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Local activity category, derived from the provider's sport type via a
/// fixed mapping table. Provider types outside the table are skipped, not
/// stored as "unknown".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Run,
    Ride,
    Walk,
    Hike,
    Swim,
}

/// Normalized, locally persisted activity.
///
/// The pair (owner_id, external_id) is the sole de-duplication key; it is
/// encoded in the document id so the store enforces it regardless of
/// which ingestion path (pull sync or webhook) wrote first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Local owning user
    pub owner_id: String,
    /// Provider activity id, stored as an opaque string
    pub external_id: String,
    /// Normalized category
    pub kind: ActivityKind,
    /// Activity title from the provider
    pub name: String,
    /// Start instant (UTC)
    pub started_at: DateTime<Utc>,
    /// Moving time in seconds
    pub moving_duration_seconds: i64,
    /// Distance in meters
    pub distance_meters: f64,
    pub elevation_gain_meters: Option<f64>,
    pub avg_heart_rate: Option<f64>,
    pub max_heart_rate: Option<f64>,
    pub calories: Option<f64>,
    /// Seconds per km, when duration and distance are both positive
    pub derived_pace_seconds_per_km: Option<f64>,
    /// Ingestion path: "manual", "webhook", or "sweep"
    pub source: String,
    /// When this record was created (RFC3339)
    pub created_at: String,
}

impl ActivityRecord {
    /// Document id encoding the (owner_id, external_id) uniqueness key.
    pub fn doc_id(owner_id: &str, external_id: &str) -> String {
        format!("{}_{}", owner_id, urlencoding::encode(external_id))
    }
}

/// Per-item failure inside a sync batch.
#[derive(Debug, Clone, Serialize)]
pub struct ItemError {
    pub external_id: String,
    pub message: String,
}

/// Aggregated result of one sync invocation. Transient, never persisted;
/// a non-empty error list does not fail the operation.
#[derive(Debug, Default, Serialize)]
pub struct SyncOutcome {
    pub created: u32,
    pub skipped_duplicate: u32,
    pub skipped_unsupported_type: u32,
    pub per_item_errors: Vec<ItemError>,
}
