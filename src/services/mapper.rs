// SPDX-License-Identifier: MIT

//! Normalization of provider activities into local records.
//!
//! Pure functions, no I/O: the type mapping table, unit rules, and pace
//! derivation live here and nowhere else.

use chrono::{DateTime, Utc};

use crate::models::{ActivityKind, ActivityRecord};
use crate::services::strava::StravaActivity;

/// Why an external activity did not produce a record.
#[derive(Debug)]
pub enum MapSkip {
    /// Provider sport type outside the accepted set. A skip, not an error.
    Unsupported,
    /// Malformed payload (bad dates, etc). Reported per item, never
    /// aborts the batch.
    Invalid(String),
}

/// Fixed table from provider sport types to local categories. Anything
/// absent maps to `Unsupported`.
fn kind_for_sport_type(sport_type: &str) -> Option<ActivityKind> {
    match sport_type {
        "Run" | "TrailRun" | "VirtualRun" => Some(ActivityKind::Run),
        "Ride" | "VirtualRide" | "GravelRide" | "MountainBikeRide" => Some(ActivityKind::Ride),
        "Walk" => Some(ActivityKind::Walk),
        "Hike" => Some(ActivityKind::Hike),
        "Swim" => Some(ActivityKind::Swim),
        _ => None,
    }
}

/// Seconds per km when both inputs are positive, else None.
fn derive_pace(moving_seconds: i64, distance_meters: f64) -> Option<f64> {
    if moving_seconds > 0 && distance_meters > 0.0 {
        Some(moving_seconds as f64 / (distance_meters / 1000.0))
    } else {
        None
    }
}

/// Map a provider activity to a local record.
pub fn map_activity(
    external: &StravaActivity,
    owner_id: &str,
    source: &str,
) -> Result<ActivityRecord, MapSkip> {
    let kind = kind_for_sport_type(&external.sport_type).ok_or(MapSkip::Unsupported)?;

    let start_date = external
        .start_date
        .as_deref()
        .ok_or_else(|| MapSkip::Invalid("missing start_date".to_string()))?;
    let started_at: DateTime<Utc> = DateTime::parse_from_rfc3339(start_date)
        .map_err(|e| MapSkip::Invalid(format!("invalid start_date {:?}: {}", start_date, e)))?
        .with_timezone(&Utc);

    Ok(ActivityRecord {
        owner_id: owner_id.to_string(),
        external_id: external.id.to_string(),
        kind,
        name: external.name.clone(),
        started_at,
        moving_duration_seconds: external.moving_time,
        distance_meters: external.distance,
        elevation_gain_meters: external.total_elevation_gain,
        avg_heart_rate: external.average_heartrate,
        max_heart_rate: external.max_heartrate,
        calories: external.calories,
        derived_pace_seconds_per_km: derive_pace(external.moving_time, external.distance),
        source: source.to_string(),
        created_at: Utc::now().to_rfc3339(),
    })
}
