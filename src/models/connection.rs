// SPDX-License-Identifier: MIT

//! Provider connection model (OAuth credential set).

use serde::{Deserialize, Serialize};

/// Stored OAuth credential set linking one local user to one provider
/// account. At most one per user (the document id is the user id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Connection {
    /// Owning local user id (also used as document ID)
    pub user_id: String,
    /// Athlete ID on the external platform
    pub athlete_id: u64,
    /// Current access token (opaque)
    pub access_token: String,
    /// Current refresh token (opaque, rotates on every refresh)
    pub refresh_token: String,
    /// Unix seconds after which `access_token` is invalid
    pub expires_at: i64,
    /// Set when a refresh fails; cleared when the user re-authorizes.
    /// The scheduler skips flagged accounts instead of retrying.
    #[serde(default)]
    pub reconnect_required: bool,
    /// Last mutation timestamp (RFC3339)
    pub updated_at: String,
}
