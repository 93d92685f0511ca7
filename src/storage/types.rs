use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Checkpoint storage errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying SQLite error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema creation failed
    #[error("Database migration failed: {0}")]
    Migration(String),

    /// State document could not be encoded
    #[error("Failed to serialize state: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Backend-specific failure that has no richer type
    #[error("Checkpoint store unavailable: {0}")]
    Unavailable(String),
}

// ============================================================================
// Timestamp Encoding
// ============================================================================

/// RFC 3339, UTC, millisecond precision, `Z` suffix (`2023-01-01T00:00:00.000Z`).
///
/// Reading accepts any RFC 3339 offset and normalizes to UTC.
pub(crate) mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(dt: &DateTime<Utc>) -> String {
        dt.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(dt))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(raw.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Data Structures
// ============================================================================

/// Durable run checkpoint, one document per deployment.
///
/// `feeds` may hold entries for feeds that are no longer configured; they are
/// kept as-is. Fields this version does not know about land in `extra` and are
/// written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunState {
    /// Wall-clock time of the last completed run (liveness marker)
    #[serde(with = "iso_millis")]
    pub last_checked_at: DateTime<Utc>,
    #[serde(default)]
    pub feeds: BTreeMap<String, FeedState>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RunState {
    /// The documented empty state: no feeds, last check at `now`.
    pub fn empty(now: DateTime<Utc>) -> Self {
        Self {
            last_checked_at: now,
            feeds: BTreeMap::new(),
            extra: Map::new(),
        }
    }

    pub fn feed(&self, feed_id: &str) -> Option<&FeedState> {
        self.feeds.get(feed_id)
    }
}

/// Per-feed progress marker.
///
/// `last_checked_at` is the publish time of the last item delivered for this
/// feed, never the time the feed was polled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedState {
    #[serde(with = "iso_millis")]
    pub last_checked_at: DateTime<Utc>,
    #[serde(default, alias = "lastItemGuid", skip_serializing_if = "Option::is_none")]
    pub last_item_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl FeedState {
    pub fn new(last_checked_at: DateTime<Utc>, last_item_id: Option<String>) -> Self {
        Self {
            last_checked_at,
            last_item_id,
            extra: Map::new(),
        }
    }
}
