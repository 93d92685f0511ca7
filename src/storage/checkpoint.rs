use super::types::{FeedState, RunState, StoreError};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Mutex;

/// Durable home of the [`RunState`] document.
///
/// `load` never fails on a missing or malformed document; it falls back to
/// [`RunState::empty`]. Only backend failures (I/O, database) are errors.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn load(&self) -> Result<RunState, StoreError>;
    async fn save(&self, state: &RunState) -> Result<(), StoreError>;
}

/// Decodes a stored document, falling back to the empty state.
///
/// The document must be a JSON object with a string `lastCheckedAt` and an
/// object `feeds`; anything else (absent, unparseable, wrong shape, bad
/// timestamp) yields `RunState::empty(now)` and a warning. A single feed
/// entry that fails to decode is dropped on its own, so only that feed goes
/// back to first-run handling.
pub fn decode_state(raw: Option<&str>) -> RunState {
    let Some(raw) = raw else {
        tracing::info!("No checkpoint document found, starting from empty state");
        return RunState::empty(Utc::now());
    };

    let value: Value = match serde_json::from_str(raw) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(error = %e, "Checkpoint document is not valid JSON, using empty state");
            return RunState::empty(Utc::now());
        }
    };

    let Some(mut obj) = into_valid_shape(value) else {
        tracing::warn!("Checkpoint document has invalid structure, using empty state");
        return RunState::empty(Utc::now());
    };

    let feeds = match obj.remove("feeds") {
        Some(Value::Object(feeds)) => feeds,
        _ => Map::new(),
    };

    let mut state: RunState = match serde_json::from_value(Value::Object(obj)) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!(error = %e, "Checkpoint document failed to decode, using empty state");
            return RunState::empty(Utc::now());
        }
    };

    for (feed_id, entry) in feeds {
        match serde_json::from_value::<FeedState>(entry) {
            Ok(feed_state) => {
                state.feeds.insert(feed_id, feed_state);
            }
            Err(e) => {
                tracing::warn!(feed = %feed_id, error = %e, "Dropping undecodable feed checkpoint");
            }
        }
    }

    state
}

/// Encodes the state as pretty-printed JSON.
pub fn encode_state(state: &RunState) -> Result<String, StoreError> {
    Ok(serde_json::to_string_pretty(state)?)
}

fn into_valid_shape(value: Value) -> Option<Map<String, Value>> {
    let Value::Object(obj) = value else {
        return None;
    };
    let valid = matches!(obj.get("lastCheckedAt"), Some(Value::String(_)))
        && matches!(obj.get("feeds"), Some(Value::Object(_)));
    valid.then_some(obj)
}

/// In-process store holding the encoded document.
///
/// Goes through the same encode/decode path as durable backends, so it is a
/// faithful stand-in for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    document: Mutex<Option<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the store with a raw document (which may be malformed).
    pub fn with_document(document: impl Into<String>) -> Self {
        Self {
            document: Mutex::new(Some(document.into())),
        }
    }

    /// The raw document as last saved.
    pub fn document(&self) -> Option<String> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<String>> {
        // A poisoned lock only means a panic mid-assignment of a String; the
        // value is still a complete Option<String>.
        self.document.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl CheckpointStore for MemoryStore {
    async fn load(&self) -> Result<RunState, StoreError> {
        let raw = self.document();
        Ok(decode_state(raw.as_deref()))
    }

    async fn save(&self, state: &RunState) -> Result<(), StoreError> {
        let encoded = encode_state(state)?;
        *self.lock() = Some(encoded);
        Ok(())
    }
}
