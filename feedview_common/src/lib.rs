//! Feedview Common - Shared wire protocol for the live traffic viewer
//!
//! This crate contains the entry model, the live/backfill message shapes and
//! the error taxonomy used by the viewer and anything that talks to it.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Feed errors. None of these is fatal to a viewing session.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Malformed push message: {0}")]
    MalformedPushMessage(#[source] serde_json::Error),

    #[error("Backfill unavailable: {0}")]
    BackfillUnavailable(String),

    #[error("A backfill is already in flight")]
    ReentrantBackfill,

    #[error("No top cursor to fetch older entries from")]
    MissingCursor,

    #[error("Buffer capacity must be greater than zero")]
    InvalidCapacity,

    #[error("Backfill timeout must be greater than zero")]
    InvalidTimeout,
}

/// Identity of an entry: unique per (worker, id), never reused
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryKey {
    pub worker: String,
    pub id: String,
}

impl EntryKey {
    pub fn new(worker: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for EntryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.worker, self.id)
    }
}

/// One captured traffic record
///
/// Only `id`, `worker` and `timestamp` are interpreted. Every other field the
/// backend sends is kept verbatim in `payload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entry {
    /// Identifier, unique within `worker`
    pub id: String,

    /// Capture-agent shard that produced the entry
    pub worker: String,

    /// Capture time in epoch milliseconds
    #[serde(default)]
    pub timestamp: i64,

    /// Opaque record body
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Entry {
    pub fn new(worker: impl Into<String>, id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            worker: worker.into(),
            timestamp,
            payload: Map::new(),
        }
    }

    /// Identity key of this entry
    pub fn key(&self) -> EntryKey {
        EntryKey::new(self.worker.clone(), self.id.clone())
    }

    /// Check identity without allocating a key
    pub fn has_key(&self, key: &EntryKey) -> bool {
        self.worker == key.worker && self.id == key.id
    }

    /// Decode one push message
    pub fn from_json(s: &str) -> Result<Self, FeedError> {
        serde_json::from_str(s).map_err(FeedError::MalformedPushMessage)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Short one-line description built from common payload fields
    pub fn summary(&self) -> String {
        let field = |name: &str| -> Option<String> {
            match self.payload.get(name)? {
                Value::String(s) if !s.is_empty() => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            }
        };

        let parts: Vec<String> = ["method", "path", "status", "summary"]
            .iter()
            .filter_map(|name| field(name))
            .collect();

        parts.join(" ")
    }
}

/// Entries compare by identity key only
impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.worker == other.worker && self.id == other.id
    }
}

impl Eq for Entry {}

/// Pagination metadata returned with a backfill page
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchMeta {
    /// Cursor to continue paging backwards from
    pub left_off: String,

    /// The backend has nothing older for this query
    pub no_more_data: bool,

    /// Number of entries matching the query
    #[serde(deserialize_with = "lenient_count")]
    pub total: u64,

    /// Earliest capture time still known when history was truncated, or 0
    #[serde(deserialize_with = "lenient_millis")]
    pub truncated_timestamp: i64,
}

/// Any JSON number; negative, fractional or non-numeric values clamp into range
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().map(|f| if f > 0.0 { f as u64 } else { 0 }))
            .unwrap_or(0),
        _ => 0,
    })
}

fn lenient_millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or(0),
        _ => 0,
    })
}

/// Response body of a backfill request
///
/// `data` is newest-first, as the backend returns it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchResponse {
    #[serde(default)]
    pub data: Option<Vec<Entry>>,

    #[serde(default)]
    pub meta: Option<FetchMeta>,
}

impl FetchResponse {
    /// Split into an ascending page and its metadata
    ///
    /// A response missing either part counts as unavailable.
    pub fn into_ascending_page(self) -> Result<(Vec<Entry>, FetchMeta), FeedError> {
        match (self.data, self.meta) {
            (Some(mut data), Some(meta)) => {
                data.reverse();
                Ok((data, meta))
            }
            (None, _) => Err(FeedError::BackfillUnavailable("response has no data".to_string())),
            (_, None) => Err(FeedError::BackfillUnavailable("response has no meta".to_string())),
        }
    }
}

/// First frame sent on a live connection, scoping the stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSubscribe {
    /// Resume just after this entry id, or `LIVE_CURSOR`
    pub left_off: String,

    /// Opaque backend filter expression
    pub query: String,

    /// Number of entries to replay before live tailing starts
    pub fetch: u32,

    /// Time budget for the replay, in milliseconds
    pub timeout_ms: u64,
}

impl LiveSubscribe {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Constants for the protocol
pub mod constants {
    /// Cursor meaning "most recent"
    pub const LIVE_CURSOR: &str = "latest";

    /// Default cap on retained entries
    pub const MAX_ENTRIES: usize = 10_000;

    /// Entries requested per backfill page
    pub const BACKFILL_PAGE_LIMIT: u32 = 100;

    /// Backfill request time budget
    pub const BACKFILL_TIMEOUT_MS: u64 = 3000;

    /// Backfill pages always walk backwards in time
    pub const BACKFILL_DIRECTION: i32 = -1;

    /// Path of the live WebSocket endpoint
    pub const LIVE_PATH: &str = "/ws";

    /// Path of the backfill endpoint
    pub const ITEMS_PATH: &str = "/items";
}
