//! Record Module
//!
//! Defines the persisted cache record and the metadata view used for eviction.

use chrono::{DateTime, Utc};

// == Record ==
/// A single cached blob with its metadata.
///
/// Values handed out by the cache are detached copies: mutating one never
/// touches the stored row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Unique, non-empty key
    pub key: String,
    /// The cached bytes
    pub payload: Option<Vec<u8>>,
    /// Time of the most recent write
    pub updated_at: Option<DateTime<Utc>>,
    /// Whether expiry and size eviction may remove this record
    pub auto_delete: bool,
    /// Expiry instant, honored only when `auto_delete` is set
    pub expires_at: Option<DateTime<Utc>>,
    /// Payload length at write time
    pub size_bytes: u64,
}

impl Record {
    // == Constructor ==
    /// Builds the record written by a `put` at time `now`.
    pub fn new(key: impl Into<String>, payload: Vec<u8>, options: PutOptions, now: DateTime<Utc>) -> Self {
        let size_bytes = payload.len() as u64;
        Self {
            key: key.into(),
            payload: Some(payload),
            updated_at: Some(now),
            auto_delete: options.auto_delete,
            expires_at: options.expires_at,
            size_bytes,
        }
    }

    // == Is Expired ==
    /// Returns true once the sweeper is allowed to remove this record.
    ///
    /// The record must be auto-delete and `now` strictly past `expires_at`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.auto_delete && self.expires_at.is_some_and(|expires| now > expires)
    }

    /// Eviction metadata for this record.
    pub fn meta(&self) -> RecordMeta {
        RecordMeta {
            key: self.key.clone(),
            size_bytes: self.size_bytes,
            updated_at: self.updated_at,
        }
    }
}

// == Record Meta ==
/// The slice of a record the eviction policy looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMeta {
    pub key: String,
    pub size_bytes: u64,
    pub updated_at: Option<DateTime<Utc>>,
}

// == Put Options ==
/// Optional arguments of a `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOptions {
    pub expires_at: Option<DateTime<Utc>>,
    pub auto_delete: bool,
}

impl PutOptions {
    /// Auto-delete, no expiry.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expires_at(mut self, at: DateTime<Utc>) -> Self {
        self.expires_at = Some(at);
        self
    }

    pub fn auto_delete(mut self, auto_delete: bool) -> Self {
        self.auto_delete = auto_delete;
        self
    }
}

impl Default for PutOptions {
    fn default() -> Self {
        Self {
            expires_at: None,
            auto_delete: true,
        }
    }
}

// == Timestamp Encoding ==
// Stored as microseconds since the Unix epoch so SQL comparisons are numeric.
pub(crate) fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}
