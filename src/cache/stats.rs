//! Cache Statistics Module
//!
//! Tracks lookups, writes and removals performed by the serial worker.

use serde::Serialize;

use crate::cache::store::StorageUsage;

// == Cache Stats ==
/// Cache counters plus a usage snapshot taken when the stats were read.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    /// Lookups that found a record
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Committed writes
    pub writes: u64,
    /// Writes that failed to commit
    pub failed_writes: u64,
    /// Records removed by explicit delete
    pub deletes: u64,
    /// Records removed by expiry sweeps
    pub expired: u64,
    /// Records removed to satisfy the budget
    pub evictions: u64,
    /// Eviction candidates whose removal failed
    pub failed_evictions: u64,
    /// Records currently stored
    pub total_entries: u64,
    /// Bytes across all records
    pub total_bytes: u64,
    /// Bytes across auto-delete records
    pub auto_delete_bytes: u64,
    /// Budget in effect
    pub storage_limit_bytes: u64,
}

impl CacheStats {
    // == Constructor ==
    /// Creates a new CacheStats with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 if no lookups have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    pub fn record_lookup(&mut self, found: bool) {
        if found {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
    }

    pub fn record_write(&mut self, committed: bool) {
        if committed {
            self.writes += 1;
        } else {
            self.failed_writes += 1;
        }
    }

    pub fn record_deletes(&mut self, count: usize) {
        self.deletes += count as u64;
    }

    pub fn record_expired(&mut self, count: usize) {
        self.expired += count as u64;
    }

    pub fn record_eviction_pass(&mut self, evicted: usize, failed: usize) {
        self.evictions += evicted as u64;
        self.failed_evictions += failed as u64;
    }

    // == Usage Snapshot ==
    /// Copies live sizes and the budget into the stats.
    pub fn set_usage(&mut self, usage: StorageUsage, storage_limit_bytes: u64) {
        self.total_entries = usage.total_entries;
        self.total_bytes = usage.total_bytes;
        self.auto_delete_bytes = usage.auto_delete_bytes;
        self.storage_limit_bytes = storage_limit_bytes;
    }
}
