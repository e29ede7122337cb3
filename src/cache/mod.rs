//! Cache Module
//!
//! Disk-backed blob storage with expiry sweeps and a size budget enforced
//! by oldest-first eviction.

mod data_cache;
pub mod eviction;
mod pending;
mod record;
mod stats;
mod store;
pub mod sweeper;
mod worker;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use data_cache::DataCache;
pub use eviction::EvictionReport;
pub use pending::{PendingWrites, WriteTicket};
pub use record::{PutOptions, Record, RecordMeta};
pub use stats::CacheStats;
pub use store::{
    CompactionPolicy, DeletePredicate, PageStats, StorageUsage, Store, StoreConnection,
};

// == Public Constants ==
/// Bytes in one megabyte of budget
pub const BYTES_PER_MB: u64 = 1024 * 1024;

/// Budget applied when none is configured (5 MiB)
pub const DEFAULT_STORAGE_LIMIT_BYTES: u64 = 5 * BYTES_PER_MB;

/// File name of the cache inside its directory
pub const DEFAULT_CACHE_FILE_NAME: &str = "DataCache.sqlite";

/// File size above which compaction is considered (40 MiB)
pub const COMPACTION_HIGH_WATER_BYTES: u64 = 40 * BYTES_PER_MB;

/// Compact only when less than this share of the file is in use
pub const COMPACTION_MAX_UTILIZATION: f64 = 0.5;
