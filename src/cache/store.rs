//! Store Module
//!
//! Durable keyed storage on a single SQLite file. A connection is opened per
//! logical operation and released when the [`StoreConnection`] is dropped.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use crate::cache::record::{from_micros, to_micros, Record, RecordMeta};
use crate::cache::{COMPACTION_HIGH_WATER_BYTES, COMPACTION_MAX_UTILIZATION};
use crate::error::{CacheError, Result};

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS records (
        record_key  TEXT PRIMARY KEY NOT NULL,
        payload     BLOB,
        updated_at  INTEGER,
        auto_delete INTEGER NOT NULL DEFAULT 1,
        expires_at  INTEGER,
        size_bytes  INTEGER NOT NULL DEFAULT 0
    );
    CREATE INDEX IF NOT EXISTS idx_records_eviction
        ON records (auto_delete, updated_at, record_key);
";

const SELECT_RECORD: &str = "SELECT record_key, payload, updated_at, auto_delete, expires_at, size_bytes
     FROM records WHERE record_key = ?1";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// == Compaction Policy ==
/// Decides when a freshly opened file should be vacuumed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompactionPolicy {
    /// File size that must be exceeded before compaction is considered
    pub high_water_bytes: u64,
    /// Compact only when used/total falls below this ratio
    pub max_utilization: f64,
}

impl CompactionPolicy {
    /// Returns true when the file is both large and mostly free pages.
    pub fn should_compact(&self, total_bytes: u64, used_bytes: u64) -> bool {
        if total_bytes == 0 || total_bytes <= self.high_water_bytes {
            return false;
        }
        (used_bytes as f64 / total_bytes as f64) < self.max_utilization
    }
}

impl Default for CompactionPolicy {
    fn default() -> Self {
        Self {
            high_water_bytes: COMPACTION_HIGH_WATER_BYTES,
            max_utilization: COMPACTION_MAX_UTILIZATION,
        }
    }
}

// == Delete Predicate ==
/// Filters accepted by [`StoreConnection::delete_where`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeletePredicate {
    /// The record with this key
    Key(String),
    /// Auto-delete records whose `expires_at` is strictly before the instant
    ExpiredBefore(DateTime<Utc>),
}

// == Storage Usage ==
/// Aggregate sizes over the stored records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageUsage {
    pub total_entries: u64,
    pub total_bytes: u64,
    pub auto_delete_bytes: u64,
}

// == Page Stats ==
/// Page accounting of the backing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageStats {
    pub page_size: u64,
    pub page_count: u64,
    pub freelist_count: u64,
}

impl PageStats {
    pub fn file_bytes(&self) -> u64 {
        self.page_count.saturating_mul(self.page_size)
    }

    pub fn used_bytes(&self) -> u64 {
        self.page_count
            .saturating_sub(self.freelist_count)
            .saturating_mul(self.page_size)
    }
}

// == Store ==
/// Location and housekeeping settings of the backing file.
#[derive(Debug, Clone)]
pub struct Store {
    path: PathBuf,
    compaction: CompactionPolicy,
}

impl Store {
    pub fn new(path: impl Into<PathBuf>, compaction: CompactionPolicy) -> Self {
        Self {
            path: path.into(),
            compaction,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // == Connect ==
    /// Opens the backing file, creating it and its schema if absent.
    ///
    /// Compaction runs here when the policy asks for it; a failed compaction
    /// is logged and the connection is still returned.
    pub fn connect(&self) -> Result<StoreConnection> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                CacheError::connection(format!("{}: {}", parent.display(), e))
            })?;
        }

        let conn = Connection::open(&self.path)
            .map_err(|e| CacheError::connection(format!("{}: {}", self.path.display(), e)))?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(CacheError::connection)?;
        conn.execute_batch(SCHEMA).map_err(CacheError::connection)?;

        let mut connection = StoreConnection {
            conn,
            compacted: false,
        };
        connection.compact_if_needed(&self.compaction);
        Ok(connection)
    }
}

// == Store Connection ==
/// An open handle on the backing file, scoped to one logical operation.
pub struct StoreConnection {
    conn: Connection,
    compacted: bool,
}

impl StoreConnection {
    /// True if this connect vacuumed the file.
    pub fn was_compacted(&self) -> bool {
        self.compacted
    }

    fn compact_if_needed(&mut self, policy: &CompactionPolicy) {
        let stats = match self.page_stats() {
            Ok(stats) => stats,
            Err(e) => {
                warn!("Skipping compaction check: {}", e);
                return;
            }
        };

        if !policy.should_compact(stats.file_bytes(), stats.used_bytes()) {
            return;
        }

        match self.conn.execute_batch("VACUUM") {
            Ok(()) => {
                self.compacted = true;
                info!(
                    "Compacted cache file: {} bytes, {} in use",
                    stats.file_bytes(),
                    stats.used_bytes()
                );
            }
            Err(e) => warn!("Compaction failed: {}", e),
        }
    }

    // == Page Stats ==
    pub fn page_stats(&self) -> Result<PageStats> {
        let read = |name: &str| -> Result<u64> {
            self.conn
                .pragma_query_value(None, name, |row| row.get::<_, i64>(0))
                .map(|v| v.max(0) as u64)
                .map_err(CacheError::transaction)
        };
        Ok(PageStats {
            page_size: read("page_size")?,
            page_count: read("page_count")?,
            freelist_count: read("freelist_count")?,
        })
    }

    // == Get ==
    /// Point lookup by primary key. Absence is `Ok(None)`.
    pub fn get(&self, key: &str) -> Result<Option<Record>> {
        self.conn
            .query_row(SELECT_RECORD, params![key], read_record)
            .optional()
            .map_err(CacheError::transaction)
    }

    // == Upsert ==
    /// Inserts the record or fully replaces the one stored under its key.
    pub fn upsert(&mut self, record: &Record) -> Result<()> {
        let tx = self.conn.transaction().map_err(CacheError::transaction)?;
        tx.execute(
            "INSERT INTO records (record_key, payload, updated_at, auto_delete, expires_at, size_bytes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(record_key) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at,
                auto_delete = excluded.auto_delete,
                expires_at = excluded.expires_at,
                size_bytes = excluded.size_bytes",
            params![
                record.key,
                record.payload,
                record.updated_at.map(to_micros),
                record.auto_delete,
                record.expires_at.map(to_micros),
                record.size_bytes as i64,
            ],
        )
        .map_err(CacheError::transaction)?;
        tx.commit().map_err(CacheError::transaction)?;

        debug!("Upserted '{}' ({} bytes)", record.key, record.size_bytes);
        Ok(())
    }

    // == Delete Where ==
    /// Removes every matching record in one transaction and returns the count.
    pub fn delete_where(&mut self, predicate: &DeletePredicate) -> Result<usize> {
        let tx = self.conn.transaction().map_err(CacheError::transaction)?;
        let removed = match predicate {
            DeletePredicate::Key(key) => {
                tx.execute("DELETE FROM records WHERE record_key = ?1", params![key])
            }
            DeletePredicate::ExpiredBefore(now) => tx.execute(
                "DELETE FROM records
                 WHERE auto_delete = 1 AND expires_at IS NOT NULL AND expires_at < ?1",
                params![to_micros(*now)],
            ),
        }
        .map_err(CacheError::transaction)?;
        tx.commit().map_err(CacheError::transaction)?;
        Ok(removed)
    }

    // == Eviction Snapshot ==
    /// Metadata of all auto-delete records, oldest `updated_at` first.
    ///
    /// Equal timestamps are ordered by key. Read inside one transaction so the
    /// result is a consistent snapshot.
    pub fn auto_delete_by_update_asc(&mut self) -> Result<Vec<RecordMeta>> {
        let tx = self.conn.transaction().map_err(CacheError::transaction)?;
        let metas = {
            let mut stmt = tx
                .prepare(
                    "SELECT record_key, size_bytes, updated_at FROM records
                     WHERE auto_delete = 1
                     ORDER BY updated_at ASC, record_key ASC",
                )
                .map_err(CacheError::transaction)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(RecordMeta {
                        key: row.get(0)?,
                        size_bytes: row.get::<_, i64>(1)?.max(0) as u64,
                        updated_at: row.get::<_, Option<i64>>(2)?.and_then(from_micros),
                    })
                })
                .map_err(CacheError::transaction)?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(CacheError::transaction)?
        };
        tx.commit().map_err(CacheError::transaction)?;
        Ok(metas)
    }

    // == Usage ==
    pub fn usage(&self) -> Result<StorageUsage> {
        self.conn
            .query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(size_bytes), 0),
                        COALESCE(SUM(CASE WHEN auto_delete = 1 THEN size_bytes ELSE 0 END), 0)
                 FROM records",
                [],
                |row| {
                    Ok(StorageUsage {
                        total_entries: row.get::<_, i64>(0)?.max(0) as u64,
                        total_bytes: row.get::<_, i64>(1)?.max(0) as u64,
                        auto_delete_bytes: row.get::<_, i64>(2)?.max(0) as u64,
                    })
                },
            )
            .map_err(CacheError::transaction)
    }
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<Record> {
    Ok(Record {
        key: row.get(0)?,
        payload: row.get(1)?,
        updated_at: row.get::<_, Option<i64>>(2)?.and_then(from_micros),
        auto_delete: row.get(3)?,
        expires_at: row.get::<_, Option<i64>>(4)?.and_then(from_micros),
        size_bytes: row.get::<_, i64>(5)?.max(0) as u64,
    })
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PutOptions;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use tempfile::TempDir;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap()
    }

    fn open_store(dir: &TempDir) -> Store {
        Store::new(dir.path().join("cache.sqlite"), CompactionPolicy::default())
    }

    #[test]
    fn test_connect_creates_file_and_parent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache.sqlite");
        let store = Store::new(&path, CompactionPolicy::default());

        let conn = store.connect().unwrap();
        drop(conn);

        assert!(path.exists());
    }

    #[test]
    fn test_connect_fails_when_parent_is_a_file() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();
        let store = Store::new(blocker.join("cache.sqlite"), CompactionPolicy::default());

        let result = store.connect();
        assert!(matches!(result, Err(CacheError::ConnectionFailed(_))));
    }

    #[test]
    fn test_get_missing_is_none() {
        let dir = TempDir::new().unwrap();
        let conn = open_store(&dir).connect().unwrap();
        assert_eq!(conn.get("nope").unwrap(), None);
    }

    #[test]
    fn test_upsert_and_get() {
        let dir = TempDir::new().unwrap();
        let mut conn = open_store(&dir).connect().unwrap();
        let expires = t0() + ChronoDuration::days(1);
        let record = Record::new("img", vec![7; 10], PutOptions::new().expires_at(expires), t0());

        conn.upsert(&record).unwrap();

        assert_eq!(conn.get("img").unwrap(), Some(record));
    }

    #[test]
    fn test_upsert_replaces_whole_record() {
        let dir = TempDir::new().unwrap();
        let mut conn = open_store(&dir).connect().unwrap();
        let first = Record::new(
            "note",
            vec![1; 50],
            PutOptions::new().expires_at(t0()).auto_delete(true),
            t0(),
        );
        let second = Record::new(
            "note",
            vec![2; 3],
            PutOptions::new().auto_delete(false),
            t0() + ChronoDuration::seconds(5),
        );

        conn.upsert(&first).unwrap();
        conn.upsert(&second).unwrap();

        let stored = conn.get("note").unwrap().unwrap();
        assert_eq!(stored, second);
        assert!(stored.expires_at.is_none());
        assert_eq!(conn.usage().unwrap().total_entries, 1);
    }

    #[test]
    fn test_records_survive_reconnect() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        {
            let mut conn = store.connect().unwrap();
            conn.upsert(&Record::new("k", vec![9; 4], PutOptions::new(), t0()))
                .unwrap();
        }

        let conn = store.connect().unwrap();
        assert_eq!(conn.get("k").unwrap().unwrap().payload, Some(vec![9; 4]));
    }

    #[test]
    fn test_delete_by_key() {
        let dir = TempDir::new().unwrap();
        let mut conn = open_store(&dir).connect().unwrap();
        conn.upsert(&Record::new("a", vec![0], PutOptions::new(), t0()))
            .unwrap();

        let key = DeletePredicate::Key("a".to_string());
        assert_eq!(conn.delete_where(&key).unwrap(), 1);
        assert_eq!(conn.delete_where(&key).unwrap(), 0);
        assert!(conn.get("a").unwrap().is_none());
    }

    #[test]
    fn test_delete_expired_respects_auto_delete_and_boundary() {
        let dir = TempDir::new().unwrap();
        let mut conn = open_store(&dir).connect().unwrap();
        let past = t0() - ChronoDuration::hours(1);

        conn.upsert(&Record::new("old", vec![0], PutOptions::new().expires_at(past), t0()))
            .unwrap();
        conn.upsert(&Record::new(
            "pinned",
            vec![0],
            PutOptions::new().expires_at(past).auto_delete(false),
            t0(),
        ))
        .unwrap();
        conn.upsert(&Record::new("edge", vec![0], PutOptions::new().expires_at(t0()), t0()))
            .unwrap();
        conn.upsert(&Record::new("forever", vec![0], PutOptions::new(), t0()))
            .unwrap();

        let removed = conn
            .delete_where(&DeletePredicate::ExpiredBefore(t0()))
            .unwrap();

        assert_eq!(removed, 1);
        assert!(conn.get("old").unwrap().is_none());
        assert!(conn.get("pinned").unwrap().is_some());
        assert!(conn.get("edge").unwrap().is_some());
        assert!(conn.get("forever").unwrap().is_some());
    }

    #[test]
    fn test_eviction_snapshot_order_and_filter() {
        let dir = TempDir::new().unwrap();
        let mut conn = open_store(&dir).connect().unwrap();

        conn.upsert(&Record::new("c", vec![0; 3], PutOptions::new(), t0() + ChronoDuration::seconds(2)))
            .unwrap();
        conn.upsert(&Record::new("b", vec![0; 2], PutOptions::new(), t0()))
            .unwrap();
        conn.upsert(&Record::new("a", vec![0; 1], PutOptions::new(), t0()))
            .unwrap();
        conn.upsert(&Record::new(
            "pinned",
            vec![0; 9],
            PutOptions::new().auto_delete(false),
            t0() - ChronoDuration::days(1),
        ))
        .unwrap();

        let keys: Vec<String> = conn
            .auto_delete_by_update_asc()
            .unwrap()
            .into_iter()
            .map(|m| m.key)
            .collect();

        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_usage_totals() {
        let dir = TempDir::new().unwrap();
        let mut conn = open_store(&dir).connect().unwrap();
        conn.upsert(&Record::new("a", vec![0; 100], PutOptions::new(), t0()))
            .unwrap();
        conn.upsert(&Record::new("b", vec![0; 30], PutOptions::new().auto_delete(false), t0()))
            .unwrap();

        let usage = conn.usage().unwrap();
        assert_eq!(
            usage,
            StorageUsage {
                total_entries: 2,
                total_bytes: 130,
                auto_delete_bytes: 100,
            }
        );
    }

    #[test]
    fn test_should_compact_thresholds() {
        let policy = CompactionPolicy::default();
        let mb = 1024 * 1024;

        assert!(!policy.should_compact(0, 0));
        assert!(!policy.should_compact(40 * mb, 1));
        assert!(policy.should_compact(41 * mb, 20 * mb));
        assert!(!policy.should_compact(41 * mb, 21 * mb));
    }

    #[test]
    fn test_connect_compacts_sparse_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.sqlite");
        {
            let mut conn = Store::new(&path, CompactionPolicy::default()).connect().unwrap();
            for i in 0..64 {
                let record = Record::new(format!("blob-{i}"), vec![0xAB; 16 * 1024], PutOptions::new(), t0());
                conn.upsert(&record).unwrap();
            }
            for i in 0..64 {
                conn.delete_where(&DeletePredicate::Key(format!("blob-{i}")))
                    .unwrap();
            }
            let stats = conn.page_stats().unwrap();
            assert!(stats.freelist_count > 0);
            assert!(!conn.was_compacted());
        }

        let tiny = CompactionPolicy {
            high_water_bytes: 4096,
            max_utilization: 0.5,
        };
        let conn = Store::new(&path, tiny).connect().unwrap();

        assert!(conn.was_compacted());
        assert_eq!(conn.page_stats().unwrap().freelist_count, 0);
    }
}
