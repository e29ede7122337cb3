//! Data Cache
//!
//! Public handle on the cache. Every operation is queued on the serial
//! worker and resolved through a future, so the calling task never blocks on
//! disk I/O.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{info, warn};

use crate::cache::eviction::EvictionReport;
use crate::cache::pending::PendingWrites;
use crate::cache::store::Store;
use crate::cache::worker::{Command, Worker};
use crate::cache::{CacheStats, PutOptions, Record, BYTES_PER_MB};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::{CacheError, Result};

// == Data Cache ==
/// Cloneable handle; all clones share one worker and one budget.
///
/// Operations issued through the same handle run on the store in the order
/// they were issued. The worker exits once every handle is dropped or
/// [`DataCache::shutdown`] is called.
#[derive(Clone)]
pub struct DataCache {
    inner: Arc<Inner>,
}

struct Inner {
    tx: mpsc::UnboundedSender<Command>,
    pending: PendingWrites,
    budget: Arc<AtomicU64>,
    path: PathBuf,
}

impl DataCache {
    // == Open ==
    /// Opens the cache described by `config` using the system clock.
    ///
    /// Starts the worker and queues an initial expiry sweep.
    pub fn open(config: &Config) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Opens the cache with a caller-provided clock.
    pub fn with_clock(config: &Config, clock: impl Clock) -> Result<Self> {
        if config.storage_limit_bytes == 0 {
            return Err(CacheError::InvalidConfiguration(
                "Storage limit must be greater than zero".to_string(),
            ));
        }

        let path = config.cache_path();
        let store = Store::new(&path, config.compaction);
        let budget = Arc::new(AtomicU64::new(config.storage_limit_bytes));
        let (tx, rx) = mpsc::unbounded_channel();

        Worker::new(store, Arc::new(clock), Arc::clone(&budget))
            .spawn(rx)
            .map_err(|e| CacheError::WorkerUnavailable(e.to_string()))?;

        // Fire-and-forget; the worker logs the outcome
        let _ = tx.send(Command::Sweep {
            now: None,
            reply: None,
        });

        info!(
            "Data cache opened at {} with a budget of {} bytes",
            path.display(),
            config.storage_limit_bytes
        );

        Ok(Self {
            inner: Arc::new(Inner {
                tx,
                pending: PendingWrites::new(),
                budget,
                path,
            }),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<Result<T>>) -> Command) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .tx
            .send(command(reply))
            .map_err(|_| CacheError::WorkerUnavailable("cache worker has stopped".to_string()))?;
        rx.await.map_err(|_| {
            CacheError::WorkerUnavailable("cache worker dropped the request".to_string())
        })?
    }

    // == Configure ==
    /// Sets the byte budget used by every following eviction pass.
    ///
    /// Non-positive values are rejected and the previous budget stays in effect.
    pub fn set_storage_limit_bytes(&self, limit_bytes: i64) -> Result<()> {
        if limit_bytes <= 0 {
            warn!("Rejected storage limit of {} bytes; keeping current limit", limit_bytes);
            return Err(CacheError::InvalidConfiguration(format!(
                "Storage limit must be positive, got {} bytes",
                limit_bytes
            )));
        }
        self.inner
            .budget
            .store(limit_bytes as u64, Ordering::Release);
        info!("Storage limit set to {} bytes", limit_bytes);
        Ok(())
    }

    /// Sets the budget in MiB.
    pub fn set_storage_limit_mb(&self, limit_mb: i64) -> Result<()> {
        if limit_mb <= 0 {
            warn!("Rejected storage limit of {} MB; keeping current limit", limit_mb);
            return Err(CacheError::InvalidConfiguration(format!(
                "Storage limit must be positive, got {} MB",
                limit_mb
            )));
        }
        let limit_bytes = limit_mb.checked_mul(BYTES_PER_MB as i64).ok_or_else(|| {
            CacheError::InvalidConfiguration(format!("Storage limit of {} MB overflows", limit_mb))
        })?;
        self.set_storage_limit_bytes(limit_bytes)
    }

    /// Budget currently in effect.
    pub fn storage_limit_bytes(&self) -> u64 {
        self.inner.budget.load(Ordering::Acquire)
    }

    /// Writes queued but not yet finished.
    pub fn pending_writes(&self) -> usize {
        self.inner.pending.in_flight()
    }

    // == Get ==
    /// Looks up `key`. Absence is `Ok(None)`.
    pub async fn get(&self, key: &str) -> Result<Option<Record>> {
        let key = key.to_string();
        self.request(|reply| Command::Get { key, reply }).await
    }

    // == Put ==
    /// Stores `payload` under `key` as auto-delete with no expiry.
    pub async fn put(&self, key: impl Into<String>, payload: impl Into<Vec<u8>>) -> Result<()> {
        self.put_with(key, payload, PutOptions::default()).await
    }

    /// Stores `payload` under `key`, replacing any existing record.
    ///
    /// Resolves once the write has committed. When this write is the last
    /// one in flight, an eviction pass follows on the worker; its outcome is
    /// not part of this result.
    pub async fn put_with(
        &self,
        key: impl Into<String>,
        payload: impl Into<Vec<u8>>,
        options: PutOptions,
    ) -> Result<()> {
        let key = key.into();
        if key.is_empty() {
            return Err(CacheError::InvalidKey("Key cannot be empty".to_string()));
        }
        let payload = payload.into();
        let ticket = self.inner.pending.begin();

        self.request(|reply| Command::Put {
            key,
            payload,
            options,
            ticket,
            reply,
        })
        .await
    }

    // == Delete ==
    /// Removes `key` and returns how many records went away (0 or 1).
    pub async fn delete(&self, key: &str) -> Result<usize> {
        let key = key.to_string();
        self.request(|reply| Command::Delete { key, reply }).await
    }

    // == Sweep ==
    /// Removes auto-delete records that expired before `now`.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        self.request(|reply| Command::Sweep {
            now: Some(now),
            reply: Some(reply),
        })
        .await
    }

    /// Sweeps using the cache clock.
    pub async fn sweep_now(&self) -> Result<usize> {
        self.request(|reply| Command::Sweep {
            now: None,
            reply: Some(reply),
        })
        .await
    }

    // == Trim ==
    /// Runs an eviction pass right away against the current budget.
    pub async fn trim(&self) -> Result<EvictionReport> {
        self.request(|reply| Command::Trim { reply }).await
    }

    // == Stats ==
    pub async fn stats(&self) -> Result<CacheStats> {
        self.request(|reply| Command::Stats { reply }).await
    }

    // == Shutdown ==
    /// Stops the worker after everything queued before this call has run.
    ///
    /// Later operations on any clone fail with `WorkerUnavailable`.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        if self.inner.tx.send(Command::Shutdown { reply }).is_ok() {
            let _ = rx.await;
        }
    }
}
