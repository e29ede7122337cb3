//! Serial Worker
//!
//! A single dedicated thread that owns every interaction with the store.
//! Commands are executed one at a time in submission order, each on its own
//! short-lived connection.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use crate::cache::eviction::{self, EvictionReport};
use crate::cache::pending::WriteTicket;
use crate::cache::store::{DeletePredicate, Store};
use crate::cache::{sweeper, CacheStats, PutOptions, Record};
use crate::clock::Clock;
use crate::error::Result;

type Reply<T> = oneshot::Sender<Result<T>>;

// == Command ==
/// Work items accepted by the serial worker.
pub(crate) enum Command {
    Get {
        key: String,
        reply: Reply<Option<Record>>,
    },
    Put {
        key: String,
        payload: Vec<u8>,
        options: PutOptions,
        ticket: WriteTicket,
        reply: Reply<()>,
    },
    Delete {
        key: String,
        reply: Reply<usize>,
    },
    /// `now` of `None` means the worker clock; `reply` of `None` means nobody waits
    Sweep {
        now: Option<DateTime<Utc>>,
        reply: Option<Reply<usize>>,
    },
    Trim {
        reply: Reply<EvictionReport>,
    },
    Stats {
        reply: Reply<CacheStats>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

// == Worker ==
pub(crate) struct Worker {
    store: Store,
    clock: Arc<dyn Clock>,
    budget: Arc<AtomicU64>,
    stats: CacheStats,
}

impl Worker {
    pub(crate) fn new(store: Store, clock: Arc<dyn Clock>, budget: Arc<AtomicU64>) -> Self {
        Self {
            store,
            clock,
            budget,
            stats: CacheStats::new(),
        }
    }

    /// Starts the worker thread. It exits when every sender is dropped or a
    /// `Shutdown` command is processed.
    pub(crate) fn spawn(self, rx: mpsc::UnboundedReceiver<Command>) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("anydata-cache-worker".to_string())
            .spawn(move || self.run(rx))
    }

    fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        info!("Cache worker started for {}", self.store.path().display());

        while let Some(command) = rx.blocking_recv() {
            match command {
                Command::Get { key, reply } => {
                    let _ = reply.send(self.get(&key));
                }
                Command::Put {
                    key,
                    payload,
                    options,
                    ticket,
                    reply,
                } => {
                    let _ = reply.send(self.put(key, payload, options));
                    // Eviction waits until the current run of writes has drained
                    if ticket.complete() {
                        if let Err(e) = self.enforce_budget() {
                            error!("Eviction pass failed: {}", e);
                        }
                    }
                }
                Command::Delete { key, reply } => {
                    let _ = reply.send(self.delete(&key));
                }
                Command::Sweep { now, reply } => {
                    let now = now.unwrap_or_else(|| self.clock.now());
                    let result = sweeper::sweep(&self.store, now);
                    match &result {
                        Ok(removed) => self.stats.record_expired(*removed),
                        Err(e) => error!("Expiry sweep failed: {}", e),
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(result);
                    }
                }
                Command::Trim { reply } => {
                    let _ = reply.send(self.enforce_budget());
                }
                Command::Stats { reply } => {
                    let _ = reply.send(self.snapshot_stats());
                }
                Command::Shutdown { reply } => {
                    let _ = reply.send(());
                    break;
                }
            }
        }

        info!("Cache worker stopped");
    }

    fn get(&mut self, key: &str) -> Result<Option<Record>> {
        let found = self.store.connect()?.get(key)?;
        self.stats.record_lookup(found.is_some());
        Ok(found)
    }

    fn put(&mut self, key: String, payload: Vec<u8>, options: PutOptions) -> Result<()> {
        let record = Record::new(key, payload, options, self.clock.now());
        let result = self
            .store
            .connect()
            .and_then(|mut conn| conn.upsert(&record));
        self.stats.record_write(result.is_ok());
        result
    }

    fn delete(&mut self, key: &str) -> Result<usize> {
        let removed = self
            .store
            .connect()?
            .delete_where(&DeletePredicate::Key(key.to_string()))?;
        self.stats.record_deletes(removed);
        debug!("Deleted '{}': {} record(s)", key, removed);
        Ok(removed)
    }

    // == Enforce Budget ==
    /// Runs the eviction policy over a fresh snapshot against the current budget.
    fn enforce_budget(&mut self) -> Result<EvictionReport> {
        let budget = self.budget.load(Ordering::Acquire);
        let mut conn = self.store.connect()?;
        let snapshot = conn.auto_delete_by_update_asc()?;

        let report = eviction::run(&snapshot, budget, |meta| {
            conn.delete_where(&DeletePredicate::Key(meta.key.clone()))
                .map(|_| ())
        });

        self.stats
            .record_eviction_pass(report.evicted.len(), report.failed.len());
        if report.evicted.is_empty() {
            debug!(
                "Eviction: {} auto-delete bytes within budget of {}",
                report.remaining_bytes, budget
            );
        } else {
            info!(
                "Eviction: removed {} records ({} bytes), {} bytes remain of {} budget",
                report.evicted.len(),
                report.bytes_freed,
                report.remaining_bytes,
                budget
            );
        }
        Ok(report)
    }

    fn snapshot_stats(&self) -> Result<CacheStats> {
        let usage = self.store.connect()?.usage()?;
        let mut stats = self.stats.clone();
        stats.set_usage(usage, self.budget.load(Ordering::Acquire));
        Ok(stats)
    }
}
