//! In-flight write tracking.
//!
//! Every queued write holds a [`WriteTicket`]. The ticket that brings the
//! counter back to zero marks the end of a batch, which is when eviction runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Counter of writes that have been submitted but not yet finished.
#[derive(Debug, Clone, Default)]
pub struct PendingWrites {
    count: Arc<AtomicUsize>,
}

impl PendingWrites {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new write and returns its ticket.
    pub fn begin(&self) -> WriteTicket {
        self.count.fetch_add(1, Ordering::AcqRel);
        WriteTicket {
            count: Arc::clone(&self.count),
            released: false,
        }
    }

    /// Writes currently in flight.
    pub fn in_flight(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

/// Slot held by one in-flight write.
///
/// Dropping a ticket without calling [`WriteTicket::complete`] still frees
/// its slot, so a write that never runs cannot hold eviction back.
#[derive(Debug)]
pub struct WriteTicket {
    count: Arc<AtomicUsize>,
    released: bool,
}

impl WriteTicket {
    /// Releases the slot. Returns true if this was the last write in flight.
    pub fn complete(mut self) -> bool {
        self.released = true;
        self.count.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

impl Drop for WriteTicket {
    fn drop(&mut self) {
        if !self.released {
            self.count.fetch_sub(1, Ordering::AcqRel);
        }
    }
}
