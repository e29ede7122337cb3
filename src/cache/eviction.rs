//! Eviction Policy
//!
//! Decides which auto-delete records to drop when their combined size
//! exceeds the storage budget. The policy itself is pure; removal is
//! delegated to a caller-supplied closure so a failing delete can be
//! skipped without aborting the pass.

use tracing::warn;

use crate::cache::RecordMeta;
use crate::error::Result;

// == Eviction Report ==
/// Outcome of one eviction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvictionReport {
    /// Keys removed, in removal order
    pub evicted: Vec<String>,
    /// Keys whose removal failed and were skipped
    pub failed: Vec<String>,
    /// Bytes released by the removed records
    pub bytes_freed: u64,
    /// Auto-delete bytes still stored after the pass
    pub remaining_bytes: u64,
}

impl EvictionReport {
    /// True if the pass brought usage within `budget`.
    pub fn within_budget(&self, budget: u64) -> bool {
        self.remaining_bytes <= budget
    }
}

// == Run ==
/// Walks `snapshot` oldest-first, removing records while the running total
/// exceeds `budget`.
///
/// `snapshot` must hold only auto-delete records, already ordered by
/// `updated_at` ascending with ties broken by key. A candidate whose
/// `remove` call fails is logged and skipped; the pass then moves on to the
/// next candidate. The pass stops once the budget is met or the snapshot is
/// exhausted.
pub fn run<F>(snapshot: &[RecordMeta], budget: u64, mut remove: F) -> EvictionReport
where
    F: FnMut(&RecordMeta) -> Result<()>,
{
    let mut total: u64 = snapshot.iter().map(|m| m.size_bytes).sum();
    let mut report = EvictionReport::default();

    for candidate in snapshot {
        if total <= budget {
            break;
        }
        match remove(candidate) {
            Ok(()) => {
                total = total.saturating_sub(candidate.size_bytes);
                report.bytes_freed += candidate.size_bytes;
                report.evicted.push(candidate.key.clone());
            }
            Err(e) => {
                warn!("Failed to evict '{}': {}", candidate.key, e);
                report.failed.push(candidate.key.clone());
            }
        }
    }

    report.remaining_bytes = total;
    report
}

// == Plan ==
/// Keys that a pass with infallible removal would evict.
pub fn plan(snapshot: &[RecordMeta], budget: u64) -> Vec<String> {
    run(snapshot, budget, |_| Ok(())).evicted
}
