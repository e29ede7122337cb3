//! Day Change Sweep Task
//!
//! Background task that sweeps expired records each time the calendar day
//! rolls over. The schedule is injected so tests can run it on a short
//! fixed interval instead of waiting for midnight.

use std::time::Duration;

use chrono::{DateTime, Local, TimeZone};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::cache::DataCache;
use crate::error::CacheError;

/// Delay used when local midnight cannot be resolved (e.g. skipped by DST)
const UNRESOLVED_MIDNIGHT_RETRY: Duration = Duration::from_secs(60 * 60);

// == Sweep Schedule ==
/// When the sweep task wakes up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepSchedule {
    /// At every local midnight
    DailyAtMidnight,
    /// On a fixed interval
    Every(Duration),
}

impl SweepSchedule {
    /// Time to sleep before the next sweep, measured from `now`.
    pub fn next_delay(&self, now: &DateTime<Local>) -> Duration {
        match self {
            SweepSchedule::DailyAtMidnight => until_next_day(now),
            SweepSchedule::Every(interval) => *interval,
        }
    }
}

/// Duration from `now` until the start of the following calendar day in
/// `now`'s time zone.
pub fn until_next_day<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    let next_midnight = now
        .date_naive()
        .succ_opt()
        .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
        .and_then(|midnight| now.timezone().from_local_datetime(&midnight).earliest());

    match next_midnight {
        Some(next) => next
            .signed_duration_since(now)
            .to_std()
            .unwrap_or(Duration::ZERO),
        None => UNRESOLVED_MIDNIGHT_RETRY,
    }
}

/// Spawns a background task that calls [`DataCache::sweep_now`] on every
/// tick of `schedule`.
///
/// The task ends by itself once the cache worker has shut down; otherwise
/// abort the returned handle during teardown.
///
/// # Example
/// ```ignore
/// let cache = DataCache::open(&Config::default())?;
/// let sweeper = spawn_day_change_task(cache.clone(), SweepSchedule::DailyAtMidnight);
/// // Later, during shutdown:
/// sweeper.abort();
/// ```
pub fn spawn_day_change_task(cache: DataCache, schedule: SweepSchedule) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting day change sweep task ({:?})", schedule);

        loop {
            let delay = schedule.next_delay(&Local::now());
            tokio::time::sleep(delay).await;

            match cache.sweep_now().await {
                Ok(removed) => debug!("Day change sweep finished: {} removed", removed),
                Err(CacheError::WorkerUnavailable(_)) => {
                    info!("Cache worker stopped; ending day change sweep task");
                    break;
                }
                Err(e) => error!("Day change sweep failed: {}", e),
            }
        }
    })
}
