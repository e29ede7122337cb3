//! AnyData Cache - a local, disk-backed cache for arbitrary binary blobs
//!
//! Provides keyed blob storage with time-based expiry and a total-size
//! budget enforced by evicting the oldest auto-delete records.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{DataCache, PutOptions, Record};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use error::{CacheError, Result};
pub use tasks::{spawn_day_change_task, SweepSchedule};
