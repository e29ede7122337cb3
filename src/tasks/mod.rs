//! Background Tasks Module
//!
//! Contains background tasks that run alongside the cache.
//!
//! # Tasks
//! - Day change: sweeps expired records whenever the calendar day rolls over

mod day_change;

pub use day_change::{spawn_day_change_task, until_next_day, SweepSchedule};
