//! Expiry Sweeper
//!
//! Removes auto-delete records whose expiry has passed.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::cache::store::{DeletePredicate, Store};
use crate::error::Result;

/// Deletes, in one transaction, every auto-delete record with
/// `expires_at < now`. Returns the number removed.
///
/// Running it again with the same `now` and no new writes removes nothing.
pub fn sweep(store: &Store, now: DateTime<Utc>) -> Result<usize> {
    let mut conn = store.connect()?;
    let removed = conn.delete_where(&DeletePredicate::ExpiredBefore(now))?;

    if removed > 0 {
        info!("Expiry sweep: removed {} expired records", removed);
    } else {
        debug!("Expiry sweep: no expired records found");
    }
    Ok(removed)
}
