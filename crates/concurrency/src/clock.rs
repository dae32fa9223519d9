//! Global commit clock
//!
//! A single process-wide counter advanced by every commit that installs at
//! least one value. It orders commits and lets a running transaction notice,
//! with one atomic load, that something may have changed since it last
//! validated its reads.
//!
//! The clock is advanced while the committing side still holds the locks of
//! every slot it wrote. A reader that observes a newly installed value is
//! therefore guaranteed to observe the advanced clock as well.

use std::sync::atomic::{AtomicU64, Ordering};

static GLOBAL_VERSION: AtomicU64 = AtomicU64::new(0);

/// Current value of the global commit clock
pub fn global_version() -> u64 {
    GLOBAL_VERSION.load(Ordering::SeqCst)
}

/// Advance the clock by one and return the new value
///
/// Callers must hold the locks of every slot whose value they installed.
pub(crate) fn advance_global_version() -> u64 {
    GLOBAL_VERSION.fetch_add(1, Ordering::SeqCst) + 1
}
