//! Identifier and version types
//!
//! - TVarId: process-unique identity of a transactional variable
//! - Version: per-TVar commit counter

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Per-TVar version counter
///
/// Starts at 0 when the TVar is created and is incremented exactly once by
/// every commit that changes the TVar's value.
pub type Version = u64;

static NEXT_TVAR_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier of a transactional variable
///
/// Ids are allocated from a process-wide counter and never reused. Their
/// ordering is the global lock order used at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TVarId(u64);

impl TVarId {
    /// Allocate a fresh id
    pub fn next() -> Self {
        Self(NEXT_TVAR_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a raw id (tests and diagnostics only; does not reserve it)
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TVarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tvar#{}", self.0)
    }
}
