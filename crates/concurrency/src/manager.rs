//! Transaction manager for coordinating commit operations
//!
//! ## Commit Sequence
//!
//! ```text
//! 1. mark_validating()      - Active → Validating
//! 2. lock touched slots     - ascending TVarId order
//! 3. validate_transaction() - against the locked versions
//! 4. IF conflicts: unlock, mark_conflicted(), return error
//! 5. install writes         - version +1 only where the value changed
//! 6. advance global clock   - only if something was installed
//! 7. unlock, mark_committed()
//! ```
//!
//! Committers lock in a single global order and running transactions never
//! hold more than one slot lock at a time, so commits cannot deadlock.
//! Validation and installation happen under the same locks, which makes the
//! whole commit atomic with respect to every other commit and every read.

use crate::clock::{advance_global_version, global_version};
use crate::slot::{Slot, SlotState};
use crate::transaction::TransactionContext;
use crate::validation::{validate_transaction, ValidationResult, VersionSource};
use parking_lot::MutexGuard;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tvar_core::{StmError, StmResult, TVarId, Version};

/// Errors that can occur during commit
#[derive(Debug, Clone)]
pub enum CommitError {
    /// A TVar in the read-set or write-set changed since it was observed
    ValidationFailed(ValidationResult),

    /// Transaction was not in a state that allows commit
    InvalidState(String),
}

impl std::fmt::Display for CommitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommitError::ValidationFailed(result) => {
                write!(f, "Commit failed: {} conflict(s)", result.conflict_count())
            }
            CommitError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
        }
    }
}

impl std::error::Error for CommitError {}

impl From<CommitError> for StmError {
    fn from(e: CommitError) -> Self {
        match e {
            CommitError::ValidationFailed(_) => StmError::Conflict,
            CommitError::InvalidState(msg) => StmError::TransactionAborted { reason: msg },
        }
    }
}

/// Result of a successful commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOutcome {
    /// Global clock after the commit
    ///
    /// Equal to the clock at commit time if nothing was installed.
    pub commit_version: u64,
    /// Number of TVars whose value changed
    pub writes_applied: usize,
}

/// Slot locks held by a committer, sorted by TVar id
struct LockedSlots<'a> {
    guards: SmallVec<[(TVarId, MutexGuard<'a, SlotState>); 8]>,
}

impl<'a> LockedSlots<'a> {
    /// Lock `slots`, which must be sorted by id and free of duplicates
    fn lock(slots: &'a [Arc<Slot>]) -> Self {
        LockedSlots {
            guards: slots.iter().map(|slot| (slot.id(), slot.lock())).collect(),
        }
    }

    fn position(&self, id: TVarId) -> Option<usize> {
        self.guards.binary_search_by_key(&id, |(gid, _)| *gid).ok()
    }

    fn state_mut(&mut self, id: TVarId) -> Option<&mut SlotState> {
        let idx = self.position(id)?;
        Some(&mut *self.guards[idx].1)
    }
}

impl VersionSource for LockedSlots<'_> {
    fn version_of(&self, slot: &Slot) -> Version {
        match self.position(slot.id()) {
            Some(idx) => self.guards[idx].1.version,
            None => slot.version(),
        }
    }
}

/// Manages transaction identity and atomic commits
pub struct TransactionManager {
    /// Next transaction ID
    next_txn_id: AtomicU64,
}

impl TransactionManager {
    /// Create a new transaction manager
    pub fn new() -> Self {
        TransactionManager {
            next_txn_id: AtomicU64::new(1),
        }
    }

    /// Allocate next transaction ID
    pub fn next_txn_id(&self) -> u64 {
        self.next_txn_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Current value of the global commit clock
    pub fn current_version(&self) -> u64 {
        global_version()
    }

    /// Start a new transaction
    pub fn begin(&self) -> TransactionContext {
        TransactionContext::new(self.next_txn_id(), global_version())
    }

    /// Reset `txn` for another attempt with a fresh id and start version
    pub fn restart(&self, txn: &mut TransactionContext) {
        txn.reset(self.next_txn_id(), global_version());
    }

    /// Commit a transaction atomically
    ///
    /// # Returns
    /// - `Ok(CommitOutcome)` on success; the transaction is `Committed`
    /// - `Err(CommitError::ValidationFailed)` on conflict; the transaction is
    ///   `Conflicted` and nothing was installed
    /// - `Err(CommitError::InvalidState)` if the transaction was not `Active`
    pub fn commit(&self, txn: &mut TransactionContext) -> Result<CommitOutcome, CommitError> {
        txn.mark_validating()
            .map_err(|e| CommitError::InvalidState(e.to_string()))?;

        let mut slots: SmallVec<[Arc<Slot>; 8]> = txn.touched_slots().cloned().collect();
        slots.sort_by_key(|slot| slot.id());
        slots.dedup_by_key(|slot| slot.id());

        let mut locked = LockedSlots::lock(&slots);

        let result = validate_transaction(txn, &locked);
        if !result.is_valid() {
            drop(locked);
            tracing::trace!(
                target: "tvar::txn",
                txn_id = txn.txn_id,
                conflicts = result.conflict_count(),
                "Commit validation failed"
            );
            txn.mark_conflicted();
            return Err(CommitError::ValidationFailed(result));
        }

        let mut writes_applied = 0;
        for (id, entry) in txn.take_writes() {
            if let Some(state) = locked.state_mut(id) {
                if state.install(entry.value) {
                    writes_applied += 1;
                }
            }
        }

        let commit_version = if writes_applied > 0 {
            advance_global_version()
        } else {
            global_version()
        };
        drop(locked);

        txn.mark_committed()
            .map_err(|e| CommitError::InvalidState(e.to_string()))?;

        Ok(CommitOutcome {
            commit_version,
            writes_applied,
        })
    }

    /// Explicitly abort a transaction
    ///
    /// All buffered writes are discarded.
    pub fn abort(&self, txn: &mut TransactionContext, reason: impl Into<String>) -> StmResult<()> {
        txn.mark_aborted(reason)
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
