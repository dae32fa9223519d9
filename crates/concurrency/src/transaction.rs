//! Transaction context
//!
//! A [`TransactionContext`] is the per-call-stack record of one atomic block:
//! the TVars it read (with the version and value seen at first read), the
//! values it intends to write, how deeply atomic blocks are nested around it,
//! and where it is in its lifecycle.
//!
//! # Read-Your-Writes
//!
//! When reading a TVar, the context checks in order:
//! 1. **write_set**: the pending value written by this transaction
//! 2. **read_set**: the value snapshotted at first read
//! 3. **slot**: the live value, which is then recorded in the read_set
//!
//! # Consistent Reads
//!
//! Every first read compares the global commit clock with the clock value at
//! which the read-set was last known to be valid. If the clock moved, the
//! read-set is revalidated against the live slots. A mismatch dooms the
//! attempt (`Conflicted`), so a running block never sees a mix of values
//! from before and after another transaction's commit.
//!
//! # Lifecycle
//!
//! ```text
//! Active ──► Validating ──► Committed
//!   │  │          │
//!   │  │          └──────► Conflicted ──► (reset) Active
//!   │  └─────────────────► Conflicted
//!   └────────────────────► Aborted { reason }
//! ```

use crate::clock::global_version;
use crate::slot::Slot;
use crate::validation::{validate_read_set, LiveVersions};
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tvar_core::{StmError, StmResult, TVarId, Value, Version};

/// Status of a transaction in its lifecycle
///
/// Terminal states (no transitions allowed except `reset`):
/// - `Committed`
/// - `Conflicted`
/// - `Aborted`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Block is executing, can read/write
    Active,
    /// Read-set and write-set are being validated
    Validating,
    /// Writes were published
    Committed,
    /// A conflicting commit was detected; the attempt must be retried
    Conflicted,
    /// The transaction was abandoned and will not commit
    Aborted {
        /// Human-readable reason for abort
        reason: String,
    },
}

/// A TVar observed by the transaction
#[derive(Debug, Clone)]
pub struct ReadEntry {
    /// The TVar's storage cell
    pub slot: Arc<Slot>,
    /// Version at first read
    pub version: Version,
    /// Value at first read
    pub value: Option<Value>,
}

/// A TVar the transaction intends to write
#[derive(Debug, Clone)]
pub struct WriteEntry {
    /// The TVar's storage cell
    pub slot: Arc<Slot>,
    /// Version the write is based on
    pub observed_version: Version,
    /// Pending value
    pub value: Value,
}

/// Transaction context for one atomic block
pub struct TransactionContext {
    /// Unique transaction ID
    pub txn_id: u64,

    /// Global commit clock when the attempt began
    pub start_version: u64,

    /// Global commit clock at which the read-set was last validated
    validated_at: u64,

    /// TVars read, with version and value at first read
    read_set: FxHashMap<TVarId, ReadEntry>,

    /// TVars written, with their pending values
    write_set: FxHashMap<TVarId, WriteEntry>,

    /// Number of atomic blocks nested inside the outermost one
    depth: u32,

    /// Current transaction status
    status: TransactionStatus,

    /// When this attempt started
    start_time: Instant,
}

impl TransactionContext {
    /// Create a new active context
    ///
    /// # Arguments
    /// * `txn_id` - Unique transaction identifier
    /// * `start_version` - Global commit clock at transaction start
    pub fn new(txn_id: u64, start_version: u64) -> Self {
        TransactionContext {
            txn_id,
            start_version,
            validated_at: start_version,
            read_set: FxHashMap::default(),
            write_set: FxHashMap::default(),
            depth: 0,
            status: TransactionStatus::Active,
            start_time: Instant::now(),
        }
    }

    // === Read / Write ===

    /// Read a TVar through this transaction
    ///
    /// Returns `Ok(None)` for a TVar that holds no value.
    ///
    /// # Errors
    /// - `StmError::Conflict` if the attempt is (or becomes) doomed
    /// - `StmError::TransactionAborted` if the transaction was abandoned
    pub fn read(&mut self, slot: &Arc<Slot>) -> StmResult<Option<Value>> {
        self.ensure_active()?;
        let id = slot.id();

        if let Some(entry) = self.write_set.get(&id) {
            return Ok(Some(entry.value.clone()));
        }
        if let Some(entry) = self.read_set.get(&id) {
            return Ok(entry.value.clone());
        }

        let (version, value) = slot.load();
        self.read_set.insert(
            id,
            ReadEntry {
                slot: Arc::clone(slot),
                version,
                value: value.clone(),
            },
        );
        self.extend_snapshot()?;
        Ok(value)
    }

    /// Buffer a write of `value` to a TVar
    ///
    /// The value must already have passed admission. The write is not
    /// visible to other transactions until commit.
    ///
    /// # Errors
    /// Same as [`read`](Self::read).
    pub fn write(&mut self, slot: &Arc<Slot>, value: Value) -> StmResult<()> {
        self.ensure_active()?;
        let id = slot.id();

        match self.write_set.entry(id) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().value = value;
            }
            Entry::Vacant(entry) => {
                let observed_version = match self.read_set.get(&id) {
                    Some(read) => read.version,
                    None => slot.version(),
                };
                entry.insert(WriteEntry {
                    slot: Arc::clone(slot),
                    observed_version,
                    value,
                });
            }
        }
        Ok(())
    }

    /// Revalidate the read-set if anything committed since the last check
    fn extend_snapshot(&mut self) -> StmResult<()> {
        let now = global_version();
        if now == self.validated_at {
            return Ok(());
        }

        let result = validate_read_set(&self.read_set, &LiveVersions);
        if !result.is_valid() {
            tracing::trace!(
                target: "tvar::txn",
                txn_id = self.txn_id,
                conflicts = result.conflict_count(),
                "Read-set invalidated during execution"
            );
            self.status = TransactionStatus::Conflicted;
            return Err(StmError::Conflict);
        }
        self.validated_at = now;
        Ok(())
    }

    /// Pending value for a TVar, if this transaction wrote it
    pub fn pending(&self, id: TVarId) -> Option<&Value> {
        self.write_set.get(&id).map(|entry| &entry.value)
    }

    /// Version recorded at first read of a TVar
    pub fn get_read_version(&self, id: TVarId) -> Option<Version> {
        self.read_set.get(&id).map(|entry| entry.version)
    }

    /// TVars read by this transaction
    pub fn read_set(&self) -> &FxHashMap<TVarId, ReadEntry> {
        &self.read_set
    }

    /// TVars written by this transaction
    pub fn write_set(&self) -> &FxHashMap<TVarId, WriteEntry> {
        &self.write_set
    }

    /// Slots of every TVar read or written, possibly with duplicates
    pub fn touched_slots(&self) -> impl Iterator<Item = &Arc<Slot>> {
        self.read_set
            .values()
            .map(|entry| &entry.slot)
            .chain(self.write_set.values().map(|entry| &entry.slot))
    }

    /// Number of TVars read
    pub fn read_count(&self) -> usize {
        self.read_set.len()
    }

    /// Number of TVars written
    pub fn write_count(&self) -> usize {
        self.write_set.len()
    }

    /// Check if the transaction has written nothing
    pub fn is_read_only(&self) -> bool {
        self.write_set.is_empty()
    }

    // === Nesting ===

    /// Enter a nested atomic block
    pub fn enter_nested(&mut self) {
        self.depth += 1;
    }

    /// Leave a nested atomic block
    pub fn exit_nested(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Current nesting depth (0 for the outermost block)
    pub fn depth(&self) -> u32 {
        self.depth
    }

    // === State ===

    /// Current status
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// Check if the transaction can still read and write
    pub fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    /// Check if the transaction committed
    pub fn is_committed(&self) -> bool {
        self.status == TransactionStatus::Committed
    }

    /// Check if the attempt is doomed by a conflict
    pub fn is_conflicted(&self) -> bool {
        self.status == TransactionStatus::Conflicted
    }

    /// Check if the transaction was abandoned
    pub fn is_aborted(&self) -> bool {
        matches!(self.status, TransactionStatus::Aborted { .. })
    }

    /// Reason the transaction was abandoned, if it was
    pub fn abort_reason(&self) -> Option<&str> {
        match &self.status {
            TransactionStatus::Aborted { reason } => Some(reason),
            _ => None,
        }
    }

    /// Time since this attempt started
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Fail unless the transaction is `Active`
    pub fn ensure_active(&self) -> StmResult<()> {
        match &self.status {
            TransactionStatus::Active => Ok(()),
            TransactionStatus::Conflicted => Err(StmError::Conflict),
            TransactionStatus::Aborted { reason } => Err(StmError::aborted(reason.clone())),
            other => Err(StmError::aborted(format!(
                "transaction {} is not active: {:?}",
                self.txn_id, other
            ))),
        }
    }

    /// Transition to Validating state
    ///
    /// # State Transition
    /// `Active` → `Validating`
    pub fn mark_validating(&mut self) -> StmResult<()> {
        self.ensure_active()?;
        self.status = TransactionStatus::Validating;
        Ok(())
    }

    /// Transition to Committed state
    ///
    /// # State Transition
    /// `Validating` → `Committed`
    pub fn mark_committed(&mut self) -> StmResult<()> {
        match &self.status {
            TransactionStatus::Validating => {
                self.status = TransactionStatus::Committed;
                Ok(())
            }
            other => Err(StmError::aborted(format!(
                "cannot commit transaction {} from state {:?}",
                self.txn_id, other
            ))),
        }
    }

    /// Mark the attempt as doomed by a conflict
    ///
    /// Allowed from `Active` and `Validating`; ignored otherwise.
    pub fn mark_conflicted(&mut self) {
        if matches!(
            self.status,
            TransactionStatus::Active | TransactionStatus::Validating
        ) {
            self.status = TransactionStatus::Conflicted;
        }
    }

    /// Abandon the transaction
    ///
    /// Buffered writes are discarded. A transaction that already committed
    /// cannot be aborted; an earlier abort reason is kept.
    pub fn mark_aborted(&mut self, reason: impl Into<String>) -> StmResult<()> {
        match &self.status {
            TransactionStatus::Committed => Err(StmError::aborted(format!(
                "cannot abort committed transaction {}",
                self.txn_id
            ))),
            TransactionStatus::Aborted { .. } => Ok(()),
            _ => {
                self.status = TransactionStatus::Aborted {
                    reason: reason.into(),
                };
                self.write_set.clear();
                Ok(())
            }
        }
    }

    /// Reset for a fresh attempt, keeping allocated capacity
    ///
    /// Clears the read-set and write-set and returns to `Active`. The
    /// nesting depth is preserved.
    pub fn reset(&mut self, txn_id: u64, start_version: u64) {
        self.txn_id = txn_id;
        self.start_version = start_version;
        self.validated_at = start_version;
        self.read_set.clear();
        self.write_set.clear();
        self.status = TransactionStatus::Active;
        self.start_time = Instant::now();
    }

    /// Take the write-set, leaving it empty
    pub(crate) fn take_writes(&mut self) -> FxHashMap<TVarId, WriteEntry> {
        std::mem::take(&mut self.write_set)
    }
}

impl std::fmt::Debug for TransactionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionContext")
            .field("txn_id", &self.txn_id)
            .field("start_version", &self.start_version)
            .field("reads", &self.read_set.len())
            .field("writes", &self.write_set.len())
            .field("depth", &self.depth)
            .field("status", &self.status)
            .finish()
    }
}
