//! Transaction coordinator for managing transaction lifecycle
//!
//! The TransactionCoordinator wraps TransactionManager and adds:
//! - Active transaction tracking
//! - Transaction metrics (started, committed, conflicted, aborted)
//! - Lifecycle logging under the `tvar::txn` target
//!
//! A transaction is one outermost `atomically` call. Each conflicted attempt
//! inside it counts as one conflict; the transaction itself ends exactly once,
//! either committed or aborted.

use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace};
use tvar_concurrency::{CommitError, CommitOutcome, TransactionContext, TransactionManager};

/// Transaction coordinator for a runtime
///
/// # Memory Ordering
///
/// The metric counters use Relaxed ordering: they are purely observational
/// and do not synchronize any other memory operations.
pub struct TransactionCoordinator {
    /// Transaction manager for ID allocation and commit
    manager: TransactionManager,
    /// Active transaction count
    active_count: AtomicU64,
    /// Total transactions started
    total_started: AtomicU64,
    /// Total transactions committed
    total_committed: AtomicU64,
    /// Total attempts that hit a conflict and were retried
    total_conflicted: AtomicU64,
    /// Total transactions abandoned
    total_aborted: AtomicU64,
}

impl TransactionCoordinator {
    /// Create new coordinator
    pub fn new() -> Self {
        Self {
            manager: TransactionManager::new(),
            active_count: AtomicU64::new(0),
            total_started: AtomicU64::new(0),
            total_committed: AtomicU64::new(0),
            total_conflicted: AtomicU64::new(0),
            total_aborted: AtomicU64::new(0),
        }
    }

    /// Start a new transaction
    pub fn start_transaction(&self) -> TransactionContext {
        let txn = self.manager.begin();
        self.record_start();
        debug!(target: "tvar::txn", txn_id = txn.txn_id, "Transaction started");
        txn
    }

    /// Start a new transaction in a recycled context
    ///
    /// The context keeps its collection capacity.
    pub fn reuse_transaction(&self, txn: &mut TransactionContext) {
        self.manager.restart(txn);
        self.record_start();
        debug!(target: "tvar::txn", txn_id = txn.txn_id, "Transaction started");
    }

    /// Prepare a conflicted transaction for another attempt
    pub fn retry_transaction(&self, txn: &mut TransactionContext, retry: usize) {
        self.total_conflicted.fetch_add(1, Ordering::Relaxed);
        trace!(target: "tvar::txn", txn_id = txn.txn_id, retry, "Transaction conflicted, retrying");
        self.manager.restart(txn);
    }

    /// Commit a transaction through the concurrency layer
    ///
    /// Records the commit on success. A validation failure leaves the
    /// transaction `Conflicted` and open; the caller either retries or
    /// abandons it.
    pub fn commit(&self, txn: &mut TransactionContext) -> Result<CommitOutcome, CommitError> {
        let outcome = self.manager.commit(txn)?;
        self.record_commit();
        debug!(
            target: "tvar::txn",
            txn_id = txn.txn_id,
            commit_version = outcome.commit_version,
            writes = outcome.writes_applied,
            elapsed_us = txn.elapsed().as_micros() as u64,
            "Transaction committed"
        );
        Ok(outcome)
    }

    /// Abandon a transaction without committing
    pub fn abandon(&self, txn: &mut TransactionContext, reason: &str) {
        // An already-aborted transaction keeps its first reason
        let _ = self.manager.abort(txn, reason);
        self.record_abort();
        debug!(
            target: "tvar::txn",
            txn_id = txn.txn_id,
            reason = txn.abort_reason().unwrap_or(reason),
            "Transaction abandoned"
        );
    }

    /// Record transaction start
    pub fn record_start(&self) {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        self.total_started.fetch_add(1, Ordering::Relaxed);
    }

    /// Record transaction commit
    ///
    /// Decrements active count (saturating at 0) and increments committed count.
    pub fn record_commit(&self) {
        self.decrement_active();
        self.total_committed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record transaction abort
    ///
    /// Decrements active count and increments aborted count.
    pub fn record_abort(&self) {
        self.decrement_active();
        self.total_aborted.fetch_add(1, Ordering::Relaxed);
    }

    fn decrement_active(&self) {
        // Use fetch_update for saturating decrement to prevent underflow
        let _ = self
            .active_count
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |x| {
                Some(x.saturating_sub(1))
            });
    }

    /// Get current active transaction count
    pub fn active_count(&self) -> u64 {
        self.active_count.load(Ordering::Relaxed)
    }

    /// Get transaction metrics
    ///
    /// Returns current snapshot of transaction statistics.
    pub fn metrics(&self) -> TransactionMetrics {
        TransactionMetrics {
            active_count: self.active_count.load(Ordering::Relaxed),
            total_started: self.total_started.load(Ordering::Relaxed),
            total_committed: self.total_committed.load(Ordering::Relaxed),
            total_conflicted: self.total_conflicted.load(Ordering::Relaxed),
            total_aborted: self.total_aborted.load(Ordering::Relaxed),
        }
    }
}

impl Default for TransactionCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

/// Transaction metrics
///
/// Provides statistics about transaction lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionMetrics {
    /// Number of currently active transactions
    pub active_count: u64,
    /// Total number of transactions started
    pub total_started: u64,
    /// Total number of transactions committed
    pub total_committed: u64,
    /// Total number of attempts retried after a conflict
    pub total_conflicted: u64,
    /// Total number of transactions abandoned
    pub total_aborted: u64,
}

impl TransactionMetrics {
    /// Total transactions that completed (committed + aborted)
    pub fn total_completed(&self) -> u64 {
        self.total_committed + self.total_aborted
    }

    /// Commit success rate (committed / started)
    pub fn commit_rate(&self) -> f64 {
        ratio(self.total_committed, self.total_started)
    }

    /// Abort rate (aborted / started)
    pub fn abort_rate(&self) -> f64 {
        ratio(self.total_aborted, self.total_started)
    }

    /// Conflicts per attempt (conflicted / (conflicted + completed))
    pub fn conflict_rate(&self) -> f64 {
        ratio(
            self.total_conflicted,
            self.total_conflicted + self.total_completed(),
        )
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole > 0 {
        part as f64 / whole as f64
    } else {
        0.0
    }
}
