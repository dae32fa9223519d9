//! Transaction validation
//!
//! A transaction may commit only if every TVar it touched is still at the
//! version it observed:
//! - read-set: the version snapshotted at first read
//! - write-set: the version that informed the write (the read version if the
//!   TVar was read first, otherwise the live version at first write)
//!
//! Validation compares observed versions against a [`VersionSource`]. At
//! commit time the source is the set of slots locked by the committer; while
//! a transaction is still running it is the live slots.

use crate::slot::Slot;
use crate::transaction::{ReadEntry, TransactionContext, WriteEntry};
use rustc_hash::FxHashMap;
use tvar_core::{TVarId, Version};

/// Types of conflicts that can occur during transaction validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// A TVar was read at one version but has since been committed to
    ReadWriteConflict {
        /// The TVar that changed
        tvar: TVarId,
        /// Version recorded at first read
        read_version: Version,
        /// Version found at validation time
        current_version: Version,
    },

    /// A TVar was written based on a version that is no longer current
    StaleWrite {
        /// The TVar that changed
        tvar: TVarId,
        /// Version the write was based on
        observed_version: Version,
        /// Version found at validation time
        current_version: Version,
    },
}

impl ConflictType {
    /// The TVar involved in the conflict
    pub fn tvar(&self) -> TVarId {
        match self {
            ConflictType::ReadWriteConflict { tvar, .. } => *tvar,
            ConflictType::StaleWrite { tvar, .. } => *tvar,
        }
    }
}

/// Result of transaction validation
///
/// Accumulates all conflicts found during validation.
/// A transaction commits only if is_valid() returns true.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// All conflicts detected during validation
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// Create a successful validation result (no conflicts)
    pub fn ok() -> Self {
        ValidationResult {
            conflicts: Vec::new(),
        }
    }

    /// Create a validation result with a single conflict
    pub fn conflict(conflict: ConflictType) -> Self {
        ValidationResult {
            conflicts: vec![conflict],
        }
    }

    /// Check if validation passed (no conflicts)
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Merge another validation result into this one
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    /// Get the number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }
}

/// Source of current slot versions
pub trait VersionSource {
    /// Current version of `slot`
    fn version_of(&self, slot: &Slot) -> Version;
}

/// Reads versions straight from the slots, locking each one briefly
///
/// Must not be used while the caller holds any slot lock.
#[derive(Debug, Clone, Copy, Default)]
pub struct LiveVersions;

impl VersionSource for LiveVersions {
    fn version_of(&self, slot: &Slot) -> Version {
        slot.version()
    }
}

/// Validate the read-set against current versions
pub fn validate_read_set<S: VersionSource>(
    read_set: &FxHashMap<TVarId, ReadEntry>,
    source: &S,
) -> ValidationResult {
    let mut result = ValidationResult::ok();

    for (id, entry) in read_set {
        let current_version = source.version_of(&entry.slot);
        if current_version != entry.version {
            result.conflicts.push(ConflictType::ReadWriteConflict {
                tvar: *id,
                read_version: entry.version,
                current_version,
            });
        }
    }

    result
}

/// Validate the write-set against current versions
///
/// TVars present in both sets are reported once, by the read-set check.
pub fn validate_write_set<S: VersionSource>(
    write_set: &FxHashMap<TVarId, WriteEntry>,
    read_set: &FxHashMap<TVarId, ReadEntry>,
    source: &S,
) -> ValidationResult {
    let mut result = ValidationResult::ok();

    for (id, entry) in write_set {
        if read_set.contains_key(id) {
            continue;
        }
        let current_version = source.version_of(&entry.slot);
        if current_version != entry.observed_version {
            result.conflicts.push(ConflictType::StaleWrite {
                tvar: *id,
                observed_version: entry.observed_version,
                current_version,
            });
        }
    }

    result
}

/// Validate a complete transaction
///
/// 1. Validates read-set: every TVar read is still at its read version
/// 2. Validates write-set: every TVar written is still at the version that
///    informed the write
pub fn validate_transaction<S: VersionSource>(
    txn: &TransactionContext,
    source: &S,
) -> ValidationResult {
    let mut result = validate_read_set(txn.read_set(), source);
    result.merge(validate_write_set(txn.write_set(), txn.read_set(), source));
    result
}
