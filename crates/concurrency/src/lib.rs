//! Concurrency layer for transactional variables
//!
//! This crate implements optimistic concurrency control (OCC) over TVar
//! slots:
//! - Slot: per-TVar value and version behind a mutex
//! - TransactionContext: read/write set tracking with consistent reads
//! - Validation: version checks against live or locked slots
//! - TransactionManager: ordered locking and atomic commit
//!
//! The global commit clock lives in [`clock`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod manager;
pub mod slot;
pub mod transaction;
pub mod validation;

pub use clock::global_version;
pub use manager::{CommitError, CommitOutcome, TransactionManager};
pub use slot::{Slot, SlotState};
pub use transaction::{ReadEntry, TransactionContext, TransactionStatus, WriteEntry};
pub use validation::{
    validate_read_set, validate_transaction, validate_write_set, ConflictType, LiveVersions,
    ValidationResult, VersionSource,
};
