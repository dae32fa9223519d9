//! The public TVar handle
//!
//! A [`TVar`] is a cheap, cloneable reference to one transactional cell.
//! Clones share the cell, so handing a clone to another thread is how a
//! TVar crosses execution contexts.
//!
//! Reads and writes go through the transaction bound to the calling thread
//! and fail with [`StmError::NoTransaction`] outside an atomic block. The
//! check happens before the value is looked at or admitted.

use crate::current;
use crate::stm::Stm;
use std::fmt;
use std::sync::Arc;
use tvar_concurrency::Slot;
use tvar_core::{
    AdmissionPolicy, ArithmeticError, StmError, StmResult, TVarId, Value, Version,
};

/// A transactional variable
#[derive(Clone)]
pub struct TVar {
    slot: Arc<Slot>,
    policy: Arc<dyn AdmissionPolicy>,
}

impl TVar {
    /// Create a TVar holding `value` in the global runtime
    ///
    /// # Errors
    /// `StmError::Admission` if the value is refused; no TVar is created.
    pub fn new(value: impl Into<Value>) -> StmResult<Self> {
        Self::new_in(Stm::global(), value)
    }

    /// Create a TVar with no value in the global runtime
    ///
    /// Reading it inside a transaction yields `None`.
    pub fn empty() -> Self {
        Self::empty_in(Stm::global())
    }

    /// Create a TVar holding `value`, admitted by `stm`'s policy
    pub fn new_in(stm: &Stm, value: impl Into<Value>) -> StmResult<Self> {
        let value = value.into();
        stm.policy().check(&value)?;
        Ok(TVar {
            slot: Slot::new(Some(value)),
            policy: Arc::clone(stm.policy()),
        })
    }

    /// Create a TVar with no value, using `stm`'s policy for later writes
    pub fn empty_in(stm: &Stm) -> Self {
        TVar {
            slot: Slot::new(None),
            policy: Arc::clone(stm.policy()),
        }
    }

    /// Read the value through the current transaction
    ///
    /// Returns the pending write if this transaction wrote the TVar,
    /// otherwise the value seen at this transaction's first read of it.
    ///
    /// # Errors
    /// - `StmError::NoTransaction` outside an atomic block
    /// - `StmError::Conflict` if the attempt was overtaken by another commit
    pub fn read(&self) -> StmResult<Option<Value>> {
        current::with_current("read", |txn| txn.read(&self.slot))
    }

    /// Write a value through the current transaction
    ///
    /// The value becomes visible to other threads only when the outermost
    /// atomic block commits.
    ///
    /// # Errors
    /// - `StmError::NoTransaction` outside an atomic block
    /// - `StmError::Admission` if the value is refused; nothing is recorded
    ///   and the enclosing transaction is abandoned
    /// - `StmError::Conflict` if the attempt was overtaken by another commit
    pub fn write(&self, value: impl Into<Value>) -> StmResult<()> {
        current::ensure_in_transaction("write")?;
        let value = value.into();
        if let Err(e) = self.policy.check(&value) {
            // A refusal dooms the whole transaction, even if the block
            // swallows the error
            current::with_current("write", |txn| {
                if !txn.is_conflicted() {
                    txn.mark_aborted("value not admissible")?;
                }
                Ok(())
            })?;
            return Err(e.into());
        }
        current::with_current("write", |txn| txn.write(&self.slot, value))
    }

    /// Add `delta` to a numeric value and return the new value
    ///
    /// Inside a transaction this is `write(read() + delta)`. Outside any
    /// transaction it is a single-TVar atomic update applied immediately.
    /// `Int + Int` stays `Int`; a `Float` on either side gives a `Float`.
    ///
    /// # Errors
    /// - `StmError::TypeMismatch` if the TVar is empty or not numeric
    /// - `StmError::Overflow` if integer addition overflows; the TVar is
    ///   left untouched
    pub fn increment(&self, delta: impl Into<Value>) -> StmResult<Value> {
        let delta = delta.into();
        if current::in_transaction() {
            let next = add(self.read()?.as_ref(), &delta)?;
            self.write(next.clone())?;
            return Ok(next);
        }
        self.slot.update_with(|current| {
            let next = add(current, &delta)?;
            self.policy.check(&next)?;
            Ok(next)
        })
    }

    /// Current committed value, outside any transaction
    ///
    /// Not part of any transaction and not validated; intended for
    /// diagnostics and tests.
    pub fn snapshot(&self) -> Option<Value> {
        self.slot.load().1
    }

    /// Number of committed changes to this TVar
    pub fn version(&self) -> Version {
        self.slot.version()
    }

    /// Identity of this TVar
    pub fn id(&self) -> TVarId {
        self.slot.id()
    }

    /// Check whether two handles refer to the same TVar
    pub fn same_as(&self, other: &TVar) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl fmt::Debug for TVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TVar")
            .field("id", &self.id())
            .field("version", &self.version())
            .finish()
    }
}

fn add(current: Option<&Value>, delta: &Value) -> StmResult<Value> {
    let current = current.ok_or(StmError::TypeMismatch {
        expected: "Int or Float",
        actual: "empty",
    })?;
    current.checked_add(delta).map_err(|e| match e {
        ArithmeticError::NotNumeric { type_name } => StmError::TypeMismatch {
            expected: "Int or Float",
            actual: type_name,
        },
        ArithmeticError::Overflow => StmError::Overflow,
    })
}
