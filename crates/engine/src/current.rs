//! Per-thread binding of the active transaction
//!
//! Each thread carries at most one active [`TransactionContext`]. TVar
//! accessors find it here instead of having it passed explicitly; nested
//! atomic blocks on the same thread share it. The binding is never visible to
//! other threads.
//!
//! A finished context is parked in a one-slot spare so the next transaction
//! on the thread reuses its read-set and write-set allocations.

use crate::coordinator::TransactionCoordinator;
use std::cell::RefCell;
use tvar_concurrency::TransactionContext;
use tvar_core::{StmError, StmResult};

thread_local! {
    /// Context of the outermost atomic block running on this thread
    static CURRENT: RefCell<Option<TransactionContext>> = const { RefCell::new(None) };

    /// Context kept for reuse by the next transaction on this thread
    static SPARE: RefCell<Option<TransactionContext>> = const { RefCell::new(None) };
}

/// Check whether this thread is inside an atomic block
pub fn in_transaction() -> bool {
    CURRENT.with(|current| current.borrow().is_some())
}

/// Fail with `NoTransaction` unless this thread is inside an atomic block
pub(crate) fn ensure_in_transaction(operation: &'static str) -> StmResult<()> {
    if in_transaction() {
        Ok(())
    } else {
        Err(StmError::no_transaction(operation))
    }
}

/// Run `f` against the active context
///
/// `f` must not call back into TVar accessors.
pub(crate) fn with_current<T, F>(operation: &'static str, f: F) -> StmResult<T>
where
    F: FnOnce(&mut TransactionContext) -> StmResult<T>,
{
    CURRENT.with(|current| match current.borrow_mut().as_mut() {
        Some(txn) => f(txn),
        None => Err(StmError::no_transaction(operation)),
    })
}

/// Start a transaction, reusing this thread's spare context if there is one
pub(crate) fn acquire(coordinator: &TransactionCoordinator) -> TransactionContext {
    match SPARE.with(|spare| spare.borrow_mut().take()) {
        Some(mut txn) => {
            coordinator.reuse_transaction(&mut txn);
            txn
        }
        None => coordinator.start_transaction(),
    }
}

/// Park a finished context for reuse
pub(crate) fn release(txn: TransactionContext) {
    SPARE.with(|spare| *spare.borrow_mut() = Some(txn));
}

/// Binding of an outermost transaction to this thread
///
/// While bound, the context lives in the thread-local slot. If the binding
/// is dropped with the context still bound (the block panicked), the
/// transaction is abandoned and the slot cleared.
pub(crate) struct Binding<'a> {
    coordinator: &'a TransactionCoordinator,
}

impl<'a> Binding<'a> {
    /// Bind `txn` as this thread's active transaction
    pub(crate) fn bind(coordinator: &'a TransactionCoordinator, txn: TransactionContext) -> Self {
        CURRENT.with(|current| *current.borrow_mut() = Some(txn));
        Binding { coordinator }
    }

    /// Take the context out of the thread-local slot
    ///
    /// Nested blocks on this thread would start their own transaction until
    /// the context is restored.
    pub(crate) fn take(&self) -> StmResult<TransactionContext> {
        CURRENT
            .with(|current| current.borrow_mut().take())
            .ok_or_else(|| StmError::aborted("transaction context was unbound"))
    }

    /// Put a context back into the thread-local slot
    pub(crate) fn restore(&self, txn: TransactionContext) {
        CURRENT.with(|current| *current.borrow_mut() = Some(txn));
    }
}

impl Drop for Binding<'_> {
    fn drop(&mut self) {
        let leftover = CURRENT
            .try_with(|current| current.try_borrow_mut().ok().and_then(|mut c| c.take()))
            .ok()
            .flatten();
        if let Some(mut txn) = leftover {
            self.coordinator.abandon(&mut txn, "atomic block panicked");
        }
    }
}

/// Marks the active context as one nesting level deeper for its lifetime
///
/// When dropped during a panic the whole transaction is marked aborted.
pub(crate) struct NestedGuard(());

impl NestedGuard {
    pub(crate) fn enter() -> StmResult<Self> {
        with_current("atomically", |txn| {
            txn.enter_nested();
            Ok(())
        })?;
        Ok(NestedGuard(()))
    }
}

impl Drop for NestedGuard {
    fn drop(&mut self) {
        let panicking = std::thread::panicking();
        let _ = CURRENT.try_with(|current| {
            if let Ok(mut current) = current.try_borrow_mut() {
                if let Some(txn) = current.as_mut() {
                    txn.exit_nested();
                    if panicking {
                        let _ = txn.mark_aborted("nested atomic block panicked");
                    }
                }
            }
        });
    }
}

/// Record that a nested block failed
///
/// The shared transaction can no longer commit, unless the failure came from
/// a conflict, in which case the outermost block retries as usual.
pub(crate) fn fail_nested() {
    let _ = with_current("atomically", |txn| {
        if !txn.is_conflicted() {
            txn.mark_aborted("nested atomic block failed")?;
        }
        Ok(())
    });
}
