//! TVar storage cell
//!
//! A [`Slot`] is the shared half of a TVar: one value plus the version
//! counter used for conflict detection, behind a mutex. Slots are only
//! mutated by a committing transaction (see `manager`) or by
//! [`Slot::update_with`], which is itself a single-slot commit.

use crate::clock::advance_global_version;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use tvar_core::{TVarId, Value, Version};

/// Value and version of a slot
#[derive(Debug, Clone, PartialEq)]
pub struct SlotState {
    /// Commit counter, 0 until the first committed change
    pub version: Version,
    /// Current value; `None` for a TVar created without one
    pub value: Option<Value>,
}

impl SlotState {
    /// Install `value` if it differs from the current one
    ///
    /// Returns `true` if the value changed, in which case the version was
    /// incremented by exactly one.
    pub fn install(&mut self, value: Value) -> bool {
        if let Some(current) = &self.value {
            if same_value(current, &value) {
                return false;
            }
        }
        self.value = Some(value);
        self.version += 1;
        true
    }
}

/// Representation equality: floats compare by bit pattern, so `-0.0`
/// differs from `0.0` and a NaN equals the identical NaN.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Float(x), Value::Float(y)) => x.to_bits() == y.to_bits(),
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_value(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, x)| ys.get(k).map_or(false, |y| same_value(x, y)))
        }
        _ => a == b,
    }
}

/// Shared storage cell of a TVar
pub struct Slot {
    id: TVarId,
    state: Mutex<SlotState>,
}

impl Slot {
    /// Create a slot holding `value` at version 0
    pub fn new(value: Option<Value>) -> Arc<Self> {
        Arc::new(Slot {
            id: TVarId::next(),
            state: Mutex::new(SlotState { version: 0, value }),
        })
    }

    /// Identity of this slot
    pub fn id(&self) -> TVarId {
        self.id
    }

    /// Current version
    pub fn version(&self) -> Version {
        self.state.lock().version
    }

    /// Version and value, read atomically
    pub fn load(&self) -> (Version, Option<Value>) {
        let state = self.state.lock();
        (state.version, state.value.clone())
    }

    /// Lock the slot
    ///
    /// When locking several slots, lock them in ascending id order.
    pub fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock()
    }

    /// Atomically replace the value with `f(current)`
    ///
    /// A single-slot commit: runs under the slot lock, bumps the version and
    /// the global clock if the value changed. Returns the value now stored.
    /// If `f` fails nothing is modified.
    pub fn update_with<F, E>(&self, f: F) -> Result<Value, E>
    where
        F: FnOnce(Option<&Value>) -> Result<Value, E>,
    {
        let mut state = self.state.lock();
        let next = f(state.value.as_ref())?;
        if state.install(next.clone()) {
            advance_global_version();
        }
        Ok(next)
    }
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Slot")
            .field("id", &self.id)
            .field("version", &state.version)
            .field("value", &state.value)
            .finish()
    }
}
