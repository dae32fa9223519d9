//! Value admission policies
//!
//! Before a value enters a TVar (at construction) or a transaction's
//! write-set (at write time) it is checked exactly once by an
//! [`AdmissionPolicy`]. A rejected value is never buffered and never becomes
//! visible to another execution context.
//!
//! Policies are plain synchronous checks and never require an active
//! transaction.

use crate::limits::{LimitError, Limits};
use crate::Value;
use thiserror::Error;

/// Why a value was refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The value exceeds the configured size limits
    #[error("value exceeds limits: {0}")]
    Limit(#[from] LimitError),

    /// The value's kind may not be shared between execution contexts
    #[error("{type_name} values are not shareable under policy {policy}")]
    NotShareable {
        /// Policy that refused the value
        policy: &'static str,
        /// Type name of the refused value
        type_name: &'static str,
    },

    /// A custom policy refused the value
    #[error("value rejected by {policy}: {reason}")]
    Rejected {
        /// Policy that refused the value
        policy: &'static str,
        /// Human-readable reason
        reason: String,
    },
}

/// Decides whether a value may be stored in a TVar
pub trait AdmissionPolicy: Send + Sync {
    /// Short name used in errors and logs
    fn name(&self) -> &'static str;

    /// Check a candidate value
    fn check(&self, value: &Value) -> Result<(), AdmissionError>;

    /// `true` if [`check`](Self::check) accepts the value
    fn is_admissible(&self, value: &Value) -> bool {
        self.check(value).is_ok()
    }
}

/// Default policy: admit any value within [`Limits`]
#[derive(Debug, Clone, Default)]
pub struct LimitsPolicy {
    limits: Limits,
}

impl LimitsPolicy {
    /// Create a policy enforcing `limits`
    pub fn new(limits: Limits) -> Self {
        Self { limits }
    }

    /// The enforced limits
    pub fn limits(&self) -> &Limits {
        &self.limits
    }
}

impl AdmissionPolicy for LimitsPolicy {
    fn name(&self) -> &'static str {
        "limits"
    }

    fn check(&self, value: &Value) -> Result<(), AdmissionError> {
        self.limits.validate_value(value).map_err(AdmissionError::from)
    }
}

/// Admit only scalar values; `Array` and `Object` are refused
///
/// Containers are the values a worker would naturally keep mutating after
/// handing them over, so this policy only lets flat values through.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarOnly;

impl AdmissionPolicy for ScalarOnly {
    fn name(&self) -> &'static str {
        "scalar-only"
    }

    fn check(&self, value: &Value) -> Result<(), AdmissionError> {
        if value.is_container() {
            return Err(AdmissionError::NotShareable {
                policy: self.name(),
                type_name: value.type_name(),
            });
        }
        Ok(())
    }
}

/// Admit every value
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmitAll;

impl AdmissionPolicy for AdmitAll {
    fn name(&self) -> &'static str {
        "admit-all"
    }

    fn check(&self, _value: &Value) -> Result<(), AdmissionError> {
        Ok(())
    }
}

/// Policy backed by a predicate closure
pub struct FnPolicy<F> {
    name: &'static str,
    predicate: F,
}

impl<F> FnPolicy<F>
where
    F: Fn(&Value) -> bool + Send + Sync,
{
    /// Create a named policy from a predicate
    pub fn new(name: &'static str, predicate: F) -> Self {
        Self { name, predicate }
    }
}

impl<F> AdmissionPolicy for FnPolicy<F>
where
    F: Fn(&Value) -> bool + Send + Sync,
{
    fn name(&self) -> &'static str {
        self.name
    }

    fn check(&self, value: &Value) -> Result<(), AdmissionError> {
        if (self.predicate)(value) {
            Ok(())
        } else {
            Err(AdmissionError::Rejected {
                policy: self.name,
                reason: format!("{} value refused", value.type_name()),
            })
        }
    }
}
