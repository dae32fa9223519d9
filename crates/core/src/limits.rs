//! Size limits for values stored in TVars
//!
//! The default admission policy rejects values that exceed these limits, so
//! an oversized or pathologically nested value never enters a transaction.
//! Custom limits are set through the `[limits]` table of the runtime config.

use crate::Value;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size limits for values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Maximum string length in bytes (default: 16MB)
    pub max_string_bytes: usize,

    /// Maximum bytes length (default: 16MB)
    pub max_bytes_len: usize,

    /// Maximum array length (default: 1M elements)
    pub max_array_len: usize,

    /// Maximum object entries (default: 1M entries)
    pub max_object_entries: usize,

    /// Maximum nesting depth (default: 128)
    pub max_nesting_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_string_bytes: 16 * 1024 * 1024,
            max_bytes_len: 16 * 1024 * 1024,
            max_array_len: 1_000_000,
            max_object_entries: 1_000_000,
            max_nesting_depth: 128,
        }
    }
}

impl Limits {
    /// Create limits with small values for testing
    pub fn with_small_limits() -> Self {
        Limits {
            max_string_bytes: 1000,
            max_bytes_len: 1000,
            max_array_len: 100,
            max_object_entries: 100,
            max_nesting_depth: 10,
        }
    }

    /// Validate a value against size limits
    ///
    /// Checks nesting depth first, then every string, byte buffer, array and
    /// object reachable from `value`.
    pub fn validate_value(&self, value: &Value) -> Result<(), LimitError> {
        if value.exceeds_depth(self.max_nesting_depth) {
            return Err(LimitError::NestingTooDeep {
                actual: self.max_nesting_depth + 1,
                max: self.max_nesting_depth,
            });
        }
        self.validate_sizes(value)
    }

    fn validate_sizes(&self, value: &Value) -> Result<(), LimitError> {
        match value {
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) => Ok(()),

            Value::String(s) => check(s.len(), self.max_string_bytes, "string_too_long"),

            Value::Bytes(b) => check(b.len(), self.max_bytes_len, "bytes_too_long"),

            Value::Array(arr) => {
                check(arr.len(), self.max_array_len, "array_too_long")?;
                arr.iter().try_for_each(|v| self.validate_sizes(v))
            }

            Value::Object(obj) => {
                check(obj.len(), self.max_object_entries, "object_too_many_entries")?;
                obj.values().try_for_each(|v| self.validate_sizes(v))
            }
        }
    }
}

fn check(actual: usize, max: usize, reason: &'static str) -> Result<(), LimitError> {
    if actual > max {
        return Err(LimitError::ValueTooLarge {
            reason,
            actual,
            max,
        });
    }
    Ok(())
}

/// Limit validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LimitError {
    /// Value exceeds size limits
    #[error("Value too large ({reason}): {actual} exceeds maximum {max}")]
    ValueTooLarge {
        /// Reason code for the violation
        reason: &'static str,
        /// Actual size
        actual: usize,
        /// Maximum allowed size
        max: usize,
    },

    /// Nesting exceeds maximum depth
    #[error("Nesting too deep: {actual} levels exceeds maximum {max}")]
    NestingTooDeep {
        /// Depth at which the check stopped, one past the maximum
        actual: usize,
        /// Maximum allowed depth
        max: usize,
    },
}

impl LimitError {
    /// Reason code for this violation
    pub fn reason_code(&self) -> &'static str {
        match self {
            LimitError::ValueTooLarge { reason, .. } => reason,
            LimitError::NestingTooDeep { .. } => "nesting_too_deep",
        }
    }
}
