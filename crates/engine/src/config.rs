//! Runtime configuration via `tvar.toml`
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working runtime. Only the tables that need changing have to be present.

use crate::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tvar_core::{Limits, StmError, StmResult};

/// Conventional config file name
pub const CONFIG_FILE_NAME: &str = "tvar.toml";

/// Runtime configuration loaded from `tvar.toml`
///
/// # Example
///
/// ```toml
/// [retry]
/// max_retries = 1000
/// spin_attempts = 8
///
/// [limits]
/// max_nesting_depth = 32
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StmConfig {
    /// Conflict retry policy
    pub retry: RetryConfig,
    /// Size limits enforced by the default admission policy
    pub limits: Limits,
}

impl StmConfig {
    /// Parse a config from TOML text and validate it
    pub fn from_toml_str(content: &str) -> StmResult<Self> {
        let config: StmConfig = toml::from_str(content)
            .map_err(|e| StmError::config(format!("invalid {}: {}", CONFIG_FILE_NAME, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a config file
    pub fn load(path: impl AsRef<Path>) -> StmResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Serialize to TOML
    pub fn to_toml_string(&self) -> StmResult<String> {
        toml::to_string(self).map_err(|e| StmError::config(e.to_string()))
    }

    /// Check the config for values the runtime cannot work with
    pub fn validate(&self) -> StmResult<()> {
        if self.retry.base_delay_us > self.retry.max_delay_us {
            return Err(StmError::config(format!(
                "retry.base_delay_us ({}) exceeds retry.max_delay_us ({})",
                self.retry.base_delay_us, self.retry.max_delay_us
            )));
        }
        if self.retry.warn_after == 0 {
            return Err(StmError::config("retry.warn_after must be at least 1"));
        }
        if self.limits.max_nesting_depth == 0 {
            return Err(StmError::config("limits.max_nesting_depth must be at least 1"));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# tvar runtime configuration

[retry]
# Retries after the first attempt before giving up with TooManyRetries.
# Leave unset to retry until the transaction commits.
# max_retries = 1000

# Retries that only yield the thread before sleeping starts
spin_attempts = 4

# Exponential backoff between retries, in microseconds
base_delay_us = 1
max_delay_us = 1000

# Warn once a single atomically call has retried this many times
warn_after = 1000

[limits]
max_string_bytes = 16777216
max_bytes_len = 16777216
max_array_len = 1000000
max_object_entries = 1000000
max_nesting_depth = 128
"#
    }
}
