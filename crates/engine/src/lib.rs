//! Transaction engine for transactional variables
//!
//! This crate ties the lower layers into the public API:
//! - TVar: handle with `read`, `write` and `increment`
//! - Stm: runtime (retry policy, admission policy, metrics)
//! - atomically: the retry loop that runs a block as one transaction
//! - Per-thread binding of the active transaction
//! - Configuration loaded from `tvar.toml`

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod coordinator;
mod current;
pub mod retry;
pub mod stm;
pub mod tvar;

pub use config::{StmConfig, CONFIG_FILE_NAME};
pub use coordinator::{TransactionCoordinator, TransactionMetrics};
pub use current::in_transaction;
pub use retry::RetryConfig;
pub use stm::{Stm, StmBuilder};
pub use tvar::TVar;

use tvar_core::StmError;

/// Run `block` as one atomic transaction in the global runtime
///
/// See [`Stm::atomically`].
pub fn atomically<T, E, F>(block: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: From<StmError>,
{
    Stm::global().atomically(block)
}
