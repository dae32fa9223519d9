//! tvar - Transactional variables for isolated concurrent workers
//!
//! A [`TVar`] is a shared mutable cell that can only be read or written
//! inside [`atomically`]. Concurrent atomic blocks behave as if they ran one
//! at a time: a block that conflicts with another commit is re-run from the
//! start, and a block that fails publishes nothing.
//!
//! # Quick Start
//!
//! ```
//! use tvar::{atomically, TVar, Value};
//!
//! let counter = TVar::new(0)?;
//!
//! let threads: Vec<_> = (0..4)
//!     .map(|_| {
//!         let counter = counter.clone();
//!         std::thread::spawn(move || {
//!             for _ in 0..100 {
//!                 atomically(|| {
//!                     let n = counter.read()?.and_then(|v| v.as_int()).unwrap_or(0);
//!                     counter.write(n + 1)
//!                 })
//!                 .unwrap();
//!             }
//!         })
//!     })
//!     .collect();
//! for t in threads {
//!     t.join().unwrap();
//! }
//!
//! let total = atomically(|| counter.read())?;
//! assert_eq!(total, Some(Value::Int(400)));
//! # Ok::<(), tvar::StmError>(())
//! ```
//!
//! # Architecture
//!
//! - `tvar-core`: values, admission policies, limits, errors
//! - `tvar-concurrency`: slots, transaction contexts, validation, commit
//! - `tvar-engine`: the runtime, the retry loop and the `TVar` handle
//!
//! Only the engine's public API is re-exported here.

pub use tvar_core::{
    AdmissionError, AdmissionPolicy, AdmitAll, FnPolicy, LimitError, Limits, LimitsPolicy,
    ScalarOnly, StmError, StmResult, TVarId, Value, Version,
};
pub use tvar_engine::{
    atomically, in_transaction, RetryConfig, Stm, StmBuilder, StmConfig, TVar,
    TransactionMetrics, CONFIG_FILE_NAME,
};
