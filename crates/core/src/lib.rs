//! Core types for transactional variables
//!
//! This crate defines the foundational types used throughout the system:
//! - Value: closed set of value kinds a TVar can hold
//! - Limits: size limits for values
//! - AdmissionPolicy: decides whether a value may be shared through a TVar
//! - TVarId / Version: identity and commit counters
//! - StmError: error type hierarchy

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod admission;
pub mod error;
pub mod limits;
pub mod types;
pub mod value;

pub use admission::{AdmissionError, AdmissionPolicy, AdmitAll, FnPolicy, LimitsPolicy, ScalarOnly};
pub use error::{StmError, StmResult};
pub use limits::{LimitError, Limits};
pub use types::{TVarId, Version};
pub use value::{ArithmeticError, Value};
