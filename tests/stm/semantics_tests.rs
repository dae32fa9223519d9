//! Semantic Invariant Tests
//!
//! - Created values read back unchanged
//! - Empty TVars read as absent, not as an error
//! - Reads and writes outside a transaction always fail
//! - Refused values never create a TVar or enter a transaction
//! - Read-your-own-writes within one block

use crate::common::*;
use std::collections::HashMap;
use std::sync::Arc;
use tvar::{atomically, AdmissionError, ScalarOnly, Stm, StmError, TVar, Value};

// =============================================================================
// Creation and Reads
// =============================================================================

#[test]
fn test_created_value_reads_back() {
    let stm = runtime();
    let mut obj = HashMap::new();
    obj.insert("name".to_string(), Value::from("worker"));

    let values = vec![
        Value::Null,
        Value::Bool(true),
        Value::Int(-42),
        Value::Float(1.5),
        Value::from("text"),
        Value::Bytes(vec![1, 2, 3]),
        Value::Array(vec![Value::Int(1), Value::Float(2.0)]),
        Value::Object(obj),
    ];

    for v in values {
        let tvar = stm.tvar(v.clone()).unwrap();
        assert_eq!(stm.atomically(|| tvar.read()).unwrap(), Some(v));
    }
}

#[test]
fn test_empty_tvar_reads_absent() {
    let stm = runtime();
    let tvar = TVar::empty_in(&stm);
    assert_eq!(stm.atomically(|| tvar.read()).unwrap(), None);

    // Null is a value, not absence
    let null = stm.tvar(Value::Null).unwrap();
    assert_eq!(stm.atomically(|| null.read()).unwrap(), Some(Value::Null));
}

#[test]
fn test_global_runtime_functions() {
    let tvar = TVar::new("shared").unwrap();
    let empty = TVar::empty();
    let (a, b) = atomically(|| Ok::<_, StmError>((tvar.read()?, empty.read()?))).unwrap();
    assert_eq!(a, Some(Value::from("shared")));
    assert_eq!(b, None);
}

// =============================================================================
// Transaction Requirement
// =============================================================================

#[test]
fn test_read_outside_transaction_fails() {
    let stm = runtime();
    let tvar = stm.tvar(1).unwrap();
    let err = tvar.read().unwrap_err();
    assert!(matches!(err, StmError::NoTransaction { operation: "read" }));
}

#[test]
fn test_write_outside_transaction_fails_and_changes_nothing() {
    let stm = runtime();
    let tvar = stm.tvar(1).unwrap();
    for _ in 0..3 {
        let err = tvar.write(2).unwrap_err();
        assert!(matches!(err, StmError::NoTransaction { operation: "write" }));
    }
    assert_eq!(tvar.snapshot(), Some(Value::Int(1)));
    assert_eq!(tvar.version(), 0);
}

#[test]
fn test_operations_fail_again_after_block_ends() {
    let stm = runtime();
    let tvar = stm.tvar(1).unwrap();
    stm.atomically(|| tvar.write(2)).unwrap();
    assert!(!tvar::in_transaction());
    assert!(tvar.read().unwrap_err().is_no_transaction());
}

#[test]
fn test_no_transaction_error_message() {
    let stm = runtime();
    let tvar = stm.tvar(1).unwrap();
    let msg = tvar.write(2).unwrap_err().to_string();
    assert!(msg.contains("without an active transaction"));
}

// =============================================================================
// Admission
// =============================================================================

fn scalar_runtime() -> Stm {
    init_tracing();
    Stm::builder().policy(Arc::new(ScalarOnly)).build().unwrap()
}

#[test]
fn test_non_admissible_initial_value_creates_nothing() {
    let stm = scalar_runtime();
    let err = stm.tvar(vec![Value::Int(1)]).unwrap_err();
    assert!(matches!(
        err,
        StmError::Admission(AdmissionError::NotShareable { type_name: "Array", .. })
    ));
}

#[test]
fn test_non_admissible_write_is_not_recorded() {
    let stm = scalar_runtime();
    let tvar = stm.tvar(1).unwrap();

    // Block propagates the refusal: transaction abandoned, not retried
    let mut attempts = 0;
    let result = stm.atomically(|| {
        attempts += 1;
        tvar.write(3)?;
        tvar.write(vec![Value::Int(1)])
    });
    assert!(result.unwrap_err().is_admission());
    assert_eq!(attempts, 1);
    assert_eq!(tvar.snapshot(), Some(Value::Int(1)));
    assert_eq!(stm.metrics().total_aborted, 1);
}

#[test]
fn test_swallowed_refusal_still_abandons_transaction() {
    let stm = scalar_runtime();
    let a = stm.tvar(1).unwrap();
    let b = stm.tvar(10).unwrap();

    let result: Result<(), StmError> = stm.atomically(|| {
        a.write(2)?;
        let _ = a.write(vec![Value::Int(1)]);
        b.write(20)
    });

    assert!(matches!(result, Err(StmError::TransactionAborted { .. })));
    assert_eq!(a.snapshot(), Some(Value::Int(1)));
    assert_eq!(b.snapshot(), Some(Value::Int(10)));
    assert_eq!(a.version(), 0);
}

#[test]
fn test_default_policy_enforces_limits() {
    let stm = Stm::builder()
        .limits(tvar::Limits::with_small_limits())
        .build()
        .unwrap();
    let err = stm.tvar("x".repeat(5_000)).unwrap_err();
    assert!(err.is_admission());
    assert!(stm.tvar("x".repeat(10)).is_ok());
}

// =============================================================================
// Read-Your-Writes
// =============================================================================

#[test]
fn test_read_your_own_writes() {
    let stm = runtime();
    let tvar = stm.tvar("before").unwrap();

    let seen = stm
        .atomically(|| {
            tvar.write("after")?;
            tvar.read()
        })
        .unwrap();
    assert_eq!(seen, Some(Value::from("after")));
}

#[test]
fn test_writes_invisible_until_commit() {
    let stm = runtime();
    let tvar = stm.tvar(0).unwrap();

    stm.atomically(|| {
        tvar.write(1)?;
        // Committed state is unchanged while the block runs
        assert_eq!(tvar.snapshot(), Some(Value::Int(0)));
        Ok::<_, StmError>(())
    })
    .unwrap();
    assert_eq!(tvar.snapshot(), Some(Value::Int(1)));
}

#[test]
fn test_empty_tvar_write_then_read() {
    let stm = runtime();
    let tvar = TVar::empty_in(&stm);
    let seen = stm
        .atomically(|| {
            tvar.write(7)?;
            tvar.read()
        })
        .unwrap();
    assert_eq!(seen, Some(Value::Int(7)));
    assert_eq!(tvar.version(), 1);
}

// =============================================================================
// Versions
// =============================================================================

#[test]
fn test_version_changes_iff_value_changes() {
    let stm = runtime();
    let tvar = stm.tvar(1).unwrap();

    stm.atomically(|| tvar.write(1)).unwrap();
    assert_eq!(tvar.version(), 0);

    stm.atomically(|| tvar.write(2)).unwrap();
    assert_eq!(tvar.version(), 1);

    // Several writes in one transaction commit once
    stm.atomically(|| {
        tvar.write(3)?;
        tvar.write(4)
    })
    .unwrap();
    assert_eq!(tvar.version(), 2);

    // Int and Float are different values
    stm.atomically(|| tvar.write(4.0)).unwrap();
    assert_eq!(tvar.version(), 3);
}

#[test]
fn test_multi_tvar_commit_is_all_or_nothing() {
    let stm = runtime();
    let a = stm.tvar(1).unwrap();
    let b = stm.tvar(2).unwrap();

    let result: Result<(), StmError> = stm.atomically(|| {
        a.write(10)?;
        b.write(20)?;
        Err(StmError::aborted("changed my mind"))
    });
    assert!(result.is_err());
    assert_eq!(a.snapshot(), Some(Value::Int(1)));
    assert_eq!(b.snapshot(), Some(Value::Int(2)));

    stm.atomically(|| {
        a.write(10)?;
        b.write(20)
    })
    .unwrap();
    assert_eq!(a.snapshot(), Some(Value::Int(10)));
    assert_eq!(b.snapshot(), Some(Value::Int(20)));
}
