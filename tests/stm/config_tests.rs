//! Configuration Tests
//!
//! - `tvar.toml` loading and validation
//! - Retry limits surface as `TooManyRetries`
//! - The global runtime can only be installed before first use

use crate::common::*;
use std::io::Write;
use std::sync::{Arc, Barrier};
use std::thread;
use tvar::{RetryConfig, Stm, StmConfig, StmError, CONFIG_FILE_NAME};

#[test]
fn test_runtime_from_config_file() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    let mut file = std::fs::File::create(&path).unwrap();
    write!(
        file,
        "[retry]\nmax_retries = 50\nspin_attempts = 2\n\n[limits]\nmax_string_bytes = 8\n"
    )
    .unwrap();

    let stm = Stm::new(StmConfig::load(&path).unwrap()).unwrap();
    assert_eq!(stm.retry_config().max_retries, Some(50));
    assert_eq!(stm.config().limits.max_string_bytes, 8);

    assert!(stm.tvar("12345678").is_ok());
    assert!(stm.tvar("123456789").unwrap_err().is_admission());
}

#[test]
fn test_default_toml_file_loads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, StmConfig::default_toml()).unwrap();
    assert_eq!(StmConfig::load(&path).unwrap(), StmConfig::default());
}

#[test]
fn test_invalid_config_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, "[retry]\nbase_delay_us = 500\nmax_delay_us = 10\n").unwrap();
    assert!(matches!(StmConfig::load(&path), Err(StmError::Config(_))));
}

#[test]
fn test_retry_limit_reports_too_many_retries() {
    init_tracing();
    let stm = Stm::builder()
        .retry(RetryConfig::new().with_max_retries(3))
        .build()
        .unwrap();
    let tvar = stm.tvar(0).unwrap();
    let mut attempts = 0;

    // Every attempt is overtaken by a direct update before it commits
    let result = stm.atomically(|| {
        attempts += 1;
        tvar.read()?;
        thread::scope(|s| {
            s.spawn(|| tvar.increment(1).unwrap());
        });
        tvar.write(-1)
    });

    assert!(matches!(result, Err(StmError::TooManyRetries { attempts: 4 })));
    assert_eq!(attempts, 4);
    assert_eq!(tvar.snapshot(), Some(tvar::Value::Int(4)));
    let metrics = stm.metrics();
    assert_eq!(metrics.total_conflicted, 3);
    assert_eq!(metrics.total_aborted, 1);
}

#[test]
fn test_bounded_retries_still_converge_under_contention() {
    const WORKERS: usize = 4;
    const INCREMENTS: usize = 500;

    init_tracing();
    let stm = Arc::new(
        Stm::builder()
            .retry(RetryConfig::new().with_max_retries(10_000))
            .build()
            .unwrap(),
    );
    let counter = stm.tvar(0).unwrap();
    let barrier = Arc::new(Barrier::new(WORKERS));

    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let (stm, counter, barrier) = (Arc::clone(&stm), counter.clone(), Arc::clone(&barrier));
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..INCREMENTS {
                    increment(&stm, &counter).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(read_int(&stm, &counter), (WORKERS * INCREMENTS) as i64);
}

#[test]
fn test_install_global_after_first_use_fails() {
    let _ = Stm::global();
    let err = Stm::install_global(Stm::default()).unwrap_err();
    assert!(matches!(err, StmError::Config(_)));
}
