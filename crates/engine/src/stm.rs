//! The transactional memory runtime
//!
//! A [`Stm`] bundles what an atomic block needs beyond the TVars themselves:
//! the retry policy, the admission policy handed to new TVars, and the
//! coordinator that commits and counts transactions.
//!
//! Most programs use the process-wide runtime through the free functions
//! [`crate::atomically`] and [`crate::TVar::new`]. It is created with
//! defaults on first use, or installed once up front with
//! [`Stm::install_global`].
//!
//! # Atomic block protocol
//!
//! ```text
//! outermost atomically(block):
//!   acquire context, bind to thread
//!   loop:
//!     r = block()
//!     unbind context
//!     Conflicted           → retry (backoff, reset, rebind)
//!     r = Err(e)           → abandon, return Err(e)
//!     Aborted (nested err) → abandon, return TransactionAborted
//!     commit conflict      → retry
//!     committed            → return Ok
//!
//! nested atomically(block):
//!   depth += 1; r = block(); depth -= 1
//!   r = Err(_) and not Conflicted → mark shared context Aborted
//!   return r
//! ```

use crate::config::StmConfig;
use crate::coordinator::{TransactionCoordinator, TransactionMetrics};
use crate::current::{self, Binding, NestedGuard};
use crate::retry::RetryConfig;
use crate::tvar::TVar;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use tracing::{info, warn};
use tvar_concurrency::{CommitError, TransactionContext};
use tvar_core::{AdmissionPolicy, Limits, LimitsPolicy, StmError, StmResult, Value};

static GLOBAL: OnceCell<Stm> = OnceCell::new();

/// Transactional memory runtime
pub struct Stm {
    config: StmConfig,
    policy: Arc<dyn AdmissionPolicy>,
    coordinator: TransactionCoordinator,
}

impl Stm {
    /// Create a runtime with the default admission policy for `config`
    pub fn new(config: StmConfig) -> StmResult<Self> {
        let policy = Arc::new(LimitsPolicy::new(config.limits.clone()));
        Self::with_policy(config, policy)
    }

    /// Create a runtime with a custom admission policy
    pub fn with_policy(config: StmConfig, policy: Arc<dyn AdmissionPolicy>) -> StmResult<Self> {
        config.validate()?;
        Ok(Self::assemble(config, policy))
    }

    /// Builder for a runtime
    pub fn builder() -> StmBuilder {
        StmBuilder::new()
    }

    fn assemble(config: StmConfig, policy: Arc<dyn AdmissionPolicy>) -> Self {
        info!(
            target: "tvar::txn",
            policy = policy.name(),
            max_retries = ?config.retry.max_retries,
            "Runtime created"
        );
        Stm {
            config,
            policy,
            coordinator: TransactionCoordinator::new(),
        }
    }

    /// The process-wide runtime, created with defaults on first use
    pub fn global() -> &'static Stm {
        GLOBAL.get_or_init(|| {
            let config = StmConfig::default();
            let policy = Arc::new(LimitsPolicy::new(config.limits.clone()));
            Stm::assemble(config, policy)
        })
    }

    /// Make `stm` the process-wide runtime
    ///
    /// # Errors
    /// `StmError::Config` if the global runtime was already installed or
    /// already used.
    pub fn install_global(stm: Stm) -> StmResult<&'static Stm> {
        GLOBAL
            .set(stm)
            .map_err(|_| StmError::config("global runtime is already initialized"))?;
        let installed = Self::global();
        info!(
            target: "tvar::txn",
            policy = installed.policy.name(),
            "Global runtime installed"
        );
        Ok(installed)
    }

    /// Runtime configuration
    pub fn config(&self) -> &StmConfig {
        &self.config
    }

    /// Retry policy
    pub fn retry_config(&self) -> &RetryConfig {
        &self.config.retry
    }

    /// Admission policy given to TVars created by this runtime
    pub fn policy(&self) -> &Arc<dyn AdmissionPolicy> {
        &self.policy
    }

    /// Snapshot of transaction statistics
    pub fn metrics(&self) -> TransactionMetrics {
        self.coordinator.metrics()
    }

    /// Create a TVar holding `value`
    pub fn tvar(&self, value: impl Into<Value>) -> StmResult<TVar> {
        TVar::new_in(self, value)
    }

    /// Run `block` as one atomic transaction
    ///
    /// Re-runs the block from the start whenever it conflicts with another
    /// commit. Any error the block returns abandons the transaction and is
    /// returned unchanged; nothing the block wrote becomes visible. Called
    /// inside another atomic block, `block` joins the enclosing transaction.
    ///
    /// # Errors
    /// - The block's own error
    /// - `TransactionAborted` if a nested block failed and the block
    ///   swallowed the error
    /// - `TooManyRetries` if a retry limit is configured and was reached
    pub fn atomically<T, E, F>(&self, mut block: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: From<StmError>,
    {
        if current::in_transaction() {
            return run_nested(block);
        }

        let retry_config = &self.config.retry;
        let binding = Binding::bind(&self.coordinator, current::acquire(&self.coordinator));
        let mut retry = 0;

        loop {
            let result = block();
            let mut txn = binding.take()?;

            if let Attempt::Done(outcome) = self.finish_attempt(&mut txn, result) {
                current::release(txn);
                return outcome;
            }

            retry += 1;
            if !retry_config.allows(retry) {
                self.coordinator.abandon(&mut txn, "retry limit reached");
                current::release(txn);
                return Err(StmError::TooManyRetries { attempts: retry }.into());
            }
            if retry == retry_config.warn_after {
                warn!(
                    target: "tvar::txn",
                    txn_id = txn.txn_id,
                    retries = retry,
                    "Transaction keeps conflicting"
                );
            }

            retry_config.backoff(retry);
            self.coordinator.retry_transaction(&mut txn, retry);
            binding.restore(txn);
        }
    }

    /// Decide what happens to an attempt once its block has returned
    fn finish_attempt<T, E>(
        &self,
        txn: &mut TransactionContext,
        result: Result<T, E>,
    ) -> Attempt<T, E>
    where
        E: From<StmError>,
    {
        if txn.is_conflicted() {
            return Attempt::Retry;
        }
        let value = match result {
            Ok(value) => value,
            Err(e) => {
                self.coordinator.abandon(txn, "atomic block failed");
                return Attempt::Done(Err(e));
            }
        };
        if let Some(reason) = txn.abort_reason() {
            let err = StmError::aborted(reason);
            self.coordinator.abandon(txn, "transaction marked aborted");
            return Attempt::Done(Err(err.into()));
        }
        match self.coordinator.commit(txn) {
            Ok(_) => Attempt::Done(Ok(value)),
            Err(CommitError::ValidationFailed(_)) => Attempt::Retry,
            Err(e) => {
                self.coordinator.abandon(txn, "commit failed");
                Attempt::Done(Err(StmError::from(e).into()))
            }
        }
    }
}

/// Fate of one attempt
enum Attempt<T, E> {
    /// The transaction is over, with this result
    Done(Result<T, E>),
    /// The attempt conflicted and must be re-run
    Retry,
}

impl Default for Stm {
    fn default() -> Self {
        let config = StmConfig::default();
        let policy = Arc::new(LimitsPolicy::new(config.limits.clone()));
        Self::assemble(config, policy)
    }
}

impl std::fmt::Debug for Stm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stm")
            .field("config", &self.config)
            .field("policy", &self.policy.name())
            .field("metrics", &self.coordinator.metrics())
            .finish()
    }
}

/// Run a block inside the transaction already bound to this thread
fn run_nested<T, E, F>(mut block: F) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: From<StmError>,
{
    let _guard = NestedGuard::enter()?;
    let result = block();
    if result.is_err() {
        current::fail_nested();
    }
    result
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`Stm`]
///
/// ```
/// use tvar_engine::{RetryConfig, Stm};
/// use tvar_core::ScalarOnly;
/// use std::sync::Arc;
///
/// let stm = Stm::builder()
///     .retry(RetryConfig::new().with_max_retries(50))
///     .policy(Arc::new(ScalarOnly))
///     .build()
///     .unwrap();
/// assert_eq!(stm.policy().name(), "scalar-only");
/// ```
#[derive(Default)]
pub struct StmBuilder {
    config: StmConfig,
    policy: Option<Arc<dyn AdmissionPolicy>>,
}

impl StmBuilder {
    /// Create new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: StmConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the retry policy
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the limits used by the default admission policy
    pub fn limits(mut self, limits: Limits) -> Self {
        self.config.limits = limits;
        self
    }

    /// Use a custom admission policy instead of the limits-based default
    pub fn policy(mut self, policy: Arc<dyn AdmissionPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Validate the configuration and create the runtime
    pub fn build(self) -> StmResult<Stm> {
        match self.policy {
            Some(policy) => Stm::with_policy(self.config, policy),
            None => Stm::new(self.config),
        }
    }
}
