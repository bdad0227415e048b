use std::future::Future;
use std::sync::Arc;

use eco_store::{LedgerStore, StoreResult};
use eco_types::SequenceClock;
use tokio::time::Instant;

use crate::config::LedgerConfig;
use crate::error::{LedgerError, LedgerResult};

/// Everything a ledger operation needs, passed in explicitly.
///
/// Cloning is cheap; clones share the store, config and clock.
#[derive(Clone)]
pub struct LedgerContext {
    store: Arc<dyn LedgerStore>,
    config: Arc<LedgerConfig>,
    clock: Arc<SequenceClock>,
    deadline: Option<Instant>,
}

impl LedgerContext {
    pub fn new(store: Arc<dyn LedgerStore>, config: LedgerConfig) -> Self {
        let clock = Arc::new(SequenceClock::new(config.node_id));
        Self {
            store,
            config: Arc::new(config),
            clock,
            deadline: None,
        }
    }

    /// Share an existing clock, e.g. between contexts in one process.
    pub fn with_clock(mut self, clock: Arc<SequenceClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Bound every store call made through this context by `deadline`, in
    /// addition to the configured per-call timeout.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn store(&self) -> &Arc<dyn LedgerStore> {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn clock(&self) -> &SequenceClock {
        &self.clock
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Run one store call under the effective deadline and classify its
    /// failure.
    pub(crate) async fn call<T, F>(&self, operation: &'static str, fut: F) -> LedgerResult<T>
    where
        F: Future<Output = StoreResult<T>>,
    {
        let mut limit = Instant::now() + self.config.store_timeout();
        if let Some(deadline) = self.deadline {
            if deadline <= Instant::now() {
                tracing::warn!(operation, "deadline already passed, store not called");
                return Err(LedgerError::StoreUnavailable { operation });
            }
            limit = limit.min(deadline);
        }

        match tokio::time::timeout_at(limit, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(error)) => Err(LedgerError::from_store(operation, error)),
            Err(_) => {
                tracing::warn!(operation, "store call timed out");
                Err(LedgerError::StoreUnavailable { operation })
            }
        }
    }
}

impl std::fmt::Debug for LedgerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerContext")
            .field("node_id", &self.clock.node_id())
            .field("deadline", &self.deadline)
            .finish()
    }
}
