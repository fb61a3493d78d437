//! In-process registry bridging the asynchronous saga back to a blocked
//! HTTP request.
//!
//! A wait handle is a one-shot channel keyed by saga id. Whichever of
//! completion, failure or timeout happens first wins; later resolution
//! attempts find the handle gone and are no-ops. This is deliberately a
//! single-instance primitive: under horizontal scaling the instance that
//! registered a wait may not be the one whose consumer resolves it, and a
//! durable saga-status record would replace it.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use common::{SagaId, UserId};
use domain::FailureCode;
use tokio::sync::oneshot;

/// Terminal outcome of a saga, delivered through a wait handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SagaOutcome {
    Completed {
        user_id: UserId,
    },
    Failed {
        code: FailureCode,
        reason: String,
    },
}

/// What a bounded wait on a handle produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitResult {
    /// The saga completed within the ceiling.
    Completed { user_id: UserId },
    /// The saga failed within the ceiling.
    Failed { code: FailureCode, reason: String },
    /// The ceiling elapsed first. The saga is still running and will
    /// resolve on its own; nobody is waiting anymore.
    TimedOut,
}

/// A registered wait for one saga's terminal outcome.
pub struct SagaWaitHandle {
    saga_id: SagaId,
    rx: oneshot::Receiver<SagaOutcome>,
}

impl SagaWaitHandle {
    /// The saga this handle waits on.
    pub fn saga_id(&self) -> SagaId {
        self.saga_id
    }

    /// Blocks for at most `ceiling` on the saga's terminal outcome.
    ///
    /// Timing out does not cancel the saga; it keeps running and its
    /// eventual resolution becomes a no-op against the unregistered id.
    pub async fn wait(self, ceiling: Duration) -> WaitResult {
        match tokio::time::timeout(ceiling, self.rx).await {
            Ok(Ok(SagaOutcome::Completed { user_id })) => WaitResult::Completed { user_id },
            Ok(Ok(SagaOutcome::Failed { code, reason })) => WaitResult::Failed { code, reason },
            // Sender dropped without resolving: the registry entry was
            // replaced. Indistinguishable from never hearing back.
            Ok(Err(_)) => WaitResult::TimedOut,
            Err(_) => WaitResult::TimedOut,
        }
    }
}

/// Concurrent map of saga id to pending wait handle.
pub struct SagaCoordinator {
    waiters: Mutex<HashMap<SagaId, oneshot::Sender<SagaOutcome>>>,
}

impl SagaCoordinator {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a wait for `saga_id` and returns its handle.
    ///
    /// Registering the same id twice replaces the previous entry; the old
    /// handle then resolves as timed out.
    pub fn register(&self, saga_id: SagaId) -> SagaWaitHandle {
        let (tx, rx) = oneshot::channel();
        self.waiters.lock().unwrap().insert(saga_id, tx);
        SagaWaitHandle { saga_id, rx }
    }

    /// Resolves a waiting request with success. Returns false if nobody
    /// was waiting (already resolved, timed out and collected, or never
    /// registered) — a safe no-op, never an error.
    pub fn complete(&self, saga_id: SagaId, user_id: UserId) -> bool {
        self.resolve(saga_id, SagaOutcome::Completed { user_id })
    }

    /// Resolves a waiting request with failure. No-op when absent, like
    /// [`SagaCoordinator::complete`].
    pub fn fail(&self, saga_id: SagaId, code: FailureCode, reason: impl Into<String>) -> bool {
        self.resolve(
            saga_id,
            SagaOutcome::Failed {
                code,
                reason: reason.into(),
            },
        )
    }

    /// Number of sagas currently being waited on.
    pub fn pending_count(&self) -> usize {
        self.waiters.lock().unwrap().len()
    }

    // Remove-and-send under one lock acquisition: of a completion and a
    // failure racing for the same id, exactly one finds the sender.
    fn resolve(&self, saga_id: SagaId, outcome: SagaOutcome) -> bool {
        let sender = self.waiters.lock().unwrap().remove(&saga_id);
        match sender {
            // The receiver may have been dropped after a timeout; sending
            // into it is the same harmless no-op.
            Some(tx) => tx.send(outcome).is_ok(),
            None => false,
        }
    }
}

impl Default for SagaCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
