//! Durable offline action queue.
//!
//! Mutations made while disconnected are persisted here and replayed against
//! the remote with a bounded retry budget. Execution is sequential to
//! preserve causal ordering of dependent mutations within a thread.

mod model;
mod repository;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

pub use model::{ActionKind, DEFAULT_MAX_RETRIES, OfflineAction};
pub use repository::ActionRepository;

use crate::Result;
use crate::sync::RemoteApi;

/// Outcome of one queue flush pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Ids of actions delivered to the remote and removed from the queue.
    pub executed: Vec<String>,
    /// Ids of actions dropped after exhausting their retry budget.
    pub failed: Vec<String>,
}

impl FlushReport {
    /// Returns true if the pass neither executed nor dropped anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.executed.is_empty() && self.failed.is_empty()
    }
}

/// Drains the durable action queue against the remote collaborator.
#[derive(Clone)]
pub struct ActionQueue {
    repo: ActionRepository,
    remote: Arc<dyn RemoteApi>,
    flush_guard: Arc<Mutex<()>>,
}

impl ActionQueue {
    /// Create a queue over the given repository and remote.
    pub fn new(repo: ActionRepository, remote: Arc<dyn RemoteApi>) -> Self {
        Self {
            repo,
            remote,
            flush_guard: Arc::new(Mutex::new(())),
        }
    }

    /// The underlying durable queue repository.
    #[must_use]
    pub const fn repository(&self) -> &ActionRepository {
        &self.repo
    }

    /// Execute every pending action sequentially, fewest retries first.
    ///
    /// Only one flush runs at a time: a caller arriving while a pass is in
    /// flight gets an immediately-empty report instead of waiting. Per
    /// action: success deletes it; a failure that exhausts the retry budget
    /// deletes it and reports it in `failed`; any other failure increments
    /// its retry count and leaves it queued for the next pass.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue store itself fails; remote failures are
    /// absorbed into retry bookkeeping.
    pub async fn execute_all(&self) -> Result<FlushReport> {
        let Ok(_guard) = self.flush_guard.try_lock() else {
            debug!("action flush already in progress, skipping");
            return Ok(FlushReport::default());
        };

        let pending = self.repo.pending().await?;
        let mut report = FlushReport::default();

        for action in pending {
            match self.remote.execute_action(&action).await {
                Ok(()) => {
                    self.repo.remove(&action.id).await?;
                    report.executed.push(action.id);
                }
                Err(err) if action.next_failure_is_permanent() => {
                    warn!(
                        action_id = %action.id,
                        kind = action.kind.as_str(),
                        %err,
                        "offline action failed permanently, dropping"
                    );
                    self.repo.remove(&action.id).await?;
                    report.failed.push(action.id);
                }
                Err(err) => {
                    debug!(
                        action_id = %action.id,
                        attempt = action.retry_count + 1,
                        %err,
                        "offline action failed, leaving queued"
                    );
                    self.repo.bump_retry(&action.id).await?;
                }
            }
        }

        if !report.is_empty() {
            debug!(
                executed = report.executed.len(),
                failed = report.failed.len(),
                "action flush completed"
            );
        }
        Ok(report)
    }
}
