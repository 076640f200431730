//! Background run-status polling
//!
//! One task per deploy handle: sleep, `kfp.get_run`, update the record, and
//! stop once the run reaches a terminal status. Tick errors are logged and
//! polling continues. Updates to a dismissed record are dropped by the
//! registry, so polling carries on silently until the run finishes.

use crate::progress::ProgressUpdate;
use crate::registry::DeployRegistry;
use crate::types::DeployHandle;
use kale_rpc::{GetRun, RpcGateway, RunInfo};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Why a polling task stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollExit {
    /// The run reached a terminal status
    Terminal(RunInfo),
    /// Polling was cancelled
    Cancelled,
    /// The maximum number of polls was reached
    Exhausted,
}

struct PollTask {
    token: CancellationToken,
    join: JoinHandle<PollExit>,
}

/// Spawns and tracks run-polling tasks
pub struct RunPoller {
    gateway: RpcGateway,
    registry: Arc<DeployRegistry>,
    interval: Duration,
    max_polls: u32,
    tasks: Mutex<HashMap<DeployHandle, PollTask>>,
}

impl RunPoller {
    /// Create a poller
    #[must_use]
    pub fn new(
        gateway: RpcGateway,
        registry: Arc<DeployRegistry>,
        interval: Duration,
        max_polls: u32,
    ) -> Self {
        Self {
            gateway,
            registry,
            interval,
            max_polls,
            tasks: Mutex::new(HashMap::new()),
        }
    }

    /// Start polling `run_id` for `handle`
    ///
    /// A poller already running for the same handle is cancelled first.
    /// Finished pollers keep their exit until [`join`](Self::join) takes it.
    pub fn spawn(&self, handle: DeployHandle, run_id: String) {
        let token = CancellationToken::new();
        let join = tokio::spawn(poll_run(
            self.gateway.clone(),
            Arc::clone(&self.registry),
            handle,
            run_id,
            self.interval,
            self.max_polls,
            token.clone(),
        ));

        if let Some(previous) = self.tasks.lock().insert(handle, PollTask { token, join }) {
            previous.token.cancel();
        }
    }

    /// Stop polling for `handle`
    ///
    /// Returns `false` when no poller is running for it.
    pub fn cancel(&self, handle: DeployHandle) -> bool {
        match self.tasks.lock().get(&handle) {
            Some(task) if !task.join.is_finished() => {
                task.token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Stop every poller
    pub fn cancel_all(&self) {
        for task in self.tasks.lock().values() {
            task.token.cancel();
        }
    }

    /// Number of pollers still running
    #[must_use]
    pub fn active(&self) -> usize {
        self.tasks
            .lock()
            .values()
            .filter(|t| !t.join.is_finished())
            .count()
    }

    /// Wait for the poller of `handle` to stop
    ///
    /// Returns `None` when no poller was started for it or it was already
    /// joined.
    pub async fn join(&self, handle: DeployHandle) -> Option<PollExit> {
        let task = self.tasks.lock().remove(&handle)?;
        match task.join.await {
            Ok(exit) => Some(exit),
            Err(err) => {
                warn!(%handle, error = %err, "run poller task failed");
                None
            }
        }
    }
}

impl Drop for RunPoller {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

async fn poll_run(
    gateway: RpcGateway,
    registry: Arc<DeployRegistry>,
    handle: DeployHandle,
    run_id: String,
    interval: Duration,
    max_polls: u32,
    token: CancellationToken,
) -> PollExit {
    let request = GetRun { run_id };
    for tick in 1..=max_polls {
        tokio::select! {
            () = token.cancelled() => {
                debug!(%handle, "run polling cancelled");
                return PollExit::Cancelled;
            }
            () = tokio::time::sleep(interval) => {}
        }

        match gateway.try_call(&request).await {
            Ok(run) => {
                let terminal = run.is_terminal();
                if !registry.upsert(handle, ProgressUpdate::run(run.clone())) {
                    debug!(%handle, tick, "record dismissed, run status not shown");
                }
                if terminal {
                    info!(%handle, run_id = %request.run_id, status = ?run.status, "run finished");
                    return PollExit::Terminal(run);
                }
            }
            Err(err) => {
                warn!(%handle, run_id = %request.run_id, tick, error = %err, "run status poll failed");
            }
        }
    }

    warn!(%handle, run_id = %request.run_id, max_polls, "run polling gave up");
    PollExit::Exhausted
}
