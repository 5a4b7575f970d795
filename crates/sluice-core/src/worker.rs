//! Worker pool: per-category execution loops and the cleanup sweep driver.

use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::config::QueueConfig;
use crate::domain::{TaskCategory, TaskId};
use crate::error::SluiceError;
use crate::manager::{Claim, QueueState};
use crate::runtime::HandlerRegistry;

/// Handle over all spawned loops.
/// - sending on `shutdown_tx` stops every loop
/// - `shutdown_and_join()` waits for them to finish
pub(crate) struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn the configured worker loops for every category, plus the
    /// cleanup loop.
    pub(crate) fn spawn(
        config: &QueueConfig,
        state: Arc<Mutex<QueueState>>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut joins = Vec::new();

        for (&category, cat_cfg) in &config.categories {
            for worker_id in 0..cat_cfg.workers {
                let st = Arc::clone(&state);
                let reg = Arc::clone(&registry);
                let mut rx = shutdown_rx.clone();
                let poll = config.poll_interval();

                joins.push(tokio::spawn(async move {
                    worker_loop(category, worker_id, st, reg, poll, &mut rx).await;
                }));
            }
        }

        {
            let st = Arc::clone(&state);
            let mut rx = shutdown_rx.clone();
            let interval = config.cleanup_interval();
            let retention = config.retention();
            joins.push(tokio::spawn(async move {
                cleanup_loop(st, interval, retention, &mut rx).await;
            }));
        }

        Self { shutdown_tx, joins }
    }

    /// Request shutdown for all loops. This does not preempt an in-flight
    /// handler call; the owning worker finishes its write-back and exits.
    pub(crate) fn request_shutdown(&self) {
        // ignore send error: receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all loops.
    pub(crate) async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            let _ = j.await;
        }
    }
}

/// One worker loop: scan, rate-gate, execute, write back.
///
/// Scan order over the table is whatever the map yields, deliberately not
/// FIFO; tasks of a category are independent and only "eventually
/// processed" is promised.
async fn worker_loop(
    category: TaskCategory,
    worker_id: usize,
    state: Arc<Mutex<QueueState>>,
    registry: Arc<HandlerRegistry>,
    poll_interval: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    debug!(category = %category, worker_id, "worker started");

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // Claim (or decline to) entirely under the state lock; the lock is
        // released before any sleeping or handler execution.
        let claim = { state.lock().await.claim_next(category) };

        match claim {
            Claim::Idle => {
                if sleep_or_shutdown(poll_interval, shutdown_rx).await {
                    break;
                }
            }
            Claim::Deferred(wait) => {
                // Not an error, and the task stays unclaimed: a sibling
                // worker whose turn comes after the window frees may pick
                // it up first.
                debug!(category = %category, worker_id, wait_secs = wait.as_secs_f64(), "rate window full, backing off");
                let wait = if wait.is_zero() { poll_interval } else { wait };
                if sleep_or_shutdown(wait, shutdown_rx).await {
                    break;
                }
            }
            Claim::Claimed { id, payload } => {
                run_one(category, worker_id, id, payload, &state, &registry).await;
            }
        }
    }

    debug!(category = %category, worker_id, "worker stopped");
}

/// Execute one claimed task and settle its outcome.
async fn run_one(
    category: TaskCategory,
    worker_id: usize,
    id: TaskId,
    payload: serde_json::Value,
    state: &Arc<Mutex<QueueState>>,
    registry: &Arc<HandlerRegistry>,
) {
    info!(task_id = %id, category = %category, worker_id, "processing task");

    // The handler runs on its own task: a slow external call cannot starve
    // sibling loops, and a panic is contained instead of taking the worker
    // down with it.
    let reg = Arc::clone(registry);
    let outcome = match tokio::spawn(async move { reg.execute(category, payload).await }).await {
        Ok(result) => result,
        Err(join_err) => Err(SluiceError::Handler(format!("handler panicked: {join_err}"))),
    };

    // Write back under the lock, then fire the callback outside it.
    let notification = { state.lock().await.settle(id, outcome) };

    if let Some((snapshot, callback)) = notification {
        // Callback failures are logged and go no further; running the
        // callback on its own task keeps a panic out of the worker loop.
        let invoked = tokio::spawn(async move { callback.on_terminal(&snapshot).await }).await;
        match invoked {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(task_id = %id, error = %e, "task callback failed"),
            Err(join_err) => warn!(task_id = %id, error = %join_err, "task callback panicked"),
        }
    }
}

/// Periodically purge terminal tasks past the retention horizon, bounding
/// table growth.
async fn cleanup_loop(
    state: Arc<Mutex<QueueState>>,
    interval: Duration,
    retention: chrono::Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if sleep_or_shutdown(interval, shutdown_rx).await {
            break;
        }
        let removed = { state.lock().await.sweep_expired(retention) };
        if removed > 0 {
            info!(removed, "purged expired terminal tasks");
        }
    }
}

/// Sleep for `dur`, returning true when shutdown was signalled instead.
/// A closed channel (the manager was dropped without `stop`) also counts
/// as shutdown, so loops never outlive their owner.
async fn sleep_or_shutdown(dur: Duration, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(dur) => false,
        changed = shutdown_rx.changed() => changed.is_err() || *shutdown_rx.borrow(),
    }
}
