//! `QueueManager`: composition root over the task table, admission
//! control, and the worker pools.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::QueueConfig;
use crate::domain::{TaskCategory, TaskId};
use crate::error::SluiceError;
use crate::observability::{QueueCounts, TaskSnapshot};
use crate::queue::{QueueTask, QuotaTracker, RateLimiter, TaskStatus};
use crate::runtime::{HandlerRegistry, TaskCallback};
use crate::worker::WorkerGroup;

/// Shared mutable state: the task table plus per-category admission
/// controls.
///
/// Everything sits behind one mutex, per the concurrency contract: the
/// claim step, rate-window mutation, and quota decrement all happen with
/// the lock held, so two workers can never claim the same task and
/// admission accounting never races a submission. The lock is never held
/// across handler execution or sleeping.
pub(crate) struct QueueState {
    tasks: HashMap<TaskId, QueueTask>,
    limiters: HashMap<TaskCategory, RateLimiter>,
    quotas: QuotaTracker,
}

/// Outcome of one table scan by a worker.
pub(crate) enum Claim {
    /// Nothing pending for this category.
    Idle,
    /// Pending work exists but the rate window is full.
    Deferred(tokio::time::Duration),
    /// Task flipped to Processing; the worker owns it now.
    Claimed {
        id: TaskId,
        payload: serde_json::Value,
    },
}

impl QueueState {
    fn new(config: &QueueConfig) -> Self {
        let mut limiters = HashMap::new();
        let mut ceilings = HashMap::new();
        for (&category, cat) in &config.categories {
            limiters.insert(
                category,
                RateLimiter::new(cat.rate_per_minute, cat.rate_per_hour),
            );
            if let Some(quota) = cat.daily_quota {
                ceilings.insert(category, quota);
            }
        }
        Self {
            tasks: HashMap::new(),
            limiters,
            quotas: QuotaTracker::new(ceilings),
        }
    }

    /// Find a Pending task of `category`, rate-gate it, and claim it.
    pub(crate) fn claim_next(&mut self, category: TaskCategory) -> Claim {
        let Some(id) = self
            .tasks
            .values()
            .find(|t| t.category == category && t.status.is_claimable())
            .map(|t| t.id)
        else {
            return Claim::Idle;
        };

        // Admission check happens before the claim; on denial the task
        // stays Pending and visible to sibling workers.
        if let Some(limiter) = self.limiters.get_mut(&category)
            && !limiter.acquire()
        {
            let wait = limiter.wait_time();
            return Claim::Deferred(wait);
        }

        if let Some(task) = self.tasks.get_mut(&id) {
            task.start();
            return Claim::Claimed {
                id,
                payload: task.payload.clone(),
            };
        }
        Claim::Idle
    }

    /// Apply a handler outcome to a claimed task. Returns the callback
    /// notification to fire when the task reached Completed or Failed.
    pub(crate) fn settle(
        &mut self,
        id: TaskId,
        outcome: Result<serde_json::Value, SluiceError>,
    ) -> Option<(TaskSnapshot, Arc<dyn TaskCallback>)> {
        let task = self.tasks.get_mut(&id)?;

        // Cancelled mid-flight: terminal states are immutable, so the
        // handler's result is discarded.
        if task.status != TaskStatus::Processing {
            warn!(task_id = %id, status = ?task.status, "dropping handler outcome, task no longer processing");
            return None;
        }

        match outcome {
            Ok(result) => {
                task.complete(result);
                info!(task_id = %id, category = %task.category, "task completed");
            }
            Err(err) if task.has_retry_budget() => {
                task.retry(err.to_string());
                warn!(task_id = %id, retry_count = task.retry_count, error = %err, "task failed, retrying");
                return None;
            }
            Err(err) => {
                task.fail(err.to_string());
                error!(task_id = %id, error = %err, "task failed permanently");
            }
        }

        let callback = task.callback.clone()?;
        Some((task.snapshot(), callback))
    }

    /// Remove terminal tasks whose completion is older than `retention`.
    /// Returns how many were purged.
    pub(crate) fn sweep_expired(&mut self, retention: chrono::Duration) -> usize {
        let cutoff = Utc::now() - retention;
        let before = self.tasks.len();
        self.tasks.retain(|_, t| {
            !(t.status.is_terminal() && t.completed_at.is_some_and(|done| done < cutoff))
        });
        before - self.tasks.len()
    }
}

/// Owns the task table, admission control, and worker pools for the
/// external-service categories, and exposes the submit/status/cancel API.
///
/// Construct one at the service's composition root and hand out
/// references; there is no global instance.
pub struct QueueManager {
    config: QueueConfig,
    registry: Arc<HandlerRegistry>,
    state: Arc<Mutex<QueueState>>,
    workers: Mutex<Option<WorkerGroup>>,
}

impl std::fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager").finish_non_exhaustive()
    }
}

impl QueueManager {
    /// Fail-fast construction: every configured category must have a
    /// handler registered.
    pub fn new(config: QueueConfig, registry: HandlerRegistry) -> Result<Self, SluiceError> {
        registry.ensure_covers(config.categories.keys().copied())?;
        let state = QueueState::new(&config);
        Ok(Self {
            config,
            registry: Arc::new(registry),
            state: Arc::new(Mutex::new(state)),
            workers: Mutex::new(None),
        })
    }

    /// Spawn the worker pools and the cleanup loop. Idempotent.
    pub async fn start(&self) {
        let mut workers = self.workers.lock().await;
        if workers.is_some() {
            return;
        }
        *workers = Some(WorkerGroup::spawn(
            &self.config,
            Arc::clone(&self.state),
            Arc::clone(&self.registry),
        ));

        let total: usize = self.config.categories.values().map(|c| c.workers).sum();
        info!(workers = total, categories = self.config.categories.len(), "queue manager started");
    }

    /// Signal every loop to stop and wait for them. Idempotent. An
    /// in-flight handler call finishes and writes back before its worker
    /// exits.
    pub async fn stop(&self) {
        let group = self.workers.lock().await.take();
        let Some(group) = group else { return };
        group.shutdown_and_join().await;
        info!("queue manager stopped");
    }

    /// Admit a task. The quota gate runs first: a rejected submission
    /// never enters the table. Returns the task id immediately
    /// (fire-and-forget); callers poll `status` or attach a callback.
    pub async fn submit(
        &self,
        category: TaskCategory,
        payload: serde_json::Value,
        callback: Option<Arc<dyn TaskCallback>>,
    ) -> Result<TaskId, SluiceError> {
        let Some(cat_cfg) = self.config.categories.get(&category) else {
            return Err(SluiceError::UnconfiguredCategory(category));
        };

        let mut state = self.state.lock().await;
        if !state.quotas.check_and_consume(category) {
            return Err(SluiceError::QuotaExceeded(category));
        }

        let task = QueueTask::new(category, payload, callback, cat_cfg.max_retries);
        let id = task.id;
        state.tasks.insert(id, task);

        info!(task_id = %id, category = %category, "task queued");
        debug!(category = %category, remaining_quota = ?state.quotas.remaining_today(category), "quota consumed");
        Ok(id)
    }

    /// Point-in-time view of one task; None for unknown or purged ids.
    pub async fn status(&self, id: TaskId) -> Option<TaskSnapshot> {
        self.state.lock().await.tasks.get(&id).map(|t| t.snapshot())
    }

    /// Cancel a Pending or Processing task. A worker already inside the
    /// handler call is not preempted; its result is discarded at
    /// write-back. Returns false for unknown or already-terminal tasks.
    pub async fn cancel(&self, id: TaskId) -> bool {
        let mut state = self.state.lock().await;
        match state.tasks.get_mut(&id) {
            Some(task) if !task.status.is_terminal() => {
                task.cancel();
                info!(task_id = %id, "task cancelled");
                true
            }
            _ => false,
        }
    }

    /// Per-status totals over the current table.
    pub async fn counts(&self) -> QueueCounts {
        let state = self.state.lock().await;
        let mut counts = QueueCounts::default();
        for task in state.tasks.values() {
            match task.status {
                TaskStatus::Pending => counts.pending += 1,
                TaskStatus::Processing => counts.processing += 1,
                TaskStatus::Completed => counts.completed += 1,
                TaskStatus::Failed => counts.failed += 1,
                TaskStatus::Cancelled => counts.cancelled += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CategoryConfig;
    use crate::queue::DEFAULT_MAX_RETRIES;
    use crate::runtime::TaskHandler;

    use async_trait::async_trait;
    use chrono::Local;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::{self, Duration, Instant};

    fn one_category(category: TaskCategory, cat: CategoryConfig) -> QueueConfig {
        QueueConfig {
            categories: HashMap::from([(category, cat)]),
            poll_interval_secs: 1,
            cleanup_interval_secs: 300,
            retention_secs: 3600,
        }
    }

    fn unlimited(workers: usize) -> CategoryConfig {
        CategoryConfig {
            workers,
            rate_per_minute: 0,
            rate_per_hour: None,
            daily_quota: None,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    /// Succeeds, echoing the payload back; counts invocations.
    struct EchoHandler {
        calls: AtomicU32,
    }

    impl EchoHandler {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl TaskHandler for EchoHandler {
        async fn handle(
            &self,
            payload: serde_json::Value,
        ) -> Result<serde_json::Value, SluiceError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(payload)
        }
    }

    /// Fails its first `n` calls, then succeeds.
    struct FlakyHandler {
        remaining_failures: AtomicU32,
        calls: AtomicU32,
    }

    impl FlakyHandler {
        fn new(n: u32) -> Self {
            Self {
                remaining_failures: AtomicU32::new(n),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl TaskHandler for FlakyHandler {
        async fn handle(
            &self,
            _payload: serde_json::Value,
        ) -> Result<serde_json::Value, SluiceError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let left = self.remaining_failures.load(Ordering::Relaxed);
            if left > 0 {
                self.remaining_failures.fetch_sub(1, Ordering::Relaxed);
                return Err(SluiceError::Handler(format!("service unavailable (left={left})")));
            }
            Ok(json!({"ok": true}))
        }
    }

    /// Records the instant of every invocation, then succeeds.
    struct StampingHandler {
        stamps: StdMutex<Vec<Instant>>,
    }

    impl StampingHandler {
        fn new() -> Self {
            Self {
                stamps: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TaskHandler for StampingHandler {
        async fn handle(
            &self,
            _payload: serde_json::Value,
        ) -> Result<serde_json::Value, SluiceError> {
            self.stamps.lock().unwrap().push(Instant::now());
            Ok(json!({"ok": true}))
        }
    }

    /// Sleeps before succeeding, to keep a task in Processing.
    struct SlowHandler {
        dur: Duration,
    }

    #[async_trait]
    impl TaskHandler for SlowHandler {
        async fn handle(
            &self,
            _payload: serde_json::Value,
        ) -> Result<serde_json::Value, SluiceError> {
            time::sleep(self.dur).await;
            Ok(json!({"ok": true}))
        }
    }

    struct RecordingCallback {
        seen: StdMutex<Vec<TaskSnapshot>>,
    }

    impl RecordingCallback {
        fn new() -> Self {
            Self {
                seen: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TaskCallback for RecordingCallback {
        async fn on_terminal(&self, snapshot: &TaskSnapshot) -> Result<(), SluiceError> {
            self.seen.lock().unwrap().push(snapshot.clone());
            Ok(())
        }
    }

    struct FailingCallback;

    #[async_trait]
    impl TaskCallback for FailingCallback {
        async fn on_terminal(&self, _snapshot: &TaskSnapshot) -> Result<(), SluiceError> {
            Err(SluiceError::Handler("callback exploded".to_string()))
        }
    }

    async fn wait_terminal(manager: &QueueManager, id: TaskId) -> TaskSnapshot {
        time::timeout(Duration::from_secs(600), async {
            loop {
                if let Some(snap) = manager.status(id).await
                    && snap.status.is_terminal()
                {
                    return snap;
                }
                time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("task did not reach a terminal state")
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_mark_the_task_failed() {
        let handler = Arc::new(FlakyHandler::new(u32::MAX));
        let mut reg = HandlerRegistry::new();
        reg.register(TaskCategory::CompanyLookup, handler.clone())
            .unwrap();
        let manager = QueueManager::new(
            one_category(TaskCategory::CompanyLookup, unlimited(1)),
            reg,
        )
        .unwrap();
        manager.start().await;

        let id = manager
            .submit(TaskCategory::CompanyLookup, json!({}), None)
            .await
            .unwrap();
        let snap = wait_terminal(&manager, id).await;

        assert_eq!(snap.status, TaskStatus::Failed);
        assert_eq!(snap.retry_count, DEFAULT_MAX_RETRIES);
        // max_retries = 3 means 4 attempts in total.
        assert_eq!(handler.calls.load(Ordering::Relaxed), 4);
        assert!(snap.error.is_some());
        assert!(snap.completed_at.is_some());

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn completes_after_one_transient_failure() {
        let handler = Arc::new(FlakyHandler::new(1));
        let mut reg = HandlerRegistry::new();
        reg.register(TaskCategory::ExportSlides, handler.clone())
            .unwrap();
        let manager = QueueManager::new(
            one_category(TaskCategory::ExportSlides, unlimited(1)),
            reg,
        )
        .unwrap();
        manager.start().await;

        let id = manager
            .submit(TaskCategory::ExportSlides, json!({}), None)
            .await
            .unwrap();
        let snap = wait_terminal(&manager, id).await;

        assert_eq!(snap.status, TaskStatus::Completed);
        assert_eq!(snap.retry_count, 1);
        assert_eq!(handler.calls.load(Ordering::Relaxed), 2);

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn rate_window_defers_the_third_invocation() {
        let handler = Arc::new(StampingHandler::new());
        let mut reg = HandlerRegistry::new();
        reg.register(TaskCategory::ExportPdf, handler.clone())
            .unwrap();
        let config = one_category(
            TaskCategory::ExportPdf,
            CategoryConfig {
                workers: 2,
                rate_per_minute: 2,
                rate_per_hour: None,
                daily_quota: None,
                max_retries: DEFAULT_MAX_RETRIES,
            },
        );
        let manager = QueueManager::new(config, reg).unwrap();
        manager.start().await;

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(
                manager
                    .submit(TaskCategory::ExportPdf, json!({}), None)
                    .await
                    .unwrap(),
            );
        }
        for id in ids {
            let snap = wait_terminal(&manager, id).await;
            assert_eq!(snap.status, TaskStatus::Completed);
        }

        let stamps = handler.stamps.lock().unwrap().clone();
        assert_eq!(stamps.len(), 3);
        // Two admissions fit the window; the third waits for it to slide.
        assert!(stamps[1] - stamps[0] < Duration::from_secs(2));
        assert!(stamps[2] - stamps[0] >= Duration::from_secs(58));

        manager.stop().await;
    }

    #[tokio::test]
    async fn quota_gate_rejects_then_resets_at_midnight() {
        let mut reg = HandlerRegistry::new();
        reg.register(TaskCategory::ExportPdf, Arc::new(EchoHandler::new()))
            .unwrap();
        let config = one_category(
            TaskCategory::ExportPdf,
            CategoryConfig {
                workers: 1,
                rate_per_minute: 0,
                rate_per_hour: None,
                daily_quota: Some(1),
                max_retries: DEFAULT_MAX_RETRIES,
            },
        );
        // Not started: the quota gate acts at submission, workers are not
        // involved.
        let manager = QueueManager::new(config, reg).unwrap();

        manager
            .submit(TaskCategory::ExportPdf, json!({}), None)
            .await
            .unwrap();
        let second = manager.submit(TaskCategory::ExportPdf, json!({}), None).await;
        assert!(matches!(
            second,
            Err(SluiceError::QuotaExceeded(TaskCategory::ExportPdf))
        ));

        // Simulated midnight rollover.
        {
            let mut state = manager.state.lock().await;
            let yesterday = Local::now().date_naive().pred_opt().unwrap();
            state.quotas.set_last_reset(yesterday);
        }
        manager
            .submit(TaskCategory::ExportPdf, json!({}), None)
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_pending_task_never_runs() {
        let handler = Arc::new(EchoHandler::new());
        let mut reg = HandlerRegistry::new();
        reg.register(TaskCategory::PersonLookup, handler.clone())
            .unwrap();
        let manager = QueueManager::new(
            one_category(TaskCategory::PersonLookup, unlimited(2)),
            reg,
        )
        .unwrap();

        let id = manager
            .submit(TaskCategory::PersonLookup, json!({}), None)
            .await
            .unwrap();
        assert!(manager.cancel(id).await);

        manager.start().await;
        time::sleep(Duration::from_secs(5)).await;

        assert_eq!(handler.calls.load(Ordering::Relaxed), 0);
        let snap = manager.status(id).await.unwrap();
        assert_eq!(snap.status, TaskStatus::Cancelled);
        // Terminal tasks cannot be cancelled again.
        assert!(!manager.cancel(id).await);

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_mid_flight_discards_the_result() {
        let mut reg = HandlerRegistry::new();
        reg.register(
            TaskCategory::CompanyLookup,
            Arc::new(SlowHandler {
                dur: Duration::from_secs(10),
            }),
        )
        .unwrap();
        let manager = QueueManager::new(
            one_category(TaskCategory::CompanyLookup, unlimited(1)),
            reg,
        )
        .unwrap();
        manager.start().await;

        let id = manager
            .submit(TaskCategory::CompanyLookup, json!({}), None)
            .await
            .unwrap();

        time::timeout(Duration::from_secs(600), async {
            loop {
                if let Some(snap) = manager.status(id).await
                    && snap.status == TaskStatus::Processing
                {
                    break;
                }
                time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("task never started processing");

        assert!(manager.cancel(id).await);

        // Let the handler finish; its write-back must not resurrect the
        // task.
        time::sleep(Duration::from_secs(15)).await;
        let snap = manager.status(id).await.unwrap();
        assert_eq!(snap.status, TaskStatus::Cancelled);
        assert!(snap.result.is_none());

        manager.stop().await;
    }

    #[tokio::test]
    async fn sweep_purges_only_past_the_retention_horizon() {
        let mut reg = HandlerRegistry::new();
        reg.register(TaskCategory::ExportPdf, Arc::new(EchoHandler::new()))
            .unwrap();
        let manager = QueueManager::new(
            one_category(TaskCategory::ExportPdf, unlimited(1)),
            reg,
        )
        .unwrap();

        let old = manager
            .submit(TaskCategory::ExportPdf, json!({}), None)
            .await
            .unwrap();
        let young = manager
            .submit(TaskCategory::ExportPdf, json!({}), None)
            .await
            .unwrap();

        {
            let mut state = manager.state.lock().await;
            for id in [old, young] {
                let task = state.tasks.get_mut(&id).unwrap();
                task.start();
                task.complete(json!("done"));
            }
            state.tasks.get_mut(&old).unwrap().completed_at =
                Some(Utc::now() - chrono::Duration::hours(2));

            let removed = state.sweep_expired(chrono::Duration::seconds(3600));
            assert_eq!(removed, 1);
        }

        assert!(manager.status(old).await.is_none());
        assert!(manager.status(young).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn five_tasks_two_workers_all_complete() {
        let handler = Arc::new(EchoHandler::new());
        let mut reg = HandlerRegistry::new();
        reg.register(TaskCategory::CompanyLookup, handler.clone())
            .unwrap();
        let manager = QueueManager::new(
            one_category(TaskCategory::CompanyLookup, unlimited(2)),
            reg,
        )
        .unwrap();
        manager.start().await;

        let mut ids = Vec::new();
        for i in 0..5 {
            ids.push(
                manager
                    .submit(TaskCategory::CompanyLookup, json!({"i": i}), None)
                    .await
                    .unwrap(),
            );
        }

        for (i, id) in ids.iter().enumerate() {
            let snap = wait_terminal(&manager, *id).await;
            assert_eq!(snap.status, TaskStatus::Completed);
            assert_eq!(snap.result, Some(json!({"i": i})));
            assert_eq!(snap.retry_count, 0);
            let started = snap.started_at.unwrap();
            assert!(started >= snap.created_at);
            assert!(snap.completed_at.unwrap() >= started);
        }

        assert_eq!(handler.calls.load(Ordering::Relaxed), 5);
        let counts = manager.counts().await;
        assert_eq!(counts.completed, 5);
        assert_eq!(counts.pending, 0);

        manager.stop().await;
    }

    #[tokio::test]
    async fn construction_fails_without_full_handler_coverage() {
        let reg = HandlerRegistry::new();
        let err = QueueManager::new(
            one_category(TaskCategory::ExportPdf, unlimited(1)),
            reg,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            SluiceError::MissingHandlers(missing) if missing == vec![TaskCategory::ExportPdf]
        ));
    }

    #[tokio::test]
    async fn submitting_an_unconfigured_category_is_rejected() {
        let mut reg = HandlerRegistry::new();
        reg.register(TaskCategory::CompanyLookup, Arc::new(EchoHandler::new()))
            .unwrap();
        let manager = QueueManager::new(
            one_category(TaskCategory::CompanyLookup, unlimited(1)),
            reg,
        )
        .unwrap();

        let err = manager
            .submit(TaskCategory::ExportPdf, json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SluiceError::UnconfiguredCategory(TaskCategory::ExportPdf)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_stop_are_idempotent() {
        let mut reg = HandlerRegistry::new();
        reg.register(TaskCategory::PersonLookup, Arc::new(EchoHandler::new()))
            .unwrap();
        let manager = QueueManager::new(
            one_category(TaskCategory::PersonLookup, unlimited(1)),
            reg,
        )
        .unwrap();

        manager.start().await;
        manager.start().await;
        manager.stop().await;
        manager.stop().await;

        // A stopped manager can be started again.
        manager.start().await;
        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn callback_fires_on_completion_and_on_failure() {
        let mut reg = HandlerRegistry::new();
        reg.register(TaskCategory::ExportPdf, Arc::new(FlakyHandler::new(0)))
            .unwrap();
        reg.register(TaskCategory::ExportSlides, Arc::new(FlakyHandler::new(u32::MAX)))
            .unwrap();
        let config = QueueConfig {
            categories: HashMap::from([
                (TaskCategory::ExportPdf, unlimited(1)),
                (TaskCategory::ExportSlides, unlimited(1)),
            ]),
            poll_interval_secs: 1,
            cleanup_interval_secs: 300,
            retention_secs: 3600,
        };
        let manager = QueueManager::new(config, reg).unwrap();
        manager.start().await;

        let callback = Arc::new(RecordingCallback::new());
        let ok = manager
            .submit(TaskCategory::ExportPdf, json!({}), Some(callback.clone()))
            .await
            .unwrap();
        let bad = manager
            .submit(TaskCategory::ExportSlides, json!({}), Some(callback.clone()))
            .await
            .unwrap();

        wait_terminal(&manager, ok).await;
        wait_terminal(&manager, bad).await;
        // Status flips terminal before the callback hop; give it a tick.
        time::sleep(Duration::from_secs(1)).await;

        let seen = callback.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 2);
        let by_id = |id: TaskId| seen.iter().find(|s| s.id == id).unwrap().status;
        assert_eq!(by_id(ok), TaskStatus::Completed);
        assert_eq!(by_id(bad), TaskStatus::Failed);

        manager.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn callback_failure_does_not_kill_the_worker() {
        let handler = Arc::new(EchoHandler::new());
        let mut reg = HandlerRegistry::new();
        reg.register(TaskCategory::CompanyLookup, handler.clone())
            .unwrap();
        let manager = QueueManager::new(
            one_category(TaskCategory::CompanyLookup, unlimited(1)),
            reg,
        )
        .unwrap();
        manager.start().await;

        let first = manager
            .submit(
                TaskCategory::CompanyLookup,
                json!({"n": 1}),
                Some(Arc::new(FailingCallback)),
            )
            .await
            .unwrap();
        wait_terminal(&manager, first).await;

        // The same (sole) worker must still be alive to run this one.
        let second = manager
            .submit(TaskCategory::CompanyLookup, json!({"n": 2}), None)
            .await
            .unwrap();
        let snap = wait_terminal(&manager, second).await;
        assert_eq!(snap.status, TaskStatus::Completed);
        assert_eq!(handler.calls.load(Ordering::Relaxed), 2);

        manager.stop().await;
    }
}
