//! Task record: payload + lifecycle metadata.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use super::TaskStatus;
use crate::domain::{TaskCategory, TaskId};
use crate::observability::TaskSnapshot;
use crate::runtime::TaskCallback;

/// Default retry budget granted to a task.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A task in the queue.
///
/// Design:
/// - This record is the single source of truth for one unit of work.
/// - It is mutated only by the worker that claimed it (or by `cancel`),
///   always under the manager's state lock.
/// - All transitions go through the methods below, which stamp timestamps.
pub struct QueueTask {
    pub id: TaskId,
    pub category: TaskCategory,

    /// Opaque structured payload owned by the submitter. The queue never
    /// inspects it; the category's handler decodes it.
    pub payload: serde_json::Value,

    /// Invoked once the task reaches Completed or Failed.
    pub callback: Option<Arc<dyn TaskCallback>>,

    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,

    /// Stamped when a terminal state is reached; the cleanup sweep keys
    /// retention off this.
    pub completed_at: Option<DateTime<Utc>>,

    pub result: Option<serde_json::Value>,
    pub error: Option<String>,

    /// Retries consumed so far. Invariant: retry_count <= max_retries.
    pub retry_count: u32,
    pub max_retries: u32,
}

impl QueueTask {
    pub fn new(
        category: TaskCategory,
        payload: serde_json::Value,
        callback: Option<Arc<dyn TaskCallback>>,
        max_retries: u32,
    ) -> Self {
        Self {
            id: TaskId::new(),
            category,
            payload,
            callback,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            retry_count: 0,
            max_retries,
        }
    }

    /// Claim: Pending -> Processing.
    pub fn start(&mut self) {
        self.status = TaskStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    /// Processing -> Completed.
    pub fn complete(&mut self, result: serde_json::Value) {
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.completed_at = Some(Utc::now());
    }

    /// Are retry slots left?
    pub fn has_retry_budget(&self) -> bool {
        self.retry_count < self.max_retries
    }

    /// Processing -> Pending, consuming one retry slot. The task becomes
    /// re-eligible immediately; there is no backoff between attempts.
    pub fn retry(&mut self, error: String) {
        self.retry_count += 1;
        self.error = Some(error);
        self.status = TaskStatus::Pending;
    }

    /// Processing -> Failed, retries exhausted.
    pub fn fail(&mut self, error: String) {
        self.status = TaskStatus::Failed;
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
    }

    /// Pending | Processing -> Cancelled. completed_at is stamped so the
    /// cleanup sweep can eventually purge the record.
    pub fn cancel(&mut self) {
        self.status = TaskStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }

    /// Point-in-time view handed out by `QueueManager::status`.
    pub fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            category: self.category,
            status: self.status,
            created_at: self.created_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            result: self.result.clone(),
            error: self.error.clone(),
            retry_count: self.retry_count,
        }
    }
}
