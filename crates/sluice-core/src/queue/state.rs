//! Task lifecycle states.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a queued task.
///
/// Transitions:
/// - Pending -> Processing (a worker claims the task)
/// - Processing -> Completed (handler returned a result)
/// - Processing -> Pending (handler failed, retry slots remain)
/// - Processing -> Failed (handler failed, retries exhausted)
/// - Pending | Processing -> Cancelled (explicit cancel)
///
/// Terminal states are immutable once reached; the only thing that happens
/// to a terminal record afterwards is removal by the cleanup sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for a worker of its category.
    Pending,

    /// Claimed; its handler is running.
    Processing,

    /// Handler returned a result.
    Completed,

    /// Handler failed and the retry budget is spent.
    Failed,

    /// Explicitly cancelled before completion.
    Cancelled,
}

impl TaskStatus {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Is this task eligible for a worker to claim?
    pub fn is_claimable(self) -> bool {
        matches!(self, TaskStatus::Pending)
    }
}
