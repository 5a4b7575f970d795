use thiserror::Error;

use crate::domain::TaskCategory;

#[derive(Debug, Error)]
pub enum SluiceError {
    /// Submission rejected synchronously: the category's daily quota is
    /// spent. The task never entered the table.
    #[error("daily quota exhausted for category={0}")]
    QuotaExceeded(TaskCategory),

    /// Submission for a category the manager was not configured with.
    #[error("category not configured: {0}")]
    UnconfiguredCategory(TaskCategory),

    #[error("no handler registered for category={0}")]
    HandlerNotFound(TaskCategory),

    #[error("duplicate handler for category={0}")]
    DuplicateHandler(TaskCategory),

    /// Construction-time coverage check failed.
    #[error("configured categories without a handler: {0:?}")]
    MissingHandlers(Vec<TaskCategory>),

    /// A handler reported failure; each occurrence consumes one retry
    /// slot until the task's budget is spent.
    #[error("handler failed: {0}")]
    Handler(String),
}
