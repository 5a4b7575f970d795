//! Handler dispatch: the static table mapping categories to handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::TaskCategory;
use crate::error::SluiceError;
use crate::observability::TaskSnapshot;

/// A handler for one task category.
///
/// The payload arrives exactly as the submitter provided it; the handler
/// decodes it as it likes and returns a structured result that is stored
/// on the task. Every error consumes one retry slot. The queue imposes no
/// deadline; a handler talking to a slow external service is expected to
/// bound its own waiting.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, payload: serde_json::Value) -> Result<serde_json::Value, SluiceError>;
}

/// Completion hook attached to a single task.
///
/// Invoked once, when the task reaches Completed or Failed. Errors are
/// logged by the worker and go no further.
#[async_trait]
pub trait TaskCallback: Send + Sync {
    async fn on_terminal(&self, snapshot: &TaskSnapshot) -> Result<(), SluiceError>;
}

/// Registry of handlers (category -> handler).
///
/// Design:
/// - Built during initialization (mutable).
/// - Used during runtime (immutable).
/// Handler coverage is checked once at manager construction, so a missing
/// handler is a startup error, not a runtime surprise.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskCategory, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a category. Double registration is an error.
    pub fn register(
        &mut self,
        category: TaskCategory,
        handler: Arc<dyn TaskHandler>,
    ) -> Result<(), SluiceError> {
        if self.handlers.contains_key(&category) {
            return Err(SluiceError::DuplicateHandler(category));
        }
        self.handlers.insert(category, handler);
        Ok(())
    }

    pub fn get(&self, category: TaskCategory) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers.get(&category)
    }

    /// Check that every category in `required` has a handler.
    pub fn ensure_covers(
        &self,
        required: impl IntoIterator<Item = TaskCategory>,
    ) -> Result<(), SluiceError> {
        let missing: Vec<TaskCategory> = required
            .into_iter()
            .filter(|c| !self.handlers.contains_key(c))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(SluiceError::MissingHandlers(missing))
        }
    }

    /// Execute one payload against the handler bound to `category`.
    pub async fn execute(
        &self,
        category: TaskCategory,
        payload: serde_json::Value,
    ) -> Result<serde_json::Value, SluiceError> {
        let handler = self
            .get(category)
            .ok_or(SluiceError::HandlerNotFound(category))?;
        handler.handle(payload).await
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
