//! sluice-core
//!
//! In-process task queue that mediates every call to rate-limited,
//! quota-bound external services (document generation, registry lookups):
//! bounded per-category concurrency, sliding-window admission control,
//! daily quota accounting, retry-with-limits, and cooperative
//! cancellation.
//!
//! # Module layout
//! - **domain**: identifiers and task categories
//! - **queue**: task records, lifecycle states, admission control
//! - **runtime**: handler & callback traits, static dispatch registry
//! - **worker**: per-category worker loops and the cleanup sweep
//! - **manager**: [`QueueManager`], the composition root and public API
//! - **config**: construction-time settings
//! - **observability**: status views ([`TaskSnapshot`], [`QueueCounts`])
//! - **error**: crate error type

pub mod config;
pub mod domain;
pub mod error;
pub mod manager;
pub mod observability;
pub mod queue;
pub mod runtime;

mod worker;

pub use config::{CategoryConfig, QueueConfig};
pub use domain::{TaskCategory, TaskId};
pub use error::SluiceError;
pub use manager::QueueManager;
pub use observability::{QueueCounts, TaskSnapshot};
pub use queue::{DEFAULT_MAX_RETRIES, TaskStatus};
pub use runtime::{HandlerRegistry, TaskCallback, TaskHandler};
