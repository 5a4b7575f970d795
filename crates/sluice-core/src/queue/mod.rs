//! Queue internals: task records, lifecycle states, admission control.

pub mod limiter;
pub mod quota;
pub mod record;
pub mod state;

pub use limiter::RateLimiter;
pub use quota::QuotaTracker;
pub use record::{DEFAULT_MAX_RETRIES, QueueTask};
pub use state::TaskStatus;
