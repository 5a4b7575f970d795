//! Construction-time configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::time::Duration;

use crate::domain::TaskCategory;
use crate::queue::DEFAULT_MAX_RETRIES;

/// Admission and concurrency settings for one task category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Number of concurrent worker loops.
    pub workers: usize,

    /// Sliding-window ceiling per minute. 0 disables the window.
    pub rate_per_minute: u32,

    /// Optional per-hour ceiling; defaults to `rate_per_minute * 60`.
    #[serde(default)]
    pub rate_per_hour: Option<u32>,

    /// Optional daily admission quota; absent means unlimited.
    #[serde(default)]
    pub daily_quota: Option<u32>,

    /// Retry budget granted to each task of this category.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

/// Top-level queue settings. Intervals are whole seconds, matching how the
/// deployment configuration spells them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    pub categories: HashMap<TaskCategory, CategoryConfig>,

    /// How long an idle worker sleeps before re-scanning the table.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// How often the cleanup sweep runs.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,

    /// Minimum age of a terminal task before the sweep may purge it.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    1
}

fn default_cleanup_interval_secs() -> u64 {
    300
}

fn default_retention_secs() -> u64 {
    3600
}

impl QueueConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.retention_secs as i64)
    }
}

impl Default for QueueConfig {
    /// Deployment defaults: two export workers sharing the generation
    /// service's tight budget, three lookup workers against the registry's
    /// per-hour cap.
    fn default() -> Self {
        let export = CategoryConfig {
            workers: 2,
            rate_per_minute: 3,
            rate_per_hour: None,
            daily_quota: Some(50),
            max_retries: DEFAULT_MAX_RETRIES,
        };
        let lookup = CategoryConfig {
            workers: 3,
            rate_per_minute: 10,
            rate_per_hour: Some(300),
            daily_quota: None,
            max_retries: DEFAULT_MAX_RETRIES,
        };

        let mut categories = HashMap::new();
        categories.insert(TaskCategory::ExportPdf, export.clone());
        categories.insert(TaskCategory::ExportSlides, export);
        categories.insert(TaskCategory::CompanyLookup, lookup.clone());
        categories.insert(TaskCategory::PersonLookup, lookup);

        Self {
            categories,
            poll_interval_secs: default_poll_interval_secs(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            retention_secs: default_retention_secs(),
        }
    }
}
