//! Daily admission quotas.

use chrono::{DateTime, Local, NaiveDate};
use std::collections::HashMap;

use crate::domain::TaskCategory;

/// Daily-resettable admission ceilings, one per quota-bearing category.
///
/// Categories with no configured ceiling are unlimited and never counted.
/// All quotas reset together on the first check after local midnight.
/// Atomicity with respect to concurrent submissions comes from the manager
/// holding its state lock around every call.
#[derive(Debug)]
pub struct QuotaTracker {
    ceilings: HashMap<TaskCategory, u32>,
    remaining: HashMap<TaskCategory, u32>,
    last_reset: NaiveDate,
}

impl QuotaTracker {
    pub fn new(ceilings: HashMap<TaskCategory, u32>) -> Self {
        let remaining = ceilings.clone();
        Self {
            ceilings,
            remaining,
            last_reset: Local::now().date_naive(),
        }
    }

    /// Consume one admission slot for `category`. Returns false, without
    /// decrementing, when the category's quota is spent for the day.
    pub fn check_and_consume(&mut self, category: TaskCategory) -> bool {
        self.check_and_consume_at(category, Local::now())
    }

    fn check_and_consume_at(&mut self, category: TaskCategory, now: DateTime<Local>) -> bool {
        let today = now.date_naive();
        if today > self.last_reset {
            self.remaining = self.ceilings.clone();
            self.last_reset = today;
        }

        let Some(left) = self.remaining.get_mut(&category) else {
            // Untracked category: unlimited.
            return true;
        };
        if *left == 0 {
            return false;
        }
        *left -= 1;
        true
    }

    /// Slots left today; None when the category is unlimited.
    pub fn remaining_today(&self, category: TaskCategory) -> Option<u32> {
        self.remaining.get(&category).copied()
    }

    /// Test hook: pretend the last reset happened on `date`.
    #[cfg(test)]
    pub(crate) fn set_last_reset(&mut self, date: NaiveDate) {
        self.last_reset = date;
    }
}
