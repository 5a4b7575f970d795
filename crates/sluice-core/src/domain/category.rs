//! Task categories: the closed set of external-service work kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One kind of work the queue can execute.
///
/// Each category maps onto one external service operation and gets its own
/// worker pool, rate limiter, and (optionally) a daily quota. The set is
/// closed on purpose: every configured category must have a handler
/// registered before the manager starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// Render a finished report as a PDF document.
    ExportPdf,
    /// Render a finished report as a slide deck.
    ExportSlides,
    /// Registry lookup of a company record.
    CompanyLookup,
    /// Registry lookup of an individual record.
    PersonLookup,
}

impl TaskCategory {
    /// All categories, in declaration order.
    pub const ALL: [TaskCategory; 4] = [
        TaskCategory::ExportPdf,
        TaskCategory::ExportSlides,
        TaskCategory::CompanyLookup,
        TaskCategory::PersonLookup,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskCategory::ExportPdf => "export_pdf",
            TaskCategory::ExportSlides => "export_slides",
            TaskCategory::CompanyLookup => "company_lookup",
            TaskCategory::PersonLookup => "person_lookup",
        }
    }
}

impl fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
