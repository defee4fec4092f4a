use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kinds of front-end defect a scan can report.
///
/// Declaration order is the report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DefectCategory {
    BrokenImage,
    UnresponsiveControl,
    ConsoleError,
    PageError,
    #[serde(rename = "HTTPError")]
    HttpError,
    NavigationError,
    RequestFailed,
}

impl DefectCategory {
    pub const ALL: [DefectCategory; 7] = [
        DefectCategory::BrokenImage,
        DefectCategory::UnresponsiveControl,
        DefectCategory::ConsoleError,
        DefectCategory::PageError,
        DefectCategory::HttpError,
        DefectCategory::NavigationError,
        DefectCategory::RequestFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DefectCategory::BrokenImage => "broken_image",
            DefectCategory::UnresponsiveControl => "unresponsive_control",
            DefectCategory::ConsoleError => "console_error",
            DefectCategory::PageError => "page_error",
            DefectCategory::HttpError => "http_error",
            DefectCategory::NavigationError => "navigation_error",
            DefectCategory::RequestFailed => "request_failed",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DefectCategory::BrokenImage => "Broken images",
            DefectCategory::UnresponsiveControl => "Unresponsive controls",
            DefectCategory::ConsoleError => "Console errors",
            DefectCategory::PageError => "Uncaught page errors",
            DefectCategory::HttpError => "HTTP errors",
            DefectCategory::NavigationError => "Navigation errors",
            DefectCategory::RequestFailed => "Failed requests",
        }
    }
}

/// A single detected defect. Never mutated after it has been recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefectRecord {
    pub category: DefectCategory,
    pub page_url: String,
    pub detail: String,
    pub replication_steps: Vec<String>,
}

impl DefectRecord {
    pub fn new(category: DefectCategory, page_url: impl Into<String>, detail: impl Into<String>) -> Self {
        let page_url = page_url.into();
        Self {
            category,
            replication_steps: vec![format!("Open {}", page_url)],
            page_url,
            detail: detail.into(),
        }
    }

    pub fn with_step(mut self, step: impl Into<String>) -> Self {
        self.replication_steps.push(step.into());
        self
    }
}

/// Snapshot of everything a scan found.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub scan_id: String,
    pub seed: String,
    pub origin_host: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub pages_visited: Vec<String>,
    pub truncated: bool,
    pub defects: BTreeMap<DefectCategory, Vec<DefectRecord>>,
}

impl Report {
    pub fn total_defects(&self) -> usize {
        self.defects.values().map(Vec::len).sum()
    }

    pub fn count(&self, category: DefectCategory) -> usize {
        self.records(category).len()
    }

    pub fn records(&self, category: DefectCategory) -> &[DefectRecord] {
        self.defects
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_clean(&self) -> bool {
        self.total_defects() == 0
    }

    /// All records in report order: by category, then emission order.
    pub fn iter(&self) -> impl Iterator<Item = &DefectRecord> {
        self.defects.values().flatten()
    }

    pub fn duration_seconds(&self) -> i64 {
        (self.finished_at - self.started_at).num_seconds()
    }
}
