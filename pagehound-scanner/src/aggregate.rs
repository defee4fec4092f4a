use crate::result::{DefectCategory, DefectRecord};
use std::collections::BTreeMap;

/// Append-only accumulator for one scan's defects, grouped by category in
/// emission order. Records are never merged or deduplicated.
#[derive(Debug, Default)]
pub struct DefectLog {
    records: BTreeMap<DefectCategory, Vec<DefectRecord>>,
}

impl DefectLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: DefectRecord) {
        self.records.entry(record.category).or_default().push(record);
    }

    pub fn len(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Immutable copy of everything recorded so far.
    pub fn snapshot(&self) -> BTreeMap<DefectCategory, Vec<DefectRecord>> {
        self.records.clone()
    }
}
