use crate::normalize::CanonicalUrl;
use std::collections::HashSet;

/// Canonical URLs already scheduled or completed during one crawl run.
///
/// Owned by a single `Scheduler`; created when the crawl starts and dropped
/// with it.
#[derive(Debug, Default)]
pub struct VisitedRegistry {
    seen: HashSet<CanonicalUrl>,
    order: Vec<CanonicalUrl>,
}

impl VisitedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check-and-mark. Returns true if `url` was not yet present.
    pub fn mark(&mut self, url: &CanonicalUrl) -> bool {
        if self.seen.insert(url.clone()) {
            self.order.push(url.clone());
            true
        } else {
            false
        }
    }

    pub fn contains(&self, url: &CanonicalUrl) -> bool {
        self.seen.contains(url)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Visited URLs in the order they were marked.
    pub fn urls(&self) -> &[CanonicalUrl] {
        &self.order
    }
}
