//! Pluggable defect checks run against each rendered page.
//!
//! Every detector is invoked through [`FailSafe`], which turns an error or a
//! panic inside the detector into a "defect present" record instead of
//! letting it hide the page's problems or abort the crawl.

pub mod console;
pub mod control;
pub mod image;
pub mod status;

pub use console::{ConsoleErrorDetector, FailedRequestDetector, PageErrorDetector};
pub use control::{CONTROL_SELECTOR, UnresponsiveControlDetector};
pub use image::BrokenImageDetector;
pub use status::HttpStatusDetector;

use crate::error::Result;
use crate::normalize::CanonicalUrl;
use crate::renderer::{EventLog, Navigation, PageEvent, PageRenderer};
use crate::result::{DefectCategory, DefectRecord};
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// Which optional detectors run. Console, page-error, failed-request and
/// HTTP status detection are always on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectorConfig {
    pub check_images: bool,
    pub check_buttons: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            check_images: true,
            check_buttons: true,
        }
    }
}

/// A page that has finished loading, as seen by the detectors.
pub struct RenderedPage<'a, R: PageRenderer> {
    pub renderer: &'a R,
    /// Canonical form of the URL that was requested.
    pub url: CanonicalUrl,
    pub navigation: Navigation,
    pub nav_timeout: Duration,
    events: Mutex<EventLog>,
}

impl<'a, R: PageRenderer> RenderedPage<'a, R> {
    pub fn new(
        renderer: &'a R,
        url: CanonicalUrl,
        navigation: Navigation,
        nav_timeout: Duration,
        events: EventLog,
    ) -> Self {
        Self {
            renderer,
            url,
            navigation,
            nav_timeout,
            events: Mutex::new(events),
        }
    }

    pub fn final_url(&self) -> &str {
        &self.navigation.final_url
    }

    /// Events observed since this page started loading, plus the number of
    /// events lost to subscriber lag.
    pub fn events(&self) -> (Vec<PageEvent>, u64) {
        let mut log = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        log.drain();
        (log.events().to_vec(), log.lagged())
    }

    /// Navigate back to this page's final URL after an interaction moved the
    /// browser elsewhere. Events fired by the reload itself are discarded so
    /// load-time console output is not reported twice.
    pub async fn restore(&self) -> Result<()> {
        let keep = {
            let mut log = self.events.lock().unwrap_or_else(PoisonError::into_inner);
            log.drain();
            log.events().len()
        };

        debug!("Restoring {} after interaction", self.final_url());
        let outcome = self
            .renderer
            .navigate(&self.navigation.final_url, self.nav_timeout)
            .await;

        let mut log = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        log.drain();
        log.truncate(keep);
        outcome.map(|_| ())
    }
}

#[async_trait]
pub trait Detector<R: PageRenderer>: Send + Sync {
    fn name(&self) -> &'static str;

    /// Category of the records this detector emits, also used for its
    /// fail-safe record.
    fn category(&self) -> DefectCategory;

    async fn detect(&self, page: &RenderedPage<'_, R>) -> Result<Vec<DefectRecord>>;
}

/// Decorator that makes any detector infallible.
pub struct FailSafe<R: PageRenderer> {
    inner: Box<dyn Detector<R>>,
}

impl<R: PageRenderer> FailSafe<R> {
    pub fn new(detector: impl Detector<R> + 'static) -> Self {
        Self {
            inner: Box::new(detector),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    pub async fn run(&self, page: &RenderedPage<'_, R>) -> Vec<DefectRecord> {
        let outcome = AssertUnwindSafe(self.inner.detect(page)).catch_unwind().await;

        let reason = match outcome {
            Ok(Ok(records)) => return records,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "detector panicked".to_string()),
        };

        warn!(
            "{} detector failed on {}: {}",
            self.inner.name(),
            page.final_url(),
            reason
        );
        vec![
            DefectRecord::new(
                self.inner.category(),
                page.final_url(),
                format!(
                    "{} check could not complete ({}); the page is reported as defective",
                    self.inner.name(),
                    reason
                ),
            )
            .with_step(format!("Re-run the {} check on this page manually", self.inner.name())),
        ]
    }
}

/// Detectors that run after the HTTP status check, in execution order.
/// Interactive detectors come first so the passive ones also see events
/// fired while controls were probed.
pub fn detector_set<R: PageRenderer>(config: &DetectorConfig, settle: Duration) -> Vec<FailSafe<R>> {
    let mut detectors = Vec::new();
    if config.check_images {
        detectors.push(FailSafe::new(BrokenImageDetector));
    }
    if config.check_buttons {
        detectors.push(FailSafe::new(UnresponsiveControlDetector::new(settle)));
    }
    detectors.push(FailSafe::new(ConsoleErrorDetector));
    detectors.push(FailSafe::new(PageErrorDetector));
    detectors.push(FailSafe::new(FailedRequestDetector));
    detectors
}

/// Record noting that `lagged` events were lost before a passive detector
/// could inspect them.
pub(crate) fn lag_record(category: DefectCategory, page_url: &str, lagged: u64) -> DefectRecord {
    DefectRecord::new(
        category,
        page_url,
        format!(
            "{} page events were dropped before they could be inspected; defects may be missing from this report",
            lagged
        ),
    )
}
