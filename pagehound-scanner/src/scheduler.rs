use crate::aggregate::DefectLog;
use crate::detectors::{DetectorConfig, FailSafe, HttpStatusDetector, RenderedPage, detector_set};
use crate::detectors::control::DEFAULT_SETTLE;
use crate::error::{Result, ScanError};
use crate::normalize::{CanonicalUrl, in_scope, normalize};
use crate::registry::VisitedRegistry;
use crate::renderer::{EventLog, PageRenderer};
use crate::result::{DefectCategory, DefectRecord, Report};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

pub type ProgressCallback = Arc<dyn Fn(usize, String) + Send + Sync>;
pub type DefectCallback = Arc<dyn Fn(&DefectRecord) + Send + Sync>;

pub const DEFAULT_NAV_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_PAGES: usize = 200;
pub const DEFAULT_MAX_DEPTH: usize = 10;

#[derive(Debug, Clone)]
pub struct ScanConfig {
    pub detectors: DetectorConfig,
    pub nav_timeout: Duration,
    /// Wait after each control probe click.
    pub settle: Duration,
    /// Pages visited per scan before the frontier is abandoned.
    pub max_pages: usize,
    /// Link hops from the seed; the seed is depth 0. A page is rendered once,
    /// at the depth it is first reached in depth-first order. If a shorter
    /// path to it turns up later, its links are expanded from that depth
    /// without rendering it again.
    pub max_depth: usize,
    /// Run detectors and follow links on pages with a non-2xx status.
    pub explore_error_pages: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            detectors: DetectorConfig::default(),
            nav_timeout: DEFAULT_NAV_TIMEOUT,
            settle: DEFAULT_SETTLE,
            max_pages: DEFAULT_MAX_PAGES,
            max_depth: DEFAULT_MAX_DEPTH,
            explore_error_pages: true,
        }
    }
}

impl ScanConfig {
    pub fn with_detectors(mut self, detectors: DetectorConfig) -> Self {
        self.detectors = detectors;
        self
    }

    pub fn with_nav_timeout(mut self, timeout: Duration) -> Self {
        self.nav_timeout = timeout;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_explore_error_pages(mut self, explore: bool) -> Self {
        self.explore_error_pages = explore;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// A discovered link waiting to be considered.
struct Frame {
    raw: String,
    /// Final URL of the page the link was found on.
    base: Option<String>,
    depth: usize,
}

/// Links found on a page, with the URL they resolve against.
struct Outbound {
    base: String,
    links: Vec<String>,
}

/// Drives one depth-first crawl over a single origin.
///
/// All crawl state (visited set, defects) lives here and dies with the
/// scheduler; a scheduler runs exactly once.
pub struct Scheduler<R: PageRenderer> {
    renderer: R,
    config: ScanConfig,
    status_detector: FailSafe<R>,
    detectors: Vec<FailSafe<R>>,
    visited: VisitedRegistry,
    /// Links of pages reached at the depth limit, kept for a shallower revisit.
    depth_limited: HashMap<CanonicalUrl, Outbound>,
    defects: DefectLog,
    state: ScanState,
    truncated: bool,
    progress_callback: Option<ProgressCallback>,
    defect_callback: Option<DefectCallback>,
}

impl<R: PageRenderer> Scheduler<R> {
    pub fn new(renderer: R, config: ScanConfig) -> Self {
        let detectors = detector_set(&config.detectors, config.settle);
        Self {
            renderer,
            config,
            status_detector: FailSafe::new(HttpStatusDetector),
            detectors,
            visited: VisitedRegistry::new(),
            depth_limited: HashMap::new(),
            defects: DefectLog::new(),
            state: ScanState::Idle,
            truncated: false,
            progress_callback: None,
            defect_callback: None,
        }
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub fn with_defect_callback(mut self, callback: DefectCallback) -> Self {
        self.defect_callback = Some(callback);
        self
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn visited(&self) -> &VisitedRegistry {
        &self.visited
    }

    pub fn into_renderer(self) -> R {
        self.renderer
    }

    /// Crawl everything reachable from `seed` within its origin.
    ///
    /// Per-page failures become defect records; only a seed that cannot
    /// start a scan is returned as an error.
    pub async fn crawl(&mut self, seed: &str) -> Result<Report> {
        if self.state != ScanState::Idle {
            return Err(ScanError::Setup("scheduler has already run".to_string()));
        }

        let started_at = Utc::now();
        let (seed_url, origin_host) = match Self::origin_of(seed) {
            Ok(origin) => origin,
            Err(e) => {
                self.state = ScanState::Failed;
                return Err(e);
            }
        };

        self.state = ScanState::Running;
        info!("Starting scan of {} (origin {})", seed_url, origin_host);

        // Explicit stack: pop order gives depth-first pre-order traversal
        let mut frontier = vec![Frame {
            raw: seed_url.to_string(),
            base: None,
            depth: 0,
        }];

        while let Some(frame) = frontier.pop() {
            let url = match normalize(&frame.raw, frame.base.as_deref()) {
                Ok(url) => url,
                Err(e) => {
                    debug!("Skipping link: {}", e);
                    continue;
                }
            };
            if !url.in_scope(&origin_host) {
                debug!("Skipping out-of-scope {}", url);
                continue;
            }
            if self.visited.contains(&url) {
                if frame.depth < self.config.max_depth
                    && let Some(outbound) = self.depth_limited.remove(&url)
                {
                    debug!("Reached {} again at depth {}; following its links", url, frame.depth);
                    Self::push_links(&mut frontier, outbound, frame.depth + 1);
                }
                continue;
            }
            if self.visited.len() >= self.config.max_pages {
                warn!(
                    "Page budget of {} exhausted; {} links left unexplored",
                    self.config.max_pages,
                    frontier.len() + 1
                );
                self.truncated = true;
                break;
            }

            // Marked before rendering so a failing page is still visited once
            self.visited.mark(&url);
            if let Some(ref callback) = self.progress_callback {
                callback(self.visited.len(), url.to_string());
            }

            let Some(outbound) = self.visit(&url, &origin_host).await else {
                continue;
            };

            if frame.depth >= self.config.max_depth {
                if !outbound.links.is_empty() {
                    debug!("Depth limit reached at {}; not following {} links", url, outbound.links.len());
                    self.depth_limited.insert(url, outbound);
                }
                continue;
            }

            Self::push_links(&mut frontier, outbound, frame.depth + 1);
        }

        self.state = ScanState::Completed;
        info!(
            "Scan complete. Visited {} pages, recorded {} defects",
            self.visited.len(),
            self.defects.len()
        );

        Ok(Report {
            scan_id: uuid::Uuid::new_v4().to_string(),
            seed: seed_url.to_string(),
            origin_host,
            started_at,
            finished_at: Utc::now(),
            pages_visited: self.visited.urls().iter().map(CanonicalUrl::to_string).collect(),
            truncated: self.truncated,
            defects: self.defects.snapshot(),
        })
    }

    /// Push in reverse so the first link in document order pops first.
    fn push_links(frontier: &mut Vec<Frame>, outbound: Outbound, depth: usize) {
        for link in outbound.links.into_iter().rev() {
            frontier.push(Frame {
                raw: link,
                base: Some(outbound.base.clone()),
                depth,
            });
        }
    }

    fn origin_of(seed: &str) -> Result<(CanonicalUrl, String)> {
        let seed_url = normalize(seed, None)
            .map_err(|e| ScanError::Setup(format!("invalid seed URL: {}", e)))?;
        let origin_host = seed_url
            .host()
            .ok_or_else(|| ScanError::Setup(format!("seed URL {} has no host", seed_url)))?;
        if !seed_url.in_scope(&origin_host) {
            return Err(ScanError::Setup(format!(
                "seed URL {} must use http or https",
                seed_url
            )));
        }
        Ok((seed_url, origin_host))
    }

    /// Render one page, run the detectors, and return its outbound links.
    /// Returns `None` when the page's subtree must not be explored.
    async fn visit(&mut self, url: &CanonicalUrl, origin_host: &str) -> Option<Outbound> {
        debug!("Visiting {}", url);
        let timeout = self.config.nav_timeout;
        let events = EventLog::new(self.renderer.subscribe());

        let navigation = match self.renderer.navigate(url.as_str(), timeout).await {
            Ok(navigation) if navigation.status.is_some() => navigation,
            Ok(_) => {
                self.record(Self::navigation_error(url, "no response was received"));
                return None;
            }
            Err(e) => {
                warn!("Navigation failed for {}: {}", url, e);
                self.record(Self::navigation_error(url, &e.to_string()));
                return None;
            }
        };

        // A redirect off the site is not checked, clicked or crawled
        if !in_scope(&navigation.final_url, origin_host) {
            info!("{} redirected off-site to {}; not checking it", url, navigation.final_url);
            if let Some(record) = HttpStatusDetector::inspect(url.as_str(), &navigation) {
                self.record(record);
            }
            return None;
        }

        let mut records = Vec::new();
        let page = RenderedPage::new(&self.renderer, url.clone(), navigation, timeout, events);

        records.extend(self.status_detector.run(&page).await);
        if !page.navigation.is_success() && !self.config.explore_error_pages {
            drop(page);
            self.record_all(records);
            return None;
        }

        for detector in &self.detectors {
            let found = detector.run(&page).await;
            debug!("{} detector: {} defects on {}", detector.name(), found.len(), url);
            records.extend(found);
        }

        let links = match Self::extract_links(&page).await {
            Ok(links) => links,
            Err(e) => {
                warn!("Link extraction failed for {}: {}", url, e);
                records.push(
                    DefectRecord::new(
                        DefectCategory::NavigationError,
                        page.final_url(),
                        format!("Link extraction failed at {}: {}", page.final_url(), e),
                    )
                    .with_step("Inspect the page's anchors in the browser developer tools"),
                );
                Vec::new()
            }
        };
        let base = page.final_url().to_string();
        drop(page);

        self.record_all(records);
        Some(Outbound { base, links })
    }

    /// `href` of every anchor, in document order.
    async fn extract_links(page: &RenderedPage<'_, R>) -> Result<Vec<String>> {
        let renderer = page.renderer;

        // Control probing may have left the browser on another page
        let current = renderer.current_url().await?;
        let home = normalize(page.final_url(), None).ok();
        if normalize(&current, None).ok() != home {
            page.restore().await?;
        }

        let anchors = renderer.query_all("a[href]").await?;
        let mut links = Vec::with_capacity(anchors.len());
        for anchor in &anchors {
            match renderer.element_property(anchor, "href").await {
                Ok(value) => {
                    if let Some(href) = value.as_str().filter(|h| !h.is_empty()) {
                        links.push(href.to_string());
                    }
                }
                Err(e) => debug!("Unreadable anchor on {}: {}", page.final_url(), e),
            }
        }
        debug!("Found {} links on {}", links.len(), page.final_url());
        Ok(links)
    }

    fn navigation_error(url: &CanonicalUrl, reason: &str) -> DefectRecord {
        DefectRecord::new(
            DefectCategory::NavigationError,
            url.as_str(),
            format!("Navigation error at {}: {}", url, reason),
        )
        .with_step("Observe that the page does not load")
    }

    fn record(&mut self, record: DefectRecord) {
        if let Some(ref callback) = self.defect_callback {
            callback(&record);
        }
        self.defects.record(record);
    }

    fn record_all(&mut self, records: Vec<DefectRecord>) {
        for record in records {
            self.record(record);
        }
    }
}

/// Run a complete scan of `seed` with a fresh scheduler.
pub async fn run_scan<R: PageRenderer>(renderer: R, seed: &str, config: ScanConfig) -> Result<Report> {
    Scheduler::new(renderer, config).crawl(seed).await
}
