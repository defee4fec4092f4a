use indicatif::{ProgressBar, ProgressStyle};
use pagehound_scanner::error::Result;
use pagehound_scanner::scheduler::DefectCallback;
use pagehound_scanner::{
    ChromiumBrowser, DefectRecord, PageRenderer, RendererConfig, Report, ScanConfig, Scheduler,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Options for configuring a scan over one or more seeds
pub struct ScanOptions {
    pub urls: Vec<String>,
    pub config: ScanConfig,
    pub renderer: RendererConfig,
    pub show_progress_bars: bool,
}

/// Callback for status lines about the scan as a whole
pub type ScanProgressCallback = Arc<dyn Fn(String) + Send + Sync>;

/// What happened to one seed.
#[derive(Debug, Clone)]
pub enum ScanOutcome {
    Completed(Report),
    /// The scan of this seed could not start.
    Failed { seed: String, error: String },
}

impl ScanOutcome {
    pub fn seed(&self) -> &str {
        match self {
            ScanOutcome::Completed(report) => &report.seed,
            ScanOutcome::Failed { seed, .. } => seed,
        }
    }

    pub fn report(&self) -> Option<&Report> {
        match self {
            ScanOutcome::Completed(report) => Some(report),
            ScanOutcome::Failed { .. } => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, ScanOutcome::Failed { .. })
    }
}

/// Extract the path component from a URL
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| match u.path() {
            "" => "/".to_string(),
            path => path.to_string(),
        })
        .unwrap_or_else(|| url.to_string())
}

/// Launch Chrome and scan every seed in `options` with it.
///
/// Only a browser that fails to launch is an error; seeds that cannot be
/// scanned are reported as [`ScanOutcome::Failed`].
pub async fn execute_scan(
    options: ScanOptions,
    progress_callback: Option<ScanProgressCallback>,
    defect_callback: Option<DefectCallback>,
) -> Result<Vec<ScanOutcome>> {
    let ScanOptions {
        urls,
        config,
        renderer,
        show_progress_bars,
    } = options;

    let browser = ChromiumBrowser::launch(renderer).await?;
    let renderer = match browser.new_renderer().await {
        Ok(renderer) => renderer,
        Err(e) => {
            let _ = browser.close().await;
            return Err(e);
        }
    };

    let (outcomes, renderer) = scan_seeds(
        renderer,
        &urls,
        &config,
        show_progress_bars,
        progress_callback,
        defect_callback,
    )
    .await;

    if let Err(e) = renderer.close().await {
        warn!("Failed to close tab: {}", e);
    }
    if let Err(e) = browser.close().await {
        warn!("Failed to close browser: {}", e);
    }

    Ok(outcomes)
}

/// Scan each seed in turn with one renderer. Every seed gets a fresh
/// scheduler, so visited state and defects never leak between seeds.
pub async fn scan_seeds<R: PageRenderer>(
    mut renderer: R,
    urls: &[String],
    config: &ScanConfig,
    show_progress_bars: bool,
    progress_callback: Option<ScanProgressCallback>,
    defect_callback: Option<DefectCallback>,
) -> (Vec<ScanOutcome>, R) {
    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message("Starting scan...");
        Some(pb)
    } else {
        None
    };

    let pages = Arc::new(AtomicUsize::new(0));
    let defects = Arc::new(AtomicUsize::new(0));

    let mut outcomes = Vec::with_capacity(urls.len());
    for (idx, url) in urls.iter().enumerate() {
        if let Some(ref callback) = progress_callback
            && urls.len() > 1
        {
            callback(format!("Scanning host {}/{}: {}", idx + 1, urls.len(), url));
        }

        let (pb, pages_seen, defects_seen) = (progress_bar.clone(), pages.clone(), defects.clone());
        let page_callback = Arc::new(move |_visited: usize, page: String| {
            let count = pages_seen.fetch_add(1, Ordering::Relaxed) + 1;
            if let Some(ref pb) = pb {
                pb.set_message(format!(
                    "Scanning... {} pages, {} defects ({})",
                    count,
                    defects_seen.load(Ordering::Relaxed),
                    extract_url_path(&page)
                ));
            }
        });

        let (forward, defects_seen) = (defect_callback.clone(), defects.clone());
        let record_callback = Arc::new(move |record: &DefectRecord| {
            defects_seen.fetch_add(1, Ordering::Relaxed);
            if let Some(ref forward) = forward {
                forward(record);
            }
        });

        let mut scheduler = Scheduler::new(renderer, config.clone())
            .with_progress_callback(page_callback)
            .with_defect_callback(record_callback);

        match scheduler.crawl(url).await {
            Ok(report) => outcomes.push(ScanOutcome::Completed(report)),
            Err(e) => {
                if let Some(ref callback) = progress_callback {
                    callback(format!("[!]  Failed to scan {}: {}", url, e));
                }
                outcomes.push(ScanOutcome::Failed {
                    seed: url.clone(),
                    error: e.to_string(),
                });
            }
        }
        renderer = scheduler.into_renderer();
    }

    if let Some(ref pb) = progress_bar {
        pb.finish_with_message(format!(
            "Scan complete! {} pages, {} defects",
            pages.load(Ordering::Relaxed),
            defects.load(Ordering::Relaxed)
        ));
    }

    (outcomes, renderer)
}
