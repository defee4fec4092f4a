// Tests for individual defect detectors and the fail-safe wrapper

mod common;

use async_trait::async_trait;
use common::{FixtureRenderer, Site, url};
use pagehound_scanner::detectors::{
    BrokenImageDetector, ConsoleErrorDetector, Detector, DetectorConfig, FailSafe,
    FailedRequestDetector, PageErrorDetector, RenderedPage, UnresponsiveControlDetector,
    detector_set,
};
use pagehound_scanner::error::{Result, ScanError};
use pagehound_scanner::normalize::normalize;
use pagehound_scanner::renderer::{EventLog, PageRenderer};
use pagehound_scanner::result::{DefectCategory, DefectRecord};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);
const SETTLE: Duration = Duration::from_millis(10);

async fn render<'a>(renderer: &'a FixtureRenderer, path: &str) -> RenderedPage<'a, FixtureRenderer> {
    let target = url(path);
    let events = EventLog::new(renderer.subscribe());
    let navigation = renderer.navigate(&target, TIMEOUT).await.unwrap();
    RenderedPage::new(
        renderer,
        normalize(&target, None).unwrap(),
        navigation,
        TIMEOUT,
        events,
    )
}

async fn run(
    detector: impl Detector<FixtureRenderer> + 'static,
    page: &RenderedPage<'_, FixtureRenderer>,
) -> Vec<DefectRecord> {
    FailSafe::new(detector).run(page).await
}

// ============================================================================
// Broken Image Tests
// ============================================================================

#[tokio::test]
async fn test_zero_width_image_is_broken() {
    let renderer = Site::new()
        .page(
            "/",
            r#"<img src="/ok.png"><img src="/img/logo.png" data-width="0">"#,
        )
        .renderer();
    let page = render(&renderer, "/").await;

    let records = run(BrokenImageDetector, &page).await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].category, DefectCategory::BrokenImage);
    assert!(records[0].detail.contains("https://shop.test/img/logo.png"));
    assert_eq!(records[0].replication_steps[0], format!("Open {}", url("/")));
}

#[tokio::test]
async fn test_incomplete_image_is_broken() {
    let renderer = Site::new()
        .page("/", r#"<img src="/slow.png" data-complete="false">"#)
        .renderer();
    let page = render(&renderer, "/").await;

    let records = run(BrokenImageDetector, &page).await;

    assert_eq!(records.len(), 1);
    assert!(records[0].detail.contains("never finished loading"));
}

#[tokio::test]
async fn test_unreadable_image_counts_as_broken() {
    let renderer = Site::new()
        .page("/", r#"<img src="/x.png" data-unreadable>"#)
        .renderer();
    let page = render(&renderer, "/").await;

    let records = run(BrokenImageDetector, &page).await;

    assert_eq!(records.len(), 1);
    assert!(records[0].detail.contains("<no src>"));
}

#[tokio::test]
async fn test_loaded_images_are_clean() {
    let renderer = Site::new()
        .page("/", r#"<img src="/a.png"><img src="/b.png" data-width="1">"#)
        .renderer();
    let page = render(&renderer, "/").await;

    assert!(run(BrokenImageDetector, &page).await.is_empty());
}

// ============================================================================
// Unresponsive Control Tests
// ============================================================================

#[tokio::test]
async fn test_dead_button_is_flagged() {
    let renderer = Site::new().page("/", "<button>  Save\n changes </button>").renderer();
    let page = render(&renderer, "/").await;

    let records = run(UnresponsiveControlDetector::new(SETTLE), &page).await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].category, DefectCategory::UnresponsiveControl);
    assert_eq!(records[0].detail, "Control \"Save changes\" does nothing when clicked");
    assert_eq!(records[0].page_url, url("/"));
}

#[tokio::test]
async fn test_responsive_controls_are_not_flagged() {
    let renderer = Site::new()
        .page(
            "/",
            r#"<button data-action="request">Track</button>
               <button data-action="hash">Tab</button>
               <input type="submit" value="Send" data-action="request">"#,
        )
        .renderer();
    let page = render(&renderer, "/").await;

    let records = run(UnresponsiveControlDetector::new(SETTLE), &page).await;

    assert!(records.is_empty(), "unexpected: {:?}", records);
    assert_eq!(renderer.clicks().len(), 3);
}

#[tokio::test]
async fn test_navigating_control_restores_page_and_continues() {
    let renderer = Site::new()
        .page(
            "/",
            r#"<button data-action="navigate:/checkout">Buy</button><div role="button">Dead</div>"#,
        )
        .console_error("/", "load-time error")
        .page("/checkout", "<p>checkout</p>")
        .renderer();
    let page = render(&renderer, "/").await;

    let records = run(UnresponsiveControlDetector::new(SETTLE), &page).await;

    assert_eq!(records.len(), 1);
    assert!(records[0].detail.contains("\"Dead\""));
    // Initial load plus the restore
    assert_eq!(renderer.navigations(), vec![url("/"), url("/")]);
    assert_eq!(renderer.current_url().await.unwrap(), url("/"));

    // The restore reload does not duplicate load-time console output
    let console = run(ConsoleErrorDetector, &page).await;
    assert_eq!(console.len(), 1);
}

#[tokio::test]
async fn test_same_page_reload_requeries_controls() {
    let renderer = Site::new()
        .page(
            "/",
            r#"<form><button data-action="reload">Submit</button></form><button>Dead</button>"#,
        )
        .renderer();
    let page = render(&renderer, "/").await;

    let records = run(UnresponsiveControlDetector::new(SETTLE), &page).await;

    assert_eq!(records.len(), 1, "unexpected: {:?}", records);
    assert!(records[0].detail.contains("\"Dead\""));
    assert_eq!(renderer.clicks(), vec!["Submit".to_string(), "Dead".to_string()]);
    // A reload at the same URL needs no restore
    assert_eq!(renderer.navigations(), vec![url("/")]);
}

#[tokio::test]
async fn test_failed_click_is_not_flagged() {
    let renderer = Site::new()
        .page("/", r#"<button data-action="fail">Detached</button>"#)
        .renderer();
    let page = render(&renderer, "/").await;

    assert!(run(UnresponsiveControlDetector::new(SETTLE), &page).await.is_empty());
}

#[tokio::test]
async fn test_disabled_and_hidden_controls_are_not_clicked() {
    let renderer = Site::new()
        .page(
            "/",
            r#"<button disabled>Off</button><button data-hidden>Hidden</button><button data-action="request">On</button>"#,
        )
        .renderer();
    let page = render(&renderer, "/").await;

    let records = run(UnresponsiveControlDetector::new(SETTLE), &page).await;

    assert!(records.is_empty());
    assert_eq!(renderer.clicks(), vec!["On".to_string()]);
}

#[tokio::test]
async fn test_input_controls_labelled_by_value() {
    let renderer = Site::new()
        .page("/", r#"<input type="button" value="Apply coupon">"#)
        .renderer();
    let page = render(&renderer, "/").await;

    let records = run(UnresponsiveControlDetector::new(SETTLE), &page).await;

    assert_eq!(records.len(), 1);
    assert!(records[0].detail.contains("\"Apply coupon\""));
}

// ============================================================================
// Event Detector Tests
// ============================================================================

#[tokio::test]
async fn test_console_errors_only() {
    let renderer = Site::new()
        .page("/", "")
        .console_log("/", "hello")
        .console_error("/", "Uncaught promise")
        .renderer();
    let page = render(&renderer, "/").await;

    let records = run(ConsoleErrorDetector, &page).await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].detail, "Console error: Uncaught promise");
}

#[tokio::test]
async fn test_events_tagged_with_emission_url() {
    let renderer = Site::new()
        .redirect("/old", &url("/new"))
        .page("/new", "")
        .exception("/new", "TypeError: x is null")
        .renderer();
    let page = render(&renderer, "/old").await;

    let records = run(PageErrorDetector, &page).await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].page_url, url("/new"));
    assert_eq!(records[0].detail, "Uncaught exception: TypeError: x is null");
}

#[tokio::test]
async fn test_failed_requests_are_reported() {
    let renderer = Site::new()
        .page("/", "")
        .failed_request("/", &url("/missing.js"), "net::ERR_FAILED")
        .renderer();
    let page = render(&renderer, "/").await;

    let records = run(FailedRequestDetector, &page).await;

    assert_eq!(records.len(), 1);
    assert_eq!(
        records[0].detail,
        format!("Request failed: {} - net::ERR_FAILED", url("/missing.js"))
    );
}

#[tokio::test]
async fn test_lost_events_are_reported() {
    let mut site = Site::new().page("/", "");
    for i in 0..5 {
        site = site.console_error("/", &format!("error {}", i));
    }
    let renderer = FixtureRenderer::with_capacity(site, 2);
    let page = render(&renderer, "/").await;

    let records = run(ConsoleErrorDetector, &page).await;

    // Navigated plus five errors into a channel of two
    assert_eq!(records.len(), 3);
    assert_eq!(records[0].detail, "Console error: error 3");
    assert!(records[2].detail.starts_with("4 page events were dropped"));
    assert_eq!(records[2].category, DefectCategory::ConsoleError);
}

// ============================================================================
// Fail-Safe Tests
// ============================================================================

struct ErroringDetector;

#[async_trait]
impl Detector<FixtureRenderer> for ErroringDetector {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn category(&self) -> DefectCategory {
        DefectCategory::BrokenImage
    }

    async fn detect(&self, _page: &RenderedPage<'_, FixtureRenderer>) -> Result<Vec<DefectRecord>> {
        Err(ScanError::Renderer("script evaluation failed".to_string()))
    }
}

struct PanickingDetector;

#[async_trait]
impl Detector<FixtureRenderer> for PanickingDetector {
    fn name(&self) -> &'static str {
        "buggy"
    }

    fn category(&self) -> DefectCategory {
        DefectCategory::ConsoleError
    }

    async fn detect(&self, _page: &RenderedPage<'_, FixtureRenderer>) -> Result<Vec<DefectRecord>> {
        panic!("index out of bounds")
    }
}

#[tokio::test]
async fn test_detector_error_becomes_defect() {
    let renderer = Site::new().page("/", "").renderer();
    let page = render(&renderer, "/").await;

    let records = run(ErroringDetector, &page).await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].category, DefectCategory::BrokenImage);
    assert_eq!(records[0].page_url, url("/"));
    assert!(records[0].detail.contains("script evaluation failed"));
}

#[tokio::test]
async fn test_detector_panic_becomes_defect() {
    let renderer = Site::new().page("/", "").renderer();
    let page = render(&renderer, "/").await;

    let records = run(PanickingDetector, &page).await;

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].category, DefectCategory::ConsoleError);
    assert!(records[0].detail.contains("index out of bounds"));
}

#[test]
fn test_detector_set_respects_config() {
    let all = detector_set::<FixtureRenderer>(&DetectorConfig::default(), SETTLE);
    let names: Vec<&str> = all.iter().map(|d| d.name()).collect();
    assert_eq!(
        names,
        vec![
            "broken image",
            "unresponsive control",
            "console error",
            "page error",
            "failed request"
        ]
    );

    let passive = detector_set::<FixtureRenderer>(
        &DetectorConfig {
            check_images: false,
            check_buttons: false,
        },
        SETTLE,
    );
    assert_eq!(passive.len(), 3);
}
