//! Headless Chrome implementation of [`PageRenderer`].
//!
//! One [`ChromiumBrowser`] owns the Chrome process; each scan gets its own
//! tab through [`ChromiumBrowser::new_renderer`]. CDP events from the tab are
//! forwarded onto a broadcast channel as [`PageEvent`]s by background tasks
//! that live as long as the renderer.

use crate::error::{Result, ScanError};
use crate::renderer::{
    ClickOptions, ConsoleLevel, EVENT_CHANNEL_CAPACITY, Navigation, PageEvent, PageRenderer,
};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventLoadingFailed, EventRequestWillBeSent, EventResponseReceived, RequestId,
    ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::{
    EventFrameNavigated, EventNavigatedWithinDocument, FrameId,
};
use chromiumoxide::cdp::js_protocol::runtime::{
    ConsoleApiCalledType, EventConsoleApiCalled, EventExceptionThrown, RemoteObject,
};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Forces a click through the DOM, ignoring visibility and overlays.
const FORCED_CLICK_JS: &str = "function() { this.click(); }";

/// Status of the navigation entry, used when the document response event
/// has not been observed.
const NAVIGATION_STATUS_JS: &str =
    "(performance.getEntriesByType('navigation')[0] || {}).responseStatus || 0";

#[derive(Debug, Clone)]
pub struct RendererConfig {
    pub headless: bool,
    pub window_size: (u32, u32),
    pub args: Vec<String>,
    /// Chrome executable; auto-detected when `None`.
    pub chrome_path: Option<String>,
}

impl RendererConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn visible(mut self) -> Self {
        self.headless = false;
        self
    }

    pub fn with_chrome_path(mut self, path: impl Into<String>) -> Self {
        self.chrome_path = Some(path.into());
        self
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args.extend(args);
        self
    }

    fn to_browser_config(&self) -> Result<BrowserConfig> {
        let mut config = BrowserConfig::builder();
        if !self.headless {
            config = config.with_head();
        }

        config = config.arg(format!(
            "--window-size={},{}",
            self.window_size.0, self.window_size.1
        ));

        // Separate profile per launch so concurrent scans don't collide
        let user_data_dir =
            std::env::temp_dir().join(format!("pagehound-{}", uuid::Uuid::new_v4()));
        config = config.arg(format!("--user-data-dir={}", user_data_dir.display()));

        for arg in &self.args {
            config = config.arg(arg.clone());
        }
        if let Some(path) = &self.chrome_path {
            config = config.chrome_executable(path.clone());
        }

        config
            .build()
            .map_err(|e| ScanError::Setup(format!("invalid browser configuration: {}", e)))
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1280, 800),
            args: vec![
                "--no-sandbox".to_string(),
                "--disable-dev-shm-usage".to_string(),
            ],
            chrome_path: None,
        }
    }
}

/// A running Chrome process.
pub struct ChromiumBrowser {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl ChromiumBrowser {
    /// Launch Chrome. Any failure here is a scan setup failure.
    pub async fn launch(config: RendererConfig) -> Result<Self> {
        debug!("Launching browser with config: {:?}", config);
        let browser_config = config.to_browser_config()?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| ScanError::Setup(format!("failed to launch Chrome: {}", e)))?;

        // chromiumoxide only processes CDP traffic while the handler is polled
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("Browser handler error: {}", e);
                }
            }
        });

        Ok(Self {
            browser,
            handler_task,
        })
    }

    /// Open a fresh tab to scan with.
    pub async fn new_renderer(&self) -> Result<ChromiumRenderer> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| ScanError::Setup(format!("failed to open a browser tab: {}", e)))?;
        ChromiumRenderer::attach(page).await
    }

    pub async fn close(mut self) -> Result<()> {
        debug!("Closing browser");
        self.browser.close().await?;
        let _ = self.browser.wait().await;
        self.handler_task.abort();
        Ok(())
    }
}

/// State shared between the renderer and its event forwarding tasks.
#[derive(Debug, Default)]
struct TabState {
    current_url: Mutex<String>,
    main_frame: Mutex<Option<FrameId>>,
    document_status: Mutex<Option<u16>>,
}

impl TabState {
    fn current_url(&self) -> String {
        self.current_url
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_current_url(&self, url: &str) {
        *self.current_url.lock().unwrap_or_else(PoisonError::into_inner) = url.to_string();
    }

    fn is_main_frame(&self, frame: &FrameId) -> bool {
        self.main_frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_none_or(|main| main == frame)
    }

    fn set_main_frame(&self, frame: FrameId) {
        *self.main_frame.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
    }

    fn take_document_status(&self) -> Option<u16> {
        self.document_status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    fn set_document_status(&self, status: u16) {
        *self.document_status.lock().unwrap_or_else(PoisonError::into_inner) = Some(status);
    }
}

pub struct ChromiumRenderer {
    page: Arc<Page>,
    events: broadcast::Sender<PageEvent>,
    state: Arc<TabState>,
    tasks: Vec<JoinHandle<()>>,
}

impl ChromiumRenderer {
    async fn attach(page: Page) -> Result<Self> {
        page.execute(EnableParams::default()).await?;

        let state = Arc::new(TabState::default());
        if let Some(frame) = page.mainframe().await? {
            state.set_main_frame(frame);
        }

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let page = Arc::new(page);
        let mut tasks = Vec::new();

        let mut console = page.event_listener::<EventConsoleApiCalled>().await?;
        let mut exceptions = page.event_listener::<EventExceptionThrown>().await?;
        let mut navigations = page.event_listener::<EventFrameNavigated>().await?;
        let mut in_document = page.event_listener::<EventNavigatedWithinDocument>().await?;
        let mut requests = page.event_listener::<EventRequestWillBeSent>().await?;
        let mut failures = page.event_listener::<EventLoadingFailed>().await?;
        let mut responses = page.event_listener::<EventResponseReceived>().await?;

        let (tx, tab) = (events.clone(), state.clone());
        tasks.push(tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    Some(event) = console.next() => PageEvent::Console {
                        level: console_level(&event),
                        text: console_text(&event),
                        page_url: tab.current_url(),
                    },
                    Some(event) = exceptions.next() => PageEvent::UncaughtException {
                        message: exception_message(&event),
                        page_url: tab.current_url(),
                    },
                    else => break,
                };
                // No subscribers is fine
                let _ = tx.send(event);
            }
        }));

        let (tx, tab) = (events.clone(), state.clone());
        tasks.push(tokio::spawn(async move {
            loop {
                let url = tokio::select! {
                    Some(event) = navigations.next() => {
                        if event.frame.parent_id.is_some() {
                            continue;
                        }
                        tab.set_main_frame(event.frame.id.clone());
                        event.frame.url.clone()
                    }
                    Some(event) = in_document.next() => {
                        if !tab.is_main_frame(&event.frame_id) {
                            continue;
                        }
                        event.url.clone()
                    }
                    else => break,
                };
                tab.set_current_url(&url);
                let _ = tx.send(PageEvent::Navigated { url });
            }
        }));

        let (tx, tab) = (events.clone(), state.clone());
        tasks.push(tokio::spawn(async move {
            let mut in_flight: HashMap<RequestId, String> = HashMap::new();
            loop {
                tokio::select! {
                    Some(event) = requests.next() => {
                        in_flight.insert(event.request_id.clone(), event.request.url.clone());
                        let _ = tx.send(PageEvent::RequestIssued { url: event.request.url.clone() });
                    }
                    Some(event) = failures.next() => {
                        let url = in_flight.remove(&event.request_id).unwrap_or_default();
                        // Requests aborted by navigating away are not defects
                        if event.canceled.unwrap_or(false) {
                            continue;
                        }
                        let _ = tx.send(PageEvent::RequestFailed {
                            url,
                            reason: event.error_text.clone(),
                            page_url: tab.current_url(),
                        });
                    }
                    Some(event) = responses.next() => {
                        in_flight.remove(&event.request_id);
                        let is_main_document = event.r#type == ResourceType::Document
                            && event.frame_id.as_ref().is_none_or(|frame| tab.is_main_frame(frame));
                        if is_main_document {
                            tab.set_document_status(event.response.status as u16);
                        }
                    }
                    else => break,
                }
            }
        }));

        Ok(Self {
            page,
            events,
            state,
            tasks,
        })
    }

    async fn navigation_status(&self) -> Option<u16> {
        if let Some(status) = self.state.take_document_status() {
            return Some(status);
        }
        let status = self
            .page
            .evaluate(NAVIGATION_STATUS_JS)
            .await
            .ok()?
            .into_value::<u64>()
            .ok()?;
        (status > 0).then_some(status as u16)
    }

    /// Close the tab. Event tasks are stopped first so the page can be
    /// reclaimed.
    pub async fn close(mut self) -> Result<()> {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        let page = self.page.clone();
        drop(self);
        match Arc::try_unwrap(page) {
            Ok(page) => {
                page.close().await?;
            }
            Err(_) => warn!("Tab still referenced at close; leaving it to the browser"),
        }
        Ok(())
    }
}

impl Drop for ChromiumRenderer {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[async_trait]
impl PageRenderer for ChromiumRenderer {
    type Element = Element;

    async fn navigate(&self, url: &str, timeout: Duration) -> Result<Navigation> {
        self.state.take_document_status();

        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Err(_) => Err(ScanError::NavigationTimeout {
                url: url.to_string(),
                timeout,
            }),
            Ok(Err(e)) => Err(ScanError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Ok(Ok(_)) => {
                let final_url = self.page.url().await?.unwrap_or_else(|| url.to_string());
                self.state.set_current_url(&final_url);
                let status = self.navigation_status().await;
                Ok(Navigation { final_url, status })
            }
        }
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<Element>> {
        self.page
            .find_elements(selector)
            .await
            .map_err(|e| ScanError::Renderer(format!("query '{}' failed: {}", selector, e)))
    }

    async fn element_property(&self, element: &Element, name: &str) -> Result<Value> {
        let value = element
            .property(name)
            .await
            .map_err(|e| ScanError::Renderer(format!("reading '{}' failed: {}", name, e)))?;
        Ok(value.unwrap_or(Value::Null))
    }

    async fn click(&self, element: &Element, options: ClickOptions) -> Result<()> {
        let outcome = if options.force {
            element.call_js_fn(FORCED_CLICK_JS, false).await.map(|_| ())
        } else {
            element.click().await.map(|_| ())
        };
        outcome.map_err(|e| ScanError::Click(e.to_string()))
    }

    async fn current_url(&self) -> Result<String> {
        self.page
            .url()
            .await?
            .ok_or_else(|| ScanError::Renderer("tab has no URL".to_string()))
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }
}

fn console_level(event: &EventConsoleApiCalled) -> ConsoleLevel {
    match event.r#type {
        ConsoleApiCalledType::Log => ConsoleLevel::Log,
        ConsoleApiCalledType::Info => ConsoleLevel::Info,
        ConsoleApiCalledType::Warning => ConsoleLevel::Warning,
        ConsoleApiCalledType::Error | ConsoleApiCalledType::Assert => ConsoleLevel::Error,
        ConsoleApiCalledType::Debug => ConsoleLevel::Debug,
        _ => ConsoleLevel::Other,
    }
}

fn remote_object_text(object: &RemoteObject) -> String {
    match &object.value {
        Some(Value::String(s)) => s.clone(),
        Some(value) => value.to_string(),
        None => object
            .description
            .clone()
            .unwrap_or_else(|| "<object>".to_string()),
    }
}

fn console_text(event: &EventConsoleApiCalled) -> String {
    event
        .args
        .iter()
        .map(remote_object_text)
        .collect::<Vec<_>>()
        .join(" ")
}

fn exception_message(event: &EventExceptionThrown) -> String {
    let details = &event.exception_details;
    details
        .exception
        .as_ref()
        .and_then(|e| e.description.clone())
        .unwrap_or_else(|| details.text.clone())
}
