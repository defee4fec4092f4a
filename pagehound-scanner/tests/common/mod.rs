//! In-memory site and renderer for exercising the crawl engine without a
//! browser.
//!
//! Pages are plain HTML parsed with `scraper`. Element behaviour is driven by
//! attributes:
//! - `img`: `data-complete="false"`, `data-width="0"`
//! - controls: `data-action="navigate:/path" | "request" | "hash" | "reload" | "fail"`,
//!   `data-hidden`, `disabled`
//! - any element: `data-unreadable` makes every property read fail
//!
//! Every load replaces the document, as `reload` does; element handles from
//! an earlier document then fail with a stale-element error. A `hash` click
//! keeps the document.

#![allow(dead_code)]

use async_trait::async_trait;
use pagehound_scanner::error::{Result, ScanError};
use pagehound_scanner::normalize::normalize;
use pagehound_scanner::renderer::{
    ClickOptions, ConsoleLevel, EVENT_CHANNEL_CAPACITY, Navigation, PageEvent, PageRenderer,
};
use scraper::{Html, Selector};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use url::Url;

pub const ORIGIN: &str = "https://shop.test";

pub fn url(path: &str) -> String {
    format!("{}{}", ORIGIN, path)
}

#[derive(Debug, Clone, Default)]
pub struct FixturePage {
    pub status: Option<u16>,
    pub html: String,
    pub redirect_to: Option<String>,
    pub times_out: bool,
    pub console_errors: Vec<String>,
    pub console_logs: Vec<String>,
    pub exceptions: Vec<String>,
    pub failed_requests: Vec<(String, String)>,
    pub anchors_fail: bool,
    pub loads_once: bool,
}

/// Pages keyed by canonical URL.
#[derive(Debug, Clone, Default)]
pub struct Site {
    pages: HashMap<String, FixturePage>,
}

impl Site {
    pub fn new() -> Self {
        Self::default()
    }

    /// Paths are anchored at [`ORIGIN`]; absolute URLs are kept.
    fn key(raw: &str) -> String {
        normalize(raw, Some(ORIGIN)).unwrap().into_string()
    }

    fn entry(&mut self, raw: &str) -> &mut FixturePage {
        self.pages.entry(Self::key(raw)).or_insert_with(|| FixturePage {
            status: Some(200),
            ..Default::default()
        })
    }

    pub fn page(mut self, raw: &str, html: &str) -> Self {
        self.entry(raw).html = html.to_string();
        self
    }

    pub fn status(mut self, raw: &str, status: Option<u16>) -> Self {
        self.entry(raw).status = status;
        self
    }

    pub fn redirect(mut self, raw: &str, target: &str) -> Self {
        self.entry(raw).redirect_to = Some(target.to_string());
        self
    }

    pub fn timeout(mut self, raw: &str) -> Self {
        self.entry(raw).times_out = true;
        self
    }

    pub fn console_error(mut self, raw: &str, text: &str) -> Self {
        self.entry(raw).console_errors.push(text.to_string());
        self
    }

    pub fn console_log(mut self, raw: &str, text: &str) -> Self {
        self.entry(raw).console_logs.push(text.to_string());
        self
    }

    pub fn exception(mut self, raw: &str, message: &str) -> Self {
        self.entry(raw).exceptions.push(message.to_string());
        self
    }

    pub fn failed_request(mut self, raw: &str, resource: &str, reason: &str) -> Self {
        self.entry(raw)
            .failed_requests
            .push((resource.to_string(), reason.to_string()));
        self
    }

    /// Anchor queries fail while this page is current.
    pub fn broken_anchors(mut self, raw: &str) -> Self {
        self.entry(raw).anchors_fail = true;
        self
    }

    /// The first load succeeds; every later one fails with a reset.
    pub fn loads_once(mut self, raw: &str) -> Self {
        self.entry(raw).loads_once = true;
        self
    }

    pub fn renderer(self) -> FixtureRenderer {
        FixtureRenderer::new(self)
    }

    fn lookup(&self, raw: &str) -> Option<&FixturePage> {
        self.pages.get(&Self::key(raw))
    }
}

/// Owned snapshot of a DOM element.
#[derive(Debug, Clone)]
pub struct FixtureElement {
    tag: String,
    attrs: HashMap<String, String>,
    text: String,
    generation: u64,
}

impl FixtureElement {
    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }
}

#[derive(Debug, Default)]
struct Current {
    url: Option<String>,
    html: String,
    generation: u64,
    anchors_fail: bool,
}

pub struct FixtureRenderer {
    site: Site,
    current: Mutex<Current>,
    events: broadcast::Sender<PageEvent>,
    navigations: Arc<Mutex<Vec<String>>>,
    clicks: Arc<Mutex<Vec<String>>>,
    loads: Mutex<HashMap<String, usize>>,
}

impl FixtureRenderer {
    pub fn new(site: Site) -> Self {
        Self::with_capacity(site, EVENT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(site: Site, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity);
        Self {
            site,
            current: Mutex::new(Current::default()),
            events,
            navigations: Arc::new(Mutex::new(Vec::new())),
            clicks: Arc::new(Mutex::new(Vec::new())),
            loads: Mutex::new(HashMap::new()),
        }
    }

    /// Every URL passed to `navigate`, in call order.
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    /// Text of every clicked control, in click order.
    pub fn clicks(&self) -> Vec<String> {
        self.clicks.lock().unwrap().clone()
    }

    fn emit(&self, event: PageEvent) {
        let _ = self.events.send(event);
    }

    fn current_url_or_blank(&self) -> String {
        self.current
            .lock()
            .unwrap()
            .url
            .clone()
            .unwrap_or_else(|| "about:blank".to_string())
    }

    /// Replace the document.
    fn load(&self, url: &str, html: String, anchors_fail: bool) {
        let mut current = self.current.lock().unwrap();
        current.url = Some(url.to_string());
        current.html = html;
        current.generation += 1;
        current.anchors_fail = anchors_fail;
    }

    fn ensure_live(&self, element: &FixtureElement) -> Result<()> {
        if element.generation != self.current.lock().unwrap().generation {
            return Err(ScanError::Renderer(format!(
                "stale element <{}>: its document was replaced",
                element.tag
            )));
        }
        Ok(())
    }

    fn select(&self, selector: &str) -> Result<Vec<FixtureElement>> {
        let selector = Selector::parse(selector)
            .map_err(|e| ScanError::Renderer(format!("bad selector: {:?}", e)))?;
        let (html, generation) = {
            let current = self.current.lock().unwrap();
            (current.html.clone(), current.generation)
        };
        let document = Html::parse_document(&html);
        Ok(document
            .select(&selector)
            .map(|el| FixtureElement {
                tag: el.value().name().to_string(),
                attrs: el
                    .value()
                    .attrs()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
                text: el.text().collect::<String>(),
                generation,
            })
            .collect())
    }

    fn resolve(&self, href: &str) -> String {
        Url::parse(&self.current_url_or_blank())
            .and_then(|base| base.join(href))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| href.to_string())
    }
}

#[async_trait]
impl PageRenderer for FixtureRenderer {
    type Element = FixtureElement;

    async fn navigate(&self, raw: &str, timeout: Duration) -> Result<Navigation> {
        self.navigations.lock().unwrap().push(raw.to_string());

        let Some(mut page) = self.site.lookup(raw) else {
            let final_url = raw.to_string();
            self.load(&final_url, "<h1>Not Found</h1>".to_string(), false);
            self.emit(PageEvent::Navigated {
                url: final_url.clone(),
            });
            return Ok(Navigation {
                final_url,
                status: Some(404),
            });
        };

        let loads = {
            let mut loads = self.loads.lock().unwrap();
            let count = loads.entry(Site::key(raw)).or_insert(0);
            *count += 1;
            *count
        };
        if page.loads_once && loads > 1 {
            return Err(ScanError::Navigation {
                url: raw.to_string(),
                reason: "connection reset".to_string(),
            });
        }

        let mut final_url = raw.to_string();
        if let Some(target) = &page.redirect_to {
            final_url = target.clone();
            page = self.site.lookup(target).ok_or_else(|| ScanError::Navigation {
                url: raw.to_string(),
                reason: "redirect to unknown page".to_string(),
            })?;
        }

        if page.times_out {
            return Err(ScanError::NavigationTimeout {
                url: raw.to_string(),
                timeout,
            });
        }

        self.load(&final_url, page.html.clone(), page.anchors_fail);
        self.emit(PageEvent::Navigated {
            url: final_url.clone(),
        });
        for text in &page.console_logs {
            self.emit(PageEvent::Console {
                level: ConsoleLevel::Log,
                text: text.clone(),
                page_url: final_url.clone(),
            });
        }
        for text in &page.console_errors {
            self.emit(PageEvent::Console {
                level: ConsoleLevel::Error,
                text: text.clone(),
                page_url: final_url.clone(),
            });
        }
        for message in &page.exceptions {
            self.emit(PageEvent::UncaughtException {
                message: message.clone(),
                page_url: final_url.clone(),
            });
        }
        for (resource, reason) in &page.failed_requests {
            self.emit(PageEvent::RequestIssued {
                url: resource.clone(),
            });
            self.emit(PageEvent::RequestFailed {
                url: resource.clone(),
                reason: reason.clone(),
                page_url: final_url.clone(),
            });
        }

        Ok(Navigation {
            final_url,
            status: page.status,
        })
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<FixtureElement>> {
        if selector == "a[href]" && self.current.lock().unwrap().anchors_fail {
            return Err(ScanError::Renderer("anchor query failed".to_string()));
        }
        self.select(selector)
    }

    async fn element_property(&self, element: &FixtureElement, name: &str) -> Result<Value> {
        self.ensure_live(element)?;
        if element.attr("data-unreadable").is_some() {
            return Err(ScanError::Renderer(format!("cannot read {}", name)));
        }

        let value = match name {
            "href" => element
                .attr("href")
                .map(|h| json!(self.resolve(h)))
                .unwrap_or(Value::Null),
            "src" => element
                .attr("src")
                .map(|s| json!(self.resolve(s)))
                .unwrap_or(Value::Null),
            "complete" => json!(element.attr("data-complete") != Some("false")),
            "naturalWidth" => json!(
                element
                    .attr("data-width")
                    .and_then(|w| w.parse::<u32>().ok())
                    .unwrap_or(100)
            ),
            "disabled" => json!(element.attr("disabled").is_some()),
            "offsetWidth" | "offsetHeight" => {
                json!(if element.attr("data-hidden").is_some() { 0 } else { 20 })
            }
            "textContent" => json!(element.text),
            "tagName" => json!(element.tag.to_uppercase()),
            other => element.attr(other).map(|v| json!(v)).unwrap_or(Value::Null),
        };
        Ok(value)
    }

    async fn click(&self, element: &FixtureElement, _options: ClickOptions) -> Result<()> {
        self.ensure_live(element)?;
        self.clicks.lock().unwrap().push(element.text.trim().to_string());

        match element.attr("data-action") {
            Some("fail") => Err(ScanError::Click("element is detached".to_string())),
            Some("request") => {
                self.emit(PageEvent::RequestIssued {
                    url: url("/api/track"),
                });
                Ok(())
            }
            Some("hash") => {
                let target = format!("{}#clicked", self.current_url_or_blank());
                self.current.lock().unwrap().url = Some(target.clone());
                self.emit(PageEvent::Navigated { url: target });
                Ok(())
            }
            Some("reload") => {
                let (target, html, anchors_fail) = {
                    let current = self.current.lock().unwrap();
                    (
                        current.url.clone().unwrap_or_else(|| "about:blank".to_string()),
                        current.html.clone(),
                        current.anchors_fail,
                    )
                };
                self.load(&target, html, anchors_fail);
                self.emit(PageEvent::Navigated { url: target });
                Ok(())
            }
            Some(action) if action.starts_with("navigate:") => {
                let target = self.resolve(&action["navigate:".len()..]);
                let html = self
                    .site
                    .lookup(&target)
                    .map(|p| p.html.clone())
                    .unwrap_or_default();
                self.load(&target, html, false);
                self.emit(PageEvent::Navigated { url: target });
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.current_url_or_blank())
    }

    fn subscribe(&self) -> broadcast::Receiver<PageEvent> {
        self.events.subscribe()
    }
}
