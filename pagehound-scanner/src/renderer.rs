//! The page rendering capability the crawl engine is written against.
//!
//! Anything that can load a URL into a live document, query and click its
//! elements, and report console/runtime/network events can drive a scan.
//! `ChromiumRenderer` is the production implementation; tests use a fixture
//! renderer.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;

/// Capacity of a renderer's event channel. Subscribers that fall further
/// behind than this observe a lag.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Outcome of a successful `navigate` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Navigation {
    /// URL of the document after redirects.
    pub final_url: String,
    /// Status of the main document response, `None` when no response arrived.
    pub status: Option<u16>,
}

impl Navigation {
    pub fn is_success(&self) -> bool {
        matches!(self.status, Some(200..=299))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClickOptions {
    /// Dispatch the click even if the element is hidden or covered.
    pub force: bool,
}

impl ClickOptions {
    pub fn forced() -> Self {
        Self { force: true }
    }
}

/// Severity of a console message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConsoleLevel {
    Log,
    Info,
    Warning,
    Error,
    Debug,
    Other,
}

impl ConsoleLevel {
    pub fn is_error(&self) -> bool {
        matches!(self, ConsoleLevel::Error)
    }
}

impl From<&str> for ConsoleLevel {
    fn from(s: &str) -> Self {
        match s {
            "log" => ConsoleLevel::Log,
            "info" => ConsoleLevel::Info,
            "warning" | "warn" => ConsoleLevel::Warning,
            "error" => ConsoleLevel::Error,
            "debug" => ConsoleLevel::Debug,
            _ => ConsoleLevel::Other,
        }
    }
}

/// Something observed on the current page. Events carrying `page_url` are
/// stamped with the URL that was current when the event fired.
#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    Console {
        level: ConsoleLevel,
        text: String,
        page_url: String,
    },
    UncaughtException {
        message: String,
        page_url: String,
    },
    /// The main frame navigated, including same-document navigations.
    Navigated { url: String },
    RequestIssued { url: String },
    RequestFailed {
        url: String,
        reason: String,
        page_url: String,
    },
}

#[async_trait]
pub trait PageRenderer: Send + Sync {
    type Element: Send + Sync;

    /// Load `url`, giving up after `timeout`.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<Navigation>;

    /// All elements matching a CSS selector, in document order.
    async fn query_all(&self, selector: &str) -> Result<Vec<Self::Element>>;

    /// Read a DOM property (`complete`, `naturalWidth`, `href`, ...).
    /// Missing properties come back as `Value::Null`.
    async fn element_property(&self, element: &Self::Element, name: &str) -> Result<Value>;

    async fn click(&self, element: &Self::Element, options: ClickOptions) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// New subscription to this renderer's event stream. Only events fired
    /// after the call are delivered.
    fn subscribe(&self) -> broadcast::Receiver<PageEvent>;
}

/// Buffered view over one event subscription.
#[derive(Debug)]
pub struct EventLog {
    receiver: broadcast::Receiver<PageEvent>,
    events: Vec<PageEvent>,
    lagged: u64,
}

impl EventLog {
    pub fn new(receiver: broadcast::Receiver<PageEvent>) -> Self {
        Self {
            receiver,
            events: Vec::new(),
            lagged: 0,
        }
    }

    /// Pull everything delivered so far into the buffer.
    pub fn drain(&mut self) {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => self.events.push(event),
                Err(TryRecvError::Lagged(n)) => self.lagged += n,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }
    }

    pub fn events(&self) -> &[PageEvent] {
        &self.events
    }

    /// Number of events dropped because the subscriber fell behind.
    pub fn lagged(&self) -> u64 {
        self.lagged
    }

    pub(crate) fn truncate(&mut self, len: usize) {
        self.events.truncate(len);
    }
}
