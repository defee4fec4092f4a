use super::{Detector, RenderedPage};
use crate::error::Result;
use crate::normalize::normalize;
use crate::renderer::{ClickOptions, PageEvent, PageRenderer};
use crate::result::{DefectCategory, DefectRecord};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, warn};

/// Native buttons and anything carrying the button role.
pub const CONTROL_SELECTOR: &str =
    r#"button, input[type="button"], input[type="submit"], [role="button"]"#;

/// Default wait between a probe click and classification.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(500);

const LABEL_MAX_CHARS: usize = 60;

/// Clicks every visible, enabled control and flags the ones that neither
/// navigate, issue a request, nor change the page URL.
///
/// A click that fails outright is not flagged: that is a mechanical failure,
/// not evidence that the control is dead.
pub struct UnresponsiveControlDetector {
    settle: Duration,
}

#[derive(Debug)]
enum Probe {
    Skipped,
    ClickFailed,
    Unresponsive,
    /// The control did something. `displaced` is set when the browser ended
    /// up on a different page, `reloaded` when a new document was loaded,
    /// even at the same URL.
    Responsive { displaced: bool, reloaded: bool },
}

impl UnresponsiveControlDetector {
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }

    async fn is_probeable<R: PageRenderer>(renderer: &R, control: &R::Element) -> bool {
        let disabled = renderer
            .element_property(control, "disabled")
            .await
            .ok()
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if disabled {
            return false;
        }

        // Same rule as jQuery's :visible. If the size cannot be read the
        // control is probed anyway.
        let mut size = 0.0;
        for dimension in ["offsetWidth", "offsetHeight"] {
            match renderer.element_property(control, dimension).await {
                Ok(value) => size += value.as_f64().unwrap_or(0.0),
                Err(_) => return true,
            }
        }
        size > 0.0
    }

    async fn label<R: PageRenderer>(renderer: &R, control: &R::Element, index: usize) -> String {
        for property in ["textContent", "value", "id"] {
            if let Ok(value) = renderer.element_property(control, property).await
                && let Some(text) = value.as_str()
            {
                let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
                if !text.is_empty() {
                    return text.chars().take(LABEL_MAX_CHARS).collect();
                }
            }
        }
        format!("control #{}", index + 1)
    }

    async fn probe<R: PageRenderer>(
        &self,
        page: &RenderedPage<'_, R>,
        control: &R::Element,
    ) -> Result<Probe> {
        let renderer = page.renderer;
        if !Self::is_probeable(renderer, control).await {
            return Ok(Probe::Skipped);
        }

        let before = renderer.current_url().await?;
        let mut observer = renderer.subscribe();

        if let Err(e) = renderer.click(control, ClickOptions::forced()).await {
            debug!("Click failed on {}: {}", page.final_url(), e);
            return Ok(Probe::ClickFailed);
        }
        tokio::time::sleep(self.settle).await;

        let mut navigated = false;
        let mut requested = false;
        loop {
            match observer.try_recv() {
                Ok(PageEvent::Navigated { .. }) => navigated = true,
                Ok(PageEvent::RequestIssued { .. }) => requested = true,
                Ok(_) => {}
                // Lost events mean something happened
                Err(TryRecvError::Lagged(_)) => requested = true,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        let after = renderer.current_url().await?;
        if !navigated && !requested && after == before {
            return Ok(Probe::Unresponsive);
        }

        let displaced = match (normalize(&after, None), normalize(page.final_url(), None)) {
            (Ok(current), Ok(home)) => current != home,
            _ => after != page.final_url(),
        };
        Ok(Probe::Responsive {
            displaced,
            reloaded: navigated,
        })
    }
}

#[async_trait]
impl<R: PageRenderer> Detector<R> for UnresponsiveControlDetector {
    fn name(&self) -> &'static str {
        "unresponsive control"
    }

    fn category(&self) -> DefectCategory {
        DefectCategory::UnresponsiveControl
    }

    async fn detect(&self, page: &RenderedPage<'_, R>) -> Result<Vec<DefectRecord>> {
        let mut controls = page.renderer.query_all(CONTROL_SELECTOR).await?;
        debug!("Probing {} controls on {}", controls.len(), page.final_url());

        let mut records = Vec::new();
        let mut index = 0;
        while index < controls.len() {
            let label = Self::label(page.renderer, &controls[index], index).await;

            match self.probe(page, &controls[index]).await? {
                Probe::Skipped | Probe::ClickFailed => {}
                Probe::Unresponsive => {
                    records.push(
                        DefectRecord::new(
                            DefectCategory::UnresponsiveControl,
                            page.final_url(),
                            format!("Control \"{}\" does nothing when clicked", label),
                        )
                        .with_step(format!("Click the control labelled \"{}\"", label))
                        .with_step(format!(
                            "Wait {} ms and observe no navigation, request or URL change",
                            self.settle.as_millis()
                        )),
                    );
                }
                Probe::Responsive { displaced, reloaded } => {
                    if displaced && let Err(e) = page.restore().await {
                        warn!(
                            "Could not return to {} after clicking \"{}\": {}; skipping remaining controls",
                            page.final_url(),
                            label,
                            e
                        );
                        break;
                    }
                    // Handles from before a navigation are stale
                    if displaced || reloaded {
                        controls = page.renderer.query_all(CONTROL_SELECTOR).await?;
                    }
                }
            }
            index += 1;
        }

        Ok(records)
    }
}
