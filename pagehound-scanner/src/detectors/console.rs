//! Passive detectors fed by the page's event stream.

use super::{Detector, RenderedPage, lag_record};
use crate::error::Result;
use crate::renderer::{PageEvent, PageRenderer};
use crate::result::{DefectCategory, DefectRecord};
use async_trait::async_trait;

/// Every error-level console message while the page was current.
pub struct ConsoleErrorDetector;

/// Every uncaught exception while the page was current.
pub struct PageErrorDetector;

/// Every sub-resource request that failed while the page was current.
pub struct FailedRequestDetector;

fn collect<R, F>(page: &RenderedPage<'_, R>, category: DefectCategory, to_record: F) -> Vec<DefectRecord>
where
    R: PageRenderer,
    F: Fn(&PageEvent) -> Option<DefectRecord>,
{
    let (events, lagged) = page.events();
    let mut records: Vec<DefectRecord> = events.iter().filter_map(to_record).collect();
    if lagged > 0 {
        records.push(lag_record(category, page.final_url(), lagged));
    }
    records
}

#[async_trait]
impl<R: PageRenderer> Detector<R> for ConsoleErrorDetector {
    fn name(&self) -> &'static str {
        "console error"
    }

    fn category(&self) -> DefectCategory {
        DefectCategory::ConsoleError
    }

    async fn detect(&self, page: &RenderedPage<'_, R>) -> Result<Vec<DefectRecord>> {
        Ok(collect(page, DefectCategory::ConsoleError, |event| match event {
            PageEvent::Console {
                level,
                text,
                page_url,
            } if level.is_error() => Some(
                DefectRecord::new(
                    DefectCategory::ConsoleError,
                    page_url.as_str(),
                    format!("Console error: {}", text),
                )
                .with_step("Open the browser developer console")
                .with_step(format!("Observe the error \"{}\"", text)),
            ),
            _ => None,
        }))
    }
}

#[async_trait]
impl<R: PageRenderer> Detector<R> for PageErrorDetector {
    fn name(&self) -> &'static str {
        "page error"
    }

    fn category(&self) -> DefectCategory {
        DefectCategory::PageError
    }

    async fn detect(&self, page: &RenderedPage<'_, R>) -> Result<Vec<DefectRecord>> {
        Ok(collect(page, DefectCategory::PageError, |event| match event {
            PageEvent::UncaughtException { message, page_url } => Some(
                DefectRecord::new(
                    DefectCategory::PageError,
                    page_url.as_str(),
                    format!("Uncaught exception: {}", message),
                )
                .with_step("Open the browser developer console")
                .with_step(format!("Observe the uncaught exception \"{}\"", message)),
            ),
            _ => None,
        }))
    }
}

#[async_trait]
impl<R: PageRenderer> Detector<R> for FailedRequestDetector {
    fn name(&self) -> &'static str {
        "failed request"
    }

    fn category(&self) -> DefectCategory {
        DefectCategory::RequestFailed
    }

    async fn detect(&self, page: &RenderedPage<'_, R>) -> Result<Vec<DefectRecord>> {
        Ok(collect(page, DefectCategory::RequestFailed, |event| match event {
            PageEvent::RequestFailed {
                url,
                reason,
                page_url,
            } => Some(
                DefectRecord::new(
                    DefectCategory::RequestFailed,
                    page_url.as_str(),
                    format!("Request failed: {} - {}", url, reason),
                )
                .with_step("Open the network panel of the browser developer tools")
                .with_step(format!("Observe the failed request to {}", url)),
            ),
            _ => None,
        }))
    }
}
