use super::{Detector, RenderedPage};
use crate::error::Result;
use crate::renderer::{Navigation, PageRenderer};
use crate::result::{DefectCategory, DefectRecord};
use async_trait::async_trait;

/// Flags a page whose main document came back outside the 2xx range.
pub struct HttpStatusDetector;

impl HttpStatusDetector {
    pub fn inspect(requested: &str, navigation: &Navigation) -> Option<DefectRecord> {
        let status = navigation.status?;
        if navigation.is_success() {
            return None;
        }

        let mut detail = format!("HTTP {} at {}", status, requested);
        if navigation.final_url != requested {
            detail.push_str(&format!(" (redirected to {})", navigation.final_url));
        }
        Some(
            DefectRecord::new(DefectCategory::HttpError, requested, detail)
                .with_step(format!("Observe the response status {}", status)),
        )
    }
}

#[async_trait]
impl<R: PageRenderer> Detector<R> for HttpStatusDetector {
    fn name(&self) -> &'static str {
        "http status"
    }

    fn category(&self) -> DefectCategory {
        DefectCategory::HttpError
    }

    async fn detect(&self, page: &RenderedPage<'_, R>) -> Result<Vec<DefectRecord>> {
        Ok(Self::inspect(page.url.as_str(), &page.navigation)
            .into_iter()
            .collect())
    }
}
