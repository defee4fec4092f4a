use super::{Detector, RenderedPage};
use crate::error::{Result, ScanError};
use crate::renderer::PageRenderer;
use crate::result::{DefectCategory, DefectRecord};
use async_trait::async_trait;
use tracing::debug;

/// Flags every `img` that has not finished loading or has no intrinsic width.
pub struct BrokenImageDetector;

#[derive(Debug, Clone, Copy, PartialEq)]
enum ImageState {
    Loaded,
    Incomplete,
    ZeroWidth,
    /// Reading the element's state failed; counted as broken.
    Unknown,
}

impl ImageState {
    fn reason(&self) -> Option<&'static str> {
        match self {
            ImageState::Loaded => None,
            ImageState::Incomplete => Some("never finished loading"),
            ImageState::ZeroWidth => Some("has an intrinsic width of 0"),
            ImageState::Unknown => Some("load state could not be read"),
        }
    }
}

async fn image_state<R: PageRenderer>(renderer: &R, image: &R::Element) -> Result<ImageState> {
    let complete = renderer
        .element_property(image, "complete")
        .await?
        .as_bool()
        .ok_or_else(|| ScanError::Renderer("img.complete is not a boolean".to_string()))?;
    if !complete {
        return Ok(ImageState::Incomplete);
    }

    let width = renderer
        .element_property(image, "naturalWidth")
        .await?
        .as_f64()
        .ok_or_else(|| ScanError::Renderer("img.naturalWidth is not a number".to_string()))?;
    if width <= 0.0 {
        return Ok(ImageState::ZeroWidth);
    }

    Ok(ImageState::Loaded)
}

#[async_trait]
impl<R: PageRenderer> Detector<R> for BrokenImageDetector {
    fn name(&self) -> &'static str {
        "broken image"
    }

    fn category(&self) -> DefectCategory {
        DefectCategory::BrokenImage
    }

    async fn detect(&self, page: &RenderedPage<'_, R>) -> Result<Vec<DefectRecord>> {
        let images = page.renderer.query_all("img").await?;
        debug!("Checking {} images on {}", images.len(), page.final_url());

        let mut records = Vec::new();
        for (index, image) in images.iter().enumerate() {
            let state = image_state(page.renderer, image).await.unwrap_or_else(|e| {
                debug!("Image #{} on {}: {}", index, page.final_url(), e);
                ImageState::Unknown
            });

            let Some(reason) = state.reason() else {
                continue;
            };

            let src = page
                .renderer
                .element_property(image, "src")
                .await
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "<no src>".to_string());

            records.push(
                DefectRecord::new(
                    DefectCategory::BrokenImage,
                    page.final_url(),
                    format!("Image {} {}", src, reason),
                )
                .with_step(format!("Locate the image with src=\"{}\"", src))
                .with_step("Observe that the image does not render"),
            );
        }

        Ok(records)
    }
}
