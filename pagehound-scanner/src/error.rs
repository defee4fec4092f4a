use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Malformed URL: {0}")]
    MalformedUrl(String),

    #[error("Navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("Navigation to {url} timed out after {timeout:?}")]
    NavigationTimeout { url: String, timeout: Duration },

    #[error("Renderer error: {0}")]
    Renderer(String),

    #[error("Click failed: {0}")]
    Click(String),

    #[error("Scan could not start: {0}")]
    Setup(String),
}

impl ScanError {
    pub fn is_setup(&self) -> bool {
        matches!(self, ScanError::Setup(_))
    }
}

impl From<chromiumoxide::error::CdpError> for ScanError {
    fn from(e: chromiumoxide::error::CdpError) -> Self {
        ScanError::Renderer(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ScanError>;
