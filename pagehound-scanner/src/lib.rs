pub mod aggregate;
pub mod chromium;
pub mod detectors;
pub mod error;
pub mod normalize;
pub mod registry;
pub mod renderer;
pub mod result;
pub mod scheduler;

pub use aggregate::DefectLog;
pub use chromium::{ChromiumBrowser, ChromiumRenderer, RendererConfig};
pub use detectors::{Detector, DetectorConfig, FailSafe, RenderedPage};
pub use error::ScanError;
pub use normalize::{CanonicalUrl, in_scope, normalize};
pub use registry::VisitedRegistry;
pub use renderer::{ClickOptions, ConsoleLevel, EventLog, Navigation, PageEvent, PageRenderer};
pub use result::{DefectCategory, DefectRecord, Report};
pub use scheduler::{ScanConfig, ScanState, Scheduler, run_scan};
