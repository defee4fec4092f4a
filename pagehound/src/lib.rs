pub mod commands;
pub mod handlers;

pub use handlers::{load_urls_from_file, load_urls_from_source, parse_url_line};

pub use pagehound_core::scan::{ScanOptions, ScanOutcome, execute_scan, extract_url_path};
