//! Pagecap Library
//!
//! Renders a local HTML document in headless Chromium, captures an ordered
//! list of elements (by id) as images, and writes them as consecutive pages
//! of one PDF. Ids that cannot be captured are skipped and reported.
//!
//! # Module Overview
//!
//! - [`browser`] - Headless browser sessions (Playwright bridge)
//! - [`capture`] - Capture stage: one document, ordered element screenshots
//! - [`composite`] - Composite stage: images to a multi-page PDF
//! - [`convert`] - The end-to-end pipeline and session limiting
//! - [`server`] - HTTP upload service
//! - [`config`] - Configuration file support
//! - [`types`] - Core data types and structures
//! - [`output`] - JSON output schemas
//!
//! # Example
//!
//! ```no_run
//! use pagecap_lib::{Config, Converter};
//! use std::path::Path;
//!
//! # async fn example() -> pagecap_lib::Result<()> {
//! let converter = Converter::from_config(&Config::default());
//! let report = converter
//!     .convert("report.html", Path::new("report.pdf"), ["pf1", "pf2", "pf3"])
//!     .await?;
//! for skipped in &report.skipped {
//!     eprintln!("no page for #{}", skipped.page_id);
//! }
//! # Ok(())
//! # }
//! ```

pub mod browser;
pub mod capture;
pub mod composite;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod server;
pub mod types;
pub mod viewport;

pub use browser::{BrowserLauncher, PageSession, PlaywrightLauncher, SessionSettings};
pub use capture::{capture_elements, CaptureOptions};
pub use composite::{composite_pages, CompositeOptions};
pub use config::Config;
pub use convert::{convert, ConvertOptions, Converter};
pub use error::{ErrorCategory, ErrorPayload, PagecapError, Result};
pub use output::{ConvertOutput, ErrorOutput, PagecapOutput, PAGECAP_OUTPUT_VERSION};
pub use types::{
    CaptureOutcome, CaptureRequest, CapturedPage, ConversionReport, SkipReason, SkippedPage,
};
pub use viewport::Viewport;
