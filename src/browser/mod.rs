//! Browser automation for element capture.
//!
//! # Module Structure
//!
//! - `engine` - Engine-neutral launcher/session traits used by the capture stage
//! - `playwright` - Bridge script, line protocol, and availability checks
//! - `session` - Playwright-backed launcher driving a Node.js bridge process
//!
//! # Example
//!
//! ```no_run
//! use pagecap_lib::browser::{BrowserLauncher, PlaywrightLauncher, SessionSettings};
//! use std::path::Path;
//! use std::time::Duration;
//!
//! # async fn example() -> pagecap_lib::Result<()> {
//! let launcher = PlaywrightLauncher::default();
//! let settings = SessionSettings {
//!     viewport: pagecap_lib::Viewport::default(),
//!     device_scale_factor: 4.0,
//!     launch_timeout: Duration::from_secs(30),
//! };
//! let mut session = launcher.launch(&settings).await?;
//! let url = url::Url::from_file_path("/tmp/report.html").expect("absolute path");
//! session.goto(&url, Duration::from_secs(60)).await?;
//! session
//!     .capture_element("pf1", Path::new("/tmp/pf1.png"), Duration::from_secs(30))
//!     .await?;
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
mod playwright;
mod session;

pub use engine::{
    element_selector, BrowserLauncher, ElementShot, ElementWait, PageSession, SessionSettings,
};
pub use session::{PlaywrightLauncher, PlaywrightSession};
