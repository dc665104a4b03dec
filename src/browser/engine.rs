//! Engine-neutral interface used by the capture stage.
//!
//! A [`BrowserLauncher`] starts one isolated browser context per conversion and
//! hands back a [`PageSession`]. Sessions are driven strictly sequentially and
//! must be closed by the caller on every exit path.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use url::Url;

use crate::{Result, Viewport};

/// Settings for one browser context.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub viewport: Viewport,
    pub device_scale_factor: f64,
    /// Upper bound for starting the engine and opening a page.
    pub launch_timeout: Duration,
}

/// Result of waiting for an element to attach to the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementWait {
    Attached,
    TimedOut,
}

/// Result of rasterizing an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementShot {
    Saved,
    NotFound,
    TimedOut,
}

#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Start a fresh browser context. Failure here is fatal to the conversion.
    async fn launch(&self, settings: &SessionSettings) -> Result<Box<dyn PageSession>>;

    /// Name of this engine (for logging).
    fn engine_name(&self) -> &'static str;
}

#[async_trait]
pub trait PageSession: Send {
    /// Navigate and wait until the network is idle.
    async fn goto(&mut self, url: &Url, timeout: Duration) -> Result<()>;

    /// Wait until an element with the given id is attached to the document.
    async fn wait_for_element(&mut self, page_id: &str, timeout: Duration) -> Result<ElementWait>;

    /// Rasterize the element's bounding box to a PNG at `path`.
    async fn capture_element(
        &mut self,
        page_id: &str,
        path: &Path,
        timeout: Duration,
    ) -> Result<ElementShot>;

    /// Tear the browser down. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

/// CSS selector matching exactly the element whose `id` attribute equals `page_id`.
///
/// An attribute selector is used instead of `#id` so ids with CSS-special
/// characters (dots, colons, leading digits) still match literally.
pub fn element_selector(page_id: &str) -> String {
    let mut escaped = String::with_capacity(page_id.len() + 8);
    for ch in page_id.chars() {
        match ch {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\a "),
            '\r' => escaped.push_str("\\d "),
            other => escaped.push(other),
        }
    }
    format!("[id=\"{escaped}\"]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_wraps_plain_id() {
        assert_eq!(element_selector("pf1"), r#"[id="pf1"]"#);
    }

    #[test]
    fn selector_keeps_css_special_characters_literal() {
        assert_eq!(element_selector("1.page:a"), r#"[id="1.page:a"]"#);
    }

    #[test]
    fn selector_escapes_quotes_and_backslashes() {
        assert_eq!(element_selector(r#"a"b\c"#), r#"[id="a\"b\\c"]"#);
        assert_eq!(element_selector("a\nb"), "[id=\"a\\a b\"]");
    }
}
