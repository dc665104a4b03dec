use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::TempPath;

use crate::PagecapError;

/// An ordered list of element ids to capture from one HTML document.
///
/// Duplicates are allowed; the order of `page_ids` is the page order of the PDF.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureRequest {
    pub html_path: PathBuf,
    pub page_ids: Vec<String>,
}

impl CaptureRequest {
    pub fn new<I, S>(html_path: impl Into<PathBuf>, page_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            html_path: html_path.into(),
            page_ids: page_ids.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.page_ids.is_empty()
    }
}

/// A rasterized element. The image file is deleted when this value is dropped.
#[derive(Debug)]
pub struct CapturedPage {
    pub page_id: String,
    /// Index of the id within the request.
    pub position: usize,
    path: TempPath,
}

impl CapturedPage {
    pub fn new(page_id: impl Into<String>, position: usize, path: TempPath) -> Self {
        Self {
            page_id: page_id.into(),
            position,
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the image now, reporting the failure instead of swallowing it.
    pub fn close(self) -> io::Result<()> {
        self.path.close()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The element was not resolvable when rasterization began.
    NotFound,
    /// The element never attached within the wait budget.
    TimedOut { waited_ms: u64 },
    /// The engine reported an unexpected error for this element only.
    Failed { message: String },
}

/// A requested id that produced no page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedPage {
    pub page_id: String,
    pub position: usize,
    #[serde(flatten)]
    pub reason: SkipReason,
}

impl SkippedPage {
    pub fn not_found(page_id: impl Into<String>, position: usize) -> Self {
        Self {
            page_id: page_id.into(),
            position,
            reason: SkipReason::NotFound,
        }
    }

    pub fn timed_out(page_id: impl Into<String>, position: usize, waited: Duration) -> Self {
        Self {
            page_id: page_id.into(),
            position,
            reason: SkipReason::TimedOut {
                waited_ms: waited.as_millis() as u64,
            },
        }
    }

    pub fn failed(page_id: impl Into<String>, position: usize, message: impl Into<String>) -> Self {
        Self {
            page_id: page_id.into(),
            position,
            reason: SkipReason::Failed {
                message: message.into(),
            },
        }
    }

    pub fn to_error(&self) -> PagecapError {
        match &self.reason {
            SkipReason::NotFound => PagecapError::ElementNotFound {
                page_id: self.page_id.clone(),
            },
            SkipReason::TimedOut { waited_ms } => PagecapError::ElementTimeout {
                page_id: self.page_id.clone(),
                timeout: Duration::from_millis(*waited_ms),
            },
            SkipReason::Failed { message } => PagecapError::browser(format!(
                "capturing element #{} failed: {}",
                self.page_id, message
            )),
        }
    }
}

/// Result of capturing one requested id.
#[derive(Debug)]
pub enum CaptureOutcome {
    Captured(CapturedPage),
    Skipped(SkippedPage),
}

impl CaptureOutcome {
    pub fn page_id(&self) -> &str {
        match self {
            CaptureOutcome::Captured(page) => &page.page_id,
            CaptureOutcome::Skipped(skip) => &skip.page_id,
        }
    }

    pub fn is_captured(&self) -> bool {
        matches!(self, CaptureOutcome::Captured(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn request_keeps_order_and_duplicates() {
        let req = CaptureRequest::new("/tmp/doc.html", ["pf2", "pf1", "pf2"]);
        assert_eq!(req.page_ids, vec!["pf2", "pf1", "pf2"]);
        assert!(!req.is_empty());
        assert!(CaptureRequest::new("/tmp/doc.html", Vec::<String>::new()).is_empty());
    }

    #[test]
    fn captured_page_deletes_file_on_drop() {
        let file = NamedTempFile::new().expect("temp file");
        let page = CapturedPage::new("pf1", 0, file.into_temp_path());
        let path = page.path().to_path_buf();
        assert!(path.exists());
        drop(page);
        assert!(!path.exists());
    }

    #[test]
    fn captured_page_close_removes_file() {
        let file = NamedTempFile::new().expect("temp file");
        let page = CapturedPage::new("pf1", 0, file.into_temp_path());
        let path = page.path().to_path_buf();
        page.close().expect("close");
        assert!(!path.exists());
    }

    #[test]
    fn skipped_page_maps_to_element_errors() {
        let timed_out = SkippedPage::timed_out("pf2", 1, Duration::from_secs(60));
        assert!(matches!(
            timed_out.to_error(),
            PagecapError::ElementTimeout { ref page_id, timeout }
                if page_id == "pf2" && timeout == Duration::from_secs(60)
        ));
        assert!(matches!(
            SkippedPage::not_found("pf3", 2).to_error(),
            PagecapError::ElementNotFound { .. }
        ));
        assert!(matches!(
            SkippedPage::failed("pf4", 3, "boom").to_error(),
            PagecapError::Browser(_)
        ));
    }

    #[test]
    fn skipped_page_serializes_flat_reason() {
        let json = serde_json::to_value(SkippedPage::timed_out("pf2", 1, Duration::from_millis(1500)))
            .expect("serialize");
        assert_eq!(json["pageId"], "pf2");
        assert_eq!(json["reason"], "timed_out");
        assert_eq!(json["waited_ms"], 1500);
    }
}
