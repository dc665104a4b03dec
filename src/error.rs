use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PagecapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load document {}: {message}", path.display())]
    DocumentLoad { path: PathBuf, message: String },

    #[error("Timed out after {timeout:?} waiting for element #{page_id}")]
    ElementTimeout { page_id: String, timeout: Duration },

    #[error("Element #{page_id} was not found")]
    ElementNotFound { page_id: String },

    #[error("No pages captured: {0}")]
    NoPagesCaptured(String),

    #[error("Failed to write PDF: {0}")]
    CompositeWrite(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unexpected error: {0}")]
    Unknown(String),
}

impl PagecapError {
    pub fn document_load(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        PagecapError::DocumentLoad {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn browser(message: impl Into<String>) -> Self {
        PagecapError::Browser(message.into())
    }

    pub fn composite(message: impl Into<String>) -> Self {
        PagecapError::CompositeWrite(message.into())
    }

    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            PagecapError::Io(e) => ErrorPayload::new(
                ErrorCategory::Io,
                e.to_string(),
                "Check file paths/permissions and free space in the temp directory.",
            ),
            PagecapError::DocumentLoad { .. } => ErrorPayload::new(
                ErrorCategory::Document,
                self.to_string(),
                "Verify the HTML file exists and loads offline; increase --nav-timeout if it fetches slow resources.",
            ),
            PagecapError::ElementTimeout { .. } => ErrorPayload::new(
                ErrorCategory::Capture,
                self.to_string(),
                "Increase --element-timeout or check that the element is rendered by the page.",
            ),
            PagecapError::ElementNotFound { .. } => ErrorPayload::new(
                ErrorCategory::Capture,
                self.to_string(),
                "Check the page id spelling against the id attributes in the document.",
            ),
            PagecapError::NoPagesCaptured(_) => ErrorPayload::new(
                ErrorCategory::Capture,
                self.to_string(),
                "Pass at least one page id that exists in the document (e.g. --page-ids pf1,pf2).",
            ),
            PagecapError::CompositeWrite(_) => ErrorPayload::new(
                ErrorCategory::Composite,
                self.to_string(),
                "Check that the output directory is writable; re-run with --verbose for details.",
            ),
            PagecapError::Browser(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("playwright npm package is missing") {
                    ErrorPayload::new(
                        ErrorCategory::Browser,
                        self.to_string(),
                        "Install Playwright (e.g., `npm install playwright` and `npx playwright install chromium`).",
                    )
                } else if lower.contains("executable doesn't exist")
                    || lower.contains("chromium executable")
                {
                    ErrorPayload::new(
                        ErrorCategory::Browser,
                        self.to_string(),
                        "Run `npx playwright install chromium` to download the browser.",
                    )
                } else if lower.contains("not found on path") || lower.contains("node command") {
                    ErrorPayload::new(
                        ErrorCategory::Browser,
                        self.to_string(),
                        "Install Node.js and ensure the node binary is on PATH (or set node_command in the config).",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Browser,
                        self.to_string(),
                        "Re-run with --verbose; check that headless Chromium can start on this host.",
                    )
                }
            }
            PagecapError::Serialization(e) => ErrorPayload::new(
                ErrorCategory::Config,
                e.to_string(),
                "Check JSON inputs (e.g. {\"page_ids\": [\"pf1\"]}).",
            ),
            PagecapError::Config(msg) => {
                let lower = msg.to_ascii_lowercase();
                if lower.contains("viewport") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Use WIDTHxHEIGHT with positive values (e.g., --viewport 1686x1205).",
                    )
                } else if lower.contains("html") {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Upload a file with an .html or .htm extension.",
                    )
                } else {
                    ErrorPayload::new(
                        ErrorCategory::Config,
                        msg.to_string(),
                        "Check flags/paths and the config file values.",
                    )
                }
            }
            PagecapError::Unknown(msg) => ErrorPayload::new(
                ErrorCategory::Unknown,
                msg.to_string(),
                "Re-run with --verbose; file an issue if persistent.",
            ),
        }
    }
}

pub type Result<T> = std::result::Result<T, PagecapError>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Config,
    Browser,
    Document,
    Capture,
    Composite,
    Io,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub category: ErrorCategory,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
}

impl ErrorPayload {
    pub fn new(category: ErrorCategory, message: String, remediation: impl Into<String>) -> Self {
        Self {
            category,
            message,
            remediation: Some(remediation.into()),
        }
    }
}
