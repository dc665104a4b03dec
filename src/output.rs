use crate::error::ErrorPayload;
use crate::types::{ConversionReport, SkippedPage, Viewport};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Schema version for output payloads.
pub const PAGECAP_OUTPUT_VERSION: &str = "0.1.0";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum PagecapOutput {
    Convert(ConvertOutput),
    Error(ErrorOutput),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertOutput {
    pub version: String,
    pub html: PathBuf,
    pub output_path: PathBuf,
    pub viewport: Viewport,
    pub device_scale_factor: f64,
    pub requested: usize,
    pub pages_written: usize,
    pub pages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedPage>,
    pub elapsed_ms: u64,
}

impl ConvertOutput {
    pub fn from_report(
        html: impl Into<PathBuf>,
        viewport: Viewport,
        device_scale_factor: f64,
        report: ConversionReport,
    ) -> Self {
        Self {
            version: PAGECAP_OUTPUT_VERSION.to_string(),
            html: html.into(),
            output_path: report.output_path,
            viewport,
            device_scale_factor,
            requested: report.requested,
            pages_written: report.pages_written,
            pages: report.pages,
            skipped: report.skipped,
            elapsed_ms: report.elapsed_ms,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorOutput {
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub error: ErrorPayload,
}

impl ErrorOutput {
    pub fn new(error: ErrorPayload) -> Self {
        Self {
            version: PAGECAP_OUTPUT_VERSION.to_string(),
            message: Some(error.message.clone()),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCategory;

    fn report() -> ConversionReport {
        ConversionReport {
            output_path: PathBuf::from("/tmp/out.pdf"),
            requested: 3,
            pages_written: 2,
            pages: vec!["pf1".into(), "pf3".into()],
            skipped: vec![SkippedPage::not_found("pf2", 1)],
            elapsed_ms: 1200,
        }
    }

    #[test]
    fn convert_output_serializes() {
        let output = PagecapOutput::Convert(ConvertOutput::from_report(
            "/tmp/doc.html",
            Viewport::default(),
            4.0,
            report(),
        ));

        let json = serde_json::to_value(&output).expect("serialize convert output");
        assert_eq!(json["mode"], "convert");
        assert_eq!(json["version"], PAGECAP_OUTPUT_VERSION);
        assert_eq!(json["pagesWritten"], 2);
        assert_eq!(json["pages"][1], "pf3");
        assert_eq!(json["skipped"][0]["pageId"], "pf2");
        assert_eq!(json["viewport"]["width"], 1686);
    }

    #[test]
    fn complete_conversion_omits_skipped() {
        let mut full = report();
        full.skipped.clear();
        let output = ConvertOutput::from_report("/tmp/doc.html", Viewport::default(), 4.0, full);
        assert!(output.is_complete());

        let json = serde_json::to_string(&output).expect("serialize");
        assert!(!json.contains("skipped"));
    }

    #[test]
    fn error_output_serializes() {
        let output = PagecapOutput::Error(ErrorOutput::new(ErrorPayload::new(
            ErrorCategory::Document,
            "missing file".to_string(),
            "check the path",
        )));

        let json = serde_json::to_string(&output).expect("serialize error output");
        assert!(json.contains("\"mode\":\"error\""));
        assert!(json.contains("\"category\":\"document\""));
        assert!(json.contains("\"message\":\"missing file\""));
    }
}
