use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::SkippedPage;

/// Summary of a finished conversion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionReport {
    pub output_path: PathBuf,
    /// Number of ids in the request, duplicates included.
    pub requested: usize,
    pub pages_written: usize,
    /// Ids of the written pages, in page order.
    pub pages: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skipped: Vec<SkippedPage>,
    pub elapsed_ms: u64,
}

impl ConversionReport {
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    pub fn skipped_ids(&self) -> Vec<&str> {
        self.skipped.iter().map(|s| s.page_id.as_str()).collect()
    }
}
