//! Conversion pipeline: capture the requested elements, then compose the PDF.
//!
//! [`Converter`] owns the browser launcher and bounds how many browser sessions
//! run at once. Each call to [`Converter::convert`] is independent.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tracing::{info, warn};

use crate::browser::{BrowserLauncher, PlaywrightLauncher};
use crate::capture::{capture_elements, CaptureOptions};
use crate::composite::{composite_pages, CompositeOptions};
use crate::config::Config;
use crate::types::{CaptureOutcome, CaptureRequest, CapturedPage, ConversionReport, SkippedPage};
use crate::{PagecapError, Result};

/// Configuration for a [`Converter`].
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub capture: CaptureOptions,
    pub composite: CompositeOptions,
    /// Maximum number of browser sessions alive at the same time.
    pub max_concurrent_sessions: usize,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl ConvertOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            capture: CaptureOptions::from_config(config),
            composite: CompositeOptions::from_config(config),
            max_concurrent_sessions: config.server.max_concurrent_sessions,
        }
    }
}

/// Runs conversions with semaphore-based limiting of browser sessions.
#[derive(Clone)]
pub struct Converter {
    launcher: Arc<dyn BrowserLauncher>,
    options: ConvertOptions,
    semaphore: Arc<Semaphore>,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("engine", &self.launcher.engine_name())
            .field("options", &self.options)
            .finish()
    }
}

impl Converter {
    pub fn new(launcher: Arc<dyn BrowserLauncher>, options: ConvertOptions) -> Self {
        let permits = options.max_concurrent_sessions.max(1);
        Self {
            launcher,
            options,
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Converter backed by Playwright, configured from `config`.
    pub fn from_config(config: &Config) -> Self {
        let launcher = PlaywrightLauncher::new(config.node_command.clone(), config.headless);
        Self::new(Arc::new(launcher), ConvertOptions::from_config(config))
    }

    pub fn options(&self) -> &ConvertOptions {
        &self.options
    }

    /// Capture `page_ids` from `html_path`, in order, and write them to `output` as a PDF.
    pub async fn convert<I, S>(
        &self,
        html_path: impl Into<PathBuf>,
        output: &Path,
        page_ids: I,
    ) -> Result<ConversionReport>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let request = CaptureRequest::new(html_path, page_ids);
        self.convert_request(&request, output, None).await
    }

    /// Same as [`Converter::convert`], optionally overriding where page images go.
    pub async fn convert_request(
        &self,
        request: &CaptureRequest,
        output: &Path,
        scratch_dir: Option<&Path>,
    ) -> Result<ConversionReport> {
        let started = Instant::now();
        if request.is_empty() {
            return Err(PagecapError::NoPagesCaptured(
                "no page ids were requested".to_string(),
            ));
        }

        let mut capture = self.options.capture.clone();
        if let Some(dir) = scratch_dir {
            capture.scratch_dir = dir.to_path_buf();
        }

        let outcomes = {
            let _permit = self
                .semaphore
                .acquire()
                .await
                .map_err(|_| PagecapError::Config("Converter unavailable".to_string()))?;
            capture_elements(self.launcher.as_ref(), request, &capture).await?
        };

        let (captured, skipped) = split_outcomes(outcomes);
        if captured.is_empty() {
            return Err(PagecapError::NoPagesCaptured(describe_skipped(&skipped)));
        }
        let pages: Vec<String> = captured.iter().map(|p| p.page_id.clone()).collect();

        let written = compose_blocking(captured, output, self.options.composite).await?;

        let report = ConversionReport {
            output_path: written,
            requested: request.page_ids.len(),
            pages_written: pages.len(),
            pages,
            skipped,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            output = %report.output_path.display(),
            pages = report.pages_written,
            skipped = report.skipped.len(),
            elapsed_ms = report.elapsed_ms,
            "conversion finished"
        );
        Ok(report)
    }
}

/// Convert with default options and the Playwright engine.
pub async fn convert<I, S>(
    html_path: impl Into<PathBuf>,
    output: &Path,
    page_ids: I,
) -> Result<ConversionReport>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    Converter::from_config(&Config::default())
        .convert(html_path, output, page_ids)
        .await
}

fn split_outcomes(outcomes: Vec<CaptureOutcome>) -> (Vec<CapturedPage>, Vec<SkippedPage>) {
    let mut captured = Vec::new();
    let mut skipped = Vec::new();
    for outcome in outcomes {
        match outcome {
            CaptureOutcome::Captured(page) => captured.push(page),
            CaptureOutcome::Skipped(skip) => skipped.push(skip),
        }
    }
    (captured, skipped)
}

fn describe_skipped(skipped: &[SkippedPage]) -> String {
    let reasons: Vec<String> = skipped.iter().map(|s| s.to_error().to_string()).collect();
    format!(
        "none of the {} requested ids could be captured ({})",
        skipped.len(),
        reasons.join("; ")
    )
}

async fn compose_blocking(
    pages: Vec<CapturedPage>,
    output: &Path,
    options: CompositeOptions,
) -> Result<PathBuf> {
    let output = output.to_path_buf();
    let paths: Vec<PathBuf> = pages.iter().map(|p| p.path().to_path_buf()).collect();
    match tokio::task::spawn_blocking(move || composite_pages(pages, &output, &options)).await {
        Ok(result) => result,
        Err(join) => {
            // The pages were dropped with the task; make sure nothing is left behind.
            for path in paths.iter().filter(|p| p.exists()) {
                if let Err(err) = std::fs::remove_file(path) {
                    warn!(path = %path.display(), error = %err, "failed to delete page image");
                }
            }
            Err(PagecapError::composite(format!("composite task failed: {join}")))
        }
    }
}
