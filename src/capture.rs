//! Capture stage: load one document and rasterize the requested elements in order.
//!
//! Per-element failures never abort the batch; they are recorded as
//! [`SkippedPage`]s. Only launching the engine or loading the document is fatal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempPath;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{BrowserLauncher, ElementShot, ElementWait, PageSession, SessionSettings};
use crate::config::Config;
use crate::types::{CaptureOutcome, CaptureRequest, CapturedPage, SkippedPage};
use crate::{PagecapError, Result, Viewport};

/// Longest page-id fragment kept in temporary image names.
const MAX_NAME_FRAGMENT: usize = 40;

#[derive(Debug, Clone)]
pub struct CaptureOptions {
    pub viewport: Viewport,
    pub device_scale_factor: f64,
    pub launch_timeout: Duration,
    pub navigation_timeout: Duration,
    /// Budget for one element to attach to the document.
    pub element_timeout: Duration,
    pub screenshot_timeout: Duration,
    /// Where per-element images are written.
    pub scratch_dir: PathBuf,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl CaptureOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            viewport: config.viewport,
            device_scale_factor: config.device_scale_factor,
            launch_timeout: config.timeouts.launch,
            navigation_timeout: config.timeouts.navigation,
            element_timeout: config.timeouts.element_wait,
            screenshot_timeout: config.timeouts.screenshot,
            scratch_dir: config
                .scratch_dir
                .clone()
                .unwrap_or_else(std::env::temp_dir),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            viewport: self.viewport,
            device_scale_factor: self.device_scale_factor,
            launch_timeout: self.launch_timeout,
        }
    }
}

/// Capture every requested element, in request order.
///
/// Returns one outcome per requested id. An empty request yields an empty list
/// without starting a browser.
pub async fn capture_elements(
    launcher: &dyn BrowserLauncher,
    request: &CaptureRequest,
    options: &CaptureOptions,
) -> Result<Vec<CaptureOutcome>> {
    if request.is_empty() {
        debug!("no page ids requested; skipping browser launch");
        return Ok(Vec::new());
    }

    let url = document_url(&request.html_path)?;
    tokio::fs::create_dir_all(&options.scratch_dir).await?;

    info!(
        engine = launcher.engine_name(),
        document = %url,
        pages = request.page_ids.len(),
        "launching browser"
    );
    let mut session = launcher.launch(&options.session_settings()).await?;

    let result = capture_with_session(session.as_mut(), request, &url, options).await;

    if let Err(err) = session.close().await {
        warn!(error = %err, "failed to close browser session cleanly");
    }
    result
}

async fn capture_with_session(
    session: &mut dyn PageSession,
    request: &CaptureRequest,
    url: &Url,
    options: &CaptureOptions,
) -> Result<Vec<CaptureOutcome>> {
    session
        .goto(url, options.navigation_timeout)
        .await
        .map_err(|err| PagecapError::document_load(&request.html_path, err.to_string()))?;
    debug!(document = %url, "document reached network idle");

    let mut outcomes = Vec::with_capacity(request.page_ids.len());
    for (position, page_id) in request.page_ids.iter().enumerate() {
        let outcome = capture_one(session, page_id, position, options).await;
        match &outcome {
            CaptureOutcome::Captured(page) => {
                debug!(page_id = %page_id, position, path = %page.path().display(), "captured element");
            }
            CaptureOutcome::Skipped(skip) => {
                warn!(page_id = %page_id, position, reason = ?skip.reason, "skipping page");
            }
        }
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

async fn capture_one(
    session: &mut dyn PageSession,
    page_id: &str,
    position: usize,
    options: &CaptureOptions,
) -> CaptureOutcome {
    match session.wait_for_element(page_id, options.element_timeout).await {
        Ok(ElementWait::Attached) => {}
        Ok(ElementWait::TimedOut) => {
            return CaptureOutcome::Skipped(SkippedPage::timed_out(
                page_id,
                position,
                options.element_timeout,
            ))
        }
        Err(err) => {
            return CaptureOutcome::Skipped(SkippedPage::failed(page_id, position, failure_message(err)))
        }
    }

    let path = match scratch_image_path(&options.scratch_dir, page_id) {
        Ok(path) => path,
        Err(err) => {
            return CaptureOutcome::Skipped(SkippedPage::failed(page_id, position, err.to_string()))
        }
    };

    match session
        .capture_element(page_id, &path, options.screenshot_timeout)
        .await
    {
        Ok(ElementShot::Saved) => match std::fs::metadata(&path) {
            Ok(meta) if meta.len() > 0 => {
                CaptureOutcome::Captured(CapturedPage::new(page_id, position, path))
            }
            _ => CaptureOutcome::Skipped(SkippedPage::failed(
                page_id,
                position,
                "engine reported success but wrote no image",
            )),
        },
        Ok(ElementShot::NotFound) => CaptureOutcome::Skipped(SkippedPage::not_found(page_id, position)),
        Ok(ElementShot::TimedOut) => CaptureOutcome::Skipped(SkippedPage::timed_out(
            page_id,
            position,
            options.screenshot_timeout,
        )),
        Err(err) => CaptureOutcome::Skipped(SkippedPage::failed(page_id, position, failure_message(err))),
    }
}

/// Engine errors are reported without their category prefix; the skip itself
/// is rendered as a browser error later.
fn failure_message(err: PagecapError) -> String {
    match err {
        PagecapError::Browser(message) => message,
        other => other.to_string(),
    }
}

/// `file://` URL for a local document; fails if the file is missing.
pub fn document_url(html_path: &Path) -> Result<Url> {
    let absolute = std::fs::canonicalize(html_path)
        .map_err(|err| PagecapError::document_load(html_path, err.to_string()))?;
    if !absolute.is_file() {
        return Err(PagecapError::document_load(html_path, "not a regular file"));
    }
    Url::from_file_path(&absolute)
        .map_err(|_| PagecapError::document_load(html_path, "cannot build a file:// URL"))
}

/// Reserve a unique, empty `.png` path in `dir` for one element.
fn scratch_image_path(dir: &Path, page_id: &str) -> std::io::Result<TempPath> {
    let prefix = format!("{}_", name_fragment(page_id));
    let file = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".png")
        .tempfile_in(dir)?;
    Ok(file.into_temp_path())
}

fn name_fragment(page_id: &str) -> String {
    let fragment: String = page_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_NAME_FRAGMENT)
        .collect();
    if fragment.is_empty() {
        "page".to_string()
    } else {
        fragment
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[derive(Clone, Copy)]
    enum Behaviour {
        Present,
        Vanishes,
        Errors,
    }

    #[derive(Default)]
    struct Calls {
        launched: AtomicUsize,
        closed: AtomicUsize,
        log: Mutex<Vec<String>>,
    }

    struct ScriptedLauncher {
        elements: HashMap<&'static str, Behaviour>,
        fail_goto: bool,
        calls: Arc<Calls>,
    }

    struct ScriptedSession {
        elements: HashMap<&'static str, Behaviour>,
        fail_goto: bool,
        calls: Arc<Calls>,
    }

    #[async_trait]
    impl BrowserLauncher for ScriptedLauncher {
        async fn launch(&self, _settings: &SessionSettings) -> Result<Box<dyn PageSession>> {
            self.calls.launched.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedSession {
                elements: self.elements.clone(),
                fail_goto: self.fail_goto,
                calls: self.calls.clone(),
            }))
        }

        fn engine_name(&self) -> &'static str {
            "scripted"
        }
    }

    #[async_trait]
    impl PageSession for ScriptedSession {
        async fn goto(&mut self, _url: &Url, _timeout: Duration) -> Result<()> {
            if self.fail_goto {
                return Err(PagecapError::browser("net::ERR_ABORTED"));
            }
            Ok(())
        }

        async fn wait_for_element(&mut self, page_id: &str, _timeout: Duration) -> Result<ElementWait> {
            self.calls.log.lock().unwrap().push(format!("wait:{page_id}"));
            match self.elements.get(page_id) {
                Some(Behaviour::Errors) => Err(PagecapError::browser("target crashed")),
                Some(_) => Ok(ElementWait::Attached),
                None => Ok(ElementWait::TimedOut),
            }
        }

        async fn capture_element(
            &mut self,
            page_id: &str,
            path: &Path,
            _timeout: Duration,
        ) -> Result<ElementShot> {
            self.calls.log.lock().unwrap().push(format!("shot:{page_id}"));
            match self.elements.get(page_id) {
                Some(Behaviour::Present) => {
                    image::RgbImage::from_pixel(3, 2, image::Rgb([1, 2, 3]))
                        .save(path)
                        .unwrap();
                    Ok(ElementShot::Saved)
                }
                _ => Ok(ElementShot::NotFound),
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.calls.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn launcher(elements: &[(&'static str, Behaviour)], fail_goto: bool) -> ScriptedLauncher {
        ScriptedLauncher {
            elements: elements.iter().copied().collect(),
            fail_goto,
            calls: Arc::new(Calls::default()),
        }
    }

    fn setup() -> (TempDir, PathBuf, CaptureOptions) {
        let dir = TempDir::new().expect("tempdir");
        let html = dir.path().join("doc.html");
        std::fs::write(&html, "<div id=pf1></div>").expect("write html");
        let options = CaptureOptions {
            scratch_dir: dir.path().join("scratch"),
            element_timeout: Duration::from_millis(50),
            ..CaptureOptions::default()
        };
        (dir, html, options)
    }

    #[tokio::test]
    async fn captures_in_request_order_and_records_missing() {
        let (_dir, html, options) = setup();
        let launcher = launcher(
            &[("pf1", Behaviour::Present), ("pf3", Behaviour::Present)],
            false,
        );
        let request = CaptureRequest::new(&html, ["pf3", "pf2", "pf1"]);

        let outcomes = capture_elements(&launcher, &request, &options).await.unwrap();

        let ids: Vec<&str> = outcomes.iter().map(|o| o.page_id()).collect();
        assert_eq!(ids, vec!["pf3", "pf2", "pf1"]);
        assert!(outcomes[0].is_captured());
        assert!(matches!(
            &outcomes[1],
            CaptureOutcome::Skipped(SkippedPage { reason: crate::types::SkipReason::TimedOut { waited_ms: 50 }, position: 1, .. })
        ));
        assert!(outcomes[2].is_captured());
        assert_eq!(
            *launcher.calls.log.lock().unwrap(),
            vec!["wait:pf3", "shot:pf3", "wait:pf2", "wait:pf1", "shot:pf1"]
        );
        assert_eq!(launcher.calls.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn vanished_and_erroring_elements_do_not_abort_batch() {
        let (_dir, html, options) = setup();
        let launcher = launcher(
            &[
                ("gone", Behaviour::Vanishes),
                ("bad", Behaviour::Errors),
                ("ok", Behaviour::Present),
            ],
            false,
        );
        let request = CaptureRequest::new(&html, ["gone", "bad", "ok"]);

        let outcomes = capture_elements(&launcher, &request, &options).await.unwrap();

        assert!(matches!(
            &outcomes[0],
            CaptureOutcome::Skipped(SkippedPage { reason: crate::types::SkipReason::NotFound, .. })
        ));
        match &outcomes[1] {
            CaptureOutcome::Skipped(skip) => {
                assert_eq!(
                    skip.reason,
                    crate::types::SkipReason::Failed {
                        message: "target crashed".to_string()
                    }
                );
                assert_eq!(
                    skip.to_error().to_string(),
                    "Browser error: capturing element #bad failed: target crashed"
                );
            }
            other => panic!("expected a skip, got {other:?}"),
        }
        assert!(outcomes[2].is_captured());
    }

    #[tokio::test]
    async fn not_found_leaves_no_scratch_file_behind() {
        let (_dir, html, options) = setup();
        let launcher = launcher(&[("gone", Behaviour::Vanishes)], false);
        let request = CaptureRequest::new(&html, ["gone"]);

        let outcomes = capture_elements(&launcher, &request, &options).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        let leftovers = std::fs::read_dir(&options.scratch_dir).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[tokio::test]
    async fn empty_request_never_launches() {
        let (_dir, html, options) = setup();
        let launcher = launcher(&[], false);
        let request = CaptureRequest::new(&html, Vec::<String>::new());

        let outcomes = capture_elements(&launcher, &request, &options).await.unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(launcher.calls.launched.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn navigation_failure_is_document_load_and_still_closes() {
        let (_dir, html, options) = setup();
        let launcher = launcher(&[("pf1", Behaviour::Present)], true);
        let request = CaptureRequest::new(&html, ["pf1"]);

        let err = capture_elements(&launcher, &request, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, PagecapError::DocumentLoad { .. }), "got {err:?}");
        assert_eq!(launcher.calls.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_document_fails_before_launch() {
        let (dir, _html, options) = setup();
        let launcher = launcher(&[("pf1", Behaviour::Present)], false);
        let request = CaptureRequest::new(dir.path().join("missing.html"), ["pf1"]);

        let err = capture_elements(&launcher, &request, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, PagecapError::DocumentLoad { .. }));
        assert_eq!(launcher.calls.launched.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn document_url_is_absolute_file_url() {
        let (_dir, html, _options) = setup();
        let url = document_url(&html).unwrap();
        assert_eq!(url.scheme(), "file");
        assert!(url.path().ends_with("/doc.html"));
    }

    #[test]
    fn name_fragment_sanitizes_ids() {
        assert_eq!(name_fragment("pf1"), "pf1");
        assert_eq!(name_fragment("../etc/passwd"), "___etc_passwd");
        assert_eq!(name_fragment(""), "page");
        assert_eq!(name_fragment(&"x".repeat(100)).len(), MAX_NAME_FRAGMENT);
    }
}
