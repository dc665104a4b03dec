//! In-process browser stand-in: an element "exists" when the document contains `id="<id>"`.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use pagecap_lib::browser::{ElementShot, ElementWait};
use pagecap_lib::{BrowserLauncher, PageSession, PagecapError, Result, SessionSettings};
use url::Url;

#[derive(Debug, Default)]
pub struct Counters {
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
    pub active: AtomicUsize,
    pub max_active: AtomicUsize,
}

#[derive(Debug, Default, Clone)]
pub struct FakeLauncher {
    pub counters: Arc<Counters>,
    /// Keep each session open this long after navigation.
    pub hold: Duration,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holding(hold: Duration) -> Self {
        Self {
            hold,
            ..Self::default()
        }
    }

    pub fn launches(&self) -> usize {
        self.counters.launches.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.counters.closes.load(Ordering::SeqCst)
    }

    pub fn max_active(&self) -> usize {
        self.counters.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for FakeLauncher {
    async fn launch(&self, _settings: &SessionSettings) -> Result<Box<dyn PageSession>> {
        self.counters.launches.fetch_add(1, Ordering::SeqCst);
        let now = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_active.fetch_max(now, Ordering::SeqCst);
        Ok(Box::new(FakeSession {
            counters: self.counters.clone(),
            hold: self.hold,
            html: None,
            closed: false,
        }))
    }

    fn engine_name(&self) -> &'static str {
        "fake"
    }
}

struct FakeSession {
    counters: Arc<Counters>,
    hold: Duration,
    html: Option<String>,
    closed: bool,
}

impl FakeSession {
    fn has(&self, page_id: &str) -> bool {
        self.html
            .as_deref()
            .map(|html| html.contains(&format!("id=\"{page_id}\"")))
            .unwrap_or(false)
    }
}

#[async_trait]
impl PageSession for FakeSession {
    async fn goto(&mut self, url: &Url, _timeout: Duration) -> Result<()> {
        let path = url
            .to_file_path()
            .map_err(|_| PagecapError::browser("not a file URL"))?;
        let html = std::fs::read_to_string(&path)
            .map_err(|e| PagecapError::browser(format!("net::ERR_FILE_NOT_FOUND: {e}")))?;
        self.html = Some(html);
        if !self.hold.is_zero() {
            tokio::time::sleep(self.hold).await;
        }
        Ok(())
    }

    async fn wait_for_element(&mut self, page_id: &str, _timeout: Duration) -> Result<ElementWait> {
        Ok(if self.has(page_id) {
            ElementWait::Attached
        } else {
            ElementWait::TimedOut
        })
    }

    async fn capture_element(
        &mut self,
        page_id: &str,
        path: &Path,
        _timeout: Duration,
    ) -> Result<ElementShot> {
        if !self.has(page_id) {
            return Ok(ElementShot::NotFound);
        }
        element_image(page_id)
            .save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| PagecapError::browser(e.to_string()))?;
        Ok(ElementShot::Saved)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.counters.closes.fetch_add(1, Ordering::SeqCst);
            self.counters.active.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// Width of the image the fake renders for `page_id`; distinct per id.
pub fn element_width(page_id: &str) -> u32 {
    10 + page_id.bytes().map(u32::from).sum::<u32>() % 50
}

fn element_image(page_id: &str) -> RgbImage {
    let seed = page_id.bytes().fold(7u8, |acc, b| acc.wrapping_mul(31).wrapping_add(b));
    RgbImage::from_pixel(element_width(page_id), 8, Rgb([seed, 255 - seed, 128]))
}

/// A document with one `<div id=...>` per id.
pub fn document_with(ids: &[&str]) -> String {
    let body: String = ids
        .iter()
        .map(|id| format!("<div id=\"{id}\" class=\"page\">{id}</div>\n"))
        .collect();
    format!("<!DOCTYPE html>\n<html><body>\n{body}</body></html>\n")
}

/// Page widths (in points at the default 72 dpi) of a PDF, in page order.
pub fn page_widths(doc: &lopdf::Document) -> Vec<f32> {
    doc.get_pages()
        .values()
        .map(|id| {
            let page = doc.get_dictionary(*id).expect("page dictionary");
            let media = page
                .get(b"MediaBox")
                .and_then(|o| o.as_array())
                .expect("media box");
            media[2].as_float().expect("width")
        })
        .collect()
}

pub fn dir_is_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}
