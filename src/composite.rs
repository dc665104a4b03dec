//! Composite stage: assemble captured element images into one multi-page PDF.

use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::ZlibEncoder;
use flate2::Compression;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use tracing::{debug, info, warn};

use crate::config::{Config, PageEncoding, PdfConfig};
use crate::types::CapturedPage;
use crate::{PagecapError, Result};

/// PDF user-space units per inch.
const POINTS_PER_INCH: f64 = 72.0;

#[derive(Debug, Clone, Copy)]
pub struct CompositeOptions {
    /// Resolution used to turn image pixels into page points.
    pub dpi: f64,
    pub encoding: PageEncoding,
    pub jpeg_quality: u8,
}

impl Default for CompositeOptions {
    fn default() -> Self {
        Self::from_pdf_config(&PdfConfig::default())
    }
}

impl CompositeOptions {
    pub fn from_config(config: &Config) -> Self {
        Self::from_pdf_config(&config.pdf)
    }

    pub fn from_pdf_config(pdf: &PdfConfig) -> Self {
        Self {
            dpi: pdf.dpi,
            encoding: pdf.encoding,
            jpeg_quality: pdf.jpeg_quality,
        }
    }

    fn to_points(&self, pixels: u32) -> f64 {
        pixels as f64 * POINTS_PER_INCH / self.dpi
    }
}

/// Write `pages` as consecutive PDF pages at `output`, then delete every image.
///
/// Images are deleted whether or not the PDF could be written. On failure no
/// file is left at `output`.
pub fn composite_pages(
    pages: Vec<CapturedPage>,
    output: &Path,
    options: &CompositeOptions,
) -> Result<PathBuf> {
    let result = write_pdf(&pages, output, options);
    let failures = cleanup_pages(pages);
    if failures > 0 {
        warn!(failures, "some temporary page images could not be deleted");
    }
    result
}

/// Delete every captured image, continuing past individual failures.
///
/// Returns the number of files that could not be removed.
pub fn cleanup_pages(pages: Vec<CapturedPage>) -> usize {
    let mut failures = 0;
    for page in pages {
        let path = page.path().to_path_buf();
        match page.close() {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to delete page image");
                failures += 1;
            }
        }
    }
    failures
}

fn write_pdf(pages: &[CapturedPage], output: &Path, options: &CompositeOptions) -> Result<PathBuf> {
    if pages.is_empty() {
        return Err(PagecapError::NoPagesCaptured(
            "there are no captured images to compose".to_string(),
        ));
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut kids = Vec::with_capacity(pages.len());
    for (index, page) in pages.iter().enumerate() {
        let image = image::open(page.path()).map_err(|e| {
            PagecapError::composite(format!(
                "failed to decode image for #{} ({}): {}",
                page.page_id,
                page.path().display(),
                e
            ))
        })?;
        // Drops alpha and palette modes; the PDF gets plain DeviceRGB.
        let rgb = image.to_rgb8();
        let page_obj = add_image_page(&mut doc, pages_id, &rgb, index, options)?;
        kids.push(Object::Reference(page_obj));
        debug!(page = index + 1, page_id = %page.page_id, width = rgb.width(), height = rgb.height(), "added page");
    }

    let pages_dict = Dictionary::from_iter([
        ("Type", Object::Name(b"Pages".to_vec())),
        ("Count", Object::Integer(kids.len() as i64)),
        ("Kids", Object::Array(kids)),
    ]);
    doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

    let catalog_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Catalog".to_vec())),
        ("Pages", Object::Reference(pages_id)),
    ]));
    doc.trailer.set("Root", Object::Reference(catalog_id));

    let mut buffer = Vec::new();
    doc.save_to(&mut buffer)
        .map_err(|e| PagecapError::composite(format!("failed to encode PDF: {e}")))?;

    persist_atomically(output, &buffer)?;
    info!(output = %output.display(), pages = pages.len(), bytes = buffer.len(), "wrote PDF");
    Ok(output.to_path_buf())
}

fn add_image_page(
    doc: &mut Document,
    pages_id: ObjectId,
    rgb: &RgbImage,
    index: usize,
    options: &CompositeOptions,
) -> Result<ObjectId> {
    let (width, height) = rgb.dimensions();
    let (data, filter) = encode_image(rgb, options)?;

    let image_dict = Dictionary::from_iter([
        ("Type", Object::Name(b"XObject".to_vec())),
        ("Subtype", Object::Name(b"Image".to_vec())),
        ("Width", Object::Integer(i64::from(width))),
        ("Height", Object::Integer(i64::from(height))),
        ("ColorSpace", Object::Name(b"DeviceRGB".to_vec())),
        ("BitsPerComponent", Object::Integer(8)),
        ("Filter", Object::Name(filter.to_vec())),
    ]);
    let image_id = doc.add_object(Stream::new(image_dict, data).with_compression(false));

    let page_w = options.to_points(width) as f32;
    let page_h = options.to_points(height) as f32;
    let name = format!("Im{index}").into_bytes();

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    page_w.into(),
                    0.into(),
                    0.into(),
                    page_h.into(),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.clone())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_bytes = content
        .encode()
        .map_err(|e| PagecapError::composite(format!("failed to encode page content: {e}")))?;
    let content_id = doc.add_object(Stream::new(Dictionary::new(), content_bytes));

    let resources = Dictionary::from_iter([(
        "XObject",
        Object::Dictionary(Dictionary::from_iter([(
            String::from_utf8_lossy(&name).into_owned(),
            Object::Reference(image_id),
        )])),
    )]);

    let page_id = doc.add_object(Dictionary::from_iter([
        ("Type", Object::Name(b"Page".to_vec())),
        ("Parent", Object::Reference(pages_id)),
        (
            "MediaBox",
            Object::Array(vec![0.into(), 0.into(), page_w.into(), page_h.into()]),
        ),
        ("Contents", Object::Reference(content_id)),
        ("Resources", Object::Dictionary(resources)),
    ]));
    Ok(page_id)
}

fn encode_image(rgb: &RgbImage, options: &CompositeOptions) -> Result<(Vec<u8>, &'static [u8])> {
    match options.encoding {
        PageEncoding::Flate => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder
                .write_all(rgb.as_raw())
                .and_then(|_| encoder.flush())
                .map_err(|e| PagecapError::composite(format!("failed to compress image: {e}")))?;
            let data = encoder
                .finish()
                .map_err(|e| PagecapError::composite(format!("failed to compress image: {e}")))?;
            Ok((data, b"FlateDecode"))
        }
        PageEncoding::Jpeg => {
            let mut data = Vec::new();
            JpegEncoder::new_with_quality(&mut data, options.jpeg_quality)
                .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)
                .map_err(|e| PagecapError::composite(format!("failed to encode JPEG: {e}")))?;
            Ok((data, b"DCTDecode"))
        }
    }
}

/// Write beside `output` first and rename into place once complete.
fn persist_atomically(output: &Path, bytes: &[u8]) -> Result<()> {
    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&parent).map_err(|e| {
        PagecapError::composite(format!(
            "failed to create output directory {}: {e}",
            parent.display()
        ))
    })?;

    let mut staged = tempfile::Builder::new()
        .prefix(".pagecap-")
        .suffix(".pdf.part")
        .tempfile_in(&parent)
        .map_err(|e| PagecapError::composite(format!("failed to stage PDF: {e}")))?;
    staged
        .write_all(bytes)
        .and_then(|_| staged.as_file().sync_all())
        .map_err(|e| PagecapError::composite(format!("failed to write PDF: {e}")))?;
    staged.persist(output).map_err(|e| {
        PagecapError::composite(format!(
            "failed to move PDF into {}: {}",
            output.display(),
            e.error
        ))
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::{NamedTempFile, TempDir};

    fn page_from_rgba(dir: &Path, id: &str, position: usize, w: u32, h: u32) -> CapturedPage {
        let file = tempfile::Builder::new()
            .prefix(id)
            .suffix(".png")
            .tempfile_in(dir)
            .unwrap();
        RgbaImage::from_pixel(w, h, Rgba([200, 10, 10, 128]))
            .save(file.path())
            .unwrap();
        CapturedPage::new(id, position, file.into_temp_path())
    }

    fn media_box(doc: &Document, page: ObjectId) -> Vec<f32> {
        let dict = doc.get_dictionary(page).unwrap();
        dict.get(b"MediaBox")
            .unwrap()
            .as_array()
            .unwrap()
            .iter()
            .map(|o| o.as_float().unwrap())
            .collect()
    }

    #[test]
    fn writes_one_page_per_image_in_order() {
        let dir = TempDir::new().unwrap();
        let pages = vec![
            page_from_rgba(dir.path(), "a", 0, 10, 20),
            page_from_rgba(dir.path(), "b", 1, 30, 40),
        ];
        let paths: Vec<PathBuf> = pages.iter().map(|p| p.path().to_path_buf()).collect();
        let output = dir.path().join("out.pdf");

        let written = composite_pages(pages, &output, &CompositeOptions::default()).unwrap();
        assert_eq!(written, output);

        let doc = Document::load(&output).unwrap();
        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        assert_eq!(page_ids.len(), 2);
        assert_eq!(media_box(&doc, page_ids[0]), vec![0.0, 0.0, 10.0, 20.0]);
        assert_eq!(media_box(&doc, page_ids[1]), vec![0.0, 0.0, 30.0, 40.0]);
        assert!(paths.iter().all(|p| !p.exists()), "page images must be deleted");
    }

    #[test]
    fn dpi_scales_page_size() {
        let dir = TempDir::new().unwrap();
        let pages = vec![page_from_rgba(dir.path(), "a", 0, 288, 144)];
        let output = dir.path().join("out.pdf");
        let options = CompositeOptions {
            dpi: 288.0,
            ..CompositeOptions::default()
        };

        composite_pages(pages, &output, &options).unwrap();

        let doc = Document::load(&output).unwrap();
        let first = *doc.get_pages().values().next().unwrap();
        assert_eq!(media_box(&doc, first), vec![0.0, 0.0, 72.0, 36.0]);
    }

    #[test]
    fn jpeg_encoding_uses_dct_filter() {
        let dir = TempDir::new().unwrap();
        let pages = vec![page_from_rgba(dir.path(), "a", 0, 8, 8)];
        let output = dir.path().join("out.pdf");
        let options = CompositeOptions {
            encoding: PageEncoding::Jpeg,
            ..CompositeOptions::default()
        };

        composite_pages(pages, &output, &options).unwrap();

        let raw = std::fs::read(&output).unwrap();
        let text = String::from_utf8_lossy(&raw);
        assert!(text.contains("/DCTDecode"));
        assert!(!text.contains("/FlateDecode"));
    }

    #[test]
    fn empty_input_is_no_pages_and_creates_nothing() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.pdf");

        let err = composite_pages(Vec::new(), &output, &CompositeOptions::default()).unwrap_err();
        assert!(matches!(err, PagecapError::NoPagesCaptured(_)));
        assert!(!output.exists());
    }

    #[test]
    fn undecodable_image_fails_without_output_and_still_cleans_up() {
        let dir = TempDir::new().unwrap();
        let good = page_from_rgba(dir.path(), "good", 0, 4, 4);
        let bad_file = tempfile::Builder::new()
            .suffix(".png")
            .tempfile_in(dir.path())
            .unwrap();
        std::fs::write(bad_file.path(), b"not a png").unwrap();
        let bad = CapturedPage::new("bad", 1, bad_file.into_temp_path());
        let paths = [good.path().to_path_buf(), bad.path().to_path_buf()];
        let output = dir.path().join("out.pdf");

        let err = composite_pages(vec![good, bad], &output, &CompositeOptions::default())
            .unwrap_err();
        assert!(matches!(err, PagecapError::CompositeWrite(_)));
        assert!(format!("{err}").contains("#bad"));
        assert!(!output.exists());
        assert!(paths.iter().all(|p| !p.exists()));
        let staged = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .count();
        assert_eq!(staged, 0);
    }

    #[test]
    fn cleanup_tolerates_already_deleted_files() {
        let first = NamedTempFile::new().unwrap();
        let second = NamedTempFile::new().unwrap();
        std::fs::remove_file(first.path()).unwrap();
        let second_path = second.path().to_path_buf();
        let pages = vec![
            CapturedPage::new("a", 0, first.into_temp_path()),
            CapturedPage::new("b", 1, second.into_temp_path()),
        ];

        assert_eq!(cleanup_pages(pages), 0);
        assert!(!second_path.exists());
    }

    #[test]
    fn replaces_existing_output_atomically() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.pdf");
        std::fs::write(&output, b"old").unwrap();
        let pages = vec![page_from_rgba(dir.path(), "a", 0, 2, 2)];

        composite_pages(pages, &output, &CompositeOptions::default()).unwrap();

        let raw = std::fs::read(&output).unwrap();
        assert!(raw.starts_with(b"%PDF-1.5"));
    }
}
