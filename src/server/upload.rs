//! Multipart form parsing and request validation.

use std::path::Path;

use axum::body::Bytes;
use axum::extract::multipart::{Multipart, MultipartError};
use serde::Deserialize;

use crate::{PagecapError, Result};

pub const HTML_FIELD: &str = "html_file";
pub const PAGE_IDS_FIELD: &str = "page_ids";
pub const CONFIG_FIELD: &str = "config";

/// Fields of a conversion form, before validation.
#[derive(Debug, Default)]
pub struct ConversionForm {
    pub file_name: Option<String>,
    pub html: Option<Bytes>,
    pub page_ids: Option<String>,
    pub config: Option<String>,
}

impl ConversionForm {
    /// Drain `multipart`, keeping the fields this service understands.
    pub async fn read(mut multipart: Multipart) -> std::result::Result<Self, MultipartError> {
        let mut form = ConversionForm::default();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_owned);
            match name.as_deref() {
                Some(HTML_FIELD) => {
                    form.file_name = field.file_name().map(str::to_owned);
                    form.html = Some(field.bytes().await?);
                }
                Some(PAGE_IDS_FIELD) => form.page_ids = Some(field.text().await?),
                Some(CONFIG_FIELD) => form.config = Some(field.text().await?),
                _ => {}
            }
        }
        Ok(form)
    }

    /// The uploaded document and its validated file name.
    pub fn html_upload(&self) -> Result<(&str, &Bytes)> {
        let html = self
            .html
            .as_ref()
            .ok_or_else(|| PagecapError::Config(format!("missing '{HTML_FIELD}' file field")))?;
        let name = self.file_name.as_deref().unwrap_or_default();
        validate_html_file_name(name)?;
        Ok((name, html))
    }
}

/// JSON body of the `config` form field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageIdsConfig {
    #[serde(default)]
    pub page_ids: Vec<String>,
}

/// Split a comma-separated id list, trimming entries and dropping blanks.
pub fn parse_page_ids_csv(raw: &str) -> Result<Vec<String>> {
    let ids: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .collect();
    if ids.is_empty() {
        return Err(PagecapError::Config(
            "at least one page id is required (e.g. pf1,pf2,pf3)".to_string(),
        ));
    }
    Ok(ids)
}

/// Parse the JSON `config` field into its id list.
pub fn parse_page_ids_json(raw: &str) -> Result<Vec<String>> {
    let config: PageIdsConfig = serde_json::from_str(raw)
        .map_err(|e| PagecapError::Config(format!("invalid JSON config: {e}")))?;
    if config.page_ids.is_empty() {
        return Err(PagecapError::Config(
            "config must list page_ids (e.g. {\"page_ids\": [\"pf1\"]})".to_string(),
        ));
    }
    Ok(config.page_ids)
}

pub fn validate_html_file_name(name: &str) -> Result<()> {
    if html_stem(name).is_some() {
        Ok(())
    } else {
        Err(PagecapError::Config(format!(
            "uploaded file must be HTML (.html or .htm), got '{name}'"
        )))
    }
}

/// File name without directories or its `.html`/`.htm` extension.
fn html_stem(name: &str) -> Option<&str> {
    let base = Path::new(name).file_name()?.to_str()?;
    let lower = base.to_ascii_lowercase();
    let ext_len = if lower.ends_with(".html") {
        5
    } else if lower.ends_with(".htm") {
        4
    } else {
        return None;
    };
    Some(&base[..base.len() - ext_len])
}

/// Download name offered for the PDF generated from `upload_name`.
pub fn output_file_name(upload_name: &str) -> String {
    let stem = html_stem(upload_name).unwrap_or("document");
    let safe = header_safe(stem);
    let stem = if safe.is_empty() { "document".to_string() } else { safe };
    format!("converted_{stem}.pdf")
}

/// Replace characters that cannot appear in a quoted header value.
pub fn header_safe(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c == ' ' || (c.is_ascii_graphic() && c != '"' && c != '\\') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
