use axum::body::Body;
use axum::extract::multipart::{Multipart, MultipartError};
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::StreamExt;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};

use super::upload::{
    header_safe, output_file_name, parse_page_ids_csv, parse_page_ids_json, ConversionForm,
    CONFIG_FIELD, PAGE_IDS_FIELD,
};
use super::AppState;
use crate::error::{ErrorCategory, ErrorPayload};
use crate::types::{CaptureRequest, ConversionReport};
use crate::PagecapError;

/// Response header listing ids that produced no page.
pub const SKIPPED_HEADER: &str = "x-pagecap-skipped";

/// Error body returned by every endpoint: `{"detail": ..., "error": {...}}`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    payload: ErrorPayload,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<PagecapError> for ApiError {
    fn from(err: PagecapError) -> Self {
        let status = match &err {
            PagecapError::NoPagesCaptured(_) | PagecapError::DocumentLoad { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            PagecapError::Config(_) | PagecapError::Serialization(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            payload: err.to_payload(),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        Self {
            status: err.status(),
            payload: ErrorPayload::new(
                ErrorCategory::Config,
                format!("invalid multipart body: {}", err.body_text()),
                "Send multipart/form-data with an 'html_file' file field.",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = json!({
            "detail": self.payload.message,
            "error": self.payload,
        });
        (self.status, Json(body)).into_response()
    }
}

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "message": "HTML to PDF Converter API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "healthy"}))
}

/// `POST /convert-html-to-pdf`: ids as a comma-separated `page_ids` field.
pub async fn convert_csv(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = ConversionForm::read(multipart).await?;
    form.html_upload()?;
    let raw = form.page_ids.as_deref().ok_or_else(|| {
        PagecapError::Config(format!("missing '{PAGE_IDS_FIELD}' form field"))
    })?;
    let ids = parse_page_ids_csv(raw)?;
    run_conversion(&state, &form, ids).await
}

/// `POST /convert-html-to-pdf-json`: ids in a JSON `config` field.
pub async fn convert_json(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let form = ConversionForm::read(multipart).await?;
    form.html_upload()?;
    let raw = form
        .config
        .as_deref()
        .ok_or_else(|| PagecapError::Config(format!("missing '{CONFIG_FIELD}' form field")))?;
    let ids = parse_page_ids_json(raw)?;
    run_conversion(&state, &form, ids).await
}

async fn run_conversion(
    state: &AppState,
    form: &ConversionForm,
    page_ids: Vec<String>,
) -> Result<Response, ApiError> {
    let (upload_name, html) = form.html_upload()?;

    // Everything for this request lives here and goes away with the guard.
    let scratch = tempfile::Builder::new()
        .prefix("pagecap-req-")
        .tempdir_in(&state.scratch_root)
        .map_err(PagecapError::Io)?;
    let html_path = scratch.path().join("document.html");
    tokio::fs::write(&html_path, html)
        .await
        .map_err(PagecapError::Io)?;

    let download_name = output_file_name(upload_name);
    let pdf_path = scratch.path().join(&download_name);
    let request = CaptureRequest::new(html_path, page_ids);

    let report = state
        .converter
        .convert_request(&request, &pdf_path, Some(scratch.path()))
        .await
        .map_err(|err| {
            warn!(upload = upload_name, error = %err, "conversion failed");
            ApiError::from(err)
        })?;
    info!(
        upload = upload_name,
        pages = report.pages_written,
        skipped = report.skipped.len(),
        "conversion succeeded"
    );

    stream_pdf(scratch, &report, &download_name).await
}

async fn stream_pdf(
    scratch: TempDir,
    report: &ConversionReport,
    download_name: &str,
) -> Result<Response, ApiError> {
    let file = tokio::fs::File::open(&report.output_path)
        .await
        .map_err(PagecapError::Io)?;
    let length = file.metadata().await.map_err(PagecapError::Io)?.len();

    // The scratch directory is removed once the body stream is dropped.
    let stream = ReaderStream::new(file).map(move |chunk| {
        let _guard = &scratch;
        chunk
    });

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/pdf"));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    if let Ok(value) =
        HeaderValue::from_str(&format!("attachment; filename=\"{download_name}\""))
    {
        headers.insert(header::CONTENT_DISPOSITION, value);
    }
    if let Some(value) = skipped_header_value(report) {
        headers.insert(HeaderName::from_static(SKIPPED_HEADER), value);
    }

    Ok((StatusCode::OK, headers, Body::from_stream(stream)).into_response())
}

fn skipped_header_value(report: &ConversionReport) -> Option<HeaderValue> {
    if report.skipped.is_empty() {
        return None;
    }
    let ids: Vec<String> = report.skipped_ids().into_iter().map(header_safe).collect();
    HeaderValue::from_str(&ids.join(",")).ok()
}
