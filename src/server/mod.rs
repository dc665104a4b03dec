//! HTTP upload service.
//!
//! # Routes
//!
//! - `GET /` and `GET /health` - liveness
//! - `POST /convert-html-to-pdf` - multipart `html_file` + comma-separated `page_ids`
//! - `POST /convert-html-to-pdf-json` - multipart `html_file` + JSON `config`
//!
//! Each conversion runs in its own scratch directory, removed once the PDF
//! response body has been sent or dropped.

mod handlers;
mod upload;

use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tracing::info;

use crate::browser::BrowserLauncher;
use crate::config::Config;
use crate::convert::{ConvertOptions, Converter};
use crate::Result;

pub use handlers::{ApiError, SKIPPED_HEADER};
pub use upload::{output_file_name, parse_page_ids_csv, parse_page_ids_json, PageIdsConfig};

#[derive(Debug, Clone)]
pub struct AppState {
    pub converter: Converter,
    /// Parent of the per-request scratch directories.
    pub scratch_root: PathBuf,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        Self {
            converter: Converter::from_config(config),
            scratch_root: config.scratch_dir.clone().unwrap_or_else(std::env::temp_dir),
            max_upload_bytes: config.server.max_upload_bytes,
        }
    }

    /// State using a caller-supplied engine.
    pub fn with_launcher(launcher: Arc<dyn BrowserLauncher>, config: &Config) -> Self {
        Self {
            converter: Converter::new(launcher, ConvertOptions::from_config(config)),
            scratch_root: config.scratch_dir.clone().unwrap_or_else(std::env::temp_dir),
            max_upload_bytes: config.server.max_upload_bytes,
        }
    }
}

pub fn router(state: AppState) -> Router {
    let limit = state.max_upload_bytes;
    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .route("/convert-html-to-pdf", post(handlers::convert_csv))
        .route("/convert-html-to-pdf-json", post(handlers::convert_json))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

/// Bind `addr` and serve until Ctrl-C.
pub async fn serve(config: &Config, addr: &str) -> Result<()> {
    let state = AppState::from_config(config);
    std::fs::create_dir_all(&state.scratch_root)?;
    let app = router(state);

    let listener = TcpListener::bind(addr).await?;
    info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler available; run until the process is killed.
        std::future::pending::<()>().await;
    }
}
