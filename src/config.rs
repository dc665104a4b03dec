use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Viewport;

/// Default device scale factor: render at 4x pixel density for print sharpness.
pub const DEFAULT_DEVICE_SCALE_FACTOR: f64 = 4.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub viewport: Viewport,
    pub device_scale_factor: f64,
    pub node_command: String,
    pub headless: bool,
    /// Directory for per-element images; the platform temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
    pub timeouts: Timeouts,
    pub pdf: PdfConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    #[serde(with = "humantime_serde")]
    pub launch: Duration,
    #[serde(with = "humantime_serde")]
    pub navigation: Duration,
    #[serde(with = "humantime_serde")]
    pub element_wait: Duration,
    #[serde(with = "humantime_serde")]
    pub screenshot: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            launch: Duration::from_secs(30),
            navigation: Duration::from_secs(60),
            element_wait: Duration::from_secs(60),
            screenshot: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageEncoding {
    /// Raw RGB, FlateDecode.
    #[default]
    Flate,
    /// Baseline JPEG, DCTDecode.
    Jpeg,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    pub dpi: f64,
    pub encoding: PageEncoding,
    pub jpeg_quality: u8,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            dpi: 72.0,
            encoding: PageEncoding::Flate,
            jpeg_quality: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub max_concurrent_sessions: usize,
    pub max_upload_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            max_concurrent_sessions: 2,
            max_upload_bytes: 20 * 1024 * 1024,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            device_scale_factor: DEFAULT_DEVICE_SCALE_FACTOR,
            node_command: "node".to_string(),
            headless: true,
            scratch_dir: None,
            timeouts: Timeouts::default(),
            pdf: PdfConfig::default(),
            server: ServerConfig::default(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigLoadError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    /// `$HOME/.config/pagecap/config.toml`, if a home directory is known.
    pub fn central_config_path() -> Option<PathBuf> {
        let home = std::env::var_os("HOME").filter(|h| !h.is_empty())?;
        Some(
            PathBuf::from(home)
                .join(".config")
                .join("pagecap")
                .join("config.toml"),
        )
    }

    /// Load from an explicit path, else the central config if it exists, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigLoadError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match Self::central_config_path() {
            Some(central) if central.is_file() => Self::from_file(&central),
            _ => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigLoadError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigLoadError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.viewport.width == 0 || self.viewport.height == 0 {
            return Err(format!(
                "viewport must have positive dimensions (got {})",
                self.viewport
            ));
        }
        if !(self.device_scale_factor.is_finite() && self.device_scale_factor > 0.0) {
            return Err(format!(
                "device_scale_factor must be positive (got {})",
                self.device_scale_factor
            ));
        }
        if self.node_command.trim().is_empty() {
            return Err("node_command must not be empty".to_string());
        }
        let t = &self.timeouts;
        for (name, value) in [
            ("launch", t.launch),
            ("navigation", t.navigation),
            ("element_wait", t.element_wait),
            ("screenshot", t.screenshot),
        ] {
            if value.is_zero() {
                return Err(format!("timeouts.{name} must be greater than zero"));
            }
        }
        if !(self.pdf.dpi.is_finite() && self.pdf.dpi > 0.0) {
            return Err(format!("pdf.dpi must be positive (got {})", self.pdf.dpi));
        }
        if !(1..=100).contains(&self.pdf.jpeg_quality) {
            return Err(format!(
                "pdf.jpeg_quality must be within 1..=100 (got {})",
                self.pdf.jpeg_quality
            ));
        }
        if self.server.max_concurrent_sessions == 0 {
            return Err("server.max_concurrent_sessions must be at least 1".to_string());
        }
        Ok(())
    }
}
