use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Logical viewport of the browser context, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1686,
            height: 1205,
        }
    }
}

impl Viewport {
    /// Size in device pixels once the scale factor is applied.
    pub fn device_pixels(&self, scale: f64) -> (u32, u32) {
        (
            (self.width as f64 * scale).round() as u32,
            (self.height as f64 * scale).round() as u32,
        )
    }
}

#[derive(Debug, Error)]
pub enum ViewportParseError {
    #[error("Invalid viewport format: expected WIDTHxHEIGHT (e.g., 1686x1205)")]
    InvalidFormat,
    #[error("Invalid viewport width: {0}")]
    InvalidWidth(String),
    #[error("Invalid viewport height: {0}")]
    InvalidHeight(String),
    #[error("Viewport width must be positive")]
    ZeroWidth,
    #[error("Viewport height must be positive")]
    ZeroHeight,
}

impl FromStr for Viewport {
    type Err = ViewportParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or(ViewportParseError::InvalidFormat)?;
        if height.contains(['x', 'X']) {
            return Err(ViewportParseError::InvalidFormat);
        }

        let width: u32 = width
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidWidth(width.to_string()))?;
        let height: u32 = height
            .trim()
            .parse()
            .map_err(|_| ViewportParseError::InvalidHeight(height.to_string()))?;

        if width == 0 {
            return Err(ViewportParseError::ZeroWidth);
        }
        if height == 0 {
            return Err(ViewportParseError::ZeroHeight);
        }

        Ok(Viewport { width, height })
    }
}

impl std::fmt::Display for Viewport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}
