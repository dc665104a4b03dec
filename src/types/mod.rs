//! Core data types shared by the capture and composite stages.
//!
//! - [`CaptureRequest`] - What to capture and in which order
//! - [`CapturedPage`] - A rasterized element backed by a temporary file
//! - [`CaptureOutcome`] / [`SkippedPage`] - Per-id result of the capture stage
//! - [`ConversionReport`] - Summary returned by a finished conversion

mod capture;
mod report;

pub use capture::{CaptureOutcome, CaptureRequest, CapturedPage, SkipReason, SkippedPage};
pub use report::ConversionReport;
pub use crate::viewport::Viewport;
