//! OCR backend abstraction.
//!
//! The engine only talks to `dyn OcrBackend`, so the binary path and other
//! process-wide settings travel inside the backend value instead of globals,
//! and tests can swap in a scripted backend.

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from OCR backends.
#[derive(Debug, Error)]
pub enum OcrError {
    #[error("Backend not available: {0}")]
    BackendNotAvailable(String),

    #[error("OCR failed: {0}")]
    OcrFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    ImageError(String),
}

/// Page segmentation modes (Tesseract `--psm` values) used by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    /// Fully automatic page segmentation.
    Auto,
    /// A single column of text of variable sizes.
    SingleColumn,
    /// A single uniform block of vertically aligned text.
    VerticalBlock,
    /// A single uniform block of text.
    SingleBlock,
    /// As much text as possible in no particular order.
    SparseText,
}

impl SegmentationMode {
    pub fn psm(&self) -> u8 {
        match self {
            SegmentationMode::Auto => 3,
            SegmentationMode::SingleColumn => 4,
            SegmentationMode::VerticalBlock => 5,
            SegmentationMode::SingleBlock => 6,
            SegmentationMode::SparseText => 11,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentationMode::Auto => "auto",
            SegmentationMode::SingleColumn => "single_column",
            SegmentationMode::VerticalBlock => "vertical_block",
            SegmentationMode::SingleBlock => "single_block",
            SegmentationMode::SparseText => "sparse_text",
        }
    }
}

impl std::fmt::Display for SegmentationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (psm {})", self.as_str(), self.psm())
    }
}

/// Per-call recognition settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizeOptions {
    pub segmentation: SegmentationMode,
    /// Restrict recognized characters to this set.
    pub whitelist: Option<String>,
}

impl RecognizeOptions {
    pub fn new(segmentation: SegmentationMode) -> Self {
        Self {
            segmentation,
            whitelist: None,
        }
    }

    pub fn with_whitelist(mut self, whitelist: impl Into<String>) -> Self {
        self.whitelist = Some(whitelist.into());
        self
    }
}

/// Trait for OCR backends.
pub trait OcrBackend: Send + Sync {
    /// Short name used in logs and diagnostics.
    fn name(&self) -> &'static str;

    /// Check if this backend can run (binary installed, models present).
    fn is_available(&self) -> bool;

    /// Get a description of what's needed to make this backend available.
    fn availability_hint(&self) -> String;

    /// Recognize text in an image.
    fn recognize(
        &self,
        image: &DynamicImage,
        options: &RecognizeOptions,
    ) -> Result<String, OcrError>;
}
