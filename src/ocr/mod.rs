//! OCR over document images.
//!
//! - [`OcrBackend`]: the recognition capability (Tesseract by default)
//! - [`OcrEngine`]: runs the multi-pass plan over image variants and selects
//!   the attempt that feeds extraction

mod backend;
mod engine;
mod tesseract;

pub use backend::{OcrBackend, OcrError, RecognizeOptions, SegmentationMode};
pub use engine::{
    select_attempt, ImageVariants, OcrAttempt, OcrConfig, OcrEngine, OcrOutcome, RegionBand,
    SelectionRule, DEFAULT_WHITELIST,
};
pub use tesseract::{TesseractBackend, TesseractConfig};
