//! lienscan - property address extraction from scanned legal filings.
//!
//! Takes a captured page image of a lien, lis pendens or tax-lien filing and
//! produces a best-effort property address plus diagnostic artifacts.
//!
//! The pipeline runs, in order:
//! - [`document`] intake and minimum-size check
//! - [`preprocess`] contrast, grayscale, denoise, adaptive threshold, deskew
//! - [`ocr`] multi-pass OCR with attempt selection
//! - [`normalize`] OCR error correction and boilerplate canonicalization
//! - [`extract`] prioritized address extraction stages
//! - [`scrub`] person-name removal from the chosen candidate
//! - [`diagnostics`] text and image artifacts per document
//!
//! Browser automation and persistence are left to the caller; see
//! [`pipeline::Pipeline::extract`] for the entry point.

pub mod config;
pub mod diagnostics;
pub mod document;
pub mod error;
pub mod extract;
pub mod llm;
pub mod normalize;
pub mod ocr;
pub mod pipeline;
pub mod polish;
pub mod preprocess;
pub mod profile;
pub mod scrub;

pub use config::Config;
pub use document::{DocumentImage, MIN_IMAGE_SIDE};
pub use error::{LienscanError, Result};
pub use extract::{AddressCandidate, AddressExtractor, Extraction, PatternTrace, Stage};
pub use normalize::TextNormalizer;
pub use ocr::{OcrAttempt, OcrBackend, OcrEngine, OcrOutcome, TesseractBackend};
pub use pipeline::{
    CleanedAddress, ExtractionMethod, ExtractionResult, Pipeline, PipelineBuilder, RecordMetadata,
    TextExtraction,
};
pub use polish::{AddressPolisher, LlmPolisher, NoopPolisher};
pub use preprocess::{ImagePreprocessor, PreprocessedImage};
pub use profile::Profile;
pub use scrub::NameScrubber;
