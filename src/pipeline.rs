//! End-to-end extraction for one document.
//!
//! `Pipeline::extract` runs intake, preprocessing, OCR, normalization,
//! address extraction and name scrubbing, then writes diagnostics. Apart
//! from unreadable configuration, every outcome (including "no address") is
//! an [`ExtractionResult`], never an error.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::diagnostics::{DiagnosticArtifacts, DiagnosticReport, DiagnosticsWriter};
use crate::document::{DocumentImage, MIN_IMAGE_SIDE};
use crate::error::Result;
use crate::extract::{AddressExtractor, Extraction, PatternTrace, Stage};
use crate::normalize::TextNormalizer;
use crate::ocr::{ImageVariants, OcrBackend, OcrConfig, OcrEngine, OcrOutcome, TesseractBackend};
use crate::polish::{AddressPolisher, LlmPolisher, NoopPolisher};
use crate::preprocess::{ImagePreprocessor, PreprocessConfig, PreprocessedImage};
use crate::profile::Profile;
use crate::scrub::NameScrubber;

/// Caller-supplied key/value pairs (case number, party names), kept in the
/// order given.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordMetadata {
    entries: Vec<(String, String)>,
}

impl RecordMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    /// Parse a `key=value` pair as given on the command line.
    pub fn parse_pair(pair: &str) -> Option<(String, String)> {
        let (key, value) = pair.split_once('=')?;
        let key = key.trim();
        if key.is_empty() {
            return None;
        }
        Some((key.to_string(), value.trim().to_string()))
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RecordMetadata {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// The final address after name scrubbing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanedAddress {
    pub text: String,
    pub had_person_name_removed: bool,
}

/// How a document's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    /// The input could not be decoded as an image.
    Unreadable,
    TooSmall,
    NoText,
    None,
    BoundaryPhrase,
    StreetPattern,
    Proximity,
    AddressParser,
    Llm,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::Unreadable => "unreadable",
            ExtractionMethod::TooSmall => "too_small",
            ExtractionMethod::NoText => "no_text",
            ExtractionMethod::None => "none",
            ExtractionMethod::BoundaryPhrase => "boundary_phrase",
            ExtractionMethod::StreetPattern => "street_pattern",
            ExtractionMethod::Proximity => "proximity",
            ExtractionMethod::AddressParser => "address_parser",
            ExtractionMethod::Llm => "llm",
        }
    }
}

impl From<Stage> for ExtractionMethod {
    fn from(stage: Stage) -> Self {
        match stage {
            Stage::BoundaryPhrase => ExtractionMethod::BoundaryPhrase,
            Stage::StreetPattern => ExtractionMethod::StreetPattern,
            Stage::Proximity => ExtractionMethod::Proximity,
            Stage::AddressParser => ExtractionMethod::AddressParser,
            Stage::Llm => ExtractionMethod::Llm,
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one pipeline invocation.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub document_identifier: String,
    pub address: Option<CleanedAddress>,
    pub method_used: ExtractionMethod,
    pub ocr_text_artifact_path: Option<PathBuf>,
    pub screenshot_artifact_path: Option<PathBuf>,
    pub preprocessed_artifact_path: Option<PathBuf>,
    /// Selected OCR text, before normalization.
    pub ocr_text: Option<String>,
    pub trace: PatternTrace,
}

impl ExtractionResult {
    fn empty(document_identifier: &str, method_used: ExtractionMethod) -> Self {
        Self {
            document_identifier: document_identifier.to_string(),
            address: None,
            method_used,
            ocr_text_artifact_path: None,
            screenshot_artifact_path: None,
            preprocessed_artifact_path: None,
            ocr_text: None,
            trace: PatternTrace::new(),
        }
    }

    pub fn address_text(&self) -> Option<&str> {
        self.address.as_ref().map(|a| a.text.as_str())
    }

    pub fn is_found(&self) -> bool {
        self.address.is_some()
    }

    fn attach(&mut self, artifacts: DiagnosticArtifacts) {
        self.ocr_text_artifact_path = artifacts.text_path;
        self.screenshot_artifact_path = artifacts.original_image_path;
        self.preprocessed_artifact_path = artifacts.preprocessed_image_path;
    }
}

#[derive(Serialize)]
struct ResultView<'a> {
    document_identifier: &'a str,
    address: Option<&'a str>,
    diagnostics_path: Option<&'a Path>,
    screenshot_path: Option<&'a Path>,
    method_used: ExtractionMethod,
    had_person_name_removed: bool,
}

impl Serialize for ExtractionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        ResultView {
            document_identifier: &self.document_identifier,
            address: self.address_text(),
            diagnostics_path: self.ocr_text_artifact_path.as_deref(),
            screenshot_path: self.screenshot_artifact_path.as_deref(),
            method_used: self.method_used,
            had_person_name_removed: self
                .address
                .as_ref()
                .is_some_and(|a| a.had_person_name_removed),
        }
        .serialize(serializer)
    }
}

/// Result of running the text stages alone.
#[derive(Debug, Clone)]
pub struct TextExtraction {
    pub normalized_text: String,
    pub address: Option<CleanedAddress>,
    pub method_used: ExtractionMethod,
    pub trace: PatternTrace,
}

/// Assembles a [`Pipeline`] from injectable parts.
pub struct PipelineBuilder {
    backend: Option<Arc<dyn OcrBackend>>,
    polisher: Option<Arc<dyn AddressPolisher>>,
    profile: Option<Profile>,
    preprocess: PreprocessConfig,
    ocr: OcrConfig,
    diagnostics: Option<DiagnosticsWriter>,
    min_side: u32,
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            backend: None,
            polisher: None,
            profile: None,
            preprocess: PreprocessConfig::default(),
            ocr: OcrConfig::default(),
            diagnostics: None,
            min_side: MIN_IMAGE_SIDE,
        }
    }
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: Arc<dyn OcrBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn polisher(mut self, polisher: Arc<dyn AddressPolisher>) -> Self {
        self.polisher = Some(polisher);
        self
    }

    pub fn profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn preprocess(mut self, config: PreprocessConfig) -> Self {
        self.preprocess = config;
        self
    }

    pub fn ocr(mut self, config: OcrConfig) -> Self {
        self.ocr = config;
        self
    }

    pub fn diagnostics(mut self, writer: DiagnosticsWriter) -> Self {
        self.diagnostics = Some(writer);
        self
    }

    pub fn min_side(mut self, min_side: u32) -> Self {
        self.min_side = min_side;
        self
    }

    /// Compile the profile and wire everything together.
    pub fn build(self) -> Result<Pipeline> {
        let profile = self.profile.unwrap_or_default().compile()?;
        let backend = self.backend.unwrap_or_else(|| {
            Arc::new(TesseractBackend::with_config(self.ocr.tesseract.clone()))
        });
        let polisher = self.polisher.unwrap_or_else(|| Arc::new(NoopPolisher));

        debug!(
            "Building pipeline: backend={}, polisher={}, profile={}",
            backend.name(),
            polisher.name(),
            profile.profile().name
        );

        Ok(Pipeline {
            min_side: self.min_side,
            preprocessor: ImagePreprocessor::new(self.preprocess),
            ocr: OcrEngine::new(backend, self.ocr),
            normalizer: TextNormalizer::new(profile.corrections()),
            scrubber: NameScrubber::new(profile.clone()),
            extractor: AddressExtractor::new(profile, polisher),
            diagnostics: self.diagnostics,
        })
    }
}

/// OCR result for one capture, kept until the best capture is chosen.
struct Recognized<'a> {
    image: &'a DocumentImage,
    preprocessed: PreprocessedImage,
    outcome: OcrOutcome,
}

impl Recognized<'_> {
    fn text_len(&self) -> usize {
        self.outcome.selected().map_or(0, |a| a.char_count)
    }
}

/// Stateless between invocations; safe to share across worker threads.
pub struct Pipeline {
    min_side: u32,
    preprocessor: ImagePreprocessor,
    ocr: OcrEngine,
    normalizer: TextNormalizer,
    extractor: AddressExtractor,
    scrubber: NameScrubber,
    diagnostics: Option<DiagnosticsWriter>,
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Build from loaded configuration, with the Tesseract backend and, if
    /// enabled, the LLM polisher.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut builder = PipelineBuilder::new()
            .preprocess(config.preprocess.clone())
            .ocr(config.ocr.clone())
            .profile(config.load_profile()?)
            .min_side(config.min_image_side);

        if let Some(dir) = config.debug_dir() {
            builder = builder.diagnostics(
                DiagnosticsWriter::new(dir).with_save_images(config.diagnostics.save_images),
            );
        }
        if config.llm.enabled {
            builder = builder.polisher(Arc::new(LlmPolisher::from_config(config.llm.clone())?));
        }
        builder.build()
    }

    pub fn ocr_engine(&self) -> &OcrEngine {
        &self.ocr
    }

    pub fn normalizer(&self) -> &TextNormalizer {
        &self.normalizer
    }

    pub fn extractor(&self) -> &AddressExtractor {
        &self.extractor
    }

    pub fn scrubber(&self) -> &NameScrubber {
        &self.scrubber
    }

    pub fn diagnostics(&self) -> Option<&DiagnosticsWriter> {
        self.diagnostics.as_ref()
    }

    /// Decode `bytes` and extract. Undecodable input ends as
    /// [`ExtractionMethod::Unreadable`] with no address.
    pub fn extract_bytes(
        &self,
        bytes: &[u8],
        source_identifier: &str,
        document_identifier: &str,
        metadata: &RecordMetadata,
    ) -> ExtractionResult {
        match DocumentImage::from_bytes(bytes, source_identifier) {
            Ok(image) => self.extract_with_metadata(&image, document_identifier, metadata),
            Err(e) => self.unreadable(source_identifier, document_identifier, &e),
        }
    }

    /// Read and decode an image file, then extract.
    pub fn extract_path(
        &self,
        path: &Path,
        document_identifier: &str,
        metadata: &RecordMetadata,
    ) -> ExtractionResult {
        match DocumentImage::open(path) {
            Ok(image) => self.extract_with_metadata(&image, document_identifier, metadata),
            Err(e) => self.unreadable(&path.display().to_string(), document_identifier, &e),
        }
    }

    fn unreadable(
        &self,
        source: &str,
        document_identifier: &str,
        error: &image::ImageError,
    ) -> ExtractionResult {
        warn!("{}: input {} rejected: {}", document_identifier, source, error);
        ExtractionResult::empty(document_identifier, ExtractionMethod::Unreadable)
    }

    pub fn extract(&self, image: &DocumentImage, document_identifier: &str) -> ExtractionResult {
        self.extract_with_metadata(image, document_identifier, &RecordMetadata::default())
    }

    pub fn extract_with_metadata(
        &self,
        image: &DocumentImage,
        document_identifier: &str,
        metadata: &RecordMetadata,
    ) -> ExtractionResult {
        if !image.accepts(self.min_side) {
            info!(
                "{}: image {} is {}x{}, below the {}px minimum",
                document_identifier,
                image.source_identifier(),
                image.width(),
                image.height(),
                self.min_side
            );
            return ExtractionResult::empty(document_identifier, ExtractionMethod::TooSmall);
        }

        let recognized = self.recognize(image);
        self.finish(recognized, document_identifier, metadata)
    }

    /// Run OCR over several captures of the same document and continue with
    /// the one that yielded the most text.
    pub fn extract_best(
        &self,
        images: &[DocumentImage],
        document_identifier: &str,
        metadata: &RecordMetadata,
    ) -> ExtractionResult {
        let mut best: Option<Recognized<'_>> = None;
        for image in images {
            if !image.accepts(self.min_side) {
                debug!(
                    "{}: skipping {} ({}x{})",
                    document_identifier,
                    image.source_identifier(),
                    image.width(),
                    image.height()
                );
                continue;
            }
            let candidate = self.recognize(image);
            let better = best
                .as_ref()
                .map_or(true, |b| candidate.text_len() > b.text_len());
            if better {
                best = Some(candidate);
            }
        }

        match best {
            Some(recognized) => {
                debug!(
                    "{}: using capture {} ({} chars)",
                    document_identifier,
                    recognized.image.source_identifier(),
                    recognized.text_len()
                );
                self.finish(recognized, document_identifier, metadata)
            }
            None => {
                warn!(
                    "{}: none of {} captures meets the {}px minimum",
                    document_identifier,
                    images.len(),
                    self.min_side
                );
                ExtractionResult::empty(document_identifier, ExtractionMethod::TooSmall)
            }
        }
    }

    /// Normalize, extract and scrub already recognized text.
    ///
    /// LLM answers are kept as the model returned them.
    pub fn extract_text(&self, raw_text: &str) -> TextExtraction {
        let normalized_text = self.normalizer.normalize(raw_text);
        let (extraction, trace) = self.extractor.extract(&normalized_text);

        let (address, method_used) = match extraction {
            Extraction::Found {
                address,
                stage: Stage::Llm,
            } => (
                Some(CleanedAddress {
                    text: address,
                    had_person_name_removed: false,
                }),
                ExtractionMethod::Llm,
            ),
            Extraction::Found { address, stage } => {
                let scrubbed = self.scrubber.scrub(&address);
                let cleaned = CleanedAddress {
                    had_person_name_removed: scrubbed != address,
                    text: scrubbed,
                };
                (Some(cleaned), stage.into())
            }
            Extraction::NotFound => (None, ExtractionMethod::None),
        };

        TextExtraction {
            normalized_text,
            address,
            method_used,
            trace,
        }
    }

    fn recognize<'a>(&self, image: &'a DocumentImage) -> Recognized<'a> {
        let preprocessed = self.preprocessor.preprocess(image);
        let outcome = self.ocr.run(&ImageVariants {
            original: image.image(),
            preprocessed: &preprocessed.grayscale,
        });
        Recognized {
            image,
            preprocessed,
            outcome,
        }
    }

    fn finish(
        &self,
        recognized: Recognized<'_>,
        document_identifier: &str,
        metadata: &RecordMetadata,
    ) -> ExtractionResult {
        let Recognized {
            image,
            preprocessed,
            outcome,
        } = recognized;

        let mut result = ExtractionResult::empty(document_identifier, ExtractionMethod::NoText);
        let mut normalized = None;

        if let Some(text) = outcome.text() {
            let found = self.extract_text(text);
            result.address = found.address;
            result.method_used = found.method_used;
            result.trace = found.trace;
            result.ocr_text = Some(text.to_string());
            normalized = Some(found.normalized_text);
        }

        match result.address_text() {
            Some(address) => info!(
                "{}: {} ({})",
                document_identifier, address, result.method_used
            ),
            None => info!(
                "{}: no address ({})",
                document_identifier, result.method_used
            ),
        }

        if let Some(writer) = &self.diagnostics {
            let report = DiagnosticReport {
                document_identifier,
                image_name: image.source_identifier(),
                width: image.width(),
                height: image.height(),
                skew_angle_degrees: Some(preprocessed.skew_angle_degrees),
                method_used: result.method_used.as_str(),
                metadata: metadata.entries(),
                attempts: outcome.attempts(),
                selected_attempt: outcome.selected().map(|a| a.config_label.as_str()),
                ocr_text: outcome.text(),
                normalized_text: normalized.as_deref(),
                address: result.address_text(),
                trace: Some(&result.trace),
                original: Some(image.image()),
                preprocessed: Some(&preprocessed.grayscale),
            };
            let artifacts = writer.record(&report);
            result.attach(artifacts);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_keeps_order() {
        let metadata = RecordMetadata::new()
            .with("case_number", "218-2023-CV-0042")
            .with("grantor", "Dennis Hogan");
        assert_eq!(metadata.entries()[0].0, "case_number");
        assert_eq!(metadata.get("grantor"), Some("Dennis Hogan"));
        assert_eq!(metadata.get("missing"), None);
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(
            RecordMetadata::parse_pair("case= 2023-CV-1 "),
            Some(("case".to_string(), "2023-CV-1".to_string()))
        );
        assert_eq!(
            RecordMetadata::parse_pair("note=a=b"),
            Some(("note".to_string(), "a=b".to_string()))
        );
        assert_eq!(RecordMetadata::parse_pair("novalue"), None);
        assert_eq!(RecordMetadata::parse_pair("=x"), None);
    }

    #[test]
    fn test_method_from_stage() {
        assert_eq!(
            ExtractionMethod::from(Stage::BoundaryPhrase),
            ExtractionMethod::BoundaryPhrase
        );
        assert_eq!(ExtractionMethod::from(Stage::Llm).as_str(), "llm");
    }

    #[test]
    fn test_result_json_shape() {
        let mut result = ExtractionResult::empty("doc-1", ExtractionMethod::StreetPattern);
        result.address = Some(CleanedAddress {
            text: "42 ELM ST NASHUA NH 03060".to_string(),
            had_person_name_removed: true,
        });
        result.ocr_text_artifact_path = Some(PathBuf::from("/tmp/doc-1.txt"));

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["document_identifier"], "doc-1");
        assert_eq!(json["address"], "42 ELM ST NASHUA NH 03060");
        assert_eq!(json["diagnostics_path"], "/tmp/doc-1.txt");
        assert_eq!(json["screenshot_path"], serde_json::Value::Null);
        assert_eq!(json["method_used"], "street_pattern");
        assert_eq!(json["had_person_name_removed"], true);
    }

    #[test]
    fn test_unreadable_method_name() {
        let result = ExtractionResult::empty("doc-3", ExtractionMethod::Unreadable);
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["address"].is_null());
        assert_eq!(json["method_used"], "unreadable");
    }

    #[test]
    fn test_not_found_serializes_null_address() {
        let result = ExtractionResult::empty("doc-2", ExtractionMethod::None);
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["address"].is_null());
        assert_eq!(json["had_person_name_removed"], false);
        assert_eq!(json["method_used"], "none");
    }
}
