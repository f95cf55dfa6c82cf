//! Multi-pass OCR over image variants.
//!
//! Pass plan, in priority order:
//! 1. preprocessed page, single block, character whitelist
//! 2. original (non-preprocessed) capture
//! 3. segmentation sweep on the preprocessed page, stopping at the first
//!    non-empty attempt
//! 4. fixed relative bands (property / seller information), concatenated into
//!    one combined attempt
//!
//! Every attempt is kept for diagnostics; one is selected for extraction.

use std::sync::Arc;

use image::{imageops, DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::backend::{OcrBackend, RecognizeOptions, SegmentationMode};
use super::tesseract::TesseractConfig;

/// Alphanumerics plus the punctuation that shows up in addresses.
pub const DEFAULT_WHITELIST: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789.,-#/&'():;";

/// Which attempt feeds extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionRule {
    /// Run every pass and keep the non-empty attempt with the most characters.
    #[default]
    Longest,
    /// Stop at the first pass producing any text.
    FirstNonEmpty,
}

/// A horizontal band of the page, as fractions of its height.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionBand {
    pub label: String,
    pub top: f32,
    pub bottom: f32,
}

impl RegionBand {
    pub fn new(label: impl Into<String>, top: f32, bottom: f32) -> Self {
        Self {
            label: label.into(),
            top,
            bottom,
        }
    }

    /// Crop the band out of `image`. `None` when the band is empty.
    pub fn crop(&self, image: &GrayImage) -> Option<GrayImage> {
        let height = image.height() as f32;
        let top = (self.top.clamp(0.0, 1.0) * height).floor() as u32;
        let bottom = (self.bottom.clamp(0.0, 1.0) * height).ceil() as u32;
        if bottom <= top || image.width() == 0 {
            return None;
        }
        Some(imageops::crop_imm(image, 0, top, image.width(), bottom - top).to_image())
    }
}

/// OCR configuration (`[ocr]` section).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    #[serde(flatten)]
    pub tesseract: TesseractConfig,
    pub selection: SelectionRule,
    pub whitelist: String,
    pub sweep: Vec<SegmentationMode>,
    pub regions: Vec<RegionBand>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract: TesseractConfig::default(),
            selection: SelectionRule::default(),
            whitelist: DEFAULT_WHITELIST.to_string(),
            sweep: vec![
                SegmentationMode::Auto,
                SegmentationMode::SingleColumn,
                SegmentationMode::SparseText,
                SegmentationMode::VerticalBlock,
            ],
            regions: vec![
                RegionBand::new("property", 0.30, 0.70),
                RegionBand::new("seller", 0.0, 0.35),
            ],
        }
    }
}

/// One OCR pass and what it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OcrAttempt {
    pub config_label: String,
    pub raw_text: String,
    pub char_count: usize,
}

impl OcrAttempt {
    pub fn new(config_label: impl Into<String>, raw_text: impl Into<String>) -> Self {
        let raw_text = raw_text.into().trim().to_string();
        Self {
            config_label: config_label.into(),
            char_count: raw_text.chars().count(),
            raw_text,
        }
    }

    pub fn empty(config_label: impl Into<String>) -> Self {
        Self::new(config_label, String::new())
    }

    pub fn is_empty(&self) -> bool {
        self.char_count == 0
    }
}

/// Result of running the pass plan.
#[derive(Debug, Clone)]
pub enum OcrOutcome {
    Text {
        selected: OcrAttempt,
        attempts: Vec<OcrAttempt>,
    },
    /// Every attempt came back empty. Terminal for the document, not an error.
    NoText { attempts: Vec<OcrAttempt> },
}

impl OcrOutcome {
    pub fn selected(&self) -> Option<&OcrAttempt> {
        match self {
            OcrOutcome::Text { selected, .. } => Some(selected),
            OcrOutcome::NoText { .. } => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        self.selected().map(|a| a.raw_text.as_str())
    }

    pub fn attempts(&self) -> &[OcrAttempt] {
        match self {
            OcrOutcome::Text { attempts, .. } | OcrOutcome::NoText { attempts } => attempts,
        }
    }

    pub fn into_attempts(self) -> Vec<OcrAttempt> {
        match self {
            OcrOutcome::Text { attempts, .. } | OcrOutcome::NoText { attempts } => attempts,
        }
    }
}

/// Images the engine can choose from.
pub struct ImageVariants<'a> {
    pub original: &'a DynamicImage,
    pub preprocessed: &'a GrayImage,
}

/// Pick the attempt used for extraction.
///
/// With [`SelectionRule::Longest`], ties keep the earlier (higher priority)
/// attempt.
pub fn select_attempt(attempts: &[OcrAttempt], rule: SelectionRule) -> Option<&OcrAttempt> {
    let mut non_empty = attempts.iter().filter(|a| !a.is_empty());
    match rule {
        SelectionRule::FirstNonEmpty => non_empty.next(),
        SelectionRule::Longest => non_empty.fold(None, |best: Option<&OcrAttempt>, attempt| {
            match best {
                Some(current) if current.char_count >= attempt.char_count => Some(current),
                _ => Some(attempt),
            }
        }),
    }
}

pub struct OcrEngine {
    backend: Arc<dyn OcrBackend>,
    config: OcrConfig,
}

impl OcrEngine {
    pub fn new(backend: Arc<dyn OcrBackend>, config: OcrConfig) -> Self {
        Self { backend, config }
    }

    pub fn backend(&self) -> &dyn OcrBackend {
        self.backend.as_ref()
    }

    pub fn config(&self) -> &OcrConfig {
        &self.config
    }

    /// Run the pass plan and select an attempt.
    pub fn run(&self, variants: &ImageVariants<'_>) -> OcrOutcome {
        let preprocessed = DynamicImage::ImageLuma8(variants.preprocessed.clone());
        let mut attempts = Vec::new();

        let whitelist_options = RecognizeOptions::new(SegmentationMode::SingleBlock)
            .with_whitelist(self.config.whitelist.clone());
        attempts.push(self.attempt("whitelist_block", &preprocessed, &whitelist_options));
        if self.should_stop(&attempts) {
            return self.finish(attempts);
        }

        attempts.push(self.attempt(
            "original",
            variants.original,
            &RecognizeOptions::new(SegmentationMode::Auto),
        ));
        if self.should_stop(&attempts) {
            return self.finish(attempts);
        }

        for mode in &self.config.sweep {
            let label = format!("psm_{}", mode.as_str());
            let attempt = self.attempt(&label, &preprocessed, &RecognizeOptions::new(*mode));
            let found = !attempt.is_empty();
            attempts.push(attempt);
            if found {
                break;
            }
        }
        if self.should_stop(&attempts) {
            return self.finish(attempts);
        }

        if let Some(regions) = self.region_attempt(variants.preprocessed) {
            attempts.push(regions);
        }

        self.finish(attempts)
    }

    fn should_stop(&self, attempts: &[OcrAttempt]) -> bool {
        self.config.selection == SelectionRule::FirstNonEmpty
            && attempts.iter().any(|a| !a.is_empty())
    }

    /// OCR each configured band and concatenate whatever came back.
    fn region_attempt(&self, page: &GrayImage) -> Option<OcrAttempt> {
        if self.config.regions.is_empty() {
            return None;
        }

        let options = RecognizeOptions::new(SegmentationMode::SingleBlock);
        let mut labels = Vec::new();
        let mut texts = Vec::new();

        for band in &self.config.regions {
            let Some(crop) = band.crop(page) else {
                debug!("Region {} is empty, skipping", band.label);
                continue;
            };
            let attempt = self.attempt(
                &format!("region_{}", band.label),
                &DynamicImage::ImageLuma8(crop),
                &options,
            );
            if attempt.is_empty() {
                continue;
            }
            labels.push(band.label.as_str());
            texts.push(attempt.raw_text);
        }

        let label = if labels.is_empty() {
            "regions".to_string()
        } else {
            format!("regions:{}", labels.join("+"))
        };
        Some(OcrAttempt::new(label, texts.join("\n")))
    }

    fn attempt(&self, label: &str, image: &DynamicImage, options: &RecognizeOptions) -> OcrAttempt {
        match self.backend.recognize(image, options) {
            Ok(text) => {
                let attempt = OcrAttempt::new(label, text);
                debug!("OCR attempt {}: {} chars", label, attempt.char_count);
                attempt
            }
            Err(e) => {
                warn!("OCR attempt {} failed on {}: {}", label, self.backend.name(), e);
                OcrAttempt::empty(label)
            }
        }
    }

    fn finish(&self, attempts: Vec<OcrAttempt>) -> OcrOutcome {
        match select_attempt(&attempts, self.config.selection).cloned() {
            Some(selected) => {
                info!(
                    "Selected OCR attempt {} ({} chars) out of {}",
                    selected.config_label,
                    selected.char_count,
                    attempts.len()
                );
                OcrOutcome::Text { selected, attempts }
            }
            None => {
                info!("All {} OCR attempts came back empty", attempts.len());
                OcrOutcome::NoText { attempts }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::OcrError;
    use image::Luma;
    use std::sync::Mutex;

    /// Returns scripted responses in call order, then empty strings.
    struct ScriptedBackend {
        responses: Mutex<Vec<Result<String, OcrError>>>,
        calls: Mutex<Vec<RecognizeOptions>>,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<Result<String, OcrError>>) -> Self {
            let mut responses = responses;
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn texts(texts: &[&str]) -> Self {
            Self::new(texts.iter().map(|t| Ok(t.to_string())).collect())
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl OcrBackend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn is_available(&self) -> bool {
            true
        }

        fn availability_hint(&self) -> String {
            String::new()
        }

        fn recognize(
            &self,
            _image: &DynamicImage,
            options: &RecognizeOptions,
        ) -> Result<String, OcrError> {
            self.calls.lock().unwrap().push(options.clone());
            self.responses
                .lock()
                .unwrap()
                .pop()
                .unwrap_or_else(|| Ok(String::new()))
        }
    }

    fn run_with(backend: Arc<ScriptedBackend>, config: OcrConfig) -> OcrOutcome {
        let original = DynamicImage::ImageLuma8(GrayImage::from_pixel(120, 120, Luma([255])));
        let preprocessed = GrayImage::from_pixel(120, 120, Luma([255]));
        let engine = OcrEngine::new(backend, config);
        engine.run(&ImageVariants {
            original: &original,
            preprocessed: &preprocessed,
        })
    }

    #[test]
    fn test_select_non_empty_regardless_of_order() {
        let empty = OcrAttempt::new("a", "");
        let full = OcrAttempt::new("b", "123 MAIN ST MANCHESTER NH 03101");

        for rule in [SelectionRule::Longest, SelectionRule::FirstNonEmpty] {
            let forward = vec![empty.clone(), full.clone()];
            let backward = vec![full.clone(), empty.clone()];
            assert_eq!(select_attempt(&forward, rule), Some(&full));
            assert_eq!(select_attempt(&backward, rule), Some(&full));
        }
    }

    #[test]
    fn test_select_longest_keeps_earliest_on_tie() {
        let attempts = vec![
            OcrAttempt::new("first", "abcd"),
            OcrAttempt::new("second", "wxyz"),
            OcrAttempt::new("third", "ab"),
        ];
        let selected = select_attempt(&attempts, SelectionRule::Longest).unwrap();
        assert_eq!(selected.config_label, "first");
    }

    #[test]
    fn test_select_nothing_when_all_empty() {
        let attempts = vec![OcrAttempt::new("a", "  \n "), OcrAttempt::empty("b")];
        assert!(select_attempt(&attempts, SelectionRule::Longest).is_none());
    }

    #[test]
    fn test_longest_runs_full_plan() {
        // whitelist, original, sweep (stops at first non-empty), two regions
        let backend = Arc::new(ScriptedBackend::texts(&[
            "short",
            "",
            "",
            "a considerably longer page of text",
            "band one",
            "band two",
        ]));
        let outcome = run_with(backend.clone(), OcrConfig::default());

        assert_eq!(backend.call_count(), 6);
        let labels: Vec<&str> = outcome
            .attempts()
            .iter()
            .map(|a| a.config_label.as_str())
            .collect();
        assert_eq!(
            labels,
            vec![
                "whitelist_block",
                "original",
                "psm_auto",
                "psm_single_column",
                "regions:property+seller"
            ]
        );
        assert_eq!(outcome.text(), Some("a considerably longer page of text"));
        assert_eq!(
            outcome.attempts().last().unwrap().raw_text,
            "band one\nband two"
        );
    }

    #[test]
    fn test_first_non_empty_stops_early() {
        let backend = Arc::new(ScriptedBackend::texts(&["", "original text"]));
        let config = OcrConfig {
            selection: SelectionRule::FirstNonEmpty,
            ..OcrConfig::default()
        };
        let outcome = run_with(backend.clone(), config);

        assert_eq!(backend.call_count(), 2);
        assert_eq!(outcome.text(), Some("original text"));
    }

    #[test]
    fn test_backend_errors_count_as_empty() {
        let backend = Arc::new(ScriptedBackend::new(vec![
            Err(OcrError::OcrFailed("boom".to_string())),
            Ok("recovered text".to_string()),
        ]));
        let outcome = run_with(backend, OcrConfig::default());
        assert_eq!(outcome.text(), Some("recovered text"));
        assert!(outcome.attempts()[0].is_empty());
    }

    #[test]
    fn test_all_empty_is_no_text() {
        let backend = Arc::new(ScriptedBackend::texts(&[]));
        let outcome = run_with(backend.clone(), OcrConfig::default());
        assert!(matches!(outcome, OcrOutcome::NoText { .. }));
        // whitelist + original + 4 sweep modes + 2 regions
        assert_eq!(backend.call_count(), 8);
    }

    #[test]
    fn test_whitelist_only_on_first_pass() {
        let backend = Arc::new(ScriptedBackend::texts(&[]));
        run_with(backend.clone(), OcrConfig::default());
        let calls = backend.calls.lock().unwrap();
        assert_eq!(calls[0].whitelist.as_deref(), Some(DEFAULT_WHITELIST));
        assert_eq!(calls[0].segmentation, SegmentationMode::SingleBlock);
        assert!(calls[1..].iter().all(|c| c.whitelist.is_none()));
    }

    #[test]
    fn test_region_crop_bounds() {
        let page = GrayImage::from_pixel(50, 200, Luma([255]));
        let band = RegionBand::new("property", 0.30, 0.70);
        let crop = band.crop(&page).unwrap();
        assert_eq!(crop.dimensions(), (50, 80));

        assert!(RegionBand::new("empty", 0.5, 0.5).crop(&page).is_none());
    }
}
