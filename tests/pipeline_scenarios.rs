//! End-to-end pipeline scenarios with a scripted OCR backend.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{DynamicImage, GrayImage, Luma};
use tempfile::TempDir;

use lienscan::diagnostics::DiagnosticsWriter;
use lienscan::ocr::{OcrError, RecognizeOptions};
use lienscan::polish::PolishError;
use lienscan::{
    AddressPolisher, DocumentImage, ExtractionMethod, ImagePreprocessor, OcrBackend, Pipeline,
    RecordMetadata, TextNormalizer,
};

/// Returns `text` for images of width `only_width` (any width when `None`)
/// and counts every call.
struct MockBackend {
    text: String,
    only_width: Option<u32>,
    empty_with_whitelist: bool,
    calls: AtomicUsize,
}

impl MockBackend {
    fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            only_width: None,
            empty_with_whitelist: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl OcrBackend for MockBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn is_available(&self) -> bool {
        true
    }

    fn availability_hint(&self) -> String {
        String::new()
    }

    fn recognize(
        &self,
        image: &DynamicImage,
        options: &RecognizeOptions,
    ) -> Result<String, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.empty_with_whitelist && options.whitelist.is_some() {
            return Ok(String::new());
        }
        match self.only_width {
            Some(width) if image.width() != width => Ok(String::new()),
            _ => Ok(self.text.clone()),
        }
    }
}

struct OfflinePolisher;

impl AddressPolisher for OfflinePolisher {
    fn name(&self) -> &'static str {
        "offline"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn polish(&self, _candidate: &str) -> Result<String, PolishError> {
        Err(PolishError::Unavailable("connection refused".to_string()))
    }
}

/// Answers every request with a fixed line.
struct FixedAnswerPolisher(&'static str);

impl AddressPolisher for FixedAnswerPolisher {
    fn name(&self) -> &'static str {
        "fixed"
    }

    fn is_enabled(&self) -> bool {
        true
    }

    fn polish(&self, _candidate: &str) -> Result<String, PolishError> {
        Ok(self.0.to_string())
    }
}

fn page(width: u32, height: u32, name: &str) -> DocumentImage {
    DocumentImage::from_dynamic(
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([255]))),
        name,
    )
}

fn pipeline(backend: Arc<MockBackend>) -> Pipeline {
    Pipeline::builder().backend(backend).build().unwrap()
}

fn pipeline_with_diagnostics(backend: Arc<MockBackend>, dir: &TempDir) -> Pipeline {
    Pipeline::builder()
        .backend(backend)
        .diagnostics(DiagnosticsWriter::new(dir.path()).with_save_images(false))
        .build()
        .unwrap()
}

#[test]
fn test_small_image_rejected_without_ocr() {
    let backend = MockBackend::new("42 ELM ST NASHUA NH 03060");
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline_with_diagnostics(backend.clone(), &dir);

    for (width, height) in [(50, 50), (99, 400), (400, 99)] {
        let result = pipeline.extract(&page(width, height, "tiny.png"), "doc-small");
        assert_eq!(result.method_used, ExtractionMethod::TooSmall);
        assert!(result.address.is_none());
        assert!(result.ocr_text_artifact_path.is_none());
    }
    assert_eq!(backend.calls(), 0);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[test]
fn test_undecodable_bytes_rejected_without_ocr() {
    let backend = MockBackend::new("42 ELM ST NASHUA NH 03060");
    let dir = TempDir::new().unwrap();
    let pipeline = pipeline_with_diagnostics(backend.clone(), &dir);

    let result = pipeline.extract_bytes(
        b"\x89PNG garbage that is not an image",
        "capture.png",
        "2023-CV-0042",
        &RecordMetadata::default(),
    );
    assert_eq!(result.method_used, ExtractionMethod::Unreadable);
    assert!(result.address.is_none());
    assert_eq!(backend.calls(), 0);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);

    let json = serde_json::to_value(&result).unwrap();
    assert!(json["address"].is_null());
    assert_eq!(json["method_used"], "unreadable");
}

#[test]
fn test_ladyslipper_end_to_end() {
    let backend = MockBackend::new(
        "...being know and numbered as 14 LADYSLIPPER AVE PELHAM NH 03076-2959 and described as followed...",
    );
    let result = pipeline(backend).extract(&page(120, 120, "page1.png"), "2023-LP-7");
    assert_eq!(
        result.address_text(),
        Some("14 LADYSLIPPER AVE PELHAM NH 03076-2959")
    );
    assert_eq!(result.method_used, ExtractionMethod::BoundaryPhrase);
}

#[test]
fn test_street_line_end_to_end() {
    let backend = MockBackend::new(
        "NOTICE OF TAX LIEN\nAmount due: $1,204.00\n42 ELM ST NASHUA NH 03060\nFiled in the registry",
    );
    let result = pipeline(backend).extract(&page(120, 120, "page1.png"), "lien-42");
    assert_eq!(result.address_text(), Some("42 ELM ST NASHUA NH 03060"));
    assert!(matches!(
        result.method_used,
        ExtractionMethod::StreetPattern | ExtractionMethod::Proximity
    ));
}

#[test]
fn test_non_empty_attempt_selected_when_first_pass_empty() {
    let backend = Arc::new(MockBackend {
        text: "commonly known as 9 SEAWALL RD RYE NH 03870".to_string(),
        only_width: None,
        empty_with_whitelist: true,
        calls: AtomicUsize::new(0),
    });
    let result = pipeline(backend).extract(&page(120, 120, "page1.png"), "doc");
    assert_eq!(result.address_text(), Some("9 SEAWALL RD RYE NH 03870"));
}

#[test]
fn test_boundary_phrase_outranks_street_pattern() {
    let backend = MockBackend::new(
        "Lienholder: 42 ELM ST NASHUA NH 03060\n\
         The premises commonly known as 14 LADYSLIPPER AVE PELHAM NH 03076",
    );
    let result = pipeline(backend).extract(&page(120, 120, "p.png"), "doc");
    assert_eq!(
        result.address_text(),
        Some("14 LADYSLIPPER AVE PELHAM NH 03076")
    );
    assert_eq!(result.method_used, ExtractionMethod::BoundaryPhrase);
}

#[test]
fn test_longest_boundary_candidate_wins() {
    let backend = MockBackend::new(
        "known and numbered as 14 LADYSLIPPER AVE and described as follows: a certain lot. \
         Being the same premises commonly known as 14 LADYSLIPPER AVE PELHAM NH 03076",
    );
    let result = pipeline(backend).extract(&page(120, 120, "p.png"), "doc");
    assert_eq!(
        result.address_text(),
        Some("14 LADYSLIPPER AVE PELHAM NH 03076")
    );
}

#[test]
fn test_person_name_scrubbed() {
    let backend = MockBackend::new(
        "Property address: 123 Main St Dennis Hogan Manchester NH 03101",
    );
    let result = pipeline(backend).extract(&page(120, 120, "p.png"), "doc");
    let address = result.address.unwrap();
    assert!(address.text.contains("123 Main St"));
    assert!(address.text.contains("03101"));
    assert!(!address.text.contains("Dennis Hogan"));
    assert!(address.had_person_name_removed);
}

#[test]
fn test_no_address_writes_ocr_text_to_diagnostics() {
    let dir = TempDir::new().unwrap();
    let text = "ORDER OF NOTICE\nThe hearing is continued to a later date.";
    let pipeline = pipeline_with_diagnostics(MockBackend::new(text), &dir);
    let metadata = RecordMetadata::new().with("case_number", "218-2023-CV-0042");

    let result = pipeline.extract_with_metadata(&page(120, 120, "p.png"), "218-2023-CV-0042", &metadata);
    assert!(result.address.is_none());
    assert_eq!(result.method_used, ExtractionMethod::None);

    let path = result.ocr_text_artifact_path.clone().unwrap();
    assert!(path.starts_with(dir.path()));
    let content = fs::read_to_string(path).unwrap();
    assert!(content.contains("The hearing is continued to a later date."));
    assert!(content.contains("case_number: 218-2023-CV-0042"));
    assert!(content.contains("--- PATTERN TRACE ---"));

    let json = serde_json::to_value(&result).unwrap();
    assert!(json["address"].is_null());
    assert_eq!(json["method_used"], "none");
}

#[test]
fn test_empty_ocr_marks_no_text() {
    let dir = TempDir::new().unwrap();
    let backend = MockBackend::new("   ");
    let pipeline = pipeline_with_diagnostics(backend.clone(), &dir);

    let result = pipeline.extract(&page(120, 120, "blank.png"), "blank");
    assert_eq!(result.method_used, ExtractionMethod::NoText);
    assert!(result.address.is_none());
    assert!(backend.calls() > 0);

    let content = fs::read_to_string(result.ocr_text_artifact_path.unwrap()).unwrap();
    assert!(content.contains("[NO TEXT]"));
}

#[test]
fn test_extract_best_uses_capture_with_text() {
    let backend = Arc::new(MockBackend {
        text: "commonly known as 14 LADYSLIPPER AVE PELHAM NH 03076".to_string(),
        only_width: Some(200),
        empty_with_whitelist: false,
        calls: AtomicUsize::new(0),
    });
    let captures = vec![
        page(60, 60, "thumb.png"),
        page(120, 120, "cropped.png"),
        page(200, 150, "full.png"),
    ];
    let result = pipeline(backend).extract_best(&captures, "doc", &RecordMetadata::default());
    assert_eq!(
        result.address_text(),
        Some("14 LADYSLIPPER AVE PELHAM NH 03076")
    );

    let none_big_enough = vec![page(60, 60, "thumb.png")];
    let result = pipeline(MockBackend::new("x")).extract_best(
        &none_big_enough,
        "doc",
        &RecordMetadata::default(),
    );
    assert_eq!(result.method_used, ExtractionMethod::TooSmall);
}

#[test]
fn test_unavailable_polisher_keeps_parser_candidate() {
    let backend = MockBackend::new("Lot 4 Block 2 of the plat at 77 Harbor View Dr as recorded");
    let pipeline = Pipeline::builder()
        .backend(backend)
        .polisher(Arc::new(OfflinePolisher))
        .build()
        .unwrap();

    let result = pipeline.extract(&page(120, 120, "p.png"), "doc");
    assert_eq!(result.address_text(), Some("77 Harbor View Dr"));
    assert_eq!(result.method_used, ExtractionMethod::AddressParser);
}

#[test]
fn test_llm_answer_kept_verbatim() {
    let backend = MockBackend::new("Lot 4 Block 2 of the plat at 77 Harbor View Dr as recorded");
    let pipeline = Pipeline::builder()
        .backend(backend)
        .polisher(Arc::new(FixedAnswerPolisher(
            "  Dennis Hogan,  77 Harbor View Dr, Rye, NH 03870\n",
        )))
        .build()
        .unwrap();

    let result = pipeline.extract(&page(120, 120, "p.png"), "doc");
    assert_eq!(result.method_used, ExtractionMethod::Llm);
    assert_eq!(
        result.address_text(),
        Some("Dennis Hogan,  77 Harbor View Dr, Rye, NH 03870")
    );
    assert!(!result.address.unwrap().had_person_name_removed);
}

#[test]
fn test_preprocessing_is_deterministic() {
    let mut image = GrayImage::from_pixel(160, 120, Luma([230]));
    for x in 20..140 {
        for y in 50..56 {
            image.put_pixel(x, y + x / 20, Luma([20]));
        }
    }
    let document = DocumentImage::from_dynamic(DynamicImage::ImageLuma8(image), "skewed.png");
    let preprocessor = ImagePreprocessor::default();

    let first = preprocessor.preprocess(&document);
    let second = preprocessor.preprocess(&document);
    assert_eq!(first.grayscale, second.grayscale);
    assert_eq!(first.skew_angle_degrees, second.skew_angle_degrees);
    assert_eq!((first.width, first.height), (160, 120));
}

#[test]
fn test_normalize_is_idempotent() {
    let normalizer = TextNormalizer::default();
    let samples = [
        "14 Maple Streel\r\nPelham, NH O3076\n\n\n  Page 2 of 3\n",
        "being known  and  numbered  as 14 LADY-\nSLIPPER AVE \u{201c}PELHAM\u{201d}",
        "/s/ Dennis Hogan\n—\n1O4 Avonue Rd, Nashua N.H. 0306O",
        "",
    ];
    for sample in samples {
        let once = normalizer.normalize(sample);
        assert_eq!(normalizer.normalize(&once), once, "sample: {:?}", sample);
    }
}
