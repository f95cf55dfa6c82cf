//! Per-document diagnostic artifacts.
//!
//! Every processed document leaves a text file with the OCR output, the
//! pattern trace and the outcome, plus the original and preprocessed images,
//! so misses can be analyzed after the fact. Writing is best effort: failures
//! are logged and the affected path is left empty.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use image::{DynamicImage, GrayImage};
use serde::Serialize;
use tracing::{debug, warn};

use crate::extract::PatternTrace;
use crate::ocr::OcrAttempt;

/// Longest sanitized identifier used in a file name.
const MAX_STEM_CHARS: usize = 80;

/// Everything known about one document at the end of its run.
#[derive(Debug, Clone, Copy)]
pub struct DiagnosticReport<'a> {
    pub document_identifier: &'a str,
    pub image_name: &'a str,
    pub width: u32,
    pub height: u32,
    pub skew_angle_degrees: Option<f32>,
    pub method_used: &'a str,
    pub metadata: &'a [(String, String)],
    pub attempts: &'a [OcrAttempt],
    pub selected_attempt: Option<&'a str>,
    pub ocr_text: Option<&'a str>,
    pub normalized_text: Option<&'a str>,
    pub address: Option<&'a str>,
    pub trace: Option<&'a PatternTrace>,
    pub original: Option<&'a DynamicImage>,
    pub preprocessed: Option<&'a GrayImage>,
}

/// Paths of the files actually written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DiagnosticArtifacts {
    pub text_path: Option<PathBuf>,
    pub original_image_path: Option<PathBuf>,
    pub preprocessed_image_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DiagnosticsWriter {
    dir: PathBuf,
    save_images: bool,
}

impl DiagnosticsWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            save_images: true,
        }
    }

    pub fn with_save_images(mut self, save_images: bool) -> Self {
        self.save_images = save_images;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write artifacts for `report` stamped with the current local time.
    pub fn record(&self, report: &DiagnosticReport<'_>) -> DiagnosticArtifacts {
        self.record_at(report, Local::now())
    }

    pub fn record_at(
        &self,
        report: &DiagnosticReport<'_>,
        timestamp: DateTime<Local>,
    ) -> DiagnosticArtifacts {
        let mut artifacts = DiagnosticArtifacts::default();

        if let Err(e) = fs::create_dir_all(&self.dir) {
            warn!(
                "Failed to create diagnostics directory {}: {}",
                self.dir.display(),
                e
            );
            return artifacts;
        }

        let base = format!(
            "{}_{}",
            sanitize_identifier(report.document_identifier),
            timestamp.format("%Y%m%d_%H%M%S")
        );
        let stem = self.unique_stem(&base);

        let text_path = self.dir.join(format!("{}.txt", stem));
        match fs::write(&text_path, render_report(report, &timestamp)) {
            Ok(()) => {
                debug!("Wrote diagnostics to {}", text_path.display());
                artifacts.text_path = Some(text_path);
            }
            Err(e) => warn!("Failed to write {}: {}", text_path.display(), e),
        }

        if self.save_images {
            if let Some(original) = report.original {
                let path = self.dir.join(format!("{}_original.png", stem));
                match original.save(&path) {
                    Ok(()) => artifacts.original_image_path = Some(path),
                    Err(e) => warn!("Failed to save {}: {}", path.display(), e),
                }
            }
            if let Some(preprocessed) = report.preprocessed {
                let path = self.dir.join(format!("{}_preprocessed.png", stem));
                match preprocessed.save(&path) {
                    Ok(()) => artifacts.preprocessed_image_path = Some(path),
                    Err(e) => warn!("Failed to save {}: {}", path.display(), e),
                }
            }
        }

        artifacts
    }

    /// Never overwrite an earlier run of the same document in the same second.
    fn unique_stem(&self, base: &str) -> String {
        let taken = |stem: &str| self.dir.join(format!("{}.txt", stem)).exists();
        if !taken(base) {
            return base.to_string();
        }
        (2..)
            .map(|n| format!("{}_{}", base, n))
            .find(|stem| !taken(stem))
            .unwrap_or_else(|| base.to_string())
    }
}

/// File-system safe version of a document identifier.
pub fn sanitize_identifier(identifier: &str) -> String {
    let sanitized: String = identifier
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_STEM_CHARS)
        .collect();
    let sanitized = sanitized.trim_matches(|c| c == '.' || c == '_');
    if sanitized.is_empty() {
        "document".to_string()
    } else {
        sanitized.to_string()
    }
}

fn render_report(report: &DiagnosticReport<'_>, timestamp: &DateTime<Local>) -> String {
    let mut out = String::new();
    let text_length = report.ocr_text.map_or(0, |t| t.chars().count());

    let _ = writeln!(out, "=== LIENSCAN DIAGNOSTICS ===");
    let _ = writeln!(out, "Document: {}", report.document_identifier);
    let _ = writeln!(out, "Image: {}", report.image_name);
    let _ = writeln!(out, "Dimensions: {}x{}", report.width, report.height);
    if let Some(skew) = report.skew_angle_degrees {
        let _ = writeln!(out, "Skew: {:.2} degrees", skew);
    }
    let _ = writeln!(out, "Method: {}", report.method_used);
    let _ = writeln!(out, "Text length: {}", text_length);
    let _ = writeln!(out, "Timestamp: {}", timestamp.to_rfc3339());
    let _ = writeln!(out, "Address: {}", report.address.unwrap_or("NOT FOUND"));

    if !report.metadata.is_empty() {
        let _ = writeln!(out, "\n--- METADATA ---");
        for (key, value) in report.metadata {
            let _ = writeln!(out, "{}: {}", key, value);
        }
    }

    if !report.attempts.is_empty() {
        let _ = writeln!(out, "\n--- OCR ATTEMPTS ---");
        for attempt in report.attempts {
            let marker = if report.selected_attempt == Some(attempt.config_label.as_str()) {
                "*"
            } else {
                " "
            };
            let _ = writeln!(
                out,
                "[{}] {}: {} chars",
                marker, attempt.config_label, attempt.char_count
            );
        }
    }

    let _ = writeln!(out, "\n--- OCR TEXT ---");
    match report.ocr_text.filter(|t| !t.trim().is_empty()) {
        Some(text) => {
            let _ = writeln!(out, "{}", text);
        }
        None => {
            let _ = writeln!(out, "[NO TEXT]");
        }
    }

    if let Some(normalized) = report.normalized_text {
        let _ = writeln!(out, "\n--- NORMALIZED TEXT ---");
        let _ = writeln!(out, "{}", normalized);
    }

    if let Some(trace) = report.trace {
        let _ = writeln!(out, "\n--- PATTERN TRACE ---");
        out.push_str(&trace.render());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Stage;
    use chrono::TimeZone;
    use image::Luma;
    use tempfile::TempDir;

    fn report<'a>(
        attempts: &'a [OcrAttempt],
        trace: &'a PatternTrace,
        metadata: &'a [(String, String)],
    ) -> DiagnosticReport<'a> {
        DiagnosticReport {
            document_identifier: "2023-CV-0042",
            image_name: "page1.png",
            width: 800,
            height: 1100,
            skew_angle_degrees: Some(1.25),
            method_used: "street_pattern",
            metadata,
            attempts,
            selected_attempt: Some("original"),
            ocr_text: Some("NOTICE OF LIEN\n42 ELM ST NASHUA NH 03060"),
            normalized_text: Some("NOTICE OF LIEN\n42 ELM ST NASHUA NH 03060"),
            address: Some("42 ELM ST NASHUA NH 03060"),
            trace: Some(trace),
            original: None,
            preprocessed: None,
        }
    }

    fn timestamp() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_sanitize_identifier() {
        assert_eq!(sanitize_identifier("2023-CV-0042"), "2023-CV-0042");
        assert_eq!(sanitize_identifier("Case #12 / Smith"), "Case__12___Smith");
        assert_eq!(sanitize_identifier("../../etc"), "etc");
        assert_eq!(sanitize_identifier("   "), "document");
        assert_eq!(sanitize_identifier(&"x".repeat(200)).len(), MAX_STEM_CHARS);
    }

    #[test]
    fn test_record_writes_text_file() {
        let dir = TempDir::new().unwrap();
        let writer = DiagnosticsWriter::new(dir.path());
        let attempts = vec![
            OcrAttempt::empty("whitelist_block"),
            OcrAttempt::new("original", "NOTICE OF LIEN\n42 ELM ST NASHUA NH 03060"),
        ];
        let mut trace = PatternTrace::new();
        trace.record(Stage::StreetPattern, "street_city_state_zip", Some("42 ELM ST NASHUA NH 03060"));
        let metadata = vec![("case_number".to_string(), "2023-CV-0042".to_string())];

        let artifacts = writer.record_at(&report(&attempts, &trace, &metadata), timestamp());
        let path = artifacts.text_path.unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "2023-CV-0042_20240309_140507.txt"
        );

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("Document: 2023-CV-0042"));
        assert!(content.contains("Dimensions: 800x1100"));
        assert!(content.contains("Method: street_pattern"));
        assert!(content.contains("case_number: 2023-CV-0042"));
        assert!(content.contains("[*] original:"));
        assert!(content.contains("--- OCR TEXT ---\nNOTICE OF LIEN"));
        assert!(content.contains("[street_pattern] street_city_state_zip: MATCH -> 42 ELM ST"));
        assert!(artifacts.original_image_path.is_none());
    }

    #[test]
    fn test_no_text_marker() {
        let dir = TempDir::new().unwrap();
        let writer = DiagnosticsWriter::new(dir.path());
        let trace = PatternTrace::new();
        let report = DiagnosticReport {
            ocr_text: None,
            address: None,
            method_used: "no_text",
            ..report(&[], &trace, &[])
        };

        let path = writer.record_at(&report, timestamp()).text_path.unwrap();
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("[NO TEXT]"));
        assert!(content.contains("Address: NOT FOUND"));
    }

    #[test]
    fn test_same_second_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let writer = DiagnosticsWriter::new(dir.path());
        let trace = PatternTrace::new();
        let first = writer.record_at(&report(&[], &trace, &[]), timestamp());
        let second = writer.record_at(&report(&[], &trace, &[]), timestamp());
        assert_ne!(first.text_path, second.text_path);
        assert!(second
            .text_path
            .unwrap()
            .to_string_lossy()
            .ends_with("_20240309_140507_2.txt"));
    }

    #[test]
    fn test_images_saved() {
        let dir = TempDir::new().unwrap();
        let writer = DiagnosticsWriter::new(dir.path());
        let trace = PatternTrace::new();
        let gray = GrayImage::from_pixel(10, 10, Luma([255]));
        let original = DynamicImage::ImageLuma8(gray.clone());
        let report = DiagnosticReport {
            original: Some(&original),
            preprocessed: Some(&gray),
            ..report(&[], &trace, &[])
        };

        let artifacts = writer.record_at(&report, timestamp());
        assert!(artifacts.original_image_path.unwrap().exists());
        assert!(artifacts.preprocessed_image_path.unwrap().exists());

        let artifacts = writer
            .clone()
            .with_save_images(false)
            .record_at(&report, timestamp());
        assert!(artifacts.original_image_path.is_none());
    }

    #[test]
    fn test_unwritable_directory_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        // A regular file where the directory should be.
        let writer = DiagnosticsWriter::new(blocker.join("diagnostics"));
        let trace = PatternTrace::new();
        let artifacts = writer.record_at(&report(&[], &trace, &[]), timestamp());
        assert_eq!(artifacts, DiagnosticArtifacts::default());
    }
}
