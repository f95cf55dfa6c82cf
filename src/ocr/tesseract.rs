//! Tesseract OCR backend implementation.
//!
//! Uses Tesseract OCR via command-line for text extraction. Each call writes
//! the image to a temporary PNG and reads the recognized text from stdout.

use std::path::{Path, PathBuf};
use std::process::Command;

use image::DynamicImage;
use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::debug;

use super::backend::{OcrBackend, OcrError, RecognizeOptions};

/// How to invoke the tesseract binary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesseractConfig {
    /// Binary name (looked up on PATH) or absolute path.
    pub binary: PathBuf,
    /// Language for OCR (e.g., "eng").
    pub language: String,
}

impl Default for TesseractConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("tesseract"),
            language: "eng".to_string(),
        }
    }
}

/// Tesseract OCR backend.
#[derive(Debug, Clone, Default)]
pub struct TesseractBackend {
    config: TesseractConfig,
}

impl TesseractBackend {
    /// Create a new Tesseract backend with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Tesseract backend with custom configuration.
    pub fn with_config(config: TesseractConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TesseractConfig {
        &self.config
    }

    /// Build the command line for one recognition pass.
    fn command(&self, image_path: &Path, options: &RecognizeOptions) -> Command {
        let mut command = Command::new(&self.config.binary);
        command
            .arg(image_path)
            .arg("stdout")
            .args(["-l", &self.config.language])
            .args(["--psm", &options.segmentation.psm().to_string()]);
        if let Some(ref whitelist) = options.whitelist {
            command
                .arg("-c")
                .arg(format!("tessedit_char_whitelist={}", whitelist));
        }
        command
    }

    /// Run Tesseract on an image file.
    fn run_tesseract(
        &self,
        image_path: &Path,
        options: &RecognizeOptions,
    ) -> Result<String, OcrError> {
        debug!(
            "Running {} on {} with {}",
            self.config.binary.display(),
            image_path.display(),
            options.segmentation
        );

        match self.command(image_path, options).output() {
            Ok(output) => {
                if output.status.success() {
                    Ok(String::from_utf8_lossy(&output.stdout).to_string())
                } else {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    Err(OcrError::OcrFailed(format!("tesseract failed: {}", stderr)))
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(OcrError::BackendNotAvailable(format!(
                    "{} not found (install tesseract-ocr)",
                    self.config.binary.display()
                )))
            }
            Err(e) => Err(OcrError::Io(e)),
        }
    }
}

impl OcrBackend for TesseractBackend {
    fn name(&self) -> &'static str {
        "tesseract"
    }

    fn is_available(&self) -> bool {
        which::which(&self.config.binary).is_ok()
    }

    fn availability_hint(&self) -> String {
        if self.is_available() {
            "Tesseract is available".to_string()
        } else {
            format!(
                "{} not found. Install with: apt install tesseract-ocr (or set ocr.binary)",
                self.config.binary.display()
            )
        }
    }

    fn recognize(
        &self,
        image: &DynamicImage,
        options: &RecognizeOptions,
    ) -> Result<String, OcrError> {
        let temp_dir = TempDir::new()?;
        let image_path = temp_dir.path().join("page.png");
        image
            .save(&image_path)
            .map_err(|e| OcrError::ImageError(e.to_string()))?;

        self.run_tesseract(&image_path, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::backend::SegmentationMode;

    #[test]
    fn test_command_arguments() {
        let backend = TesseractBackend::with_config(TesseractConfig {
            binary: PathBuf::from("/opt/tess/bin/tesseract"),
            language: "eng".to_string(),
        });
        let options = RecognizeOptions::new(SegmentationMode::SingleBlock).with_whitelist("ABC123");
        let command = backend.command(Path::new("/tmp/page.png"), &options);

        assert_eq!(command.get_program(), "/opt/tess/bin/tesseract");
        let args: Vec<String> = command
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            args,
            vec![
                "/tmp/page.png",
                "stdout",
                "-l",
                "eng",
                "--psm",
                "6",
                "-c",
                "tessedit_char_whitelist=ABC123"
            ]
        );
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let backend = TesseractBackend::with_config(TesseractConfig {
            binary: PathBuf::from("/nonexistent/tesseract-binary"),
            language: "eng".to_string(),
        });
        assert!(!backend.is_available());
        assert!(backend.availability_hint().contains("not found"));

        let image = DynamicImage::new_luma8(10, 10);
        let result = backend.recognize(&image, &RecognizeOptions::new(SegmentationMode::Auto));
        assert!(matches!(result, Err(OcrError::BackendNotAvailable(_))));
    }
}
