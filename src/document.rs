//! Document image intake.
//!
//! The browser-automation side hands over a captured bitmap (full page or a
//! cropped document region). Images are decoded once and only read after that.

use std::path::Path;

use image::{DynamicImage, GenericImageView, ImageResult};

/// Smallest accepted width and height in pixels.
pub const MIN_IMAGE_SIDE: u32 = 100;

/// A captured document page, owned by a single pipeline invocation.
#[derive(Debug, Clone)]
pub struct DocumentImage {
    image: DynamicImage,
    source_identifier: String,
}

impl DocumentImage {
    /// Wrap an already decoded bitmap.
    pub fn from_dynamic(image: DynamicImage, source_identifier: impl Into<String>) -> Self {
        Self {
            image,
            source_identifier: source_identifier.into(),
        }
    }

    /// Decode an encoded image (PNG, JPEG, TIFF, ...) from memory.
    pub fn from_bytes(bytes: &[u8], source_identifier: impl Into<String>) -> ImageResult<Self> {
        let image = image::load_from_memory(bytes)?;
        Ok(Self::from_dynamic(image, source_identifier))
    }

    /// Decode an image file. The file name becomes the source identifier.
    pub fn open(path: &Path) -> ImageResult<Self> {
        let image = image::open(path)?;
        let source = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Ok(Self::from_dynamic(image, source))
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn source_identifier(&self) -> &str {
        &self.source_identifier
    }

    pub fn width(&self) -> u32 {
        self.image.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.image.dimensions().1
    }

    /// Whether both sides reach `min_side` pixels.
    pub fn accepts(&self, min_side: u32) -> bool {
        self.width() >= min_side && self.height() >= min_side
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    fn blank(width: u32, height: u32) -> DocumentImage {
        let image = GrayImage::from_pixel(width, height, Luma([255]));
        DocumentImage::from_dynamic(DynamicImage::ImageLuma8(image), "blank.png")
    }

    #[test]
    fn test_accepts_minimum_size() {
        assert!(blank(100, 100).accepts(MIN_IMAGE_SIDE));
        assert!(blank(800, 1100).accepts(MIN_IMAGE_SIDE));
        assert!(!blank(99, 400).accepts(MIN_IMAGE_SIDE));
        assert!(!blank(400, 99).accepts(MIN_IMAGE_SIDE));
    }

    #[test]
    fn test_from_bytes_rejects_garbage() {
        let result = DocumentImage::from_bytes(b"definitely not an image", "junk.bin");
        assert!(result.is_err());
    }

    #[test]
    fn test_from_bytes_roundtrips_png() {
        let mut encoded = Vec::new();
        let image = DynamicImage::ImageLuma8(GrayImage::from_pixel(120, 140, Luma([200])));
        image
            .write_to(
                &mut std::io::Cursor::new(&mut encoded),
                image::ImageFormat::Png,
            )
            .unwrap();

        let doc = DocumentImage::from_bytes(&encoded, "page-1.png").unwrap();
        assert_eq!(doc.width(), 120);
        assert_eq!(doc.height(), 140);
        assert_eq!(doc.source_identifier(), "page-1.png");
    }
}
