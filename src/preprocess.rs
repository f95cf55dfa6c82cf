//! Scan cleanup ahead of OCR.
//!
//! Steps run in a fixed order: contrast, grayscale, denoise, adaptive
//! threshold, deskew. Legal filings tend to have uneven illumination across
//! the page, so thresholding uses a Gaussian-weighted local mean rather than
//! one global cut.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::filter::{gaussian_blur_f32, median_filter};
use imageproc::geometry::convex_hull;
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::document::DocumentImage;

/// Corrections smaller than this are not worth resampling the page for.
const MIN_CORRECTION_DEGREES: f32 = 0.05;

/// Keys cubic convolution parameter (matches the common OpenCV choice).
const CUBIC_A: f32 = -0.75;

/// Tuning knobs for [`ImagePreprocessor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Contrast adjustment on the `image` crate's scale (positive increases).
    pub contrast: f32,
    /// Median filter radius used for denoising (0 disables).
    pub denoise_radius: u32,
    /// Sigma of the Gaussian window used for the local threshold.
    pub threshold_sigma: f32,
    /// Subtracted from the local mean before comparing.
    pub threshold_offset: i16,
    /// Estimate and correct page skew.
    pub deskew: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            contrast: 20.0,
            denoise_radius: 1,
            threshold_sigma: 5.0,
            threshold_offset: 10,
            deskew: true,
        }
    }
}

/// Binarized, deskewed page ready for OCR.
#[derive(Debug, Clone)]
pub struct PreprocessedImage {
    pub grayscale: GrayImage,
    pub width: u32,
    pub height: u32,
    pub skew_angle_degrees: f32,
}

impl PreprocessedImage {
    pub fn to_dynamic(&self) -> DynamicImage {
        DynamicImage::ImageLuma8(self.grayscale.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    config: PreprocessConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    /// Clean up a page. Never fails; size checks happen before this point.
    pub fn preprocess(&self, document: &DocumentImage) -> PreprocessedImage {
        let enhanced = document.image().adjust_contrast(self.config.contrast);
        let gray = enhanced.to_luma8();

        let denoised = if self.config.denoise_radius > 0 {
            let radius = self.config.denoise_radius;
            median_filter(&gray, radius, radius)
        } else {
            gray
        };

        let binary = adaptive_threshold(
            &denoised,
            self.config.threshold_sigma,
            self.config.threshold_offset,
        );

        let skew = if self.config.deskew {
            estimate_skew(&binary)
        } else {
            0.0
        };

        let corrected = if skew.abs() < MIN_CORRECTION_DEGREES {
            binary
        } else {
            rotate_replicate(&binary, skew)
        };

        debug!(
            "Preprocessed {} ({}x{}), skew {:.2} degrees",
            document.source_identifier(),
            corrected.width(),
            corrected.height(),
            skew
        );

        PreprocessedImage {
            width: corrected.width(),
            height: corrected.height(),
            skew_angle_degrees: skew,
            grayscale: corrected,
        }
    }
}

/// Binarize against a Gaussian-weighted local mean.
///
/// A pixel turns white when it is brighter than `local_mean - offset`, black
/// otherwise.
pub fn adaptive_threshold(image: &GrayImage, sigma: f32, offset: i16) -> GrayImage {
    let local = gaussian_blur_f32(image, sigma.max(0.5));
    let mut result = GrayImage::new(image.width(), image.height());

    for (x, y, pixel) in image.enumerate_pixels() {
        let threshold = i16::from(local.get_pixel(x, y)[0]) - offset;
        let value = if i16::from(pixel[0]) > threshold { 255 } else { 0 };
        result.put_pixel(x, y, Luma([value]));
    }

    result
}

/// Estimate page skew from the minimum-area rectangle around all foreground
/// (black) pixels. Returns degrees in [-45, 45); 0 for blank or degenerate
/// pages.
///
/// The minimum-area rectangle is flush with one edge of the convex hull, so
/// the angle is taken from that hull edge in floating point. The rectangle's
/// own corners are rounded to whole pixels, which on a single text line
/// leaves only a handful of representable angles.
pub fn estimate_skew(binary: &GrayImage) -> f32 {
    let points: Vec<Point<i32>> = binary
        .enumerate_pixels()
        .filter(|(_, _, pixel)| pixel[0] == 0)
        .map(|(x, y, _)| Point::new(x as i32, y as i32))
        .collect();

    if !has_area(&points) {
        return 0.0;
    }

    let hull = convex_hull(points);
    let Some(angle) = min_area_edge_angle(&hull) else {
        return 0.0;
    };
    normalize_skew(angle.to_degrees() as f32)
}

/// Direction (radians) of the longer side of the minimum-area rectangle
/// around a convex hull, found by trying every hull edge.
fn min_area_edge_angle(hull: &[Point<i32>]) -> Option<f64> {
    if hull.len() < 3 {
        return None;
    }

    let mut best: Option<(f64, f64)> = None;
    for (i, a) in hull.iter().enumerate() {
        let b = hull[(i + 1) % hull.len()];
        let ex = f64::from(b.x - a.x);
        let ey = f64::from(b.y - a.y);
        let length = ex.hypot(ey);
        if length == 0.0 {
            continue;
        }
        let (ux, uy) = (ex / length, ey / length);

        let (mut min_u, mut max_u) = (f64::MAX, f64::MIN);
        let (mut min_v, mut max_v) = (f64::MAX, f64::MIN);
        for p in hull {
            let (px, py) = (f64::from(p.x), f64::from(p.y));
            let u = px * ux + py * uy;
            let v = py * ux - px * uy;
            min_u = min_u.min(u);
            max_u = max_u.max(u);
            min_v = min_v.min(v);
            max_v = max_v.max(v);
        }

        let along = max_u - min_u;
        let across = max_v - min_v;
        let area = along * across;
        if best.map_or(true, |(best_area, _)| area < best_area) {
            let angle = if along >= across {
                uy.atan2(ux)
            } else {
                ux.atan2(-uy)
            };
            best = Some((area, angle));
        }
    }

    best.map(|(_, angle)| angle)
}

/// Fold any rectangle edge angle into [-45, 45) so near-vertical text blocks
/// are never flipped by 90 degrees.
pub fn normalize_skew(angle: f32) -> f32 {
    let folded = (angle + 45.0).rem_euclid(90.0) - 45.0;
    if folded >= 45.0 {
        -45.0
    } else {
        folded
    }
}

/// True when the points are not all collinear (at least a triangle).
fn has_area(points: &[Point<i32>]) -> bool {
    let Some(&a) = points.first() else {
        return false;
    };
    let Some(&b) = points.iter().find(|p| **p != a) else {
        return false;
    };

    points.iter().any(|c| {
        let cross = i64::from(b.x - a.x) * i64::from(c.y - a.y)
            - i64::from(b.y - a.y) * i64::from(c.x - a.x);
        cross != 0
    })
}

/// Rotate about the center so a line at `angle_degrees` becomes horizontal.
///
/// Bicubic sampling; coordinates outside the source clamp to the nearest edge
/// pixel (edge replication). Output keeps the input dimensions.
pub fn rotate_replicate(image: &GrayImage, angle_degrees: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    let (sin, cos) = angle_degrees.to_radians().sin_cos();
    let cx = (width as f32 - 1.0) / 2.0;
    let cy = (height as f32 - 1.0) / 2.0;

    let mut result = GrayImage::new(width, height);
    for (x, y, pixel) in result.enumerate_pixels_mut() {
        let dx = x as f32 - cx;
        let dy = y as f32 - cy;
        let sx = cx + dx * cos - dy * sin;
        let sy = cy + dx * sin + dy * cos;
        *pixel = Luma([sample_bicubic(image, sx, sy)]);
    }

    result
}

fn sample_bicubic(image: &GrayImage, x: f32, y: f32) -> u8 {
    let max_x = i64::from(image.width()) - 1;
    let max_y = i64::from(image.height()) - 1;
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let mut acc = 0.0f32;
    for j in -1i64..=2 {
        let wy = cubic_weight(fy - j as f32);
        let py = (y0 as i64 + j).clamp(0, max_y) as u32;
        for i in -1i64..=2 {
            let wx = cubic_weight(fx - i as f32);
            let px = (x0 as i64 + i).clamp(0, max_x) as u32;
            acc += wx * wy * f32::from(image.get_pixel(px, py)[0]);
        }
    }

    acc.round().clamp(0.0, 255.0) as u8
}

fn cubic_weight(t: f32) -> f32 {
    let t = t.abs();
    if t <= 1.0 {
        (CUBIC_A + 2.0) * t * t * t - (CUBIC_A + 3.0) * t * t + 1.0
    } else if t < 2.0 {
        CUBIC_A * t * t * t - 5.0 * CUBIC_A * t * t + 8.0 * CUBIC_A * t - 4.0 * CUBIC_A
    } else {
        0.0
    }
}
