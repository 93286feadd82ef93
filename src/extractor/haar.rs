//! Lightweight face encoder built on integral images.
//!
//! Candidate windows are scored with a few Haar-like contrasts (the eye band
//! is darker than the forehead and the cheeks, and the face is roughly
//! left/right balanced), overlapping hits are suppressed, and each surviving
//! window is reduced to a mean-centred, unit-length luma patch.

use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, sum_image_pixels};
use tracing::debug;

use super::FaceEncoder;
use crate::error::ExtractError;
use crate::models::{BoundingBox, DetectedFace, Signature};

const DETECTION_MAX_SIDE: u32 = 320;
const PATCH_WIDTH: u32 = 8;
const PATCH_HEIGHT: u32 = 16;

/// Signature length produced by [`HaarEncoder`].
pub const SIGNATURE_LEN: usize = (PATCH_WIDTH * PATCH_HEIGHT) as usize;

type Integral = ImageBuffer<Luma<u64>, Vec<u64>>;

#[derive(Debug, Clone)]
pub struct HaarEncoder {
    pub min_face_size: u32,
    pub scale_factor: f32,
    pub confidence_threshold: f32,
    pub nms_iou_threshold: f32,
}

impl Default for HaarEncoder {
    fn default() -> Self {
        Self {
            min_face_size: 48,
            scale_factor: 1.15,
            confidence_threshold: 0.7,
            nms_iou_threshold: 0.3,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    x: u32,
    y: u32,
    size: u32,
    confidence: f32,
}

/// Window-relative band, as fractions of the window side.
struct Band {
    x0: f32,
    y0: f32,
    x1: f32,
    y1: f32,
}

const FOREHEAD: Band = Band { x0: 0.15, y0: 0.10, x1: 0.85, y1: 0.25 };
const EYES: Band = Band { x0: 0.15, y0: 0.25, x1: 0.85, y1: 0.45 };
const CHEEKS: Band = Band { x0: 0.15, y0: 0.50, x1: 0.85, y1: 0.70 };
const LEFT_HALF: Band = Band { x0: 0.10, y0: 0.10, x1: 0.50, y1: 0.90 };
const RIGHT_HALF: Band = Band { x0: 0.50, y0: 0.10, x1: 0.90, y1: 0.90 };

const MIN_BAND_CONTRAST: f64 = 0.08;
const MAX_HALF_IMBALANCE: f64 = 0.10;

impl HaarEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn detect(&self, gray: &GrayImage) -> Vec<Window> {
        let (width, height) = gray.dimensions();
        let integral: Integral = integral_image::<_, u64>(gray);

        let mut windows = Vec::new();
        let mut size = self.min_face_size as f32;
        while size as u32 <= width.min(height) {
            let side = size as u32;
            let step = (side / 8).max(4) as usize;
            for y in (0..=height - side).step_by(step) {
                for x in (0..=width - side).step_by(step) {
                    let confidence = self.evaluate(&integral, x, y, side);
                    if confidence > self.confidence_threshold {
                        windows.push(Window { x, y, size: side, confidence });
                    }
                }
            }
            size *= self.scale_factor;
        }

        non_maximum_suppression(windows, self.nms_iou_threshold)
    }

    fn evaluate(&self, integral: &Integral, x: u32, y: u32, side: u32) -> f32 {
        let mean = |band: &Band| band_mean(integral, x, y, side, band);
        let eyes = mean(&EYES);

        let mut score = 0.0;
        if mean(&FOREHEAD) - eyes > MIN_BAND_CONTRAST {
            score += 2.0;
        }
        if mean(&CHEEKS) - eyes > MIN_BAND_CONTRAST {
            score += 2.0;
        }
        if (mean(&LEFT_HALF) - mean(&RIGHT_HALF)).abs() < MAX_HALF_IMBALANCE {
            score += 1.0;
        }
        score / 5.0
    }
}

impl FaceEncoder for HaarEncoder {
    fn encode(&self, image: &DynamicImage) -> Result<Vec<DetectedFace>, ExtractError> {
        let gray = image.to_luma8();
        if gray.width() < self.min_face_size || gray.height() < self.min_face_size {
            return Ok(Vec::new());
        }

        let longest = gray.width().max(gray.height());
        let scale = if longest > DETECTION_MAX_SIDE {
            DETECTION_MAX_SIDE as f32 / longest as f32
        } else {
            1.0
        };
        let small = if scale < 1.0 {
            imageops::resize(
                &gray,
                ((gray.width() as f32 * scale) as u32).max(1),
                ((gray.height() as f32 * scale) as u32).max(1),
                FilterType::Triangle,
            )
        } else {
            gray.clone()
        };

        let faces: Vec<DetectedFace> = self
            .detect(&small)
            .into_iter()
            .map(|w| {
                let bbox = to_source_box(&w, scale, gray.width(), gray.height());
                DetectedFace {
                    signature: patch_signature(&gray, &bbox),
                    bbox,
                }
            })
            .collect();

        debug!("Haar encoder found {} faces", faces.len());
        Ok(faces)
    }
}

fn band_mean(integral: &Integral, x: u32, y: u32, side: u32, band: &Band) -> f64 {
    let s = side as f32;
    let left = x + (band.x0 * s) as u32;
    let top = y + (band.y0 * s) as u32;
    let right = (x + (band.x1 * s) as u32).max(left + 1) - 1;
    let bottom = (y + (band.y1 * s) as u32).max(top + 1) - 1;
    let area = ((right - left + 1) * (bottom - top + 1)) as f64;
    let sum = sum_image_pixels(integral, left, top, right, bottom)[0] as f64;
    sum / area / 255.0
}

fn non_maximum_suppression(mut windows: Vec<Window>, iou_threshold: f32) -> Vec<Window> {
    windows.sort_by(|a, b| b.confidence.total_cmp(&a.confidence).then(b.size.cmp(&a.size)));

    let mut keep: Vec<Window> = Vec::new();
    for window in windows {
        if keep.iter().all(|k| iou(k, &window) < iou_threshold) {
            keep.push(window);
        }
    }
    keep
}

fn iou(a: &Window, b: &Window) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.size).min(b.x + b.size);
    let y2 = (a.y + a.size).min(b.y + b.size);
    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = ((x2 - x1) * (y2 - y1)) as f32;
    let union = (a.size * a.size + b.size * b.size) as f32 - intersection;
    intersection / union
}

fn to_source_box(window: &Window, scale: f32, width: u32, height: u32) -> BoundingBox {
    let x = ((window.x as f32 / scale) as u32).min(width - 1);
    let y = ((window.y as f32 / scale) as u32).min(height - 1);
    let side = ((window.size as f32 / scale) as u32).max(1);
    BoundingBox {
        x,
        y,
        width: side.min(width - x),
        height: side.min(height - y),
    }
}

const FLAT_PATCH_NORM: f64 = 1e-9;

/// Mean-centred, L2-normalised luma patch of the face region.
pub fn patch_signature(gray: &GrayImage, bbox: &BoundingBox) -> Signature {
    let crop = imageops::crop_imm(gray, bbox.x, bbox.y, bbox.width, bbox.height).to_image();
    let patch = imageops::resize(&crop, PATCH_WIDTH, PATCH_HEIGHT, FilterType::Triangle);

    let mut values: Vec<f64> = patch.pixels().map(|p| p[0] as f64 / 255.0).collect();
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter_mut().for_each(|v| *v -= mean);

    let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
    // Mean subtraction leaves rounding residue on flat patches.
    if norm > FLAT_PATCH_NORM {
        values.iter_mut().for_each(|v| *v /= norm);
    } else {
        values.iter_mut().for_each(|v| *v = 0.0);
    }
    Signature::new(values)
}
