//! Object-detector model and YOLO post-processing
//!
//! A [`BoxPredictor`] backend produces raw candidate boxes; [`DetectorModel`]
//! turns them into per-label counts: confidence filter, catalog filter,
//! per-class non-maximum suppression, then one count per surviving box.

use super::DetectionBatch;
use crate::error::{Error, Result};
use image::imageops::FilterType;
use image::DynamicImage;
use pestwatch_common::catalog;
use tracing::debug;

/// Boxes of the same class overlapping more than this are duplicates
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

/// Axis-aligned box in image pixels, top-left origin
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    /// Box from YOLO center/size coordinates
    pub fn from_center(cx: f32, cy: f32, width: f32, height: f32) -> Self {
        Self {
            x: cx - width / 2.0,
            y: cy - height / 2.0,
            width,
            height,
        }
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union; 0.0 for disjoint or degenerate boxes
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);

        if right <= left || bottom <= top {
            return 0.0;
        }

        let intersection = (right - left) * (bottom - top);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 || !union.is_finite() {
            return 0.0;
        }
        intersection / union
    }
}

/// One raw detection from a backend
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Inference backend producing candidate boxes for an image
pub trait BoxPredictor: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    fn predict(&self, image: &DynamicImage) -> Result<Vec<Candidate>>;
}

/// Object detector counting pests per label
pub struct DetectorModel {
    backend: Box<dyn BoxPredictor>,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl DetectorModel {
    pub fn new(backend: Box<dyn BoxPredictor>, confidence_threshold: f32) -> Self {
        Self {
            backend,
            confidence_threshold,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn detect(&self, image: &DynamicImage) -> Result<DetectionBatch> {
        let candidates = self.backend.predict(image)?;
        debug!(
            "{} produced {} candidate boxes",
            self.backend.name(),
            candidates.len()
        );
        Ok(count_detections(
            candidates,
            self.confidence_threshold,
            self.iou_threshold,
        ))
    }
}

/// Filter, de-duplicate and count candidates per catalog label.
///
/// Candidates need `confidence > confidence_threshold` and a class index
/// inside the catalog to count.
pub fn count_detections(
    candidates: Vec<Candidate>,
    confidence_threshold: f32,
    iou_threshold: f32,
) -> DetectionBatch {
    let kept: Vec<Candidate> = candidates
        .into_iter()
        .filter(|c| c.confidence.is_finite() && c.confidence > confidence_threshold)
        .filter(|c| c.class_id < catalog::PEST_LABELS.len())
        .collect();

    let mut batch = DetectionBatch::new();
    for candidate in non_max_suppression(kept, iou_threshold) {
        if let Some(label) = catalog::label_for_class(candidate.class_id) {
            batch.add(label, 1);
        }
    }
    batch
}

/// Greedy per-class non-maximum suppression, highest confidence first
pub fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let duplicate = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !duplicate {
            kept.push(candidate);
        }
    }
    kept
}

/// Resize to `size` square RGB and lay out as CHW floats in `[0, 1]`
pub fn to_chw_tensor(image: &DynamicImage, size: u32) -> Vec<f32> {
    let rgb = image.resize_exact(size, size, FilterType::Triangle).to_rgb8();
    let plane = (size as usize) * (size as usize);
    let mut data = vec![0.0f32; plane * 3];

    for (i, pixel) in rgb.pixels().enumerate() {
        for channel in 0..3 {
            data[channel * plane + i] = pixel[channel] as f32 / 255.0;
        }
    }
    data
}

/// Decode a YOLOv8 output tensor of shape `[1, 4 + classes, anchors]`.
///
/// Box coordinates are in model-input pixels and are scaled back to the
/// source image with `scale_x`/`scale_y`. Anchors whose best class score
/// is not above `min_confidence` are dropped here to keep NMS cheap.
pub fn decode_yolov8(
    shape: &[usize],
    data: &[f32],
    scale_x: f32,
    scale_y: f32,
    min_confidence: f32,
) -> Result<Vec<Candidate>> {
    let (channels, anchors) = match shape {
        [1, channels, anchors] if *channels > 4 => (*channels, *anchors),
        _ => {
            return Err(Error::Inference(format!(
                "unexpected detector output shape {:?}",
                shape
            )))
        }
    };
    if data.len() != channels * anchors {
        return Err(Error::Inference(format!(
            "detector output has {} values, shape {:?} needs {}",
            data.len(),
            shape,
            channels * anchors
        )));
    }

    let at = |channel: usize, anchor: usize| data[channel * anchors + anchor];
    let mut candidates = Vec::new();

    for anchor in 0..anchors {
        let mut best_class = 0;
        let mut best_score = f32::NEG_INFINITY;
        for class in 0..channels - 4 {
            let score = at(4 + class, anchor);
            if score > best_score {
                best_score = score;
                best_class = class;
            }
        }
        if !(best_score > min_confidence) {
            continue;
        }

        let bbox = BoundingBox::from_center(
            at(0, anchor) * scale_x,
            at(1, anchor) * scale_y,
            at(2, anchor) * scale_x,
            at(3, anchor) * scale_y,
        );
        candidates.push(Candidate {
            class_id: best_class,
            confidence: best_score,
            bbox,
        });
    }

    Ok(candidates)
}
