//! ONNX Runtime backend for YOLOv8-style pest detectors
//!
//! Expects a single `[1, 3, N, N]` float input (RGB, `[0, 1]`) and a
//! `[1, 4 + classes, anchors]` output.

use super::yolo::{decode_yolov8, to_chw_tensor, BoxPredictor, Candidate};
use crate::error::{Error, Result};
use image::DynamicImage;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Tensor;
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// Standard YOLOv8 input resolution
pub const DEFAULT_INPUT_SIZE: u32 = 640;

pub struct OnnxPredictor {
    session: Mutex<Session>,
    input_size: u32,
    min_confidence: f32,
}

fn load_error(e: impl std::fmt::Display) -> Error {
    Error::ModelLoad(format!("ONNX session: {}", e))
}

fn inference_error(e: impl std::fmt::Display) -> Error {
    Error::Inference(format!("ONNX runtime: {}", e))
}

impl OnnxPredictor {
    /// Load a detector, keeping anchors scoring above `min_confidence`
    pub fn load(path: &Path, min_confidence: f32) -> Result<Self> {
        let builder = Session::builder().map_err(load_error)?;
        let builder = builder
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(load_error)?;
        let session = builder.commit_from_file(path).map_err(load_error)?;

        Ok(Self {
            session: Mutex::new(session),
            input_size: DEFAULT_INPUT_SIZE,
            min_confidence,
        })
    }
}

impl BoxPredictor for OnnxPredictor {
    fn name(&self) -> &str {
        "onnx-yolov8"
    }

    fn predict(&self, image: &DynamicImage) -> Result<Vec<Candidate>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(Error::Inference("image has no pixels".to_string()));
        }

        let size = self.input_size as usize;
        let pixels = to_chw_tensor(image, self.input_size);
        let input = Tensor::from_array(([1usize, 3, size, size], pixels))
            .map_err(inference_error)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::Inference("ONNX session lock poisoned".to_string()))?;
        let outputs = session.run(ort::inputs![input]).map_err(inference_error)?;

        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(inference_error)?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        debug!("ONNX output shape {:?}", dims);

        let scale_x = image.width() as f32 / self.input_size as f32;
        let scale_y = image.height() as f32 / self.input_size as f32;
        decode_yolov8(&dims, data, scale_x, scale_y, self.min_confidence)
    }
}
