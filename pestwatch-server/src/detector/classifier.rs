//! Whole-image linear classifier
//!
//! The artifact is a JSON document:
//!
//! ```json
//! { "input_size": 128, "labels": ["Aphid", ...], "weights": [[...]], "bias": [...] }
//! ```
//!
//! `weights` holds one row of `input_size * input_size` coefficients per
//! class; `labels` is optional and defaults to the pest catalog order.
//! Images are converted to grayscale, resized to `input_size` square,
//! flattened and scaled to `[0, 1]` before scoring.

use super::DetectionBatch;
use crate::error::{Error, Result};
use image::imageops::FilterType;
use image::DynamicImage;
use pestwatch_common::catalog;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

fn default_input_size() -> u32 {
    128
}

#[derive(Debug, Deserialize)]
struct ClassifierArtifact {
    #[serde(default = "default_input_size")]
    input_size: u32,
    #[serde(default)]
    labels: Option<Vec<String>>,
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

/// Linear classifier predicting a single pest label per image
#[derive(Debug, Clone)]
pub struct ClassifierModel {
    input_size: u32,
    labels: Option<Vec<String>>,
    weights: Vec<Vec<f32>>,
    bias: Vec<f32>,
}

impl ClassifierModel {
    /// Load a classifier artifact from disk
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let artifact: ClassifierArtifact = serde_json::from_str(&content)
            .map_err(|e| Error::ModelLoad(format!("{}: {}", path.display(), e)))?;
        Self::from_parts(artifact.input_size, artifact.labels, artifact.weights, artifact.bias)
    }

    /// Build a classifier from its parameters, validating their shapes
    pub fn from_parts(
        input_size: u32,
        labels: Option<Vec<String>>,
        weights: Vec<Vec<f32>>,
        bias: Vec<f32>,
    ) -> Result<Self> {
        if input_size == 0 {
            return Err(Error::ModelLoad("input_size must be positive".to_string()));
        }
        if weights.is_empty() {
            return Err(Error::ModelLoad("classifier has no classes".to_string()));
        }
        if weights.len() != bias.len() {
            return Err(Error::ModelLoad(format!(
                "{} weight rows but {} bias terms",
                weights.len(),
                bias.len()
            )));
        }

        let features = (input_size as usize) * (input_size as usize);
        if let Some((class, row)) = weights.iter().enumerate().find(|(_, r)| r.len() != features) {
            return Err(Error::ModelLoad(format!(
                "weight row {} has {} coefficients, expected {}",
                class,
                row.len(),
                features
            )));
        }

        if let Some(labels) = &labels {
            if labels.len() != weights.len() {
                return Err(Error::ModelLoad(format!(
                    "{} labels for {} classes",
                    labels.len(),
                    weights.len()
                )));
            }
        }

        Ok(Self {
            input_size,
            labels,
            weights,
            bias,
        })
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    pub fn num_classes(&self) -> usize {
        self.weights.len()
    }

    /// Grayscale, resize, flatten and scale to `[0, 1]`
    pub fn preprocess(&self, image: &DynamicImage) -> Vec<f32> {
        let gray = image.to_luma8();
        let resized = image::imageops::resize(
            &gray,
            self.input_size,
            self.input_size,
            FilterType::Triangle,
        );
        resized.as_raw().iter().map(|&p| p as f32 / 255.0).collect()
    }

    /// Index of the highest-scoring class
    pub fn predict_class(&self, features: &[f32]) -> Result<usize> {
        let expected = (self.input_size as usize) * (self.input_size as usize);
        if features.len() != expected {
            return Err(Error::Inference(format!(
                "feature vector has {} values, expected {}",
                features.len(),
                expected
            )));
        }

        let mut best: Option<(usize, f32)> = None;
        for (class, (row, bias)) in self.weights.iter().zip(&self.bias).enumerate() {
            let score = row.iter().zip(features).map(|(w, x)| w * x).sum::<f32>() + bias;
            if !score.is_finite() {
                return Err(Error::Inference(format!(
                    "non-finite score for class {}",
                    class
                )));
            }
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((class, score));
            }
        }

        best.map(|(class, _)| class)
            .ok_or_else(|| Error::Inference("classifier has no classes".to_string()))
    }

    fn label_for(&self, class: usize) -> Option<String> {
        match &self.labels {
            Some(labels) => labels.get(class).cloned(),
            None => catalog::label_for_class(class).map(str::to_string),
        }
    }

    /// Classify the image; always reports exactly one detection
    pub fn detect(&self, image: &DynamicImage) -> Result<DetectionBatch> {
        let features = self.preprocess(image);
        let class = self.predict_class(&features)?;
        let label = self.label_for(class).ok_or_else(|| {
            Error::Inference(format!("class index {} outside the label catalog", class))
        })?;
        debug!("Classifier predicted {} (class {})", label, class);

        let mut batch = DetectionBatch::new();
        batch.add(label, 1);
        Ok(batch)
    }
}
