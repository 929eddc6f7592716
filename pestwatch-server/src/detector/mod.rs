//! Detector adapter
//!
//! Normalizes whichever pretrained model is available into a
//! [`DetectionBatch`] (pest label -> count). Two model families are
//! supported:
//!
//! - [`ClassifierModel`]: whole-image linear classifier, one label per image
//! - [`DetectorModel`]: object detector, one count per surviving box
//!
//! The family is chosen once at startup by [`ModelProbe`], which checks which
//! artifacts are present and loadable instead of falling back on load errors
//! at request time.

pub mod classifier;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod yolo;

use crate::error::{Error, Result};
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tracing::{info, warn};

pub use classifier::ClassifierModel;
pub use yolo::{BoundingBox, BoxPredictor, Candidate, DetectorModel};

/// Detections at or below this confidence are discarded
pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.5;

/// Request-scoped detection result: pest label -> number of detections.
///
/// A label that is absent means zero detections; zero counts are never
/// stored. Serializes as a plain JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectionBatch(BTreeMap<String, u64>);

impl DetectionBatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `count` detections of `label`
    pub fn add(&mut self, label: impl Into<String>, count: u64) {
        if count == 0 {
            return;
        }
        *self.0.entry(label.into()).or_insert(0) += count;
    }

    pub fn get(&self, label: &str) -> u64 {
        self.0.get(label).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(label, count)| (label.as_str(), *count))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct labels
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Total detections across all labels
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }
}

impl<L: Into<String>> FromIterator<(L, u64)> for DetectionBatch {
    fn from_iter<I: IntoIterator<Item = (L, u64)>>(iter: I) -> Self {
        let mut batch = DetectionBatch::new();
        for (label, count) in iter {
            batch.add(label, count);
        }
        batch
    }
}

/// Model family in use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Classifier,
    Detector,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelKind::Classifier => write!(f, "classifier"),
            ModelKind::Detector => write!(f, "detector"),
        }
    }
}

/// The model selected at startup
pub enum PestModel {
    Classifier(ClassifierModel),
    Detector(DetectorModel),
}

impl PestModel {
    pub fn kind(&self) -> ModelKind {
        match self {
            PestModel::Classifier(_) => ModelKind::Classifier,
            PestModel::Detector(_) => ModelKind::Detector,
        }
    }

    /// Count pests in a decoded image. No side effects.
    pub fn detect(&self, image: &DynamicImage) -> Result<DetectionBatch> {
        match self {
            PestModel::Classifier(model) => model.detect(image),
            PestModel::Detector(model) => model.detect(image),
        }
    }
}

impl From<ClassifierModel> for PestModel {
    fn from(model: ClassifierModel) -> Self {
        PestModel::Classifier(model)
    }
}

impl From<DetectorModel> for PestModel {
    fn from(model: DetectorModel) -> Self {
        PestModel::Detector(model)
    }
}

/// Startup capability probe for the model artifacts
#[derive(Debug, Clone)]
pub struct ModelProbe {
    /// JSON linear-classifier artifact
    pub classifier_path: Option<PathBuf>,
    /// ONNX object-detector artifact
    pub detector_path: Option<PathBuf>,
    pub confidence_threshold: f32,
}

impl ModelProbe {
    /// Whether this build can run the ONNX detector backend
    pub const fn onnx_supported() -> bool {
        cfg!(feature = "onnx")
    }

    /// Select a model: a loadable classifier first, then the detector.
    ///
    /// Fails with `ModelUnavailable` naming every artifact that was probed.
    pub fn select(&self) -> Result<PestModel> {
        let mut probed = Vec::new();

        if let Some(path) = &self.classifier_path {
            if path.is_file() {
                match ClassifierModel::load(path) {
                    Ok(model) => {
                        info!("Classifier model loaded from {}", path.display());
                        return Ok(model.into());
                    }
                    Err(e) => {
                        warn!("Ignoring classifier artifact {}: {}", path.display(), e);
                        probed.push(format!("{} (unloadable: {})", path.display(), e));
                    }
                }
            } else {
                probed.push(format!("{} (missing)", path.display()));
            }
        }

        if let Some(path) = &self.detector_path {
            if !path.is_file() {
                probed.push(format!("{} (missing)", path.display()));
            } else if !Self::onnx_supported() {
                warn!(
                    "Detector artifact {} found but this build lacks the `onnx` feature",
                    path.display()
                );
                probed.push(format!("{} (onnx support not compiled)", path.display()));
            } else {
                return self.load_detector(path);
            }
        }

        if probed.is_empty() {
            probed.push("no model paths configured".to_string());
        }
        Err(Error::ModelUnavailable(probed.join("; ")))
    }

    #[cfg(feature = "onnx")]
    fn load_detector(&self, path: &std::path::Path) -> Result<PestModel> {
        let backend = onnx::OnnxPredictor::load(path, self.confidence_threshold)?;
        info!("ONNX detector loaded from {}", path.display());
        Ok(DetectorModel::new(Box::new(backend), self.confidence_threshold).into())
    }

    #[cfg(not(feature = "onnx"))]
    fn load_detector(&self, path: &std::path::Path) -> Result<PestModel> {
        Err(Error::ModelUnavailable(format!(
            "{} requires the `onnx` feature",
            path.display()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_ignores_zero_counts() {
        let mut batch = DetectionBatch::new();
        batch.add("Aphid", 0);
        assert!(batch.is_empty());
        assert_eq!(batch.get("Aphid"), 0);
    }

    #[test]
    fn test_batch_accumulates_same_label() {
        let mut batch = DetectionBatch::new();
        batch.add("Mite", 2);
        batch.add("Mite", 3);
        batch.add("Thrips", 1);
        assert_eq!(batch.get("Mite"), 5);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.total(), 6);
    }

    #[test]
    fn test_batch_serializes_as_plain_object() {
        let batch: DetectionBatch = vec![("Beetle", 2), ("Aphid", 1)].into_iter().collect();
        let json = serde_json::to_value(&batch).unwrap();
        assert_eq!(json, serde_json::json!({"Aphid": 1, "Beetle": 2}));

        let empty = serde_json::to_string(&DetectionBatch::new()).unwrap();
        assert_eq!(empty, "{}");
    }

    #[test]
    fn test_probe_without_paths_is_unavailable() {
        let probe = ModelProbe {
            classifier_path: None,
            detector_path: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        };
        assert!(matches!(probe.select(), Err(Error::ModelUnavailable(_))));
    }

    #[test]
    fn test_probe_reports_missing_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let probe = ModelProbe {
            classifier_path: Some(dir.path().join("model.json")),
            detector_path: Some(dir.path().join("yolov8n.onnx")),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        };
        match probe.select() {
            Err(Error::ModelUnavailable(msg)) => {
                assert!(msg.contains("model.json (missing)"));
                assert!(msg.contains("yolov8n.onnx (missing)"));
            }
            Ok(model) => panic!("unexpected model {}", model.kind()),
            Err(e) => panic!("unexpected error {}", e),
        }
    }

    #[test]
    fn test_probe_prefers_loadable_classifier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        let artifact = serde_json::json!({
            "input_size": 2,
            "weights": [[1.0, 1.0, 1.0, 1.0], [-1.0, -1.0, -1.0, -1.0]],
            "bias": [0.0, 0.0]
        });
        std::fs::write(&path, artifact.to_string()).unwrap();

        let probe = ModelProbe {
            classifier_path: Some(path),
            detector_path: Some(dir.path().join("yolov8n.onnx")),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        };
        let model = probe.select().unwrap();
        assert_eq!(model.kind(), ModelKind::Classifier);
    }

    #[test]
    fn test_probe_skips_corrupt_classifier() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.json");
        std::fs::write(&path, "{ not json").unwrap();

        let probe = ModelProbe {
            classifier_path: Some(path),
            detector_path: None,
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        };
        match probe.select() {
            Err(Error::ModelUnavailable(msg)) => assert!(msg.contains("unloadable")),
            Ok(model) => panic!("unexpected model {}", model.kind()),
            Err(e) => panic!("unexpected error {}", e),
        }
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn test_probe_detector_requires_onnx_feature() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yolov8n.onnx");
        std::fs::write(&path, b"onnx bytes").unwrap();

        let probe = ModelProbe {
            classifier_path: None,
            detector_path: Some(path),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        };
        match probe.select() {
            Err(Error::ModelUnavailable(msg)) => assert!(msg.contains("onnx")),
            Ok(model) => panic!("unexpected model {}", model.kind()),
            Err(e) => panic!("unexpected error {}", e),
        }
    }
}
