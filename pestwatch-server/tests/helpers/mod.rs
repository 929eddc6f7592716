//! Shared fixtures for pestwatch-server integration tests

#![allow(dead_code)]

use axum::body::Body;
use axum::http::Request;
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use pestwatch_common::catalog;
use pestwatch_server::detector::{BoundingBox, BoxPredictor, Candidate, DetectorModel};
use pestwatch_server::{AppState, DetectionAggregator, Error, PestModel};
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;

pub const BOUNDARY: &str = "pestwatch-test-boundary";

/// Backend that reports one well-separated box per listed class
pub struct ScriptedPredictor {
    classes: Vec<usize>,
    fail: bool,
}

impl ScriptedPredictor {
    pub fn detecting(labels: &[&str]) -> Self {
        let classes = labels
            .iter()
            .map(|l| catalog::class_index(l).expect("label in catalog"))
            .collect();
        Self {
            classes,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            classes: Vec::new(),
            fail: true,
        }
    }
}

impl BoxPredictor for ScriptedPredictor {
    fn name(&self) -> &str {
        "scripted"
    }

    fn predict(&self, _image: &DynamicImage) -> pestwatch_server::Result<Vec<Candidate>> {
        if self.fail {
            return Err(Error::Inference("backend exploded".to_string()));
        }
        Ok(self
            .classes
            .iter()
            .enumerate()
            .map(|(i, &class_id)| Candidate {
                class_id,
                confidence: 0.9,
                bbox: BoundingBox {
                    x: i as f32 * 100.0,
                    y: 0.0,
                    width: 10.0,
                    height: 10.0,
                },
            })
            .collect())
    }
}

pub fn model(predictor: ScriptedPredictor) -> PestModel {
    DetectorModel::new(Box::new(predictor), 0.5).into()
}

/// App state over a fresh aggregator
pub fn state_with(predictor: ScriptedPredictor) -> (AppState, Arc<DetectionAggregator>) {
    let aggregator = Arc::new(DetectionAggregator::new());
    let state = AppState::new(Arc::clone(&aggregator), Arc::new(model(predictor)));
    (state, aggregator)
}

/// Small solid-color JPEG
pub fn jpeg_bytes() -> Vec<u8> {
    let img = RgbImage::from_pixel(16, 16, Rgb([40, 160, 40]));
    let mut out = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut out, ImageFormat::Jpeg)
        .expect("encode jpeg");
    out.into_inner()
}

/// One part of a multipart/form-data body
pub enum Part<'a> {
    File {
        name: &'a str,
        file_name: &'a str,
        bytes: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

pub fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File {
                name,
                file_name,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                        name, file_name
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
                body.extend_from_slice(bytes);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                        .as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn detect_request(parts: &[Part<'_>]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/detect")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(multipart_body(parts)))
        .unwrap()
}

pub fn image_upload<'a>(file_name: &'a str, bytes: &'a [u8]) -> Part<'a> {
    Part::File {
        name: "image",
        file_name,
        bytes,
    }
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Extract JSON body from response
pub async fn extract_json(body: Body) -> Value {
    let bytes = body
        .collect()
        .await
        .expect("Should read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}
