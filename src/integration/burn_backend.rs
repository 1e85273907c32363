//! Burn inference backend for vehicle detection.
//!
//! This module provides a `BurnDetector` that implements [`Detector`] for
//! object detection models built with the Burn framework.
//!
//! # Example
//!
//! ```ignore
//! use speedtrack_rs::integration::{BurnDetector, BurnModel, RawDetection};
//! use burn::backend::NdArray;
//!
//! // Implement BurnModel for your detection model
//! struct MyYoloModel { /* ... */ }
//!
//! impl BurnModel<NdArray> for MyYoloModel {
//!     fn forward(&self, input: burn::tensor::Tensor<NdArray, 4>) -> Vec<RawDetection> {
//!         // Run inference
//!     }
//! }
//!
//! let model = MyYoloModel::load("model.bin");
//! let detector = BurnDetector::new(model, Default::default());
//! ```

use burn::prelude::*;
use burn::tensor::Tensor;
use thiserror::Error;

use super::{DetectionBuilder, Detector, Frame};
use crate::tracker::{Detection, VehicleClass};

/// Error type for Burn detection failures.
#[derive(Debug, Clone, Error)]
pub enum BurnDetectorError {
    /// Frame has invalid dimensions.
    #[error("invalid input dimensions: expected {expected:?}, got {got:?}")]
    InvalidInputDimensions {
        expected: (u32, u32, u32),
        got: (u32, u32, u32),
    },
    /// Preprocessing failed.
    #[error("preprocessing error: {0}")]
    PreprocessingError(String),
}

/// Raw detection output from the model before filtering.
#[derive(Debug, Clone)]
pub struct RawDetection {
    /// Bounding box: [x1, y1, x2, y2] or [cx, cy, w, h] depending on model
    pub bbox: [f32; 4],
    /// Confidence score
    pub score: f32,
    /// COCO class index, when the model is multi-class
    pub class_id: Option<usize>,
}

/// Trait for Burn-based detection models.
///
/// Implement this trait for your specific model architecture.
pub trait BurnModel<B: Backend>: Send + Sync {
    /// Run forward pass on an input tensor of shape [batch, channels, height, width].
    fn forward(&self, input: Tensor<B, 4>) -> Vec<RawDetection>;

    /// Get the expected input size (channels, height, width).
    fn input_size(&self) -> (u32, u32, u32) {
        (3, 640, 640) // Default YOLO input size
    }

    /// Whether bbox output is in XYWH format (vs corner format).
    fn bbox_is_xywh(&self) -> bool {
        true // Most YOLO variants use XYWH
    }
}

/// Burn-based object detector implementing [`Detector`].
///
/// Outputs whose class index is not a road vehicle are discarded here;
/// outputs without a class index are labelled as cars.
pub struct BurnDetector<B: Backend, M: BurnModel<B>> {
    model: M,
    device: B::Device,
    conf_threshold: f32,
}

impl<B: Backend, M: BurnModel<B>> BurnDetector<B, M> {
    /// Create a new Burn detector with the given model and device.
    pub fn new(model: M, device: B::Device) -> Self {
        Self {
            model,
            device,
            conf_threshold: 0.25,
        }
    }

    /// Set the confidence threshold for filtering detections.
    pub fn with_conf_threshold(mut self, threshold: f32) -> Self {
        self.conf_threshold = threshold;
        self
    }

    /// Convert frame bytes (CHW, u8) into a normalized `[1, C, H, W]` tensor.
    pub fn preprocess(&self, frame: &Frame) -> Result<Tensor<B, 4>, BurnDetectorError> {
        let (channels, target_h, target_w) = self.model.input_size();
        let (width, height) = (frame.width, frame.height);
        let expected_len = (width * height * channels) as usize;

        if frame.data.len() != expected_len {
            let got_width = if height * channels > 0 {
                frame.data.len() as u32 / (height * channels)
            } else {
                0
            };
            return Err(BurnDetectorError::InvalidInputDimensions {
                expected: (channels, height, width),
                got: (channels, height, got_width),
            });
        }

        if height != target_h || width != target_w {
            return Err(BurnDetectorError::PreprocessingError(format!(
                "frame size {width}x{height} doesn't match model size {target_w}x{target_h}"
            )));
        }

        let data: Vec<f32> = frame.data.iter().map(|&x| x as f32 / 255.0).collect();
        let tensor = Tensor::<B, 1>::from_floats(data.as_slice(), &self.device).reshape([
            1,
            channels as usize,
            height as usize,
            width as usize,
        ]);

        Ok(tensor)
    }

    /// Convert raw model outputs to vehicle detections.
    fn postprocess(&self, raw_detections: Vec<RawDetection>) -> Vec<Detection> {
        raw_detections
            .into_iter()
            .filter(|d| d.score >= self.conf_threshold)
            .filter_map(|d| {
                let class = match d.class_id {
                    Some(id) => VehicleClass::from_coco_id(id)?,
                    None => VehicleClass::Car,
                };
                let builder = DetectionBuilder::new().class(class).confidence(d.score);
                let [a, b, c, e] = d.bbox;
                Some(if self.model.bbox_is_xywh() {
                    builder.xywh(a, b, c, e).build()
                } else {
                    builder.tlbr(a, b, c, e).build()
                })
            })
            .collect()
    }
}

impl<B: Backend, M: BurnModel<B>> Detector for BurnDetector<B, M> {
    type Error = BurnDetectorError;

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
        let tensor = self.preprocess(frame)?;
        let raw_detections = self.model.forward(tensor);
        Ok(self.postprocess(raw_detections))
    }
}
