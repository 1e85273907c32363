//! Trait for object detection inference backends.

use serde::{Deserialize, Serialize};

use crate::error::{BoxError, ConfigError};
use crate::integration::source::Frame;
use crate::tracker::{Detection, VehicleClass};

/// Trait for object detection inference backends.
///
/// Implement this trait to connect any detection model to the pipeline.
///
/// # Example
///
/// ```ignore
/// use speedtrack_rs::{Detection, Detector, Frame};
///
/// struct MyDetector {
///     // Your model here
/// }
///
/// impl Detector for MyDetector {
///     type Error = std::io::Error;
///
///     fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
///         // Run inference on frame.data and return detections
///         Ok(vec![])
///     }
/// }
/// ```
pub trait Detector {
    /// Error type for detection failures.
    type Error: Into<BoxError>;

    /// Run inference on one frame. No particular ordering of the returned
    /// detections is required.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    type Error = D::Error;

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
        (**self).detect(frame)
    }
}

/// Helper trait for converting model-specific outputs to `Detection`.
///
/// Implement this for your model's output format to enable easy conversion.
pub trait IntoDetections {
    /// Convert the output into a vector of detections.
    fn into_detections(self) -> Vec<Detection>;
}

impl IntoDetections for Vec<Detection> {
    fn into_detections(self) -> Vec<Detection> {
        self
    }
}

/// Keeps confident detections of the configured classes.
///
/// Defaults to the four road-vehicle classes above 0.5 confidence. An empty
/// class list accepts every class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionFilter {
    pub min_confidence: f32,
    pub classes: Vec<VehicleClass>,
}

impl Default for DetectionFilter {
    fn default() -> Self {
        Self {
            min_confidence: 0.5,
            classes: vec![
                VehicleClass::Car,
                VehicleClass::Motorcycle,
                VehicleClass::Bus,
                VehicleClass::Truck,
            ],
        }
    }
}

impl DetectionFilter {
    /// Filter that lets everything through.
    pub fn accept_all() -> Self {
        Self {
            min_confidence: 0.0,
            classes: Vec::new(),
        }
    }

    pub fn accepts(&self, detection: &Detection) -> bool {
        detection.confidence > self.min_confidence
            && (self.classes.is_empty() || self.classes.contains(&detection.class))
    }

    pub fn apply(&self, detections: impl IntoDetections) -> Vec<Detection> {
        let mut detections = detections.into_detections();
        detections.retain(|d| self.accepts(d));
        detections
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(ConfigError::invalid("filter.min_confidence", "must be within [0, 1]"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_keeps_confident_vehicles() {
        let filter = DetectionFilter::default();
        let kept = filter.apply(vec![
            Detection::new("car", 0.0, 0.0, 10.0, 10.0, 0.9),
            Detection::new("truck", 0.0, 0.0, 10.0, 10.0, 0.4),
            Detection::new("person", 0.0, 0.0, 10.0, 10.0, 0.99),
            Detection::new("bus", 0.0, 0.0, 10.0, 10.0, 0.5),
        ]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].class, VehicleClass::Car);
    }

    #[test]
    fn test_accept_all() {
        let filter = DetectionFilter::accept_all();
        assert!(filter.accepts(&Detection::new("person", 0.0, 0.0, 1.0, 1.0, 0.1)));
    }
}
