//! Detector output consumed by the tracker.

use std::fmt;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::tracker::rect::Rect;

/// Object class reported by the detector.
///
/// The four road-vehicle classes get their own variants; anything else the
/// detector emits is kept verbatim so it still shows up in logs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum VehicleClass {
    Car,
    Motorcycle,
    Bus,
    Truck,
    Other(String),
}

impl VehicleClass {
    /// Map a COCO class index to a vehicle class. Non-vehicle indices yield `None`.
    pub fn from_coco_id(id: usize) -> Option<Self> {
        match id {
            2 => Some(Self::Car),
            3 => Some(Self::Motorcycle),
            5 => Some(Self::Bus),
            7 => Some(Self::Truck),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Car => "car",
            Self::Motorcycle => "motorcycle",
            Self::Bus => "bus",
            Self::Truck => "truck",
            Self::Other(label) => label,
        }
    }
}

impl From<&str> for VehicleClass {
    fn from(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "car" => Self::Car,
            "motorcycle" | "motorbike" => Self::Motorcycle,
            "bus" => Self::Bus,
            "truck" => Self::Truck,
            _ => Self::Other(label.to_string()),
        }
    }
}

impl From<String> for VehicleClass {
    fn from(label: String) -> Self {
        Self::from(label.as_str())
    }
}

impl From<VehicleClass> for String {
    fn from(class: VehicleClass) -> Self {
        class.as_str().to_string()
    }
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Detection input for the tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    /// Object class
    pub class: VehicleClass,
    /// Bounding box in pixel coordinates
    pub bbox: Rect,
    /// Detection confidence score in [0, 1]
    pub confidence: f32,
}

impl Detection {
    pub fn new(
        class: impl Into<VehicleClass>,
        x1: f32,
        y1: f32,
        x2: f32,
        y2: f32,
        confidence: f32,
    ) -> Self {
        Self {
            class: class.into(),
            bbox: Rect::from_tlbr(x1, y1, x2, y2),
            confidence,
        }
    }

    pub fn from_rect(class: impl Into<VehicleClass>, bbox: Rect, confidence: f32) -> Self {
        Self {
            class: class.into(),
            bbox,
            confidence,
        }
    }

    #[inline]
    pub fn center(&self) -> Point2<f32> {
        self.bbox.center()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_from_label() {
        assert_eq!(VehicleClass::from("Car"), VehicleClass::Car);
        assert_eq!(VehicleClass::from("motorbike"), VehicleClass::Motorcycle);
        assert_eq!(
            VehicleClass::from("bicycle"),
            VehicleClass::Other("bicycle".to_string())
        );
    }

    #[test]
    fn test_class_from_coco_id() {
        assert_eq!(VehicleClass::from_coco_id(7), Some(VehicleClass::Truck));
        assert_eq!(VehicleClass::from_coco_id(0), None);
    }

    #[test]
    fn test_class_serde_as_string() {
        let json = serde_json::to_string(&VehicleClass::Bus).unwrap();
        assert_eq!(json, "\"bus\"");
        let back: VehicleClass = serde_json::from_str("\"truck\"").unwrap();
        assert_eq!(back, VehicleClass::Truck);
    }

    #[test]
    fn test_detection_center() {
        let det = Detection::new("car", 90.0, 90.0, 110.0, 110.0, 0.9);
        assert_eq!(det.center(), Point2::new(100.0, 100.0));
    }
}
