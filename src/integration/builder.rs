//! Builder for creating Detection objects from various input formats.

use crate::tracker::{Detection, Rect, VehicleClass};

/// Builder for creating `Detection` objects from various input formats.
#[derive(Debug, Clone)]
pub struct DetectionBuilder {
    class: VehicleClass,
    bbox: Rect,
    confidence: f32,
}

impl Default for DetectionBuilder {
    fn default() -> Self {
        Self {
            class: VehicleClass::Car,
            bbox: Rect::default(),
            confidence: 0.0,
        }
    }
}

impl DetectionBuilder {
    /// Create a new detection builder.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn class(mut self, class: impl Into<VehicleClass>) -> Self {
        self.class = class.into();
        self
    }

    /// Set bounding box in corner format (x1, y1, x2, y2).
    pub fn tlbr(mut self, x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        self.bbox = Rect::from_tlbr(x1, y1, x2, y2);
        self
    }

    /// Set bounding box in XYWH format (center_x, center_y, width, height).
    pub fn xywh(mut self, cx: f32, cy: f32, w: f32, h: f32) -> Self {
        self.bbox = Rect::from_xywh(cx, cy, w, h);
        self
    }

    /// Set bounding box in TLWH format (left, top, width, height).
    pub fn tlwh(mut self, x: f32, y: f32, w: f32, h: f32) -> Self {
        self.bbox = Rect::new(x, y, w, h);
        self
    }

    /// Set the confidence score.
    pub fn confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// Build the final `Detection`.
    pub fn build(self) -> Detection {
        Detection::from_rect(self.class, self.bbox, self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detection_builder() {
        let det = DetectionBuilder::new()
            .class("truck")
            .tlbr(10.0, 20.0, 50.0, 80.0)
            .confidence(0.95)
            .build();

        assert_eq!(det.confidence, 0.95);
        assert_eq!(det.class, VehicleClass::Truck);
        assert_eq!(det.bbox.to_tlbr(), [10.0, 20.0, 50.0, 80.0]);
    }

    #[test]
    fn test_xywh_and_tlwh_agree() {
        let a = DetectionBuilder::new().xywh(30.0, 50.0, 40.0, 60.0).build();
        let b = DetectionBuilder::new().tlwh(10.0, 20.0, 40.0, 60.0).build();
        assert_eq!(a.bbox, b.bbox);
    }
}
