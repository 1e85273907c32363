//! Values the pipeline hands to its host: speed events, annotated frames and
//! status updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::estimation::SpeedClass;
use crate::integration::source::Frame;
use crate::tracker::{Rect, TrackId, VehicleClass};

/// One speed measurement for one track in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedEvent {
    pub track_id: TrackId,
    pub class: VehicleClass,
    pub speed_kmh: f64,
    pub over_limit: bool,
    pub frame_index: u64,
    pub timestamp: DateTime<Utc>,
}

/// Drawing instruction for one matched track.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub track_id: TrackId,
    pub bbox: Rect,
    pub class: VehicleClass,
    pub speed_kmh: Option<f64>,
    pub speed_class: SpeedClass,
}

impl Overlay {
    /// Text drawn above the box, e.g. `"72.4 km/h"`. `None` while the speed
    /// is undefined.
    pub fn label(&self) -> Option<String> {
        self.speed_kmh.map(|speed| format!("{speed:.1} km/h"))
    }

    #[inline]
    pub fn over_limit(&self) -> bool {
        self.speed_class.is_speeding()
    }
}

/// A frame plus the overlays the presentation layer should draw on it.
#[derive(Debug, Clone)]
pub struct AnnotatedFrame {
    pub frame: Frame,
    pub overlays: Vec<Overlay>,
}

/// Lifecycle state of a [`PipelineController`](crate::PipelineController).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PipelineState {
    #[default]
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Human-readable status for the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub state: PipelineState,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_label() {
        let mut overlay = Overlay {
            track_id: TrackId(3),
            bbox: Rect::default(),
            class: VehicleClass::Car,
            speed_kmh: Some(72.44),
            speed_class: SpeedClass::Speeding,
        };
        assert_eq!(overlay.label().as_deref(), Some("72.4 km/h"));
        assert!(overlay.over_limit());

        overlay.speed_kmh = None;
        overlay.speed_class = SpeedClass::Undefined;
        assert_eq!(overlay.label(), None);
        assert!(!overlay.over_limit());
    }
}
