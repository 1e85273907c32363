//! SpeedPipeline for combining detection, tracking and speed estimation.

use chrono::{DateTime, Utc};

use crate::config::{Calibration, PipelineConfig};
use crate::estimation::{SpeedEstimator, classify};
use crate::tracker::{Detection, TrackId, Tracker};

use super::detector::{DetectionFilter, Detector};
use super::events::{Overlay, SpeedEvent};
use super::source::Frame;

/// Result of processing one frame.
#[derive(Debug, Clone, Default)]
pub struct FrameReport {
    pub frame_index: u64,
    /// One event per matched track that received a speed sample this frame,
    /// in track id order
    pub events: Vec<SpeedEvent>,
    /// One overlay per matched track
    pub overlays: Vec<Overlay>,
    pub live_tracks: usize,
    /// Tracks expired in this frame
    pub expired: Vec<TrackId>,
}

/// Per-frame cycle: detect, track, estimate, classify.
///
/// This struct bundles any `Detector` with the [`Tracker`] and
/// [`SpeedEstimator`] and runs them synchronously; the
/// [`PipelineController`](super::PipelineController) drives it from its
/// processing thread.
pub struct SpeedPipeline<D: Detector> {
    detector: D,
    filter: DetectionFilter,
    tracker: Tracker,
    estimator: SpeedEstimator,
    speed_limit_kmh: f64,
}

impl<D: Detector> SpeedPipeline<D> {
    /// Create a new pipeline with the given detector and configuration.
    pub fn new(detector: D, config: &PipelineConfig) -> Self {
        Self {
            detector,
            filter: config.filter.clone(),
            tracker: Tracker::new(config.tracker.clone()),
            estimator: SpeedEstimator::new(config.calibration, config.smoothing_window),
            speed_limit_kmh: config.calibration.speed_limit_kmh,
        }
    }

    /// Create a new pipeline with default configuration.
    pub fn with_default_config(detector: D) -> Self {
        Self::new(detector, &PipelineConfig::default())
    }

    /// Prepare for a new run: drop live tracks and apply `calibration`.
    /// Track ids keep counting from the previous run.
    pub fn reset(&mut self, calibration: Calibration) {
        self.tracker.reset();
        self.estimator = SpeedEstimator::new(calibration, self.estimator.window());
        self.speed_limit_kmh = calibration.speed_limit_kmh;
    }

    /// Run detection on `frame`, then track and estimate.
    ///
    /// A detector error leaves the tracker untouched.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameReport, D::Error> {
        let detections = self.detector.detect(frame)?;
        let detections = self.filter.apply(detections);
        Ok(self.process_detections(&detections, frame.index, frame.timestamp))
    }

    /// Track and estimate from detections produced elsewhere.
    pub fn process_detections(
        &mut self,
        detections: &[Detection],
        frame_index: u64,
        timestamp: DateTime<Utc>,
    ) -> FrameReport {
        let speed_limit_kmh = self.speed_limit_kmh;
        let estimator = &self.estimator;
        let tracks = self.tracker.update_at(detections, frame_index, timestamp);

        let mut events = Vec::new();
        let mut overlays = Vec::new();
        for track in tracks.iter_mut().filter(|t| t.is_matched()) {
            let already_sampled = track.last_speed_frame() == Some(frame_index);
            let speed_kmh = estimator.update(track, frame_index);
            let speed_class = classify(speed_kmh, speed_limit_kmh);
            // events only for a new sample, keeping per-track frame order strict
            let sampled = !already_sampled && track.last_speed_frame() == Some(frame_index);

            overlays.push(Overlay {
                track_id: track.id(),
                bbox: track.bbox(),
                class: track.class().clone(),
                speed_kmh,
                speed_class,
            });

            if let (true, Some(speed_kmh)) = (sampled, speed_kmh) {
                events.push(SpeedEvent {
                    track_id: track.id(),
                    class: track.class().clone(),
                    speed_kmh,
                    over_limit: speed_class.is_speeding(),
                    frame_index,
                    timestamp,
                });
            }
        }

        FrameReport {
            frame_index,
            events,
            overlays,
            live_tracks: self.tracker.len(),
            expired: self.tracker.removed().to_vec(),
        }
    }

    /// Get a reference to the underlying detector.
    pub fn detector(&self) -> &D {
        &self.detector
    }

    /// Get a mutable reference to the underlying detector.
    pub fn detector_mut(&mut self) -> &mut D {
        &mut self.detector
    }

    /// Get a reference to the underlying tracker.
    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn estimator(&self) -> &SpeedEstimator {
        &self.estimator
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use super::*;
    use crate::estimation::SpeedClass;

    struct MockDetector {
        detections: Vec<Detection>,
    }

    impl Detector for MockDetector {
        type Error = Infallible;

        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, Self::Error> {
            Ok(self.detections.clone())
        }
    }

    #[test]
    fn test_first_frame_has_overlay_but_no_event() {
        let detector = MockDetector {
            detections: vec![Detection::new("car", 10.0, 20.0, 50.0, 80.0, 0.9)],
        };

        let mut pipeline = SpeedPipeline::with_default_config(detector);
        let report = pipeline.process_frame(&Frame::empty(0)).unwrap();

        assert!(report.events.is_empty());
        assert_eq!(report.overlays.len(), 1);
        assert_eq!(report.overlays[0].speed_class, SpeedClass::Undefined);
        assert_eq!(report.live_tracks, 1);
    }

    #[test]
    fn test_filtered_detections_never_become_tracks() {
        let detector = MockDetector {
            detections: vec![Detection::new("person", 10.0, 20.0, 50.0, 80.0, 0.9)],
        };

        let mut pipeline = SpeedPipeline::with_default_config(detector);
        let report = pipeline.process_frame(&Frame::empty(0)).unwrap();
        assert_eq!(report.live_tracks, 0);
        assert!(pipeline.tracker().is_empty());
    }

    #[test]
    fn test_reset_applies_new_limit() {
        let detector = MockDetector { detections: vec![] };
        let mut pipeline = SpeedPipeline::with_default_config(detector);
        let now = Utc::now();

        pipeline.reset(Calibration::new(10.0, 30.0, 200.0));
        pipeline.process_detections(&[Detection::new("car", 90.0, 90.0, 110.0, 110.0, 0.9)], 0, now);
        let report =
            pipeline.process_detections(&[Detection::new("car", 100.0, 90.0, 120.0, 110.0, 0.9)], 1, now);

        // 108 km/h is under the new 200 km/h limit
        assert_eq!(report.events.len(), 1);
        assert!((report.events[0].speed_kmh - 108.0).abs() < 1e-6);
        assert!(!report.events[0].over_limit);
    }
}
