//! Pixel displacement to real-world speed.

use tracing::debug;

use crate::config::Calibration;
use crate::tracker::{PositionSample, Track};

/// Conversion factor from m/s to km/h.
pub const KMH_PER_MPS: f64 = 3.6;

/// Computes smoothed per-track speeds from position history.
#[derive(Debug, Clone)]
pub struct SpeedEstimator {
    calibration: Calibration,
    window: usize,
}

impl SpeedEstimator {
    /// `window` is clamped to at least one sample.
    pub fn new(calibration: Calibration, window: usize) -> Self {
        Self {
            calibration,
            window: window.max(1),
        }
    }

    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Speed in km/h between two samples, `None` when they share a frame index.
    pub fn instantaneous_speed(&self, prev: &PositionSample, last: &PositionSample) -> Option<f64> {
        let delta_frames = last.frame_index.checked_sub(prev.frame_index)?;
        if delta_frames == 0 {
            return None;
        }
        let pixels = nalgebra::distance(&prev.center, &last.center) as f64;
        let meters = pixels * self.calibration.meters_per_pixel();
        let seconds = delta_frames as f64 / self.calibration.frame_rate;
        let speed = meters / seconds * KMH_PER_MPS;
        speed.is_finite().then_some(speed)
    }

    /// Record a speed sample for a track matched in `frame_index` and return
    /// the smoothed speed.
    ///
    /// Returns `None` while the track has fewer than two positions. When no
    /// new sample can be taken for this frame the previous smoothed value is
    /// returned unchanged.
    pub fn update(&self, track: &mut Track, frame_index: u64) -> Option<f64> {
        let (prev, last) = track.last_two_positions()?;

        let fresh = last.frame_index == frame_index && track.last_speed_frame() != Some(frame_index);
        let speed = if fresh {
            self.instantaneous_speed(prev, last)
        } else {
            None
        };

        match speed {
            Some(speed) => Some(track.push_speed(frame_index, speed, self.window)),
            None => {
                debug!(
                    track = %track.id(),
                    frame_index,
                    "degenerate time delta, keeping previous speed"
                );
                track.speed_kmh()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::tracker::{Detection, Rect, Tracker};

    fn car_at(cx: f32, cy: f32) -> Detection {
        Detection::from_rect("car", Rect::from_xywh(cx, cy, 40.0, 30.0), 0.9)
    }

    #[test]
    fn test_single_position_is_undefined() {
        let estimator = SpeedEstimator::new(Calibration::default(), 3);
        let mut tracker = Tracker::default();
        let tracks = tracker.update(&[car_at(100.0, 100.0)], 0);
        assert_eq!(estimator.update(&mut tracks[0], 0), None);
    }

    #[test]
    fn test_instantaneous_speed() {
        let estimator = SpeedEstimator::new(Calibration::new(10.0, 30.0, 60.0), 1);
        let now = Utc::now();
        let prev = PositionSample {
            frame_index: 0,
            center: nalgebra::Point2::new(100.0, 100.0),
            timestamp: now,
        };
        let last = PositionSample {
            frame_index: 1,
            center: nalgebra::Point2::new(110.0, 100.0),
            timestamp: now,
        };
        let speed = estimator.instantaneous_speed(&prev, &last).unwrap();
        assert!((speed - 108.0).abs() < 1e-9);

        let same_frame = PositionSample { frame_index: 1, ..prev };
        assert_eq!(estimator.instantaneous_speed(&same_frame, &last), None);
    }

    #[test]
    fn test_gap_in_frames_divides_time() {
        // 10 px over 2 frames at 30 fps is half of 108 km/h
        let estimator = SpeedEstimator::new(Calibration::new(10.0, 30.0, 60.0), 1);
        let mut tracker = Tracker::default();
        tracker.update(&[car_at(100.0, 100.0)], 0);
        tracker.update(&[], 1);
        let tracks = tracker.update(&[car_at(110.0, 100.0)], 2);
        let speed = estimator.update(&mut tracks[0], 2).unwrap();
        assert!((speed - 54.0).abs() < 1e-6);
    }

    #[test]
    fn test_repeated_update_same_frame_is_idempotent() {
        let estimator = SpeedEstimator::new(Calibration::default(), 3);
        let mut tracker = Tracker::default();
        tracker.update(&[car_at(100.0, 100.0)], 0);
        let tracks = tracker.update(&[car_at(110.0, 100.0)], 1);
        let first = estimator.update(&mut tracks[0], 1);
        let second = estimator.update(&mut tracks[0], 1);
        assert_eq!(first, second);
        assert_eq!(tracks[0].speed_history().len(), 1);
    }

    #[test]
    fn test_duplicate_frame_index_keeps_previous_speed() {
        let estimator = SpeedEstimator::new(Calibration::default(), 3);
        let mut tracker = Tracker::default();
        tracker.update(&[car_at(100.0, 100.0)], 0);
        let tracks = tracker.update(&[car_at(110.0, 100.0)], 1);
        let before = estimator.update(&mut tracks[0], 1).unwrap();

        // detector delivers frame 1 again with the box moved
        let tracks = tracker.update(&[car_at(150.0, 100.0)], 1);
        let after = estimator.update(&mut tracks[0], 1).unwrap();
        assert!(after.is_finite());
        assert_eq!(before, after);
    }
}
