//! Single vehicle track: identity plus bounded motion history.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::tracker::detection::{Detection, VehicleClass};
use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackState;

/// Stable track identifier. Allocated once by the tracker and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&format!("#{}", self.0))
    }
}

/// One observed position of a track.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub frame_index: u64,
    /// Bounding box center in pixels
    pub center: Point2<f32>,
    pub timestamp: DateTime<Utc>,
}

/// Single vehicle track.
///
/// Position samples are strictly increasing by frame index and capped at the
/// tracker's `history_len`; speed samples are capped by the estimator's
/// smoothing window.
#[derive(Debug, Clone)]
pub struct Track {
    id: TrackId,
    class: VehicleClass,
    state: TrackState,
    bbox: Rect,
    confidence: f32,
    last_seen: u64,
    history_len: usize,
    positions: VecDeque<PositionSample>,
    speeds: VecDeque<f64>,
    last_speed_frame: Option<u64>,
    speed_kmh: Option<f64>,
}

impl Track {
    pub(crate) fn new(
        id: TrackId,
        detection: &Detection,
        frame_index: u64,
        timestamp: DateTime<Utc>,
        history_len: usize,
    ) -> Self {
        let history_len = history_len.max(2);
        let mut positions = VecDeque::with_capacity(history_len);
        positions.push_back(PositionSample {
            frame_index,
            center: detection.center(),
            timestamp,
        });

        Self {
            id,
            class: detection.class.clone(),
            state: TrackState::Tracked,
            bbox: detection.bbox,
            confidence: detection.confidence,
            last_seen: frame_index,
            history_len,
            positions,
            speeds: VecDeque::new(),
            last_speed_frame: None,
            speed_kmh: None,
        }
    }

    #[inline]
    pub fn id(&self) -> TrackId {
        self.id
    }

    /// Class of the most recent matched detection.
    #[inline]
    pub fn class(&self) -> &VehicleClass {
        &self.class
    }

    #[inline]
    pub fn state(&self) -> TrackState {
        self.state
    }

    /// Whether a detection was associated to this track in the latest frame.
    #[inline]
    pub fn is_matched(&self) -> bool {
        self.state == TrackState::Tracked
    }

    #[inline]
    pub fn bbox(&self) -> Rect {
        self.bbox
    }

    #[inline]
    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    /// Frame index of the last associated detection.
    #[inline]
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    /// Position history, oldest first.
    pub fn positions(&self) -> impl ExactSizeIterator<Item = &PositionSample> {
        self.positions.iter()
    }

    #[inline]
    pub fn last_position(&self) -> Option<&PositionSample> {
        self.positions.back()
    }

    /// The two most recent position samples, oldest first.
    pub fn last_two_positions(&self) -> Option<(&PositionSample, &PositionSample)> {
        let n = self.positions.len();
        if n < 2 {
            return None;
        }
        Some((&self.positions[n - 2], &self.positions[n - 1]))
    }

    #[inline]
    pub fn num_positions(&self) -> usize {
        self.positions.len()
    }

    /// Instantaneous speed samples in km/h, oldest first.
    pub fn speed_history(&self) -> impl ExactSizeIterator<Item = f64> + '_ {
        self.speeds.iter().copied()
    }

    /// Latest smoothed speed in km/h. `None` until two positions were seen.
    #[inline]
    pub fn speed_kmh(&self) -> Option<f64> {
        self.speed_kmh
    }

    /// Frame index of the newest speed sample.
    #[inline]
    pub fn last_speed_frame(&self) -> Option<u64> {
        self.last_speed_frame
    }

    /// Associate a detection with this track.
    ///
    /// Class, box and confidence always follow the newest detection. A
    /// position sample is appended only when `frame_index` is newer than the
    /// last one; returns whether that happened.
    pub(crate) fn observe(
        &mut self,
        detection: &Detection,
        frame_index: u64,
        timestamp: DateTime<Utc>,
    ) -> bool {
        self.class = detection.class.clone();
        self.bbox = detection.bbox;
        self.confidence = detection.confidence;
        self.state = TrackState::Tracked;

        let newer = self
            .positions
            .back()
            .is_none_or(|last| frame_index > last.frame_index);
        if !newer {
            return false;
        }

        if self.positions.len() == self.history_len {
            self.positions.pop_front();
        }
        self.positions.push_back(PositionSample {
            frame_index,
            center: detection.center(),
            timestamp,
        });
        self.last_seen = frame_index;
        true
    }

    /// Append an instantaneous speed sample, keep at most `window` samples
    /// and return their mean.
    pub(crate) fn push_speed(&mut self, frame_index: u64, speed_kmh: f64, window: usize) -> f64 {
        let window = window.max(1);
        self.speeds.push_back(speed_kmh);
        while self.speeds.len() > window {
            self.speeds.pop_front();
        }
        let smoothed = self.speeds.iter().sum::<f64>() / self.speeds.len() as f64;
        self.last_speed_frame = Some(frame_index);
        self.speed_kmh = Some(smoothed);
        smoothed
    }

    pub(crate) fn mark_lost(&mut self) {
        self.state = TrackState::Lost;
    }
}
