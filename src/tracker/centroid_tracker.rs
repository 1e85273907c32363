//! Center-distance multi-object tracker.

use chrono::{DateTime, Utc};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::tracker::detection::Detection;
use crate::tracker::matching::{self, AssignmentResult, AssociationMethod};
use crate::tracker::track::{Track, TrackId};

/// Configuration for the [`Tracker`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Association gate: maximum center distance in pixels
    pub max_distance: f32,
    /// Frames a track may go unmatched before it is removed
    pub max_age: u64,
    /// Position samples retained per track
    pub history_len: usize,
    pub association: AssociationMethod,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_distance: 80.0,
            max_age: 30,
            history_len: 32,
            association: AssociationMethod::Greedy,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_distance.is_finite() && self.max_distance > 0.0) {
            return Err(ConfigError::invalid("tracker.max_distance", "must be > 0"));
        }
        if self.max_age < 1 {
            return Err(ConfigError::invalid("tracker.max_age", "must be >= 1"));
        }
        if self.history_len < 2 {
            return Err(ConfigError::invalid("tracker.history_len", "must be >= 2"));
        }
        Ok(())
    }
}

/// Associates per-frame detections with persistent tracks.
///
/// Live tracks are kept in ascending id order. Ids come from a counter that
/// only moves forward, so an expired id is never handed out again.
#[derive(Debug, Clone)]
pub struct Tracker {
    tracks: Vec<Track>,
    removed: Vec<TrackId>,
    next_id: u64,
    frame_index: Option<u64>,
    config: TrackerConfig,
}

impl Default for Tracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}

impl Tracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            tracks: Vec::new(),
            removed: Vec::new(),
            next_id: 1,
            frame_index: None,
            config,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Index of the most recent frame passed to [`Tracker::update`].
    pub fn frame_index(&self) -> Option<u64> {
        self.frame_index
    }

    /// Live tracks in ascending id order.
    pub fn live_tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn get(&self, id: TrackId) -> Option<&Track> {
        self.tracks
            .binary_search_by_key(&id, Track::id)
            .ok()
            .map(|idx| &self.tracks[idx])
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Ids expired during the latest update.
    pub fn removed(&self) -> &[TrackId] {
        &self.removed
    }

    /// Drop every live track. The id counter keeps counting.
    pub fn reset(&mut self) {
        self.tracks.clear();
        self.removed.clear();
        self.frame_index = None;
    }

    /// Update with the current wall-clock time as the sample timestamp.
    pub fn update(&mut self, detections: &[Detection], frame_index: u64) -> &mut [Track] {
        self.update_at(detections, frame_index, Utc::now())
    }

    /// Associate `detections` observed in `frame_index` and return the live
    /// tracks. Matched tracks are in [`TrackState::Tracked`], the rest in
    /// [`TrackState::Lost`].
    ///
    /// [`TrackState::Tracked`]: crate::tracker::TrackState::Tracked
    /// [`TrackState::Lost`]: crate::tracker::TrackState::Lost
    pub fn update_at(
        &mut self,
        detections: &[Detection],
        frame_index: u64,
        timestamp: DateTime<Utc>,
    ) -> &mut [Track] {
        self.frame_index = Some(frame_index);
        self.removed.clear();

        // Step 1: Expire tracks unmatched for longer than max_age, so a gap in
        // frame indices cannot revive them
        let max_age = self.config.max_age;
        let removed = &mut self.removed;
        self.tracks.retain(|track| {
            if frame_index.saturating_sub(track.last_seen()) > max_age {
                debug!(track = %track.id(), last_seen = track.last_seen(), "track expired");
                removed.push(track.id());
                false
            } else {
                true
            }
        });

        // Step 2: Associate against the remaining tracks
        let track_centers: Vec<Point2<f32>> = self
            .tracks
            .iter()
            .map(|t| t.last_position().map_or(t.bbox().center(), |p| p.center))
            .collect();
        let det_centers: Vec<Point2<f32>> = detections.iter().map(Detection::center).collect();
        let dists = matching::center_distance(&track_centers, &det_centers);

        let confidences: Vec<f32> = detections.iter().map(|d| d.confidence).collect();
        let order = matching::confidence_order(&confidences);

        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = match self.config.association {
            AssociationMethod::Greedy => {
                matching::greedy_assignment(&dists, &order, self.config.max_distance)
            }
            AssociationMethod::Optimal => {
                matching::linear_assignment(&dists, self.config.max_distance)
            }
        };

        // Step 3: Update matched tracks, the rest go lost
        for itrack in unmatched_tracks {
            self.tracks[itrack].mark_lost();
        }
        for (itrack, idet) in matches {
            let track = &mut self.tracks[itrack];
            if !track.observe(&detections[idet], frame_index, timestamp) {
                debug!(
                    track = %track.id(),
                    frame_index,
                    "frame index not newer than last sample, position not recorded"
                );
            }
        }

        // Step 4: Init new tracks, most confident detection first
        let mut unmatched = unmatched_detections;
        unmatched.sort_by_key(|&idx| order.iter().position(|&o| o == idx));
        for idet in unmatched {
            let id = TrackId(self.next_id);
            self.next_id += 1;
            let det = &detections[idet];
            debug!(track = %id, class = %det.class, frame_index, "new track");
            self.tracks.push(Track::new(
                id,
                det,
                frame_index,
                timestamp,
                self.config.history_len,
            ));
        }

        &mut self.tracks
    }
}
