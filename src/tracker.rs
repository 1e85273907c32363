mod centroid_tracker;
mod detection;
mod matching;
mod rect;
mod track;
mod track_state;

pub use centroid_tracker::{Tracker, TrackerConfig};
pub use detection::{Detection, VehicleClass};
pub use matching::AssociationMethod;
pub use rect::Rect;
pub use track::{PositionSample, Track, TrackId};
pub use track_state::TrackState;
