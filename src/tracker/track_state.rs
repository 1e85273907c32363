/// Track state enumeration for the track lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    /// Matched to a detection in the current frame
    #[default]
    Tracked,
    /// Alive but unmatched in the current frame
    Lost,
}
