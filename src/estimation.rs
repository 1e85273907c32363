//! Speed estimation and speed-limit classification for tracked objects.

mod classifier;
mod speed;

pub use classifier::{SpeedClass, classify};
pub use speed::{KMH_PER_MPS, SpeedEstimator};
